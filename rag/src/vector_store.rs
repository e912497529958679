use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::chunk_text::Chunk;
use crate::config::{Config, StoreKind};
use crate::error::{RagError, Result};
use crate::store_qdrant::QdrantStore;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    pub chunk: Chunk,
    pub score: f32,
}

/// A similarity index over embedded chunks.
pub trait VectorStore: Send {
    fn is_empty(&self) -> Result<bool>;
    fn upsert(&mut self, entries: &[IndexedChunk]) -> Result<()>;
    /// Best `limit` matches, highest score first.
    fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<Hit>>;
    fn clear(&mut self) -> Result<()>;
}

pub fn store_from_config(cfg: &Config) -> Result<Box<dyn VectorStore>> {
    Ok(match cfg.store {
        StoreKind::Memory => Box::new(MemoryStore::default()),
        StoreKind::Qdrant => Box::new(QdrantStore::new(cfg)?),
    })
}

/// Brute-force cosine index held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Vec<IndexedChunk>,
}

impl MemoryStore {
    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl VectorStore for MemoryStore {
    fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.is_empty())
    }

    fn upsert(&mut self, entries: &[IndexedChunk]) -> Result<()> {
        let dim = self.entries.first().or(entries.first()).map(|e| e.vector.len());
        if let Some(dim) = dim {
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
                return Err(RagError::Dimension {
                    expected: dim,
                    actual: bad.vector.len(),
                });
            }
        }
        for entry in entries {
            match self
                .entries
                .iter_mut()
                .find(|e| e.chunk.index == entry.chunk.index)
            {
                Some(existing) => *existing = entry.clone(),
                None => self.entries.push(entry.clone()),
            }
        }
        Ok(())
    }

    fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<Hit>> {
        if limit == 0 || vector.is_empty() || self.entries.is_empty() {
            return Ok(vec![]);
        }
        let dim = self.entries[0].vector.len();
        if vector.len() != dim {
            return Err(RagError::Dimension {
                expected: dim,
                actual: vector.len(),
            });
        }

        let mut hits: Vec<Hit> = self
            .entries
            .iter()
            .map(|e| Hit {
                chunk: e.chunk.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk.index.cmp(&b.chunk.index))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

/// Cosine similarity; 0 when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
