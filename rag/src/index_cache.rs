use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::load_document::hex_digest;
use crate::vector_store::IndexedChunk;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    embed_model: String,
    entries: Vec<IndexedChunk>,
}

/// Embedded chunks of one document, persisted as JSON so restarts skip re-embedding.
#[derive(Clone, Debug)]
pub struct IndexCache {
    path: PathBuf,
    embed_model: String,
}

impl IndexCache {
    pub fn new(
        dir: &Path,
        fingerprint: &str,
        embed_model: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        let key = hex_digest(
            format!("{fingerprint}\n{embed_model}\n{chunk_size}\n{chunk_overlap}").as_bytes(),
        );
        Self {
            path: dir.join(format!("{key}.json")),
            embed_model: embed_model.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached entries, or `None` when missing or unreadable.
    pub fn load(&self) -> Option<Vec<IndexedChunk>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return None,
        };
        match serde_json::from_str::<CacheFile>(&raw) {
            Ok(file) if file.embed_model == self.embed_model && !file.entries.is_empty() => {
                debug!(path = %self.path.display(), entries = file.entries.len(), "index cache hit");
                Some(file.entries)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring corrupt index cache");
                None
            }
        }
    }

    pub fn save(&self, entries: &[IndexedChunk]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| RagError::io(dir, e))?;
        }
        let file = CacheFile {
            embed_model: self.embed_model.clone(),
            entries: entries.to_vec(),
        };
        let json = serde_json::to_string(&file).map_err(|e| RagError::Cache(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| RagError::io(&self.path, e))
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RagError::io(&self.path, e)),
        }
    }
}
