use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::chunk_text::Chunk;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::http::HttpClient;
use crate::vector_store::{Hit, IndexedChunk, VectorStore};

#[derive(Serialize)]
struct CreateCollection<'a> {
    vectors: VectorParams<'a>,
}

#[derive(Serialize)]
struct VectorParams<'a> {
    size: usize,
    distance: &'a str,
}

#[derive(Serialize, Deserialize)]
struct PointPayload {
    index: usize,
    offset: usize,
    chunk: String,
}

#[derive(Serialize)]
struct Point<'a> {
    id: u64,
    vector: &'a [f32],
    payload: PointPayload,
}

#[derive(Serialize)]
struct UpsertPoints<'a> {
    points: Vec<Point<'a>>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: Option<QueryResult>,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: Option<PointPayload>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    result: Option<CollectionInfo>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    points_count: Option<u64>,
}

/// Chunks stored in a Qdrant collection through its REST API.
pub struct QdrantStore {
    http: HttpClient,
    collection_url: String,
    distance: String,
}

impl QdrantStore {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(cfg.request_timeout_secs, cfg.max_retries)?,
            collection_url: format!("{}/collections/{}", cfg.qdrant_url, cfg.collection),
            distance: cfg.distance.clone(),
        })
    }

    fn points_count(&self) -> Result<Option<u64>> {
        match self.http.get_json::<CollectionResponse>(&self.collection_url) {
            Ok(res) => Ok(Some(res.result.and_then(|r| r.points_count).unwrap_or(0))),
            Err(RagError::Http { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn ensure_collection(&self, vector_size: usize) -> Result<()> {
        if self.points_count()?.is_some() {
            return Ok(());
        }
        let body = CreateCollection {
            vectors: VectorParams {
                size: vector_size,
                distance: &self.distance,
            },
        };
        self.http.put_json::<Value, _>(&self.collection_url, &body)?;
        info!(url = %self.collection_url, vector_size, "created qdrant collection");
        Ok(())
    }
}

impl VectorStore for QdrantStore {
    fn is_empty(&self) -> Result<bool> {
        Ok(self.points_count()?.unwrap_or(0) == 0)
    }

    fn upsert(&mut self, entries: &[IndexedChunk]) -> Result<()> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        self.ensure_collection(first.vector.len())?;
        let body = UpsertPoints {
            points: entries
                .iter()
                .map(|e| Point {
                    id: e.chunk.index as u64,
                    vector: &e.vector,
                    payload: PointPayload {
                        index: e.chunk.index,
                        offset: e.chunk.offset,
                        chunk: e.chunk.text.clone(),
                    },
                })
                .collect(),
        };
        let url = format!("{}/points?wait=true", self.collection_url);
        self.http.put_json::<Value, _>(&url, &body)?;
        debug!(points = entries.len(), "upserted points");
        Ok(())
    }

    fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<Hit>> {
        if vector.is_empty() || limit == 0 {
            return Ok(vec![]);
        }
        let url = format!("{}/points/query", self.collection_url);
        let req = QueryRequest {
            query: vector,
            limit,
            with_payload: true,
        };
        let res = self.http.post_json::<QueryResponse, _>(&url, &req)?;
        Ok(res
            .result
            .map(|r| r.points)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| {
                let payload = p.payload?;
                Some(Hit {
                    chunk: Chunk {
                        index: payload.index,
                        offset: payload.offset,
                        text: payload.chunk,
                    },
                    score: p.score,
                })
            })
            .collect())
    }

    fn clear(&mut self) -> Result<()> {
        match self.http.delete_json::<Value>(&self.collection_url) {
            Ok(_) => Ok(()),
            Err(RagError::Http { status, .. }) if status == StatusCode::NOT_FOUND => Ok(()),
            Err(err) => Err(err),
        }
    }
}
