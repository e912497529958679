use tracing::{debug, info};

use crate::chunk_text::Chunk;
use crate::error::{RagError, Result};
use crate::llm::LlmClient;
use crate::vector_store::IndexedChunk;

/// Embeds `chunks` in batches of `batch_size`, keeping chunk order.
pub fn embed_chunks(
    llm: &dyn LlmClient,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<IndexedChunk>> {
    let batch_size = batch_size.max(1);
    let mut out = Vec::with_capacity(chunks.len());

    for (n, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = llm.embed(&texts)?;
        if vectors.len() != batch.len() {
            return Err(RagError::EmbeddingCount {
                expected: batch.len(),
                actual: vectors.len(),
            });
        }
        debug!(batch = n, size = batch.len(), "embedded batch");
        out.extend(
            batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedChunk { chunk, vector }),
        );
    }

    info!(chunks = out.len(), provider = llm.name(), "embedded document");
    Ok(out)
}
