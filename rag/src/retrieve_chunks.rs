use tracing::debug;

use crate::embed_query::embed_query;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::vector_store::{Hit, VectorStore};

pub fn retrieve_top(
    llm: &dyn LlmClient,
    store: &dyn VectorStore,
    question: &str,
    top_k: usize,
) -> Result<Vec<Hit>> {
    let vector = embed_query(llm, question)?;
    if vector.is_empty() {
        return Ok(vec![]);
    }
    let hits = store.query(&vector, top_k)?;
    debug!(hits = hits.len(), top_k, "retrieved chunks");
    Ok(hits)
}

pub fn format_context(hits: &[Hit]) -> String {
    let blocks: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] (chunk {})\n{}", i + 1, hit.chunk.index, hit.chunk.text))
        .collect();

    if blocks.is_empty() {
        "(no context found)".to_string()
    } else {
        blocks.join("\n\n")
    }
}
