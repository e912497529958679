use crate::error::Result;
use crate::llm::LlmClient;

pub fn embed_query(llm: &dyn LlmClient, text: &str) -> Result<Vec<f32>> {
    let vecs = llm.embed(&[text.to_string()])?;
    Ok(vecs.into_iter().next().unwrap_or_default())
}
