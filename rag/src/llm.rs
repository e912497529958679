use crate::build_prompt::Message;
use crate::config::{Config, Provider};
use crate::error::Result;
use crate::gemini::GeminiClient;
use crate::ollama::OllamaClient;

/// A hosted model that can embed text and answer chat prompts.
pub trait LlmClient: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// One vector per input text, in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Sends the conversation and returns the answer text.
    fn chat(&self, messages: &[Message]) -> Result<String>;
}

pub fn client_from_config(cfg: &Config) -> Result<Box<dyn LlmClient>> {
    Ok(match cfg.provider {
        Provider::Ollama => Box::new(OllamaClient::new(cfg)?),
        Provider::Gemini => Box::new(GeminiClient::new(cfg)?),
    })
}
