use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::build_prompt::Message;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::http::HttpClient;
use crate::llm::LlmClient;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Serialize)]
struct EmbedLegacyRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Client for a local or remote Ollama server.
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    chat_model: String,
    embed_model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(cfg.request_timeout_secs, cfg.max_retries)?,
            base_url: cfg.ollama_url.clone(),
            chat_model: cfg.chat_model.clone(),
            embed_model: cfg.embed_model.clone(),
            temperature: cfg.temperature,
        })
    }

    fn embed_legacy(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let req = EmbedLegacyRequest {
                model: &self.embed_model,
                prompt: text,
            };
            let res = self.http.post_json::<Value, _>(&url, &req)?;
            let mut vectors = parse_embeddings(&url, res)?;
            match vectors.pop() {
                Some(v) if vectors.is_empty() => out.push(v),
                _ => {
                    return Err(RagError::Decode {
                        url,
                        reason: "expected exactly one embedding".to_string(),
                    })
                }
            }
        }
        Ok(out)
    }
}

impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip_all, fields(count = texts.len(), model = %self.embed_model))]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let url = format!("{}/api/embed", self.base_url);
        let req = EmbedRequest {
            model: &self.embed_model,
            input: texts,
        };
        let vectors = match self.http.post_json::<Value, _>(&url, &req) {
            Ok(res) => parse_embeddings(&url, res)?,
            Err(err @ RagError::Http { .. }) => {
                // Older servers only expose the single-prompt endpoint.
                warn!(error = %err, "batch embed endpoint failed, using /api/embeddings");
                self.embed_legacy(texts)?
            }
            Err(err) => return Err(err),
        };
        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingCount {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }

    #[instrument(skip_all, fields(messages = messages.len(), model = %self.chat_model))]
    fn chat(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let req = ChatRequest {
            model: &self.chat_model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };
        let res = self.http.post_json::<ChatResponse, _>(&url, &req)?;
        let answer = res
            .message
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if answer.is_empty() {
            return Err(RagError::MissingAnswer {
                provider: self.name().to_string(),
            });
        }
        debug!(chars = answer.len(), "received answer");
        Ok(answer)
    }
}

fn parse_embeddings(url: &str, value: Value) -> Result<Vec<Vec<f32>>> {
    let decode = |reason: &str| RagError::Decode {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let field = value
        .get("embeddings")
        .or_else(|| value.get("embedding"))
        .ok_or_else(|| decode("no embeddings in response"))?;
    let arr = field
        .as_array()
        .ok_or_else(|| decode("invalid embeddings format"))?;
    if arr.is_empty() {
        return Ok(vec![]);
    }
    if arr[0].is_array() {
        arr.iter()
            .map(|row| parse_vec(row).ok_or_else(|| decode("embedding is not a number array")))
            .collect()
    } else {
        let single = parse_vec(field).ok_or_else(|| decode("embedding is not a number array"))?;
        Ok(vec![single])
    }
}

fn parse_vec(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|n| n as f32))
        .collect()
}
