use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::build_prompt::{Message, Role};
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::http::HttpClient;
use crate::llm::LlmClient;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Client for the Gemini `generativelanguage` REST API.
pub struct GeminiClient {
    http: HttpClient,
    base_url: String,
    chat_model: String,
    embed_model: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        if cfg.api_key.trim().is_empty() {
            return Err(RagError::Config(
                "GEMINI_API_KEY (or GOOGLE_API_KEY) must be set for the gemini provider".to_string(),
            ));
        }
        let http = HttpClient::new(cfg.request_timeout_secs, cfg.max_retries)?
            .with_header("x-goog-api-key", cfg.api_key.trim());
        Ok(Self {
            http,
            base_url: cfg.gemini_url.clone(),
            chat_model: model_path(&cfg.chat_model),
            embed_model: model_path(&cfg.embed_model),
            temperature: cfg.temperature,
        })
    }
}

impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip_all, fields(count = texts.len(), model = %self.embed_model))]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let url = format!("{}/v1beta/{}:batchEmbedContents", self.base_url, self.embed_model);
        let req = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.embed_model,
                    content: Content {
                        role: None,
                        parts: vec![Part { text }],
                    },
                })
                .collect(),
        };
        let res = self.http.post_json::<BatchEmbedResponse, _>(&url, &req)?;
        if res.embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingCount {
                expected: texts.len(),
                actual: res.embeddings.len(),
            });
        }
        Ok(res.embeddings.into_iter().map(|e| e.values).collect())
    }

    #[instrument(skip_all, fields(messages = messages.len(), model = %self.chat_model))]
    fn chat(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}/v1beta/{}:generateContent", self.base_url, self.chat_model);
        let req = generate_request(messages, self.temperature);
        let res = self.http.post_json::<GenerateResponse, _>(&url, &req)?;

        let answer = res
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .map(|text| text.trim().to_string())
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

fn generate_request(messages: &[Message], temperature: f32) -> GenerateRequest<'_> {
    let system_parts: Vec<Part<'_>> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| Part { text: &m.content })
        .collect();
    let contents = messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::System => return None,
                Role::User => "user",
                Role::Assistant => "model",
            };
            Some(Content {
                role: Some(role),
                parts: vec![Part { text: &m.content }],
            })
        })
        .collect();

    GenerateRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| Content {
            role: None,
            parts: system_parts,
        }),
        generation_config: GenerationConfig { temperature },
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}
