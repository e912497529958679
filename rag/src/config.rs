use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::build_prompt::PromptPreset;
use crate::error::{RagError, Result};

/// How the document reaches the prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// The whole document text is the context.
    Full,
    /// Only the top-k retrieved chunks are the context.
    Rag,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Full => Mode::Rag,
            Mode::Rag => Mode::Full,
        }
    }
}

impl FromStr for Mode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "document" => Ok(Mode::Full),
            "rag" | "retrieval" => Ok(Mode::Rag),
            other => Err(RagError::Config(format!(
                "unknown mode '{other}' (expected full or rag)"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Full => f.write_str("full"),
            Mode::Rag => f.write_str("rag"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Gemini,
}

impl Provider {
    pub fn default_chat_model(self) -> &'static str {
        match self {
            Provider::Ollama => "qwen2.5:7b",
            Provider::Gemini => "gemini-1.5-flash",
        }
    }

    pub fn default_embed_model(self) -> &'static str {
        match self {
            Provider::Ollama => "nomic-embed-text",
            Provider::Gemini => "text-embedding-004",
        }
    }
}

impl FromStr for Provider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(RagError::Config(format!(
                "unknown provider '{other}' (expected ollama or gemini)"
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Ollama => f.write_str("ollama"),
            Provider::Gemini => f.write_str("gemini"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Qdrant,
}

impl FromStr for StoreKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreKind::Memory),
            "qdrant" => Ok(StoreKind::Qdrant),
            other => Err(RagError::Config(format!(
                "unknown vector store '{other}' (expected memory or qdrant)"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub document_path: PathBuf,
    pub mode: Mode,
    pub provider: Provider,
    pub ollama_url: String,
    pub gemini_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embed_model: String,
    pub temperature: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embed_batch_size: usize,
    pub store: StoreKind,
    pub qdrant_url: String,
    pub collection: String,
    pub distance: String,
    pub cache_dir: Option<PathBuf>,
    pub history_turns: usize,
    pub max_context_chars: usize,
    pub preset: PromptPreset,
    pub system_prompt: String,
    pub prompt_template: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        // An empty environment only yields defaults, which always parse.
        match Self::from_lookup(|_| None) {
            Ok(cfg) => cfg,
            Err(err) => unreachable!("default configuration is invalid: {err}"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env if present so provider keys work without exporting them.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let document_path = PathBuf::from(get("RAG_DOCUMENT").unwrap_or_else(|| "document.pdf".to_string()));
        let mode = get("RAG_MODE").map(|v| v.parse::<Mode>()).transpose()?.unwrap_or(Mode::Full);
        let provider = get("LLM_PROVIDER")
            .map(|v| v.parse::<Provider>())
            .transpose()?
            .unwrap_or(Provider::Ollama);
        let preset = get("RAG_PROMPT_PRESET")
            .map(|v| v.parse::<PromptPreset>())
            .transpose()?
            .unwrap_or(PromptPreset::General);

        let prompt_template = match (get("RAG_PROMPT_TEMPLATE"), get("RAG_PROMPT_FILE")) {
            (Some(inline), _) => inline,
            (None, Some(path)) => fs::read_to_string(&path).map_err(|e| {
                RagError::Config(format!("cannot read prompt file {path}: {e}"))
            })?,
            (None, None) => preset.template().to_string(),
        };

        let chunk_size = parse_or(&get, "RAG_CHUNK_SIZE", 1000usize)?;
        let mut chunk_overlap = parse_or(&get, "RAG_CHUNK_OVERLAP", 200usize)?;
        if chunk_size > 0 && chunk_overlap >= chunk_size {
            chunk_overlap = chunk_size / 4;
        }

        let cache_dir = match get("RAG_CACHE_DIR") {
            Some(v) if v.eq_ignore_ascii_case("off") || v.eq_ignore_ascii_case("none") => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(PathBuf::from(".rag_cache")),
        };

        Ok(Self {
            mode,
            provider,
            ollama_url: trim_url(get("OLLAMA_URL").unwrap_or_else(|| "http://localhost:11434".to_string())),
            gemini_url: trim_url(
                get("GEMINI_URL").unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            ),
            api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")).unwrap_or_default(),
            chat_model: get("LLM_CHAT_MODEL").unwrap_or_else(|| provider.default_chat_model().to_string()),
            embed_model: get("LLM_EMBED_MODEL").unwrap_or_else(|| provider.default_embed_model().to_string()),
            temperature: parse_or(&get, "LLM_TEMPERATURE", 0.2f32)?,
            chunk_size,
            chunk_overlap,
            top_k: parse_or(&get, "RAG_TOP_K", 4usize)?,
            embed_batch_size: parse_or(&get, "RAG_EMBED_BATCH", 32usize)?.max(1),
            store: get("RAG_STORE").map(|v| v.parse::<StoreKind>()).transpose()?.unwrap_or(StoreKind::Memory),
            qdrant_url: trim_url(get("QDRANT_URL").unwrap_or_else(|| "http://localhost:6333".to_string())),
            collection: get("QDRANT_COLLECTION").unwrap_or_else(|| default_collection(&document_path)),
            distance: get("QDRANT_DISTANCE").unwrap_or_else(|| "Cosine".to_string()),
            cache_dir,
            history_turns: parse_or(&get, "RAG_HISTORY_TURNS", 6usize)?,
            max_context_chars: parse_or(&get, "RAG_MAX_CONTEXT_CHARS", 200_000usize)?,
            preset,
            system_prompt: get("RAG_SYSTEM_PROMPT").unwrap_or_else(|| preset.system_prompt().to_string()),
            prompt_template,
            request_timeout_secs: parse_or(&get, "LLM_TIMEOUT_SECS", 120u64)?,
            max_retries: parse_or(&get, "LLM_MAX_RETRIES", 3u32)?,
            log_file: PathBuf::from(get("RAG_LOG_FILE").unwrap_or_else(|| "legis-chat.log".to_string())),
            document_path,
        })
    }

    /// Points the config at another provider, resetting models that were left at the old defaults.
    pub fn set_provider(&mut self, provider: Provider) {
        if self.chat_model == self.provider.default_chat_model() {
            self.chat_model = provider.default_chat_model().to_string();
        }
        if self.embed_model == self.provider.default_embed_model() {
            self.embed_model = provider.default_embed_model().to_string();
        }
        self.provider = provider;
    }

    /// Points the config at another document; a derived collection name follows it.
    pub fn set_document(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.collection == default_collection(&self.document_path) {
            self.collection = default_collection(&path);
        }
        self.document_path = path;
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RagError::Config(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn default_collection(document: &Path) -> String {
    let stem = document
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    format!("{}_chunks", sanitize_collection_name(stem))
}

fn sanitize_collection_name(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else if c.is_whitespace() || c == '.' {
            out.push('_');
        }
    }
    if out.is_empty() { "default".to_string() } else { out }
}
