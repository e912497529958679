use std::path::PathBuf;

use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to extract text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("document {0} contains no text")]
    EmptyDocument(PathBuf),

    #[error("question is empty")]
    EmptyQuestion,

    #[error("{method} {url} failed: {status} {body}")]
    Http {
        method: &'static str,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("{method} {url} could not be sent: {source}")]
    Transport {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned an undecodable response: {reason}")]
    Decode { url: String, reason: String },

    #[error("{provider} response contained no answer")]
    MissingAnswer { provider: String },

    #[error("expected {expected} embeddings, got {actual}")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("vector dimension mismatch: index has {expected}, query has {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("prompt template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("index cache error: {0}")]
    Cache(String),
}

impl RagError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io {
            path: path.into(),
            source,
        }
    }

    /// Transport failures and throttling/server-side statuses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::Transport { .. } => true,
            RagError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}
