mod build_prompt;
mod chunk_text;
mod config;
mod embed_chunks;
mod embed_query;
mod error;
mod gemini;
mod http;
mod index_cache;
mod llm;
mod load_document;
mod ollama;
mod retrieve_chunks;
mod session;
mod store_qdrant;
mod vector_store;

pub use build_prompt::{build_prompt, recent_history, truncate_chars, Message, PromptPreset, PromptTemplate, Role};
pub use chunk_text::{chunk_text, Chunk};
pub use config::{Config, Mode, Provider, StoreKind};
pub use embed_chunks::embed_chunks;
pub use error::{RagError, Result};
pub use gemini::GeminiClient;
pub use index_cache::IndexCache;
pub use llm::{client_from_config, LlmClient};
pub use load_document::{load_document, normalize_text, Document};
pub use ollama::OllamaClient;
pub use retrieve_chunks::{format_context, retrieve_top};
pub use session::{Answer, ChatSession, GENERIC_ERROR_MESSAGE};
pub use store_qdrant::QdrantStore;
pub use vector_store::{cosine_similarity, store_from_config, Hit, IndexedChunk, MemoryStore, VectorStore};

/// Opens a session for the configured document and provider.
pub fn open_session(cfg: Config) -> Result<ChatSession> {
    let llm = client_from_config(&cfg)?;
    ChatSession::open(cfg, llm)
}

/// One-shot question: open a session, ask, return the answer.
pub fn answer_query(cfg: Config, question: &str) -> Result<Answer> {
    let mut session = open_session(cfg)?;
    session.ask(question)
}
