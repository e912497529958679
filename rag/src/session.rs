use tracing::{info, instrument, warn};

use crate::build_prompt::{build_prompt, recent_history, truncate_chars, Message, PromptTemplate};
use crate::chunk_text::{chunk_text, Chunk};
use crate::config::{Config, Mode};
use crate::embed_chunks::embed_chunks;
use crate::error::{RagError, Result};
use crate::index_cache::IndexCache;
use crate::llm::LlmClient;
use crate::load_document::{load_document, Document};
use crate::retrieve_chunks::{format_context, retrieve_top};
use crate::vector_store::{store_from_config, Hit, VectorStore};

/// Shown to the user whenever a question cannot be answered; details go to the log.
pub const GENERIC_ERROR_MESSAGE: &str =
    "Sorry, something went wrong while preparing the answer. Please try again.";

#[derive(Clone, Debug)]
pub struct Answer {
    pub text: String,
    /// The context text the prompt was built with.
    pub context: String,
    /// Retrieved chunks; empty in full-document mode.
    pub sources: Vec<Hit>,
}

/// One conversation about one document.
pub struct ChatSession {
    cfg: Config,
    document: Document,
    chunks: Vec<Chunk>,
    template: PromptTemplate,
    llm: Box<dyn LlmClient>,
    store: Box<dyn VectorStore>,
    history: Vec<Message>,
    indexed: bool,
}

impl ChatSession {
    /// Loads the configured document and, in rag mode, indexes it.
    pub fn open(cfg: Config, llm: Box<dyn LlmClient>) -> Result<Self> {
        let document = load_document(&cfg.document_path)?;
        let store = store_from_config(&cfg)?;
        Self::new(cfg, document, llm, store)
    }

    pub fn new(
        cfg: Config,
        document: Document,
        llm: Box<dyn LlmClient>,
        store: Box<dyn VectorStore>,
    ) -> Result<Self> {
        let template = PromptTemplate::new(&cfg.prompt_template)?;
        let chunks = chunk_text(&document.text, cfg.chunk_size, cfg.chunk_overlap);
        info!(
            document = %document.name,
            chunks = chunks.len(),
            mode = %cfg.mode,
            provider = llm.name(),
            "opened chat session"
        );
        let mut session = Self {
            cfg,
            document,
            chunks,
            template,
            llm,
            store,
            history: Vec::new(),
            indexed: false,
        };
        if session.cfg.mode == Mode::Rag {
            session.ensure_index()?;
        }
        Ok(session)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn mode(&self) -> Mode {
        self.cfg.mode
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Switches modes; entering rag mode builds the index first.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        if mode == Mode::Rag {
            self.ensure_index()?;
        }
        self.cfg.mode = mode;
        Ok(())
    }

    /// Drops the stored and cached index and embeds the document again.
    pub fn rebuild_index(&mut self) -> Result<usize> {
        self.store.clear()?;
        if let Some(cache) = self.cache() {
            cache.remove()?;
        }
        self.indexed = false;
        self.ensure_index()?;
        Ok(self.chunks.len())
    }

    #[instrument(skip_all, fields(mode = %self.cfg.mode))]
    pub fn ask(&mut self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let (context, sources) = match self.cfg.mode {
            Mode::Full => {
                let (text, truncated) = truncate_chars(&self.document.text, self.cfg.max_context_chars);
                if truncated {
                    warn!(
                        limit = self.cfg.max_context_chars,
                        total = self.document.char_len(),
                        "document truncated to fit the prompt"
                    );
                }
                (text.to_string(), Vec::new())
            }
            Mode::Rag => {
                self.ensure_index()?;
                let hits = retrieve_top(self.llm.as_ref(), self.store.as_ref(), question, self.cfg.top_k)?;
                (format_context(&hits), hits)
            }
        };

        let history = recent_history(&self.history, self.cfg.history_turns);
        let messages = build_prompt(
            &self.cfg.system_prompt,
            &self.template,
            &self.document.name,
            &context,
            history,
            question,
        )?;
        let text = self.llm.chat(&messages)?;

        self.history.push(Message::user(question));
        self.history.push(Message::assistant(text.clone()));
        info!(turns = self.history.len() / 2, "answered question");

        Ok(Answer {
            text,
            context,
            sources,
        })
    }

    fn cache(&self) -> Option<IndexCache> {
        self.cfg.cache_dir.as_deref().map(|dir| {
            IndexCache::new(
                dir,
                &self.document.fingerprint(),
                &self.cfg.embed_model,
                self.cfg.chunk_size,
                self.cfg.chunk_overlap,
            )
        })
    }

    fn ensure_index(&mut self) -> Result<()> {
        if self.indexed {
            return Ok(());
        }
        if !self.store.is_empty()? {
            info!("reusing populated vector store");
            self.indexed = true;
            return Ok(());
        }

        let cache = self.cache();
        let entries = match cache.as_ref().and_then(IndexCache::load) {
            Some(entries) if entries.len() == self.chunks.len() => {
                info!(entries = entries.len(), "loaded index from cache");
                entries
            }
            _ => {
                let entries = embed_chunks(self.llm.as_ref(), &self.chunks, self.cfg.embed_batch_size)?;
                if let Some(cache) = &cache {
                    if let Err(err) = cache.save(&entries) {
                        warn!(error = %err, "could not write index cache");
                    }
                }
                entries
            }
        };

        self.store.upsert(&entries)?;
        self.indexed = true;
        Ok(())
    }
}
