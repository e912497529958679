use std::collections::HashMap;
use std::path::PathBuf;

use rag::{Config, Mode, PromptPreset, Provider, RagError, StoreKind};

fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, RagError> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn empty_environment_gives_defaults() {
    let cfg = from_pairs(&[]).expect("defaults should load");
    assert_eq!(cfg.document_path, PathBuf::from("document.pdf"));
    assert_eq!(cfg.mode, Mode::Full);
    assert_eq!(cfg.provider, Provider::Ollama);
    assert_eq!(cfg.chat_model, "qwen2.5:7b");
    assert_eq!(cfg.embed_model, "nomic-embed-text");
    assert_eq!(cfg.store, StoreKind::Memory);
    assert_eq!(cfg.collection, "document_chunks");
    assert_eq!(cfg.cache_dir, Some(PathBuf::from(".rag_cache")));
    assert_eq!((cfg.chunk_size, cfg.chunk_overlap, cfg.top_k), (1000, 200, 4));
    assert_eq!(cfg.preset, PromptPreset::General);
    assert_eq!(cfg.prompt_template, PromptPreset::General.template());
}

#[test]
fn provider_selects_its_default_models() {
    let cfg = from_pairs(&[("LLM_PROVIDER", "Gemini"), ("GOOGLE_API_KEY", "k")])
        .expect("gemini config should load");
    assert_eq!(cfg.provider, Provider::Gemini);
    assert_eq!(cfg.chat_model, "gemini-1.5-flash");
    assert_eq!(cfg.embed_model, "text-embedding-004");
    assert_eq!(cfg.api_key, "k");
}

#[test]
fn explicit_values_override_defaults() {
    let cfg = from_pairs(&[
        ("RAG_DOCUMENT", "docs/Lei 8.666.docx"),
        ("RAG_MODE", "rag"),
        ("LLM_CHAT_MODEL", "llama3"),
        ("OLLAMA_URL", "http://gpu-box:11434/"),
        ("RAG_TOP_K", "8"),
        ("RAG_CACHE_DIR", "off"),
        ("RAG_STORE", "qdrant"),
        ("RAG_PROMPT_PRESET", "indexing"),
    ])
    .expect("overrides should load");
    assert_eq!(cfg.mode, Mode::Rag);
    assert_eq!(cfg.chat_model, "llama3");
    assert_eq!(cfg.ollama_url, "http://gpu-box:11434");
    assert_eq!(cfg.top_k, 8);
    assert_eq!(cfg.cache_dir, None);
    assert_eq!(cfg.store, StoreKind::Qdrant);
    assert_eq!(cfg.collection, "Lei_8_666_chunks");
    assert_eq!(cfg.system_prompt, PromptPreset::Indexing.system_prompt());
}

#[test]
fn invalid_values_are_config_errors() {
    let err = from_pairs(&[("RAG_MODE", "summary")]).expect_err("unknown mode should fail");
    assert!(matches!(err, RagError::Config(_)));

    let err = from_pairs(&[("RAG_TOP_K", "many")]).expect_err("bad number should fail");
    assert!(err.to_string().contains("RAG_TOP_K"));

    let err = from_pairs(&[("RAG_PROMPT_FILE", "/definitely/missing/prompt.j2")])
        .expect_err("missing prompt file should fail");
    assert!(matches!(err, RagError::Config(_)));
}

#[test]
fn overlap_not_smaller_than_size_is_normalised() {
    let cfg = from_pairs(&[("RAG_CHUNK_SIZE", "400"), ("RAG_CHUNK_OVERLAP", "400")])
        .expect("config should load");
    assert_eq!(cfg.chunk_overlap, 100);
}

#[test]
fn prompt_file_is_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("prompt.j2");
    std::fs::write(&path, "{{ context }}\nQ: {{ question }}").expect("write prompt");
    let cfg = from_pairs(&[("RAG_PROMPT_FILE", path.to_str().expect("utf-8 path"))])
        .expect("prompt file should load");
    assert_eq!(cfg.prompt_template, "{{ context }}\nQ: {{ question }}");
}

#[test]
fn switching_provider_keeps_custom_models() {
    let mut cfg = from_pairs(&[("LLM_CHAT_MODEL", "llama3")]).expect("config should load");
    cfg.set_provider(Provider::Gemini);
    assert_eq!(cfg.chat_model, "llama3");
    assert_eq!(cfg.embed_model, "text-embedding-004");
}
