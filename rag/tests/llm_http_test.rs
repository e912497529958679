use rag::{
    client_from_config, Chunk, Config, GeminiClient, IndexedChunk, LlmClient, Message, OllamaClient,
    Provider, QdrantStore, RagError, VectorStore,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ollama_config(server: &MockServer) -> Config {
    Config {
        ollama_url: server.uri(),
        chat_model: "qwen2.5:7b".to_string(),
        embed_model: "nomic-embed-text".to_string(),
        max_retries: 0,
        request_timeout_secs: 5,
        ..Config::default()
    }
}

fn gemini_config(server: &MockServer) -> Config {
    let mut cfg = Config {
        gemini_url: server.uri(),
        api_key: "test-key".to_string(),
        max_retries: 0,
        request_timeout_secs: 5,
        ..Config::default()
    };
    cfg.set_provider(Provider::Gemini);
    cfg
}

fn conversation() -> Vec<Message> {
    vec![
        Message::system("SYS"),
        Message::user("Qual a lei?"),
        Message::assistant("A Lei 8.666."),
        Message::user("Qual o prazo?"),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn ollama_chat_extracts_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "qwen2.5:7b",
            "stream": false,
            "messages": [{"role": "system", "content": "SYS"}, {"role": "user", "content": "Qual a lei?"}, {"role": "assistant", "content": "A Lei 8.666."}, {"role": "user", "content": "Qual o prazo?"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "qwen2.5:7b",
            "message": {"role": "assistant", "content": "  Cinco dias úteis.\n"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = ollama_config(&server);
    let answer = tokio::task::spawn_blocking(move || {
        let client = OllamaClient::new(&cfg)?;
        client.chat(&conversation())
    })
    .await
    .expect("join")
    .expect("chat should succeed");
    assert_eq!(answer, "Cinco dias úteis.");
}

#[tokio::test(flavor = "multi_thread")]
async fn ollama_response_without_content_is_missing_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .mount(&server)
        .await;

    let cfg = ollama_config(&server);
    let err = tokio::task::spawn_blocking(move || OllamaClient::new(&cfg)?.chat(&conversation()))
        .await
        .expect("join")
        .expect_err("empty answer should fail");
    assert!(matches!(err, RagError::MissingAnswer { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn ollama_embed_uses_batch_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "nomic-embed-text", "input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2], [0.3, 0.4]]
        })))
        .mount(&server)
        .await;

    let cfg = ollama_config(&server);
    let vectors = tokio::task::spawn_blocking(move || {
        OllamaClient::new(&cfg)?.embed(&["a".to_string(), "b".to_string()])
    })
    .await
    .expect("join")
    .expect("embed should succeed");
    assert_eq!(vectors, vec![vec![0.1f32, 0.2], vec![0.3, 0.4]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn ollama_embed_falls_back_to_legacy_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404).set_body_string("404 page not found"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [1.0, 2.0]})))
        .expect(2)
        .mount(&server)
        .await;

    let cfg = ollama_config(&server);
    let vectors = tokio::task::spawn_blocking(move || {
        OllamaClient::new(&cfg)?.embed(&["a".to_string(), "b".to_string()])
    })
    .await
    .expect("join")
    .expect("legacy embed should succeed");
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[1], vec![1.0f32, 2.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "ok"}
        })))
        .mount(&server)
        .await;

    let cfg = Config {
        max_retries: 1,
        ..ollama_config(&server)
    };
    let answer = tokio::task::spawn_blocking(move || OllamaClient::new(&cfg)?.chat(&conversation()))
        .await
        .expect("join")
        .expect("retry should succeed");
    assert_eq!(answer, "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = Config {
        max_retries: 3,
        ..ollama_config(&server)
    };
    let err = tokio::task::spawn_blocking(move || OllamaClient::new(&cfg)?.chat(&conversation()))
        .await
        .expect("join")
        .expect_err("400 should fail");
    match err {
        RagError::Http { status, body, .. } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(body, "bad request");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn gemini_chat_maps_roles_and_reads_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "SYS"}]},
            "contents": [
                {"role": "user", "parts": [{"text": "Qual a lei?"}]},
                {"role": "model", "parts": [{"text": "A Lei 8.666."}]},
                {"role": "user", "parts": [{"text": "Qual o prazo?"}]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Cinco "}, {"text": "dias."}]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = gemini_config(&server);
    let answer = tokio::task::spawn_blocking(move || client_from_config(&cfg)?.chat(&conversation()))
        .await
        .expect("join")
        .expect("gemini chat should succeed");
    assert_eq!(answer, "Cinco dias.");
}

#[tokio::test(flavor = "multi_thread")]
async fn gemini_without_candidates_is_missing_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let cfg = gemini_config(&server);
    let err = tokio::task::spawn_blocking(move || GeminiClient::new(&cfg)?.chat(&conversation()))
        .await
        .expect("join")
        .expect_err("blocked prompt should fail");
    assert!(matches!(err, RagError::MissingAnswer { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn gemini_batch_embeddings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:batchEmbedContents"))
        .and(body_partial_json(json!({
            "requests": [
                {"model": "models/text-embedding-004", "content": {"parts": [{"text": "a"}]}},
                {"model": "models/text-embedding-004", "content": {"parts": [{"text": "b"}]}}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [{"values": [0.5, 0.5]}, {"values": [1.0, 0.0]}]
        })))
        .mount(&server)
        .await;

    let cfg = gemini_config(&server);
    let vectors = tokio::task::spawn_blocking(move || {
        GeminiClient::new(&cfg)?.embed(&["a".to_string(), "b".to_string()])
    })
    .await
    .expect("join")
    .expect("embed should succeed");
    assert_eq!(vectors, vec![vec![0.5f32, 0.5], vec![1.0, 0.0]]);
}

#[test]
fn gemini_requires_an_api_key() {
    let mut cfg = Config::default();
    cfg.set_provider(Provider::Gemini);
    cfg.api_key.clear();
    assert!(matches!(GeminiClient::new(&cfg), Err(RagError::Config(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn qdrant_store_creates_collection_upserts_and_queries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/lei_chunks"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"status": {"error": "Not found"}})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/collections/lei_chunks"))
        .and(body_partial_json(json!({"vectors": {"size": 2, "distance": "Cosine"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true, "status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/collections/lei_chunks/points"))
        .and(body_partial_json(json!({
            "points": [{"id": 0, "vector": [1.0, 0.0], "payload": {"index": 0, "offset": 0, "chunk": "Art. 1º"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"status": "completed"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/collections/lei_chunks/points/query"))
        .and(body_partial_json(json!({"limit": 3, "with_payload": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"points": [
                {"id": 0, "score": 0.91, "payload": {"index": 0, "offset": 0, "chunk": "Art. 1º"}},
                {"id": 7, "score": 0.2}
            ]},
            "status": "ok"
        })))
        .mount(&server)
        .await;

    let cfg = Config {
        qdrant_url: server.uri(),
        collection: "lei_chunks".to_string(),
        max_retries: 0,
        ..Config::default()
    };
    let hits = tokio::task::spawn_blocking(move || {
        let mut store = QdrantStore::new(&cfg)?;
        assert!(store.is_empty()?);
        store.upsert(&[IndexedChunk {
            chunk: Chunk {
                index: 0,
                offset: 0,
                text: "Art. 1º".to_string(),
            },
            vector: vec![1.0, 0.0],
        }])?;
        store.query(&[1.0, 0.0], 3)
    })
    .await
    .expect("join")
    .expect("qdrant round trip should succeed");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text, "Art. 1º");
    assert!((hits[0].score - 0.91).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn qdrant_reports_populated_collection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/lei_chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"status": "green", "points_count": 12},
            "status": "ok"
        })))
        .mount(&server)
        .await;

    let cfg = Config {
        qdrant_url: server.uri(),
        collection: "lei_chunks".to_string(),
        max_retries: 0,
        ..Config::default()
    };
    let empty = tokio::task::spawn_blocking(move || QdrantStore::new(&cfg)?.is_empty())
        .await
        .expect("join")
        .expect("collection info");
    assert!(!empty);
}

#[tokio::test(flavor = "multi_thread")]
async fn ollama_embed_rejects_missing_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let cfg = ollama_config(&server);
    let err = tokio::task::spawn_blocking(move || {
        OllamaClient::new(&cfg)?.embed(&["a".to_string(), "b".to_string()])
    })
    .await
    .expect("join")
    .expect_err("one vector for two inputs should fail");
    assert!(matches!(err, RagError::EmbeddingCount { expected: 2, actual: 1 }));
}

#[tokio::test(flavor = "multi_thread")]
async fn gemini_embed_rejects_missing_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:batchEmbedContents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [{"values": [0.5, 0.5]}]
        })))
        .mount(&server)
        .await;

    let cfg = gemini_config(&server);
    let err = tokio::task::spawn_blocking(move || {
        GeminiClient::new(&cfg)?.embed(&["a".to_string(), "b".to_string()])
    })
    .await
    .expect("join")
    .expect_err("one vector for two inputs should fail");
    assert!(matches!(err, RagError::EmbeddingCount { expected: 2, actual: 1 }));
}

fn qdrant_config(server: &MockServer) -> Config {
    Config {
        qdrant_url: server.uri(),
        collection: "lei_chunks".to_string(),
        max_retries: 0,
        ..Config::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn qdrant_clear_deletes_collection() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/collections/lei_chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true, "status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = qdrant_config(&server);
    tokio::task::spawn_blocking(move || QdrantStore::new(&cfg)?.clear())
        .await
        .expect("join")
        .expect("delete should succeed");
}

#[tokio::test(flavor = "multi_thread")]
async fn qdrant_clear_tolerates_missing_collection() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/collections/lei_chunks"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"status": {"error": "Not found"}})))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = qdrant_config(&server);
    tokio::task::spawn_blocking(move || QdrantStore::new(&cfg)?.clear())
        .await
        .expect("join")
        .expect("missing collection counts as cleared");
}

#[tokio::test(flavor = "multi_thread")]
async fn qdrant_clear_reports_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/collections/lei_chunks"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let cfg = qdrant_config(&server);
    let err = tokio::task::spawn_blocking(move || QdrantStore::new(&cfg)?.clear())
        .await
        .expect("join")
        .expect_err("500 should fail");
    assert!(matches!(err, RagError::Http { .. }));
}
