use std::sync::Arc;

use async_trait::async_trait;
use medrag_core::{
    ChunkRecord, EmbeddingProvider, FlatIndex, HashingEmbeddingProvider, IndexBuilder, IndexKind,
    MedragConfig, MedragError, RetrievalService, VectorBundle, VectorIndex,
};
use medrag_server::{AppState, app_router};

const PASSAGES: [(&str, u32); 5] = [
    ("Fever in children is most often caused by viral infection.", 12),
    ("Paracetamol and ibuprofen are used to reduce fever and pain.", 13),
    ("A stiff neck with fever may indicate meningitis and needs urgent care.", 40),
    ("Dehydration presents with dry mucous membranes and reduced urine output.", 41),
    ("Otitis media commonly follows an upper respiratory tract infection.", 77),
];

fn records() -> Vec<ChunkRecord> {
    PASSAGES
        .iter()
        .enumerate()
        .map(|(i, (text, page))| ChunkRecord {
            text: text.to_string(),
            source_file: "pediatrics.pdf".to_string(),
            page: *page,
            chunk_index: i as u32,
        })
        .collect()
}

async fn service() -> RetrievalService {
    let config = MedragConfig::builder().index_kind(IndexKind::Flat).build().unwrap();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::default());
    let bundle = IndexBuilder::new(embedder.clone(), config.clone()).build(records()).await.unwrap();
    RetrievalService::from_bundle(bundle, embedder, config).unwrap()
}

async fn spawn_server(service: RetrievalService) -> (String, tokio::task::JoinHandle<()>) {
    let app = app_router(AppState::new(service));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });
    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn root_and_health_report_the_index() {
    let (base, handle) = spawn_server(service().await).await;
    let client = reqwest::Client::new();

    let root: serde_json::Value =
        client.get(format!("{}/", base)).send().await.expect("root").json().await.expect("root json");
    assert_eq!(root["status"], "online");
    assert_eq!(root["vector_count"], 5);

    let response = client.get(format!("{}/health", base)).send().await.expect("health");
    assert!(response.status().is_success());
    let health: serde_json::Value = response.json().await.expect("health json");
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["vector_count"], 5);
    assert_eq!(health["dimensions"], 384);
    assert_eq!(health["index_kind"], "flat");
    assert_eq!(health["embedding_model"], "fnv1a-hashing-v1");

    handle.abort();
}

#[tokio::test]
async fn query_returns_answer_sources_and_confidence() {
    let (base, handle) = spawn_server(service().await).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/query", base))
        .json(&serde_json::json!({ "question": "fever and stiff neck" }))
        .send()
        .await
        .expect("query response");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("query json");
    let answer = body["answer"].as_str().expect("answer");
    assert!(answer.starts_with("**Medical Information Retrieved:**"));
    assert!(answer.contains("Based on 5 relevant sources found in database."));

    let sources = body["sources"].as_array().expect("sources");
    assert_eq!(sources.len(), 5);
    assert_eq!(sources[0]["citation_number"], 1);
    assert_eq!(sources[0]["source_file"], "pediatrics.pdf");
    assert_eq!(sources[0]["page"], 40);
    assert_eq!(body["confidence"], "High - Multiple relevant sources found");

    let two: serde_json::Value = client
        .post(format!("{}/query", base))
        .json(&serde_json::json!({ "question": "fever and stiff neck", "k": 2 }))
        .send()
        .await
        .expect("query response")
        .json()
        .await
        .expect("query json");
    assert_eq!(two["sources"].as_array().map(Vec::len), Some(2));
    assert_eq!(two["confidence"], "Medium - Some relevant sources found");

    handle.abort();
}

#[tokio::test]
async fn invalid_questions_are_bad_requests() {
    let (base, handle) = spawn_server(service().await).await;
    let client = reqwest::Client::new();

    for (question, detail) in [
        ("", "Question cannot be empty"),
        ("   ", "Question cannot be empty"),
        ("hi", "Question too short. Please provide more detail."),
    ] {
        let response = client
            .post(format!("{}/query", base))
            .json(&serde_json::json!({ "question": question }))
            .send()
            .await
            .expect("query response");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.expect("error json");
        assert_eq!(body["detail"], detail);
    }

    handle.abort();
}

struct UnavailableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> medrag_core::Result<Vec<f32>> {
        Err(MedragError::Embedding {
            provider: "remote".into(),
            message: "connection refused by 10.1.2.3:8080".into(),
        })
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "remote-model"
    }
}

#[tokio::test]
async fn internal_failures_are_generic_500s() {
    let mut index = FlatIndex::new(2).unwrap();
    index.insert(vec![1.0, 0.0]).unwrap();
    let config = MedragConfig::default();
    let bundle =
        VectorBundle::new(records()[..1].to_vec(), Box::new(index), "remote-model", &config).unwrap();
    let service = RetrievalService::from_bundle(bundle, Arc::new(UnavailableEmbedder), config).unwrap();

    let (base, handle) = spawn_server(service).await;
    let response = reqwest::Client::new()
        .post(format!("{}/query", base))
        .json(&serde_json::json!({ "question": "what causes fever?" }))
        .send()
        .await
        .expect("query response");

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.expect("error json");
    assert_eq!(body["detail"], "Query processing error");
    assert!(!body.to_string().contains("10.1.2.3"));

    handle.abort();
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (base, handle) = spawn_server(service().await).await;
    let response = reqwest::Client::new()
        .get(format!("{}/health", base))
        .header("Origin", "https://frontend.example")
        .send()
        .await
        .expect("health");
    assert_eq!(
        response.headers().get("access-control-allow-origin").and_then(|v| v.to_str().ok()),
        Some("*")
    );
    handle.abort();
}
