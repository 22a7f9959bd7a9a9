use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use portfolio_chat::server::MODEL_FAILURE_MESSAGE;
use portfolio_chat::{
    router, AppContext, Chunker, ChunkConfig, Document, EmbeddingIndex, EmbeddingProvider,
    IndexPaths, LanguageModel, ModelError, PromptAssembler, Retriever, WindowChunker,
};
use serde_json::{json, Value};
use tempfile::TempDir;

/// 고정 응답 또는 실패를 돌려주고 받은 프롬프트를 기록하는 모델
struct StubModel {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or_else(|| ModelError::Unavailable {
            backend: "stub".to_string(),
            message: "secret-internal-detail: connection refused".to_string(),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }
}

/// "apple" / "njit" 빈도 기반 임베딩
struct WordEmbedding;

#[async_trait]
impl EmbeddingProvider for WordEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                vec![
                    lower.matches("apple").count() as f32 + 0.01,
                    lower.matches("njit").count() as f32 + 0.01,
                ]
            })
            .collect())
    }

    fn name(&self) -> &str {
        "test/words"
    }
}

async fn spawn_server(state: AppContext) -> (String, tokio::task::JoinHandle<()>) {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{}", addr), handle)
}

fn context_without_index(model: Arc<StubModel>) -> AppContext {
    AppContext::new(model, PromptAssembler::default(), None, 4)
}

async fn context_with_index(model: Arc<StubModel>, dir: &TempDir) -> AppContext {
    let docs = vec![
        Document {
            source_path: PathBuf::from("apple.md"),
            text: "Pablo built an agentic payments MVP at Apple.".to_string(),
            metadata: BTreeMap::new(),
        },
        Document {
            source_path: PathBuf::from("njit.md"),
            text: "Pablo studies Computer Science at NJIT.".to_string(),
            metadata: BTreeMap::new(),
        },
    ];
    let chunks = WindowChunker::new(ChunkConfig::new(200, 20).unwrap()).chunk_all(&docs);
    let index = EmbeddingIndex::build(&IndexPaths::new(dir.path()), &chunks, &WordEmbedding)
        .await
        .unwrap();
    let retriever = Retriever::new(Arc::new(index), Arc::new(WordEmbedding)).unwrap();

    AppContext::new(model, PromptAssembler::default(), Some(retriever), 1)
}

#[tokio::test]
async fn health_reports_healthy() {
    let (base, handle) = spawn_server(context_without_index(StubModel::replying("x"))).await;

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "status": "healthy" }));

    handle.abort();
}

#[tokio::test]
async fn chat_returns_model_answer() {
    let model = StubModel::replying("He is an engineer.");
    let (base, handle) = spawn_server(context_without_index(model.clone())).await;

    let response = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "What does Pablo do?" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "message": "He is an engineer." }));

    let prompt = model.last_prompt();
    assert!(prompt.starts_with("You are Pablo Leyva's AI assistant."));
    assert!(prompt.contains("What does Pablo do?"));

    handle.abort();
}

#[tokio::test]
async fn chat_rejects_empty_and_malformed_input() {
    let model = StubModel::replying("unused");
    let (base, handle) = spawn_server(context_without_index(model.clone())).await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "message": "" }),
        json!({ "message": "   " }),
        json!({}),
        json!({ "message": 42 }),
    ] {
        let response = client
            .post(format!("{}/chat", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "body: {}", body);
        let error: Value = response.json().await.unwrap();
        assert!(error.get("error").and_then(Value::as_str).is_some());
    }

    let response = client
        .post(format!("{}/chat", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    assert!(model.prompts.lock().unwrap().is_empty());
    handle.abort();
}

#[tokio::test]
async fn chat_model_failure_is_generic_500() {
    let (base, handle) = spawn_server(context_without_index(StubModel::failing())).await;

    let response = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "Hello" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let text = response.text().await.unwrap();
    assert!(!text.contains("secret-internal-detail"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body, json!({ "error": MODEL_FAILURE_MESSAGE }));

    handle.abort();
}

#[tokio::test]
async fn ask_with_empty_corpus_still_answers() {
    let model = StubModel::replying("I don't know.");
    let (base, handle) = spawn_server(context_without_index(model.clone())).await;

    let response = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "What is Pablo's favorite color?" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "answer": "I don't know." }));

    let prompt = model.last_prompt();
    assert!(prompt.contains("Question: What is Pablo's favorite color?"));
    assert!(!prompt.contains("[1]"));

    handle.abort();
}

#[tokio::test]
async fn ask_puts_retrieved_chunk_in_prompt() {
    let dir = TempDir::new().unwrap();
    let model = StubModel::replying("At NJIT.");
    let (base, handle) = spawn_server(context_with_index(model.clone(), &dir).await).await;

    let response = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "What does he study at NJIT?" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["answer"], "At NJIT.");

    let prompt = model.last_prompt();
    assert!(prompt.contains("[1] Pablo studies Computer Science at NJIT."));
    assert!(!prompt.contains("agentic payments"));

    handle.abort();
}

#[tokio::test]
async fn ask_rejects_missing_question_and_hides_model_errors() {
    let (base, handle) = spawn_server(context_without_index(StubModel::failing())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/ask", base))
        .json(&json!({ "message": "wrong field" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No question provided");

    let response = client
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "Hello?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], MODEL_FAILURE_MESSAGE);

    handle.abort();
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (base, handle) = spawn_server(context_without_index(StubModel::replying("x"))).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base))
        .header("origin", "https://someone.github.io")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{}/chat", base))
        .header("origin", "https://someone.github.io")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert!(preflight
        .headers()
        .contains_key("access-control-allow-methods"));

    handle.abort();
}
