//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 호스티드(OpenAI 호환 `/v1/embeddings`) 또는 로컬(Ollama `/api/embed`)
//! 임베딩 프로바이더를 제공합니다. 인덱스 빌드와 질의 임베딩은 반드시
//! 같은 프로바이더/모델을 사용해야 하므로 `name()`이 모델 식별자가 됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&settings)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ModelBackend, Settings};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vectors"))
    }

    /// 배치 임베딩 (입력 순서대로 반환)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 모델 식별자 (예: "ollama/nomic-embed-text")
    fn name(&self) -> &str;
}

// ============================================================================
// Retry Policy
// ============================================================================

/// 429/연결 실패 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;

/// 재시도 포함 JSON POST
///
/// 연결 실패와 429는 지수 백오프로 재시도하고, 타임아웃과 그 외 에러 상태는 즉시 실패합니다.
async fn post_json_with_retry<B, R>(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &B,
    provider: &str,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
            tracing::warn!(
                "{} embedding request failed, retrying in {:?} (attempt {}/{})",
                provider,
                backoff,
                attempt,
                MAX_RETRIES
            );
            tokio::time::sleep(backoff).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            // 타임아웃은 재시도하지 않음: 호출 하나가 설정된 제한 시간을 넘지 않아야 함
            Err(e) if e.is_timeout() => {
                return Err(e).context("Embedding request timed out");
            }
            Err(e) if e.is_connect() => {
                last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                continue;
            }
            Err(e) => return Err(e).context("Failed to send embedding request"),
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read embedding response body")?;

        if status.is_success() {
            return serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {} embedding response", provider));
        }

        if status.as_u16() == 429 {
            last_error = Some(anyhow::anyhow!("{} rate limit exceeded (429)", provider));
            continue;
        }

        anyhow::bail!("{} embedding error ({}): {}", provider, status, text);
    }

    Err(last_error.unwrap_or_else(|| {
        anyhow::anyhow!("Embedding failed after {} retries", MAX_RETRIES)
    }))
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// OpenAI 호환 임베딩 구현체
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    name: String,
}

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!("OpenAI API key must not be empty");
        }

        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.to_string(),
            url: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            name: format!("openai/{}", model),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let request = OpenAiEmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response: OpenAiEmbedResponse =
            post_json_with_retry(&self.client, &self.url, Some(&self.api_key), &request, "OpenAI")
                .await?;

        let mut data = response.data;
        // index 필드가 있으면 입력 순서로 정렬
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));

        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        ensure_count(vectors, texts.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// Ollama 로컬 임베딩 구현체
pub struct OllamaEmbedding {
    client: reqwest::Client,
    url: String,
    model: String,
    name: String,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedding {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
            name: format!("ollama/{}", model),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let request = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response: OllamaEmbedResponse =
            post_json_with_retry(&self.client, &self.url, None, &request, "Ollama").await?;

        ensure_count(response.embeddings, texts.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 응답 벡터 개수 검증
fn ensure_count(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        anyhow::bail!(
            "Embedding count mismatch: expected {}, got {}",
            expected,
            vectors.len()
        );
    }
    Ok(vectors)
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정된 백엔드에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match &settings.backend {
        ModelBackend::Hosted {
            api_key,
            base_url,
            embedding_model,
            ..
        } => Arc::new(OpenAiEmbedding::new(
            api_key,
            base_url,
            embedding_model,
            settings.request_timeout,
        )?),
        ModelBackend::Local {
            base_url,
            embedding_model,
            ..
        } => Arc::new(OllamaEmbedding::new(
            base_url,
            embedding_model,
            settings.request_timeout,
        )?),
    };

    tracing::info!("Using embedding model: {}", embedder.name());
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
