//! 언어 모델 클라이언트 모듈
//!
//! `complete(prompt) -> String` 하나의 인터페이스 뒤에
//! 호스티드(OpenAI 호환 chat completions)와 로컬(Ollama generate) 구현을 둡니다.
//! 어떤 구현을 쓸지는 시작 시 `Settings`로 한 번만 결정됩니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ModelBackend, Settings};

// ============================================================================
// Errors
// ============================================================================

/// 모델 백엔드 에러
#[derive(Debug, Error)]
pub enum ModelError {
    /// 네트워크 실패 또는 에러 상태 응답
    #[error("model backend unavailable ({backend}): {message}")]
    Unavailable { backend: String, message: String },

    /// 제한 시간 초과
    #[error("model backend timed out ({backend}) after {after:?}")]
    Timeout { backend: String, after: Duration },

    /// 응답 형식 오류
    #[error("malformed response from {backend}: {message}")]
    MalformedResponse { backend: String, message: String },
}

impl ModelError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ModelError::Timeout { .. })
    }

    fn from_request(backend: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Timeout {
                backend: backend.to_string(),
                after: timeout,
            }
        } else {
            ModelError::Unavailable {
                backend: backend.to_string(),
                message: err.to_string(),
            }
        }
    }
}

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트에 대한 텍스트 완성
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;

    /// 프로바이더 이름 (예: "openai", "ollama")
    fn name(&self) -> &str;

    /// 모델 이름
    fn model(&self) -> &str;
}

/// 생성 파라미터
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GenerationOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.request_timeout,
        }
    }
}

fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// 응답 상태/본문 처리 공통 로직
async fn read_json<R>(backend: &str, response: reqwest::Response, timeout: Duration) -> Result<R, ModelError>
where
    R: for<'de> Deserialize<'de>,
{
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ModelError::from_request(backend, timeout, e))?;

    if !status.is_success() {
        return Err(ModelError::Unavailable {
            backend: backend.to_string(),
            message: format!("HTTP {}: {}", status, body),
        });
    }

    serde_json::from_str(&body).map_err(|e| ModelError::MalformedResponse {
        backend: backend.to_string(),
        message: e.to_string(),
    })
}

// ============================================================================
// OpenAI Chat
// ============================================================================

/// OpenAI 호환 chat completions 클라이언트
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    options: GenerationOptions,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        options: GenerationOptions,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(options.timeout)?,
            api_key: api_key.to_string(),
            url: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            options,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::from_request("openai", self.options.timeout, e))?;

        let payload: ChatCompletionResponse =
            read_json("openai", response, self.options.timeout).await?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::MalformedResponse {
                backend: "openai".to_string(),
                message: "response contained no message content".to_string(),
            })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama
// ============================================================================

/// Ollama 로컬 generate 클라이언트
pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    options: GenerationOptions,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaChat {
    pub fn new(base_url: &str, model: &str, options: GenerationOptions) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(options.timeout)?,
            url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
            options,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: self.options.max_tokens,
                temperature: self.options.temperature,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::from_request("ollama", self.options.timeout, e))?;

        let payload: GenerateResponse = read_json("ollama", response, self.options.timeout).await?;
        Ok(payload.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정된 백엔드에 맞는 언어 모델 생성
///
/// 프로세스 시작 시 한 번만 호출하고 결과를 공유합니다.
pub fn create_language_model(settings: &Settings) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let options = GenerationOptions::from_settings(settings);

    let model: Arc<dyn LanguageModel> = match &settings.backend {
        ModelBackend::Hosted {
            api_key,
            base_url,
            chat_model,
            ..
        } => Arc::new(OpenAiChat::new(api_key, base_url, chat_model, options)?),
        ModelBackend::Local {
            base_url,
            chat_model,
            ..
        } => Arc::new(OllamaChat::new(base_url, chat_model, options)?),
    };

    tracing::info!("Using language model: {}/{}", model.name(), model.model());
    Ok(model)
}

// ============================================================================
// Tests
// ============================================================================
