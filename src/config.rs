//! 설정 모듈 - 환경변수 기반 서버 설정
//!
//! 모든 설정은 환경변수(또는 `.env`)에서 읽습니다.
//! `OPENAI_API_KEY` 존재 여부로 호스티드/로컬 모델 백엔드가 결정되며,
//! 이 선택은 프로세스 시작 시 한 번만 이루어집니다.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

pub const DEFAULT_OLLAMA_MODEL: &str = "mistral";
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_CHUNK_SIZE: usize = 800;
const DEFAULT_CHUNK_OVERLAP: usize = 150;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_TOKENS: u32 = 500;
const DEFAULT_TEMPERATURE: f32 = 0.7;

// ============================================================================
// Cache Directory
// ============================================================================

/// 캐시 디렉토리 경로 (~/.cache/portfolio-chat/)
pub fn get_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("portfolio-chat")
}

// ============================================================================
// Model Backend
// ============================================================================

/// 모델 백엔드 선택 결과
///
/// 호스티드(OpenAI 호환 API) 또는 로컬(Ollama) 중 하나입니다.
/// 채팅 모델과 임베딩 모델 모두 같은 백엔드를 사용합니다.
#[derive(Clone, PartialEq, Eq)]
pub enum ModelBackend {
    Hosted {
        api_key: String,
        base_url: String,
        chat_model: String,
        embedding_model: String,
    },
    Local {
        base_url: String,
        chat_model: String,
        embedding_model: String,
    },
}

impl ModelBackend {
    /// 백엔드 이름 ("openai" / "ollama")
    pub fn provider(&self) -> &'static str {
        match self {
            ModelBackend::Hosted { .. } => "openai",
            ModelBackend::Local { .. } => "ollama",
        }
    }

    pub fn chat_model(&self) -> &str {
        match self {
            ModelBackend::Hosted { chat_model, .. } | ModelBackend::Local { chat_model, .. } => {
                chat_model
            }
        }
    }

    pub fn embedding_model(&self) -> &str {
        match self {
            ModelBackend::Hosted {
                embedding_model, ..
            }
            | ModelBackend::Local {
                embedding_model, ..
            } => embedding_model,
        }
    }
}

impl fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelBackend::Hosted {
                base_url,
                chat_model,
                embedding_model,
                ..
            } => f
                .debug_struct("Hosted")
                .field("api_key", &"<redacted>")
                .field("base_url", base_url)
                .field("chat_model", chat_model)
                .field("embedding_model", embedding_model)
                .finish(),
            ModelBackend::Local {
                base_url,
                chat_model,
                embedding_model,
            } => f
                .debug_struct("Local")
                .field("base_url", base_url)
                .field("chat_model", chat_model)
                .field("embedding_model", embedding_model)
                .finish(),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// 문서 디렉토리 (재귀 스캔)
    pub data_dir: PathBuf,
    /// 인덱스 저장 디렉토리
    pub index_dir: PathBuf,
    /// 페르소나 텍스트 파일 (없으면 내장 페르소나)
    pub persona_path: Option<PathBuf>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// 모델/임베딩 호출 타임아웃
    pub request_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    /// 시작 시 결정되는 모델 백엔드
    pub backend: ModelBackend,
}

impl Settings {
    /// 프로세스 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 key -> value 조회 함수로 설정 로드
    ///
    /// 빈 문자열은 설정되지 않은 것으로 취급합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend = match get("OPENAI_API_KEY") {
            Some(api_key) => ModelBackend::Hosted {
                api_key,
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                chat_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                embedding_model: get("OPENAI_EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()),
            },
            None => ModelBackend::Local {
                base_url: get("OLLAMA_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string()),
                chat_model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
                embedding_model: get("OLLAMA_EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string()),
            },
        };

        let settings = Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            index_dir: get("INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| get_cache_dir().join("index")),
            persona_path: get("PERSONA_PATH").map(PathBuf::from),
            chunk_size: parse_or(get("CHUNK_SIZE"), "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: parse_or(get("CHUNK_OVERLAP"), "CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            top_k: parse_or(get("RAG_TOP_K"), "RAG_TOP_K", DEFAULT_TOP_K)?,
            request_timeout: Duration::from_secs(parse_or(
                get("MODEL_TIMEOUT_SECS"),
                "MODEL_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            max_tokens: parse_or(get("MODEL_MAX_TOKENS"), "MODEL_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            temperature: parse_or(
                get("MODEL_TEMPERATURE"),
                "MODEL_TEMPERATURE",
                DEFAULT_TEMPERATURE,
            )?,
            backend,
        };

        if settings.top_k == 0 {
            anyhow::bail!("RAG_TOP_K must be at least 1");
        }

        Ok(settings)
    }

    /// HTTP 리스너 주소
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 값이 있으면 파싱, 없으면 기본값
fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================
