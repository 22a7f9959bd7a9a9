//! CLI 모듈
//!
//! portfolio-chat 명령어 정의 및 구현. 하위 명령이 없으면 `serve`로 동작합니다.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::DocumentLoader;
use crate::config::Settings;
use crate::embedding::create_embedder;
use crate::knowledge::{ChunkConfig, EmbeddingIndex, IndexPaths, IndexStats};
use crate::server::{self, AppContext};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "portfolio-chat")]
#[command(version, about = "포트폴리오 챗봇 백엔드 (RAG)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP 서버 실행 (기본값)
    Serve {
        /// 바인드 호스트 (HOST 환경변수보다 우선)
        #[arg(long)]
        host: Option<String>,

        /// 바인드 포트 (PORT 환경변수보다 우선)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 데이터 디렉토리에서 인덱스 빌드
    Index {
        /// 저장된 인덱스가 유효해도 다시 빌드
        #[arg(long)]
        force: bool,
    },

    /// 터미널에서 질문 한 번 실행
    Ask {
        /// 질문
        question: String,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env().context("설정 로드 실패")?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => cmd_serve(settings, host, port).await,
        Commands::Index { force } => cmd_index(&settings, force).await,
        Commands::Ask { question } => cmd_ask(&settings, &question).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 서버 명령어 (serve)
async fn cmd_serve(mut settings: Settings, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        settings.host = host;
    }
    if let Some(port) = port {
        settings.port = port;
    }

    tracing::info!(
        "Starting portfolio-chat v{} ({} backend)",
        env!("CARGO_PKG_VERSION"),
        settings.backend.provider()
    );
    server::serve(settings).await
}

/// 인덱스 명령어 (index)
///
/// 저장된 인덱스가 유효하면 그대로 두고, `--force`면 항상 다시 빌드합니다.
async fn cmd_index(settings: &Settings, force: bool) -> Result<()> {
    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());
    println!("[*] 인덱스 디렉토리: {}", settings.index_dir.display());

    let embedder = create_embedder(settings)?;
    let chunk_config = ChunkConfig::new(settings.chunk_size, settings.chunk_overlap)?;

    let index = EmbeddingIndex::open_or_build(
        &IndexPaths::new(&settings.index_dir),
        &settings.data_dir,
        chunk_config,
        embedder.as_ref(),
        force,
    )
    .await
    .context("인덱스 빌드 실패")?;

    println!("\n[OK] 인덱스 준비 완료");
    print_index_stats(&index.stats());

    Ok(())
}

/// 질문 명령어 (ask)
///
/// 서버와 같은 검색 → 생성 경로를 한 번 실행합니다.
async fn cmd_ask(settings: &Settings, question: &str) -> Result<()> {
    let context = AppContext::initialize(settings).await?;

    println!("[*] 질문: \"{}\"", question);

    let state = context
        .pipeline
        .run(question)
        .await
        .context("답변 생성 실패")?;

    if state.context.is_empty() {
        println!("\n[!] 관련 문서를 찾지 못했습니다. 컨텍스트 없이 답변합니다.");
    } else {
        println!("\n[OK] 참고한 청크 ({} 건):\n", state.context.len());
        for (i, chunk) in state.context.iter().enumerate() {
            println!("{}. {} #{}", i + 1, chunk.source, chunk.chunk_index);
            println!("   내용: {}", truncate_text(&chunk.text, 120));
        }
    }

    println!("\n{}", state.answer.unwrap_or_default());
    Ok(())
}

/// 상태 명령어 (status)
///
/// 모델 백엔드, 코퍼스, 저장된 인덱스 상태를 확인합니다.
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("portfolio-chat v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!(
        "[*] 모델 백엔드: {} (chat: {}, embedding: {})",
        settings.backend.provider(),
        settings.backend.chat_model(),
        settings.backend.embedding_model()
    );
    if settings.backend.provider() == "ollama" {
        println!("    OPENAI_API_KEY 미설정: 로컬 Ollama 사용");
    }

    print_corpus_stats(&settings.data_dir);

    let embedder = create_embedder(settings)?;
    let paths = IndexPaths::new(&settings.index_dir);
    println!("[*] 인덱스 디렉토리: {}", paths.dir.display());

    match EmbeddingIndex::load(&paths, embedder.name()).await {
        Ok(Some(index)) => {
            println!("[OK] 저장된 인덱스");
            print_index_stats(&index.stats());
        }
        Ok(None) => {
            println!("[!] 유효한 인덱스 없음 (서버 시작 시 빌드됨)");
        }
        Err(e) => {
            println!("[!] 인덱스 확인 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_corpus_stats(data_dir: &Path) {
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    match DocumentLoader::with_defaults().load(data_dir) {
        Ok(documents) => {
            let total_bytes: usize = documents.iter().map(|d| d.text.len()).sum();
            println!(
                "[OK] 문서: {} 건 ({})",
                documents.len(),
                format_bytes(total_bytes)
            );
        }
        Err(e) => {
            println!("[!] 문서 로드 실패: {}", e);
        }
    }
}

fn print_index_stats(stats: &IndexStats) {
    println!("     청크: {} 개 ({} 개 문서)", stats.chunk_count, stats.source_count);
    println!("     임베딩: {} ({}차원)", stats.embedding_model, stats.dimension);
    if let Some(built_at) = stats.built_at {
        println!("     빌드 시각: {}", built_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
