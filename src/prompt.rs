//! 프롬프트 조립 모듈
//!
//! 페르소나 텍스트, 검색된 청크(1번부터 번호 매김), 질문을 하나의 프롬프트로
//! 렌더링합니다. 모든 함수는 부수 효과가 없는 순수 함수입니다.

use std::path::Path;

use anyhow::{Context, Result};

use crate::knowledge::ChunkRecord;

/// 내장 페르소나
pub const DEFAULT_PERSONA: &str = "\
You are Pablo Leyva's AI assistant. Here's information about Pablo:

EXPERIENCE:
- Apple: AI Product & Strategy Intern - Led team of 3 interns to build MVP for Agentic Payment flow, prototyped agentic workflows with LLM-based product recommendations and Apple Pay checkout using TypeScript and Model Context Protocol
- Radical AI: AI Engineer - Integrated modern LLMs into web applications using Python, worked with OpenAI's GPT-4o and Google's Gemini, developed Rex web app that helped students improve Calculus grades to 93%
- Caterpillar: Software Engineer - Retrieved engineer data via Python scripts using Azure DevOps API and GitHub REST API, analyzed software development efficiency using Generative AI, optimized SDLC by visualizing data in PowerBI
- NJIT: Research Assistant - Data analysis and FinTech research

SKILLS: TypeScript, Python, React, AI/ML, data analysis, web development, APIs, product strategy

PROJECTS: Portfolio website (React, TypeScript, Tailwind CSS, Framer Motion), Rex learning app, Apple Pay MVP with agentic workflows, data analysis projects

EDUCATION: Computer Science at NJIT

CONTACT: Available through this portfolio website

Be helpful, professional, and knowledgeable about Pablo's background. You can help with questions about his experience, draft emails to Pablo, suggest meeting times, and provide his contact information.";

/// RAG 모드 지시문
const CONTEXT_INSTRUCTION: &str = "Answer the user using ONLY the context below. \
If the answer is not in the context, say you don't know.";

// ============================================================================
// PromptAssembler
// ============================================================================

/// 프롬프트 조립기
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    persona: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

impl PromptAssembler {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    /// 페르소나 파일이 지정되면 읽고, 아니면 내장 페르소나 사용
    pub fn from_persona_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let persona = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read persona file: {:?}", path))?;
                if persona.trim().is_empty() {
                    anyhow::bail!("Persona file is empty: {:?}", path);
                }
                Ok(Self::new(persona.trim()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// RAG 프롬프트 렌더링
    pub fn render_rag(&self, chunks: &[ChunkRecord], question: &str) -> String {
        build_rag_prompt(&self.persona, chunks, question)
    }

    /// 단일 턴 채팅 프롬프트 렌더링 (검색 없음)
    pub fn render_chat(&self, message: &str) -> String {
        build_chat_prompt(&self.persona, message)
    }
}

/// 페르소나 + 번호 매긴 컨텍스트 + 질문 + 답변 신호
///
/// 청크가 없으면 컨텍스트 섹션은 비어 있지만 프롬프트 구조는 유지됩니다.
pub fn build_rag_prompt(persona: &str, chunks: &[ChunkRecord], question: &str) -> String {
    let context = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] {}", i + 1, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\n{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        persona.trim_end(),
        CONTEXT_INSTRUCTION,
        context,
        question.trim()
    )
}

/// 페르소나 + 사용자 메시지 + 답변 신호
pub fn build_chat_prompt(persona: &str, message: &str) -> String {
    format!("{}\n\nUser: {}\n\nAssistant:", persona.trim_end(), message.trim())
}

// ============================================================================
// Tests
// ============================================================================
