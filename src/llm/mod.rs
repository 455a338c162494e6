//! LLM 모듈 - 대화형 언어 모델 추상화
//!
//! 라우팅 분류, 검색어 추출, 시맨틱 답변 생성에 사용되는
//! 언어 모델 인터페이스와 구현체(OpenAI, Ollama)를 제공합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let llm = create_llm("gpt-3.5-turbo", &config)?;
//! let answer = llm.complete(&[ChatMessage::user("Hello")]).await?;
//! ```

mod ollama;
mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{is_openai_model, AppConfig};

pub use ollama::OllamaChat;
pub use openai::OpenAiChat;

/// 스트리밍 토큰 콜백
pub type TokenCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

// ============================================================================
// Messages
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 대화 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 전체 응답을 한 번에 생성
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// 토큰 단위 스트리밍 생성 (기본 구현: complete 후 한 번 전달)
    async fn stream(&self, messages: &[ChatMessage], on_token: TokenCallback<'_>) -> Result<String> {
        let text = self.complete(messages).await?;
        on_token(&text);
        Ok(text)
    }

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 모델 이름으로 언어 모델 생성
///
/// `gpt`로 시작하면 OpenAI, 그 외는 Ollama 로컬 모델(소문자 이름)을 사용합니다.
pub fn create_llm(model_name: &str, config: &AppConfig) -> Result<Arc<dyn LanguageModel>> {
    if is_openai_model(model_name) {
        let llm = OpenAiChat::from_config(model_name, config)?;
        tracing::info!("Using OpenAI chat model: {}", model_name);
        Ok(Arc::new(llm))
    } else {
        let llm = OllamaChat::new(&model_name.to_lowercase(), config)?;
        tracing::info!("Using Ollama model: {}", llm.name());
        Ok(Arc::new(llm))
    }
}

// ============================================================================
// Line Buffer
// ============================================================================

/// 스트리밍 응답 바이트를 줄 단위로 분리
///
/// SSE(`data: ...`)와 NDJSON 응답 모두 줄 단위 파싱에 사용합니다.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// 바이트를 추가하고 완성된 줄을 반환
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// 남은 데이터를 마지막 줄로 반환
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

// ============================================================================
// Tests
// ============================================================================
