//! OpenAI Chat Completions 클라이언트
//!
//! ref: https://platform.openai.com/docs/api-reference/chat

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, LanguageModel, LineBuffer, TokenCallback};
use crate::config::{get_api_key, AppConfig};
use crate::http::{build_client, send_with_retry, REQUEST_TIMEOUT};

/// OpenAI 대화 모델
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: &str,
        temperature: f32,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            client: build_client(REQUEST_TIMEOUT)?,
        })
    }

    /// 설정과 환경변수(OPENAI_API_KEY)로 생성
    pub fn from_config(model: &str, config: &AppConfig) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, &config.openai_base_url, model, config.temperature)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream,
        };
        let url = self.endpoint();

        send_with_retry("OpenAI", || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// SSE 한 줄 해석 결과
#[derive(Debug, PartialEq)]
enum SseEvent {
    Token(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: StreamChunk =
        serde_json::from_str(data).context("Failed to parse OpenAI stream chunk")?;
    let token = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect::<String>();

    Ok(if token.is_empty() {
        SseEvent::Skip
    } else {
        SseEvent::Token(token)
    })
}

// ============================================================================
// LanguageModel
// ============================================================================

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.send(messages, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI chat response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("OpenAI response contained no message content"))
    }

    async fn stream(&self, messages: &[ChatMessage], on_token: TokenCallback<'_>) -> Result<String> {
        let response = self.send(messages, true).await?;
        let mut body = response.bytes_stream();
        let mut buffer = LineBuffer::default();
        let mut answer = String::new();

        'outer: while let Some(bytes) = body.next().await {
            let bytes = bytes.context("Failed to read OpenAI stream")?;
            for line in buffer.push(&bytes) {
                match parse_sse_line(&line)? {
                    SseEvent::Token(token) => {
                        on_token(&token);
                        answer.push_str(&token);
                    }
                    SseEvent::Done => break 'outer,
                    SseEvent::Skip => {}
                }
            }
        }

        Ok(answer)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
