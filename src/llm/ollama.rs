//! Ollama 로컬 모델 클라이언트
//!
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, LanguageModel, LineBuffer, TokenCallback};
use crate::config::AppConfig;
use crate::http::{build_client, send_with_retry};

/// 로컬 모델은 첫 로딩이 느리므로 타임아웃을 넉넉하게
const OLLAMA_TIMEOUT: Duration = Duration::from_secs(300);

/// Ollama 대화 모델
#[derive(Debug)]
pub struct OllamaChat {
    host: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(model: &str, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            host: config.ollama_host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: config.temperature,
            client: build_client(OLLAMA_TIMEOUT)?,
        })
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let request = OllamaRequest {
            model: &self.model,
            messages,
            stream,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };
        let url = format!("{}/api/chat", self.host);

        send_with_retry("Ollama", || self.client.post(&url).json(&request)).await
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

fn parse_ndjson_line(line: &str) -> Result<OllamaResponse> {
    let chunk: OllamaResponse =
        serde_json::from_str(line).context("Failed to parse Ollama response line")?;
    if let Some(err) = chunk.error {
        anyhow::bail!("Ollama error: {}", err);
    }
    Ok(chunk)
}

// ============================================================================
// LanguageModel
// ============================================================================

#[async_trait]
impl LanguageModel for OllamaChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.send(messages, false).await?;
        let body = response
            .text()
            .await
            .context("Failed to read Ollama response")?;
        let parsed = parse_ndjson_line(body.trim())?;

        parsed
            .message
            .map(|m| m.content)
            .ok_or_else(|| anyhow::anyhow!("Ollama response contained no message"))
    }

    async fn stream(&self, messages: &[ChatMessage], on_token: TokenCallback<'_>) -> Result<String> {
        let response = self.send(messages, true).await?;
        let mut body = response.bytes_stream();
        let mut buffer = LineBuffer::default();
        let mut answer = String::new();
        let mut done = false;

        while let Some(bytes) = body.next().await {
            let bytes = bytes.context("Failed to read Ollama stream")?;
            for line in buffer.push(&bytes) {
                let chunk = parse_ndjson_line(&line)?;
                if let Some(message) = chunk.message {
                    if !message.content.is_empty() {
                        on_token(&message.content);
                        answer.push_str(&message.content);
                    }
                }
                done |= chunk.done;
            }
            if done {
                break;
            }
        }

        if !done {
            if let Some(line) = buffer.finish() {
                if let Some(message) = parse_ndjson_line(&line)?.message {
                    on_token(&message.content);
                    answer.push_str(&message.content);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_line() {
        let chunk =
            parse_ndjson_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap();
        assert_eq!(chunk.message.map(|m| m.content), Some("Hi".to_string()));
        assert!(!chunk.done);
    }

    #[test]
    fn test_parse_done_line() {
        let chunk = parse_ndjson_line(r#"{"done":true,"total_duration":123}"#).unwrap();
        assert!(chunk.done);
        assert!(chunk.message.is_none());
    }

    #[test]
    fn test_parse_error_line() {
        let err = parse_ndjson_line(r#"{"error":"model not found"}"#)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("model not found"));
    }

    #[test]
    fn test_request_options() {
        let messages = vec![ChatMessage::system("s")];
        let request = OllamaRequest {
            model: "llama3.2",
            messages: &messages,
            stream: true,
            options: OllamaOptions { temperature: 0.0 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["options"]["temperature"], 0.0);
        assert_eq!(json["stream"], true);
    }
}
