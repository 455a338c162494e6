//! 임베딩 모듈 - OpenAI API를 통한 텍스트 벡터화
//!
//! 페이지 청크와 질문을 벡터로 변환합니다.
//! 시맨틱 QA의 검색 단계에서 사용됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OpenAiEmbedding::from_config(&config)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{get_api_key, AppConfig};
use crate::http::{build_client, send_with_retry, RateLimiter, REQUEST_TIMEOUT};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// text-embedding-3-small 기본 차원
pub const DEFAULT_DIMENSION: usize = 1536;

/// 한 번의 요청에 담을 최대 입력 수
const MAX_BATCH_SIZE: usize = 96;

/// Rate Limiter 설정
const RATE_LIMIT_RPM: u32 = 500;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MIN_DELAY_MS: u64 = 100;

/// OpenAI 임베딩 구현체
///
/// ref: https://platform.openai.com/docs/api-reference/embeddings
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl OpenAiEmbedding {
    /// 새 OpenAI 임베딩 인스턴스 생성
    pub fn new(api_key: String, base_url: &str, model: &str) -> Result<Self> {
        let dimension = dimension_for_model(model)?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
            Duration::from_millis(MIN_DELAY_MS),
        )));

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
            client: build_client(REQUEST_TIMEOUT)?,
            rate_limiter,
        })
    }

    /// 설정과 환경변수(OPENAI_API_KEY)로 생성
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, &config.openai_base_url, &config.embedding_model)
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        let request = EmbedRequest {
            model: &self.model,
            input: inputs,
        };
        let url = format!("{}/embeddings", self.base_url);

        let response = send_with_retry("OpenAI embeddings", || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await?;

        let mut parsed: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        if parsed.data.len() != inputs.len() {
            anyhow::bail!(
                "Embedding response size mismatch: expected {}, got {}",
                inputs.len(),
                parsed.data.len()
            );
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// 모델별 임베딩 차원
fn dimension_for_model(model: &str) -> Result<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Ok(DEFAULT_DIMENSION),
        "text-embedding-3-large" => Ok(3072),
        other => anyhow::bail!(
            "Unknown embedding model: {}. Use text-embedding-3-small, text-embedding-3-large or text-embedding-ada-002",
            other
        ),
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];

        // 빈 텍스트는 API 호출 없이 0 벡터
        let non_empty: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.as_str()))
            .collect();

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                results[i] = vec![0.0; self.dimension];
            }
        }

        for (batch_no, batch) in non_empty.chunks(MAX_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                batch_no + 1,
                non_empty.len().div_ceil(MAX_BATCH_SIZE)
            );
            let inputs: Vec<&str> = batch.iter().map(|(_, t)| *t).collect();
            let embeddings = self.request(&inputs).await?;

            for ((index, _), embedding) in batch.iter().zip(embeddings) {
                results[*index] = embedding;
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성 (OpenAI API)
pub fn create_embedder(config: &AppConfig) -> Result<OpenAiEmbedding> {
    let embedder = OpenAiEmbedding::from_config(config)?;
    tracing::info!(
        "Using OpenAI embedding {} (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_for_model() {
        assert_eq!(dimension_for_model("text-embedding-3-small").unwrap(), 1536);
        assert_eq!(dimension_for_model("text-embedding-3-large").unwrap(), 3072);
    }

    #[test]
    fn test_unknown_model() {
        let result = OpenAiEmbedding::new("fake_key".to_string(), "http://localhost", "word2vec");
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("Unknown embedding model"));
    }

    #[tokio::test]
    async fn test_empty_text_needs_no_request() {
        let embedder =
            OpenAiEmbedding::new("fake_key".to_string(), "http://127.0.0.1:9", "text-embedding-3-small")
                .unwrap();
        let embedding = embedder.embed("   ").await.unwrap();
        assert_eq!(embedding.len(), DEFAULT_DIMENSION);
        assert!(embedding.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_batch_of_empty_texts_needs_no_request() {
        let embedder =
            OpenAiEmbedding::new("fake_key".to_string(), "http://127.0.0.1:9", "text-embedding-3-small")
                .unwrap();
        let texts = vec![String::new(), " ".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == DEFAULT_DIMENSION));
    }

    #[test]
    fn test_request_serialization() {
        let inputs = ["a", "b"];
        let request = EmbedRequest {
            model: "text-embedding-3-small",
            input: &inputs,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input"][1], "b");
    }
}
