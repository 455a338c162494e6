//! HTTP 유틸리티 - Rate Limiter 및 재시도
//!
//! OpenAI/Ollama 호출이 공유하는 요청 간격 제어와
//! 429/전송 오류에 대한 지수 백오프 재시도를 제공합니다.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;

/// 429 에러 시 최대 재시도 횟수
pub const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
pub const INITIAL_BACKOFF_MS: u64 = 2000;
/// 기본 요청 타임아웃
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP 클라이언트 생성
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("pdf-qa/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
pub struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    pub async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        // 2. 윈도우 밖의 오래된 요청 제거
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }

    /// 현재 윈도우 내 요청 수
    pub fn in_flight_window(&self) -> usize {
        self.requests.len()
    }
}

// ============================================================================
// Retry
// ============================================================================

/// 재시도 횟수에 따른 백오프 시간
pub fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

/// OpenAI 형식 에러 응답
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// 에러 응답 본문에서 메시지 추출
pub fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiError>(body) {
        return parsed.error.message;
    }
    // Ollama: {"error": "..."}
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
            return msg.to_string();
        }
    }
    body.trim().to_string()
}

/// 요청 전송 (429 및 전송 오류 시 지수 백오프 재시도)
///
/// `build`는 매 시도마다 새 요청을 만듭니다. 성공 응답만 반환합니다.
pub async fn send_with_retry<F>(service: &str, build: F) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=MAX_RETRIES {
        let response = match build().send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = Some(anyhow::anyhow!("Failed to send {} request: {}", service, e));
                if attempt < MAX_RETRIES {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        "Request failed, retrying in {:?} (attempt {}/{})",
                        backoff,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                break;
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            let backoff = backoff_for(attempt);
            tracing::warn!(
                "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                backoff,
                attempt + 1,
                MAX_RETRIES
            );
            last_error = Some(anyhow::anyhow!("{} rate limit exceeded (429)", service));

            if attempt < MAX_RETRIES {
                tokio::time::sleep(backoff).await;
                continue;
            }
            break;
        }

        // 다른 에러 - 즉시 실패
        let body = response
            .text()
            .await
            .context("Failed to read error response body")?;
        anyhow::bail!("{} API error ({}): {}", service, status, error_message(&body));
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("{} request failed after {} retries", service, MAX_RETRIES)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_for(0), Duration::from_millis(2000));
        assert_eq!(backoff_for(1), Duration::from_millis(4000));
        assert_eq!(backoff_for(2), Duration::from_millis(8000));
    }

    #[test]
    fn test_error_message_openai_format() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Incorrect API key provided");
    }

    #[test]
    fn test_error_message_ollama_format() {
        let body = r#"{"error": "model 'mistral' not found"}"#;
        assert_eq!(error_message(body), "model 'mistral' not found");
    }

    #[test]
    fn test_error_message_plain_body() {
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_rate_limiter_records_requests() {
        let mut limiter = RateLimiter::new(10, Duration::from_secs(60), Duration::ZERO);
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.in_flight_window(), 2);
    }

    #[tokio::test]
    async fn test_rate_limiter_min_delay() {
        let mut limiter =
            RateLimiter::new(10, Duration::from_secs(60), Duration::from_millis(20));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
