//! 설정 모듈
//!
//! 환경변수(및 선택적 `.env` 파일)에서 애플리케이션 설정을 읽습니다.

use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Serialize;

/// 기본 대화 모델
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// OpenAI API 기본 URL
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Ollama 기본 호스트
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// UI에서 선택 가능했던 모델 목록
pub const MODEL_OPTIONS: &[&str] = &["gpt-3.5-turbo", "gpt-4", "llama3.2", "mistral"];

// ============================================================================
// AppConfig
// ============================================================================

/// 애플리케이션 설정
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    /// 대화/라우팅 모델 이름
    pub model: String,
    /// 임베딩 모델 이름
    pub embedding_model: String,
    /// OpenAI 호환 API 기본 URL
    pub openai_base_url: String,
    /// Ollama 호스트
    pub ollama_host: String,
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 시맨틱 검색 결과 개수
    pub top_k: usize,
    /// 생성 온도
    pub temperature: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            temperature: 0.0,
        }
    }
}

impl AppConfig {
    /// 환경변수에서 설정 로드
    ///
    /// 현재 디렉토리에 `.env` 파일이 있으면 먼저 읽습니다.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 구성 (테스트에서 환경변수 없이 사용)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            model: get("PDFQA_MODEL").unwrap_or(defaults.model),
            embedding_model: get("PDFQA_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            openai_base_url: get("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            ollama_host: get("OLLAMA_HOST")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_host),
            chunk_size: parse_or("PDFQA_CHUNK_SIZE", get("PDFQA_CHUNK_SIZE"), defaults.chunk_size)?,
            chunk_overlap: parse_or(
                "PDFQA_CHUNK_OVERLAP",
                get("PDFQA_CHUNK_OVERLAP"),
                defaults.chunk_overlap,
            )?,
            top_k: parse_or("PDFQA_TOP_K", get("PDFQA_TOP_K"), defaults.top_k)?,
            temperature: parse_or(
                "PDFQA_TEMPERATURE",
                get("PDFQA_TEMPERATURE"),
                defaults.temperature,
            )?,
        };

        if config.chunk_overlap >= config.chunk_size {
            anyhow::bail!(
                "PDFQA_CHUNK_OVERLAP ({}) must be smaller than PDFQA_CHUNK_SIZE ({})",
                config.chunk_overlap,
                config.chunk_size
            );
        }
        if config.top_k == 0 {
            anyhow::bail!("PDFQA_TOP_K must be at least 1");
        }

        Ok(config)
    }

    /// 선택된 모델이 OpenAI 모델인지 여부
    pub fn uses_openai(&self) -> bool {
        is_openai_model(&self.model)
    }
}

/// `gpt`로 시작하는 모델은 OpenAI, 나머지는 Ollama로 처리
pub fn is_openai_model(model: &str) -> bool {
    model.starts_with("gpt")
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// OpenAI API 키 로드 (OPENAI_API_KEY)
pub fn get_api_key() -> Result<String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => {
            tracing::debug!("Using API key from OPENAI_API_KEY");
            Ok(key)
        }
        _ => anyhow::bail!(
            "API key not found. Set OPENAI_API_KEY environment variable.\n\
             Get your API key at: https://platform.openai.com/api-keys"
        ),
    }
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    std::env::var("OPENAI_API_KEY")
        .map(|key| !key.is_empty())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 4);
        assert!(config.uses_openai());
    }

    #[test]
    fn test_overrides_from_env() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("PDFQA_MODEL", "llama3.2"),
            ("PDFQA_TOP_K", "8"),
            ("OLLAMA_HOST", "http://gpu-box:11434/"),
        ]))
        .unwrap();

        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.top_k, 8);
        assert_eq!(config.ollama_host, "http://gpu-box:11434");
        assert!(!config.uses_openai());
    }

    #[test]
    fn test_invalid_number_is_error() {
        let result = AppConfig::from_lookup(lookup_from(&[("PDFQA_CHUNK_SIZE", "big")]));
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("PDFQA_CHUNK_SIZE"));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("PDFQA_CHUNK_SIZE", "100"),
            ("PDFQA_CHUNK_OVERLAP", "100"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[("PDFQA_MODEL", "  ")])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_is_openai_model() {
        assert!(is_openai_model("gpt-4"));
        assert!(!is_openai_model("mistral"));
    }
}
