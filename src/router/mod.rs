//! Query Router - 질문을 정확 일치 또는 시맨틱 QA로 라우팅
//!
//! ## 라우팅 순서
//! 1. 고정 패턴 규칙 (대소문자 무시). 일치하면 외부 호출 없이 `ExactMatch`
//! 2. 분류기 협력자에게 모드 라벨 질의
//! 3. 라벨이 잘못되었거나 호출이 실패하면 `SemanticQa`
//!
//! 라우팅 단계는 실패하지 않습니다 (로그 후 기본값).
//! 실행 단계의 오류는 로그 후 그대로 호출자에게 전달합니다.

mod classifier;

pub use classifier::{Classifier, LlmClassifier};

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::document::Document;
use crate::llm::{ChatMessage, TokenCallback};
use crate::tools::{ExactMatchTool, MatchOptions, MatchResult, QaResult, SemanticAnswerer};

/// 정확 일치로 라우팅하는 질문 패턴
const EXACT_MATCH_PATTERNS: &[&str] = &[
    "how many times",
    "how many occurrences",
    "how many instances",
    "how often",
    "how frequently",
    "count of",
    "number of",
    "occurrences of",
    "instances of",
    "appears",
    "appear",
    "occurring",
    "occurs",
    "mentioned",
    "mentions",
    "find.*exact",
    "locate.*phrase",
    "search for.*exact",
];

static EXACT_MATCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(&EXACT_MATCH_PATTERNS.join("|"))
        .case_insensitive(true)
        .build()
        .expect("valid exact match patterns")
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"']*)["']"#).expect("valid quote pattern"));

// ============================================================================
// Types
// ============================================================================

/// 질의 처리 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueryMode {
    #[serde(rename = "EXACT_MATCH")]
    ExactMatch,
    #[serde(rename = "SEMANTIC_QA")]
    SemanticQa,
}

impl QueryMode {
    /// 분류기 라벨
    pub fn label(&self) -> &'static str {
        match self {
            QueryMode::ExactMatch => "EXACT_MATCH",
            QueryMode::SemanticQa => "SEMANTIC_QA",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QueryMode {
    type Err = anyhow::Error;

    /// 라벨과 정확히 같아야 합니다 (공백 제거 후)
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "EXACT_MATCH" => Ok(QueryMode::ExactMatch),
            "SEMANTIC_QA" => Ok(QueryMode::SemanticQa),
            other => anyhow::bail!("Unknown query mode: {:?}", other),
        }
    }
}

/// 라우팅 결정
///
/// `search_term`은 `ExactMatch`일 때만 존재합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub mode: QueryMode,
    pub search_term: Option<String>,
}

/// 모드별 처리 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    ExactMatch(MatchResult),
    SemanticQa(QaResult),
}

/// 질의 처리 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub mode: QueryMode,
    pub result: QueryOutcome,
}

// ============================================================================
// QueryRouter
// ============================================================================

/// 질의 라우터
///
/// 대화 상태를 갖지 않습니다. 시맨틱 도구가 자체 대화 메모리를 관리합니다.
pub struct QueryRouter {
    exact_match: ExactMatchTool,
    semantic: Arc<dyn SemanticAnswerer>,
    classifier: Arc<dyn Classifier>,
}

impl QueryRouter {
    pub fn new(semantic: Arc<dyn SemanticAnswerer>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            exact_match: ExactMatchTool::new(),
            semantic,
            classifier,
        }
    }

    /// 질문의 처리 모드 분류
    pub async fn classify(&self, question: &str) -> QueryMode {
        if EXACT_MATCH_RE.is_match(question) {
            tracing::debug!("Question matched exact match pattern");
            return QueryMode::ExactMatch;
        }

        match self.classifier.classify_mode(question).await {
            Ok(label) => label.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    "Unexpected routing label {:?}, defaulting to {}",
                    label.trim(),
                    QueryMode::SemanticQa
                );
                QueryMode::SemanticQa
            }),
            Err(e) => {
                tracing::error!("Error in query classification: {:#}", e);
                QueryMode::SemanticQa
            }
        }
    }

    /// 정확 일치 검색어 추출
    ///
    /// 첫 번째 따옴표 구절이 있으면 그대로 사용합니다. 이후 구절은 무시합니다.
    pub async fn extract_search_term(&self, question: &str) -> String {
        if let Some(quoted) = first_quoted_span(question) {
            return quoted.to_string();
        }

        match self.classifier.extract_term(question).await {
            Ok(raw) => {
                let term = clean_term(&raw);
                if term.is_empty() {
                    tracing::warn!("Search term extraction returned nothing, using full question");
                    question.to_string()
                } else {
                    term.to_string()
                }
            }
            Err(e) => {
                tracing::error!("Error extracting search term: {:#}", e);
                question.to_string()
            }
        }
    }

    /// 라우팅 결정만 수행
    pub async fn route(&self, question: &str, force_mode: Option<QueryMode>) -> RoutingDecision {
        let mode = match force_mode {
            Some(mode) => mode,
            None => self.classify(question).await,
        };

        let search_term = match mode {
            QueryMode::ExactMatch => Some(self.extract_search_term(question).await),
            QueryMode::SemanticQa => None,
        };

        tracing::info!("Routing to {} mode", mode);
        RoutingDecision { mode, search_term }
    }

    /// 질의를 적절한 도구로 처리
    pub async fn process_query(
        &self,
        question: &str,
        document: &Document,
        force_mode: Option<QueryMode>,
        on_token: Option<TokenCallback<'_>>,
    ) -> Result<QueryResult> {
        let decision = self.route(question, force_mode).await;

        // route()는 ExactMatch일 때만 검색어를 채움
        let result = match decision.search_term {
            Some(term) => self
                .exact_match
                .count_matches(document, &term, MatchOptions::default())
                .map(QueryOutcome::ExactMatch)
                .map_err(anyhow::Error::from),
            None => self
                .semantic
                .ask(question, on_token)
                .await
                .map(QueryOutcome::SemanticQa),
        };

        match result {
            Ok(result) => Ok(QueryResult {
                mode: decision.mode,
                result,
            }),
            Err(e) => {
                tracing::error!("Error processing query: {:#}", e);
                Err(e)
            }
        }
    }

    /// 시맨틱 도구의 대화 기록 초기화
    pub async fn clear_chat_history(&self) {
        self.semantic.clear_memory().await;
    }

    /// 시맨틱 도구의 대화 기록
    pub async fn chat_history(&self) -> Vec<ChatMessage> {
        self.semantic.chat_history().await
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 질문이 정확 일치 패턴에 해당하는지 여부
pub fn matches_exact_pattern(question: &str) -> bool {
    EXACT_MATCH_RE.is_match(question)
}

/// 첫 번째 따옴표 구절 (비어 있으면 None)
fn first_quoted_span(question: &str) -> Option<&str> {
    QUOTED_RE
        .captures(question)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
}

/// 분류기 출력에서 공백과 따옴표 제거
fn clean_term(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

// ============================================================================
// Tests
// ============================================================================
