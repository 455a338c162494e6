//! Exact Match 도구 - 문서 내 정확 일치 카운팅
//!
//! 검색어를 리터럴 문자열로 취급하여 페이지별 등장 횟수와
//! 각 등장 위치의 문맥 스니펫을 계산합니다. LLM을 사용하지 않습니다.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use thiserror::Error;

use crate::document::Document;

/// 스니펫 앞뒤로 포함할 문맥 문자 수
pub const CONTEXT_CHARS: usize = 50;

/// 잘린 스니펫 표시
pub const ELLIPSIS: &str = "...";

// ============================================================================
// Types
// ============================================================================

/// 정확 일치 검색 오류
#[derive(Debug, Error)]
pub enum ExactMatchError {
    #[error("Search term must not be empty")]
    EmptyTerm,

    #[error("Invalid search pattern for {term:?}: {source}")]
    InvalidPattern {
        term: String,
        #[source]
        source: regex::Error,
    },
}

/// 검색 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// 대소문자 구분 (기본: 구분하지 않음)
    pub case_sensitive: bool,
    /// 단어 경계 일치만 허용
    pub whole_word: bool,
}

/// 페이지별 일치 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMatch {
    pub page_number: usize,
    pub count: usize,
    /// 등장 순서대로의 문맥 스니펫
    pub snippets: Vec<String>,
}

/// 문서 전체 일치 결과
///
/// `count`는 항상 `matches`의 페이지별 count 합과 같고,
/// `matches`는 페이지 번호 오름차순입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub count: usize,
    pub matches: Vec<PageMatch>,
}

impl MatchResult {
    /// 일치 항목이 하나도 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 모든 스니펫을 (페이지 번호, 스니펫) 순서로 순회
    pub fn snippets(&self) -> impl Iterator<Item = (usize, &str)> {
        self.matches.iter().flat_map(|m| {
            m.snippets
                .iter()
                .map(move |s| (m.page_number, s.as_str()))
        })
    }
}

// ============================================================================
// ExactMatchTool
// ============================================================================

/// 정확 일치 도구
#[derive(Debug, Clone)]
pub struct ExactMatchTool {
    context_chars: usize,
}

impl Default for ExactMatchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExactMatchTool {
    pub fn new() -> Self {
        Self {
            context_chars: CONTEXT_CHARS,
        }
    }

    /// 문맥 길이를 지정하여 생성
    pub fn with_context_chars(context_chars: usize) -> Self {
        Self { context_chars }
    }

    /// 문서에서 검색어 등장 횟수 계산
    pub fn count_matches(
        &self,
        document: &Document,
        term: &str,
        options: MatchOptions,
    ) -> Result<MatchResult, ExactMatchError> {
        let regex = build_pattern(term, options).map_err(|e| {
            tracing::error!("Error counting matches: {}", e);
            e
        })?;

        let mut matches: Vec<PageMatch> = document
            .pages()
            .iter()
            .filter_map(|page| {
                let text = page.text();
                let snippets: Vec<String> = regex
                    .find_iter(text)
                    .map(|m| context_snippet(text, m.start(), m.end(), self.context_chars))
                    .collect();

                if snippets.is_empty() {
                    None
                } else {
                    Some(PageMatch {
                        page_number: page.page_number(),
                        count: snippets.len(),
                        snippets,
                    })
                }
            })
            .collect();

        matches.sort_by_key(|m| m.page_number);
        let count = matches.iter().map(|m| m.count).sum();

        tracing::debug!(
            "Exact match {:?}: {} occurrences on {} pages",
            term,
            count,
            matches.len()
        );

        Ok(MatchResult { count, matches })
    }
}

/// 기본 도구로 일치 횟수 계산
pub fn count_matches(
    document: &Document,
    term: &str,
    options: MatchOptions,
) -> Result<MatchResult, ExactMatchError> {
    ExactMatchTool::new().count_matches(document, term, options)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 검색어를 리터럴 정규식으로 컴파일
fn build_pattern(term: &str, options: MatchOptions) -> Result<Regex, ExactMatchError> {
    if term.is_empty() {
        return Err(ExactMatchError::EmptyTerm);
    }

    let escaped = regex::escape(term);
    let pattern = if options.whole_word {
        format!(r"\b{}\b", escaped)
    } else {
        escaped
    };

    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(|source| ExactMatchError::InvalidPattern {
            term: term.to_string(),
            source,
        })
}

/// 일치 위치 주변의 문맥 스니펫 생성
///
/// `start`/`end`는 바이트 오프셋이고, 문맥 길이는 문자 단위로 계산합니다.
fn context_snippet(text: &str, start: usize, end: usize, context_chars: usize) -> String {
    let snippet_start = text[..start]
        .char_indices()
        .rev()
        .nth(context_chars.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let snippet_start = if context_chars == 0 { start } else { snippet_start };

    let snippet_end = text[end..]
        .char_indices()
        .nth(context_chars)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let prefix = if snippet_start > 0 { ELLIPSIS } else { "" };
    let suffix = if snippet_end < text.len() { ELLIPSIS } else { "" };

    format!(
        "{}{}{}",
        prefix,
        text[snippet_start..snippet_end].trim(),
        suffix
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pages: &[&str]) -> Document {
        Document::from_texts("test.pdf", pages.iter().copied())
    }

    fn strip_ellipsis(snippet: &str) -> &str {
        let s = snippet.strip_prefix(ELLIPSIS).unwrap_or(snippet);
        s.strip_suffix(ELLIPSIS).unwrap_or(s)
    }

    #[test]
    fn test_case_insensitive_across_pages() {
        let d = doc(&["Neural networks are powerful.", "I love neural NETWORKS."]);
        let result = count_matches(&d, "neural network", MatchOptions::default()).unwrap();

        assert_eq!(result.count, 2);
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.matches[0].page_number, 1);
        assert_eq!(result.matches[0].count, 1);
        assert_eq!(result.matches[1].page_number, 2);
        assert_eq!(result.matches[1].count, 1);
    }

    #[test]
    fn test_case_sensitive() {
        let d = doc(&["Rust rust RUST"]);
        let options = MatchOptions {
            case_sensitive: true,
            ..Default::default()
        };
        assert_eq!(count_matches(&d, "rust", options).unwrap().count, 1);
        assert_eq!(count_matches(&d, "rust", MatchOptions::default()).unwrap().count, 3);
    }

    #[test]
    fn test_whole_word() {
        let d = doc(&["cat category catalog"]);
        let options = MatchOptions {
            whole_word: true,
            ..Default::default()
        };
        let result = count_matches(&d, "cat", options).unwrap();
        assert_eq!(result.count, 1);

        let partial = count_matches(&d, "cat", MatchOptions::default()).unwrap();
        assert_eq!(partial.count, 3);
    }

    #[test]
    fn test_no_matches() {
        let d = doc(&["alpha", "beta"]);
        let result = count_matches(&d, "gamma", MatchOptions::default()).unwrap();
        assert_eq!(result, MatchResult { count: 0, matches: vec![] });
        assert!(result.is_empty());
    }

    #[test]
    fn test_empty_document() {
        let result = count_matches(&Document::default(), "x", MatchOptions::default()).unwrap();
        assert_eq!(result.count, 0);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_empty_term_is_error() {
        let result = count_matches(&doc(&["text"]), "", MatchOptions::default());
        assert!(matches!(result, Err(ExactMatchError::EmptyTerm)));
    }

    #[test]
    fn test_special_characters_are_literal() {
        let d = doc(&["costs $5.00 (approx.) or 5x00", "a+b a+b ab"]);
        let opts = MatchOptions::default();

        assert_eq!(count_matches(&d, "$5.00", opts).unwrap().count, 1);
        assert_eq!(count_matches(&d, "(approx.)", opts).unwrap().count, 1);
        assert_eq!(count_matches(&d, "a+b", opts).unwrap().count, 2);
        assert_eq!(count_matches(&d, ".", opts).unwrap().count, 2);
    }

    #[test]
    fn test_non_overlapping_scan() {
        let d = doc(&["aaaa"]);
        let result = count_matches(&d, "aa", MatchOptions::default()).unwrap();
        assert_eq!(result.count, 2);
    }

    #[test]
    fn test_count_is_sum_of_pages() {
        let d = doc(&["x x x", "", "x", "none here", "x x"]);
        let result = count_matches(&d, "x", MatchOptions::default()).unwrap();
        let sum: usize = result.matches.iter().map(|m| m.count).sum();

        assert_eq!(result.count, sum);
        assert_eq!(result.count, 6);
        assert!(result.matches.iter().all(|m| m.count == m.snippets.len()));
    }

    #[test]
    fn test_pages_strictly_ascending() {
        let d = doc(&["term", "no", "term term", "term"]);
        let result = count_matches(&d, "term", MatchOptions::default()).unwrap();
        let pages: Vec<usize> = result.matches.iter().map(|m| m.page_number).collect();

        assert_eq!(pages, vec![1, 3, 4]);
        assert!(pages.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_idempotent() {
        let d = doc(&["Repeat repeat", "REPEAT"]);
        let first = count_matches(&d, "repeat", MatchOptions::default()).unwrap();
        let second = count_matches(&d, "repeat", MatchOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_snippets_are_substrings_of_page() {
        let long = format!("{} needle {} needle {}", "a".repeat(80), "b".repeat(30), "c".repeat(90));
        let d = doc(&[long.as_str(), "  needle  "]);
        let result = count_matches(&d, "needle", MatchOptions::default()).unwrap();

        for page_match in &result.matches {
            let page_text = d.page(page_match.page_number).unwrap().text();
            for snippet in &page_match.snippets {
                assert!(page_text.contains(strip_ellipsis(snippet)), "{:?}", snippet);
            }
        }
    }

    #[test]
    fn test_snippet_at_start_has_no_leading_ellipsis() {
        let text = format!("needle{}", "z".repeat(200));
        let d = doc(&[text.as_str()]);
        let result = count_matches(&d, "needle", MatchOptions::default()).unwrap();
        let snippet = &result.matches[0].snippets[0];

        assert!(!snippet.starts_with(ELLIPSIS));
        assert!(snippet.ends_with(ELLIPSIS));
        assert_eq!(snippet, &format!("needle{}...", "z".repeat(50)));
    }

    #[test]
    fn test_snippet_in_middle_has_both_ellipses() {
        let text = format!("{}needle{}", "a".repeat(60), "b".repeat(60));
        let d = doc(&[text.as_str()]);
        let result = count_matches(&d, "needle", MatchOptions::default()).unwrap();
        let snippet = &result.matches[0].snippets[0];

        assert_eq!(snippet, &format!("...{}needle{}...", "a".repeat(50), "b".repeat(50)));
    }

    #[test]
    fn test_short_page_snippet_is_trimmed_without_ellipsis() {
        let d = doc(&["  the needle \n"]);
        let result = count_matches(&d, "needle", MatchOptions::default()).unwrap();
        assert_eq!(result.matches[0].snippets, vec!["the needle".to_string()]);
    }

    #[test]
    fn test_snippet_window_counts_characters() {
        let text = format!("{}키워드{}", "가".repeat(55), "나".repeat(55));
        let d = doc(&[text.as_str()]);
        let result = count_matches(&d, "키워드", MatchOptions::default()).unwrap();
        let snippet = &result.matches[0].snippets[0];

        assert_eq!(snippet, &format!("...{}키워드{}...", "가".repeat(50), "나".repeat(50)));
    }

    #[test]
    fn test_custom_context_length() {
        let d = doc(&["0123456789needle9876543210"]);
        let tool = ExactMatchTool::with_context_chars(3);
        let result = tool.count_matches(&d, "needle", MatchOptions::default()).unwrap();
        assert_eq!(result.matches[0].snippets[0], "...789needle987...");
    }

    #[test]
    fn test_snippets_iterator_order() {
        let d = doc(&["one x", "two x x"]);
        let result = count_matches(&d, "x", MatchOptions::default()).unwrap();
        let pages: Vec<usize> = result.snippets().map(|(p, _)| p).collect();
        assert_eq!(pages, vec![1, 2, 2]);
    }
}
