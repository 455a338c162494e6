//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 페이지별 텍스트를 추출합니다.

use std::path::Path;

use anyhow::{Context, Result};

/// PDF 파일에서 페이지별 텍스트 추출
///
/// 페이지 텍스트 목록을 순서대로 반환합니다. 최소 한 페이지를 보장합니다.
pub fn extract_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;
    extract_pages_from_mem(&bytes).with_context(|| format!("Failed to extract text from PDF: {:?}", path))
}

/// 메모리의 PDF 바이트에서 페이지별 텍스트 추출
pub fn extract_pages_from_mem(bytes: &[u8]) -> Result<Vec<String>> {
    let text = pdf_extract::extract_text_from_mem(bytes).context("pdf-extract failed")?;

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
    }

    Ok(split_pages(&text))
}

/// 추출된 텍스트를 페이지별로 분리
///
/// pdf-extract는 페이지마다 폼피드(`\x0c`)를 붙입니다. 마지막 빈 조각만 버리고,
/// 중간의 빈 페이지는 그대로 두어 페이지 번호가 물리 페이지와 일치하게 합니다.
/// 페이지 텍스트는 손대지 않습니다.
pub(crate) fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();

    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }

    pages
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content\x0c";
        let pages = split_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[2], "Page 3 content");
    }

    #[test]
    fn test_blank_pages_keep_later_page_numbers() {
        let pages = split_pages("intro\x0c\x0cneedle on page three\x0c");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1], "");

        let document = crate::document::Document::from_texts("doc.pdf", pages);
        let result = crate::tools::count_matches(
            &document,
            "needle",
            crate::tools::MatchOptions::default(),
        )
        .unwrap();
        assert_eq!(result.matches[0].page_number, 3);
    }

    #[test]
    fn test_page_text_is_not_trimmed() {
        let pages = split_pages("  first \n\x0c\nsecond  ");
        assert_eq!(pages, vec!["  first \n".to_string(), "\nsecond  ".to_string()]);
    }

    #[test]
    fn test_heading_lines_do_not_split_pages() {
        let text = "Results table\n== 2024 ==\nneedle here";
        assert_eq!(split_pages(text), vec![text.to_string()]);
    }

    #[test]
    fn test_split_pages_no_separator() {
        let pages = split_pages("Just some text without page breaks");
        assert_eq!(pages, vec!["Just some text without page breaks".to_string()]);
    }

    #[test]
    fn test_extract_pages_rejects_non_pdf() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("not-a.pdf");
        std::fs::write(&path, b"plain text, not a pdf").unwrap();

        let result = extract_pages(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_pages_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = extract_pages(&dir.path().join("missing.pdf"))
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("Failed to read PDF"));
    }
}
