//! 문서 모듈
//!
//! PDF를 페이지 단위로 로드하고, 시맨틱 검색용 청크로 분할합니다.
//! - pdf: pdf-extract 기반 페이지별 텍스트 추출
//! - splitter: 재귀적 문자 분할기

pub mod pdf;
pub mod splitter;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

pub use splitter::{RecursiveTextSplitter, DEFAULT_SEPARATORS};

// ============================================================================
// Types
// ============================================================================

/// 문서의 한 페이지
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    page_number: usize,
    text: String,
}

impl Page {
    /// 페이지 번호 (1부터 시작)
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    /// 페이지 원문 텍스트
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// 로드된 문서 (읽기 전용)
///
/// 페이지 번호는 로드 시점에 1부터 연속으로 부여되며 이후 변경되지 않습니다.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Document {
    name: String,
    pages: Vec<Page>,
}

/// 시맨틱 검색용 청크 (원본 페이지 번호 유지)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub page_number: usize,
    pub text: String,
}

impl Document {
    /// 페이지 텍스트 목록으로 문서 생성
    pub fn from_texts<I, S>(name: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page {
                page_number: i + 1,
                text: text.into(),
            })
            .collect();

        Self {
            name: name.into(),
            pages,
        }
    }

    /// 문서 이름 (보통 파일명)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// 특정 페이지 조회 (1부터 시작)
    pub fn page(&self, page_number: usize) -> Result<&Page> {
        if page_number == 0 || page_number > self.pages.len() {
            anyhow::bail!("Page number {} out of range", page_number);
        }
        Ok(&self.pages[page_number - 1])
    }

    /// 전체 텍스트 크기 (바이트)
    pub fn total_bytes(&self) -> usize {
        self.pages.iter().map(|p| p.text.len()).sum()
    }

    /// 페이지별로 분할하여 청크 생성 (페이지 번호 보존)
    pub fn chunks(&self, splitter: &RecursiveTextSplitter) -> Vec<Chunk> {
        self.pages
            .iter()
            .flat_map(|page| {
                splitter
                    .split_text(&page.text)
                    .into_iter()
                    .map(move |text| Chunk {
                        page_number: page.page_number,
                        text,
                    })
            })
            .collect()
    }
}

// ============================================================================
// Loading
// ============================================================================

/// PDF 파일 로드
pub fn load_pdf(path: &Path) -> Result<Document> {
    let pages = pdf::extract_pages(path).map_err(|e| {
        tracing::error!("Error loading PDF file {:?}: {:#}", path, e);
        e
    })?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf")
        .to_string();

    let document = Document::from_texts(name, pages);
    tracing::info!(
        "Loaded PDF: {} ({} pages, {} bytes)",
        document.name(),
        document.page_count(),
        document.total_bytes()
    );

    Ok(document)
}

/// PDF 파일 비동기 로드
///
/// PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
pub async fn load_pdf_async(path: &Path) -> Result<Document> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_pdf(&path))
        .await
        .context("PDF loading task failed")?
}

// ============================================================================
// Tests
// ============================================================================
