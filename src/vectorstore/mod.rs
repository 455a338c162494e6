//! Vector Store - 인메모리 벡터 인덱스
//!
//! 청크 임베딩을 세션 동안 메모리에 보관하고,
//! 코사인 유사도 전수 비교로 유사 청크를 찾습니다. 디스크에 저장하지 않습니다.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::document::Chunk;
use crate::embedding::EmbeddingProvider;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub page_number: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub page_number: usize,
    pub text: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

/// 페이지 번호 필터
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFilter {
    /// 특정 페이지만
    Page(usize),
    /// 포함 범위 [start, end]
    Range(usize, usize),
}

impl PageFilter {
    fn accepts(&self, page_number: usize) -> bool {
        match *self {
            PageFilter::Page(p) => page_number == p,
            PageFilter::Range(start, end) => (start..=end).contains(&page_number),
        }
    }
}

// ============================================================================
// VectorStore
// ============================================================================

/// 인메모리 벡터 저장소
#[derive(Debug, Default)]
pub struct VectorStore {
    entries: Vec<VectorEntry>,
    dimension: Option<usize>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 청크를 임베딩하여 새 저장소 생성
    pub async fn from_chunks(chunks: &[Chunk], embedder: &dyn EmbeddingProvider) -> Result<Self> {
        let mut store = Self::new();
        store.add_chunks(chunks, embedder).await?;
        Ok(store)
    }

    /// 청크 임베딩 후 추가
    pub async fn add_chunks(
        &mut self,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        if chunks.is_empty() {
            tracing::warn!("No chunks to add to vector store");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed chunks")?;

        let entries = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorEntry {
                page_number: chunk.page_number,
                text: chunk.text.clone(),
                embedding,
            })
            .collect::<Vec<_>>();

        let added = self.insert_batch(entries)?;
        tracing::info!(
            "Vector store: added {} chunks via {} (total {})",
            added,
            embedder.name(),
            self.len()
        );
        Ok(added)
    }

    /// 임베딩이 계산된 엔트리 삽입
    pub fn insert_batch(&mut self, entries: Vec<VectorEntry>) -> Result<usize> {
        for entry in &entries {
            match self.dimension {
                Some(dim) if dim != entry.embedding.len() => anyhow::bail!(
                    "Embedding dimension mismatch: store has {}, entry has {}",
                    dim,
                    entry.embedding.len()
                ),
                None => self.dimension = Some(entry.embedding.len()),
                _ => {}
            }
        }

        let count = entries.len();
        self.entries.extend(entries);
        Ok(count)
    }

    /// 질의와 유사한 청크 검색
    ///
    /// 유사도 내림차순, 동점은 삽입 순서대로 정렬합니다.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&PageFilter>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<SearchResult>> {
        if self.is_empty() {
            anyhow::bail!("No vector store available");
        }

        let query_embedding = embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        Ok(self.search_by_vector(&query_embedding, k, filter))
    }

    /// 임베딩 벡터로 직접 검색
    pub fn search_by_vector(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&PageFilter>,
    ) -> Vec<SearchResult> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| filter.map_or(true, |f| f.accepts(e.page_number)))
            .map(|(i, e)| (i, cosine_similarity(query_embedding, &e.embedding)))
            .collect();

        // stable sort: 동점은 삽입 순서 유지
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, similarity)| SearchResult {
                page_number: self.entries[i].page_number,
                text: self.entries[i].text.clone(),
                similarity,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 길이가 다르거나 영벡터가 포함되면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;

    /// 키워드 포함 여부로 3차원 벡터를 만드는 테스트용 임베더
    pub(crate) struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let t = text.to_lowercase();
            Ok(vec![
                t.contains("neural") as u8 as f32,
                t.contains("cooking") as u8 as f32,
                t.contains("finance") as u8 as f32,
            ])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn chunk(page_number: usize, text: &str) -> Chunk {
        Chunk {
            page_number,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.0001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.0001);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 0.0001);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_similarity_search_ranks_relevant_chunk_first() {
        let chunks = vec![
            chunk(1, "A cooking recipe"),
            chunk(2, "Neural networks learn"),
            chunk(3, "Finance report"),
        ];
        let store = VectorStore::from_chunks(&chunks, &KeywordEmbedder).await.unwrap();

        let results = store
            .similarity_search("what do neural nets do?", 2, None, &KeywordEmbedder)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].page_number, 2);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_similarity_search_with_filter() {
        let chunks = vec![
            chunk(1, "neural one"),
            chunk(2, "neural two"),
            chunk(5, "neural five"),
        ];
        let store = VectorStore::from_chunks(&chunks, &KeywordEmbedder).await.unwrap();

        let only_five = store
            .similarity_search("neural", 4, Some(&PageFilter::Page(5)), &KeywordEmbedder)
            .await
            .unwrap();
        assert_eq!(only_five.len(), 1);
        assert_eq!(only_five[0].text, "neural five");

        let range = store
            .similarity_search("neural", 4, Some(&PageFilter::Range(1, 2)), &KeywordEmbedder)
            .await
            .unwrap();
        let pages: Vec<usize> = range.iter().map(|r| r.page_number).collect();
        assert_eq!(pages, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_store_search_is_error() {
        let store = VectorStore::new();
        let result = store
            .similarity_search("anything", 4, None, &KeywordEmbedder)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut store = VectorStore::new();
        store
            .insert_batch(vec![VectorEntry {
                page_number: 1,
                text: "a".to_string(),
                embedding: vec![1.0, 0.0],
            }])
            .unwrap();

        let result = store.insert_batch(vec![VectorEntry {
            page_number: 2,
            text: "b".to_string(),
            embedding: vec![1.0, 0.0, 0.0],
        }]);
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
    }
}
