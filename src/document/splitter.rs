//! Recursive Text Splitter
//!
//! 구분자 우선순위(문단 → 줄 → 단어 → 문자)를 따라 텍스트를 재귀적으로 나누고,
//! 최대 크기 이하의 청크로 병합합니다. 길이는 문자(char) 단위로 측정합니다.

use std::collections::VecDeque;

use anyhow::Result;

/// 기본 구분자 (문단, 줄, 공백, 문자)
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

// ============================================================================
// RecursiveTextSplitter
// ============================================================================

/// 재귀적 문자 분할기
#[derive(Debug, Clone)]
pub struct RecursiveTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveTextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RecursiveTextSplitter {
    /// 청크 크기와 오버랩으로 생성 (기본 구분자 사용)
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let separators = DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect();
        Self::with_separators(chunk_size, chunk_overlap, separators)
    }

    /// 구분자까지 지정하여 생성
    pub fn with_separators(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: Vec<String>,
    ) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than 0");
        }
        if chunk_overlap >= chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// 텍스트를 청크로 분할
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // 텍스트에 존재하는 첫 번째 구분자 선택
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for piece in split_by(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                chunks.extend(self.merge_splits(&good_splits, separator));
                good_splits.clear();
            }

            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits, separator));
        }

        chunks
    }

    /// 작은 조각들을 chunk_size 이하로 병합 (앞 청크의 꼬리를 오버랩으로 유지)
    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);

                // 오버랩 크기 이하가 될 때까지 앞쪽 조각 제거
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
                }
            }

            let joiner = if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
            total += len + joiner;
        }

        push_joined(&mut docs, &current, separator);
        docs
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn push_joined(docs: &mut Vec<String>, parts: &VecDeque<&str>, separator: &str) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// 구분자로 분할 (빈 구분자는 문자 단위)
fn split_by<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|s| !s.is_empty()).collect()
    }
}

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        let splitter = RecursiveTextSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n ").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = RecursiveTextSplitter::default();
        let chunks = splitter.split_text("Neural networks are powerful.");
        assert_eq!(chunks, vec!["Neural networks are powerful.".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = RecursiveTextSplitter::new(20, 5).unwrap();
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = splitter.split_text(text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_word_split_with_overlap() {
        let splitter = RecursiveTextSplitter::new(10, 4).unwrap();
        let chunks = splitter.split_text("aaa bbb ccc ddd");
        assert_eq!(
            chunks,
            vec!["aaa bbb".to_string(), "bbb ccc".to_string(), "ccc ddd".to_string()]
        );
    }

    #[test]
    fn test_paragraphs_preferred() {
        let splitter = RecursiveTextSplitter::new(30, 0).unwrap();
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = splitter.split_text(text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "First paragraph here.");
        assert_eq!(chunks[1], "Second paragraph here.");
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let splitter = RecursiveTextSplitter::new(4, 0).unwrap();
        let chunks = splitter.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_unicode_is_measured_in_chars() {
        let splitter = RecursiveTextSplitter::new(3, 0).unwrap();
        let chunks = splitter.split_text("안녕하세요");
        assert_eq!(chunks, vec!["안녕하", "세요"]);
    }

    #[test]
    fn test_invalid_config() {
        assert!(RecursiveTextSplitter::new(0, 0).is_err());
        assert!(RecursiveTextSplitter::new(10, 10).is_err());
        assert!(RecursiveTextSplitter::new(10, 9).is_ok());
    }
}
