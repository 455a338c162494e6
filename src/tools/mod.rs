//! 질의 처리 도구
//!
//! - exact_match: 리터럴 검색어 카운팅 + 문맥 스니펫
//! - semantic_qa: 벡터 검색 + LLM 답변 생성

pub mod exact_match;
pub mod semantic_qa;

pub use exact_match::{
    count_matches, ExactMatchError, ExactMatchTool, MatchOptions, MatchResult, PageMatch,
};
pub use semantic_qa::{
    ConversationMemory, QaResult, SemanticAnswerer, SemanticQaTool, SourceChunk,
};
