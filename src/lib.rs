//! pdf-qa - PDF 문서 질의응답
//!
//! 질문을 정확 일치 카운팅 또는 검색 증강 시맨틱 QA로 라우팅합니다.
//! 카운팅은 LLM 없이 결정적으로 계산되고, 시맨틱 QA는 인메모리 벡터
//! 검색과 언어 모델(OpenAI 또는 Ollama)을 사용합니다.

pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod http;
pub mod llm;
pub mod router;
pub mod session;
pub mod tools;
pub mod vectorstore;

// Re-exports
pub use config::{get_api_key, has_api_key, AppConfig};
pub use document::{load_pdf, load_pdf_async, Chunk, Document, Page, RecursiveTextSplitter};
pub use embedding::{create_embedder, EmbeddingProvider, OpenAiEmbedding};
pub use llm::{create_llm, ChatMessage, LanguageModel, Role, TokenCallback};
pub use router::{
    Classifier, LlmClassifier, QueryMode, QueryOutcome, QueryResult, QueryRouter, RoutingDecision,
};
pub use session::{ChatSession, SessionMessage, SourceRef};
pub use tools::{
    count_matches, ExactMatchError, ExactMatchTool, MatchOptions, MatchResult, PageMatch,
    QaResult, SemanticAnswerer, SemanticQaTool, SourceChunk,
};
pub use vectorstore::{PageFilter, SearchResult, VectorStore};
