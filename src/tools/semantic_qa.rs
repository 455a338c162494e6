//! Semantic QA 도구 - 검색 증강 질의응답
//!
//! 벡터 저장소에서 관련 청크를 찾고, 대화 기록과 함께
//! 언어 모델에 전달하여 답변을 생성합니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::document::{Document, RecursiveTextSplitter};
use crate::embedding::EmbeddingProvider;
use crate::llm::{ChatMessage, LanguageModel, Role, TokenCallback};
use crate::vectorstore::{SearchResult, VectorStore};

/// 기본 검색 청크 수
pub const DEFAULT_TOP_K: usize = 4;

const QA_INSTRUCTIONS: &str = "You are a helpful AI assistant that answers questions about PDF documents.
Use the following pieces of context to answer the question at the end.
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

// ============================================================================
// Types
// ============================================================================

/// 답변 근거가 된 청크
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceChunk {
    pub page_number: usize,
    pub text: String,
}

impl From<SearchResult> for SourceChunk {
    fn from(result: SearchResult) -> Self {
        Self {
            page_number: result.page_number,
            text: result.text,
        }
    }
}

/// 시맨틱 QA 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaResult {
    pub answer: String,
    /// 검색 순위 순서의 근거 청크
    pub sources: Vec<SourceChunk>,
}

// ============================================================================
// SemanticAnswerer Trait
// ============================================================================

/// 시맨틱 QA 협력자 트레이트
#[async_trait]
pub trait SemanticAnswerer: Send + Sync {
    /// 질문에 답변 (on_token이 있으면 스트리밍)
    async fn ask(&self, question: &str, on_token: Option<TokenCallback<'_>>) -> Result<QaResult>;

    /// 대화 기록 초기화
    async fn clear_memory(&self) {}

    /// 대화 기록 조회
    async fn chat_history(&self) -> Vec<ChatMessage> {
        Vec::new()
    }
}

// ============================================================================
// ConversationMemory
// ============================================================================

/// 대화 버퍼 메모리
#[derive(Debug, Default, Clone)]
pub struct ConversationMemory {
    messages: Vec<ChatMessage>,
}

impl ConversationMemory {
    /// 질문/답변 한 쌍 저장
    pub fn save_context(&mut self, question: &str, answer: &str) {
        self.messages.push(ChatMessage::user(question));
        self.messages.push(ChatMessage::assistant(answer));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// 프롬프트용 텍스트로 변환
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| match m.role {
                Role::User => format!("Human: {}", m.content),
                Role::Assistant => format!("Assistant: {}", m.content),
                Role::System => format!("System: {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// SemanticQaTool
// ============================================================================

/// 시맨틱 QA 도구
pub struct SemanticQaTool {
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
    top_k: usize,
    memory: Mutex<ConversationMemory>,
}

impl SemanticQaTool {
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            top_k: DEFAULT_TOP_K,
            memory: Mutex::new(ConversationMemory::default()),
        }
    }

    /// 검색 청크 수 지정
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// 문서를 청킹/임베딩하여 도구 생성
    pub async fn from_document(
        document: &Document,
        splitter: &RecursiveTextSplitter,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let chunks = document.chunks(splitter);
        let store = VectorStore::from_chunks(&chunks, embedder.as_ref())
            .await
            .context("Failed to create vector store")?;

        tracing::info!(
            "Indexed {} chunks from {} ({} pages)",
            chunks.len(),
            document.name(),
            document.page_count()
        );

        Ok(Self::new(store, embedder, llm))
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    async fn answer(&self, question: &str, on_token: Option<TokenCallback<'_>>) -> Result<QaResult> {
        let results = self
            .store
            .similarity_search(question, self.top_k, None, self.embedder.as_ref())
            .await?;

        let history = self.memory.lock().await.render();
        let prompt = build_prompt(&results, &history, question);
        let messages = [ChatMessage::user(prompt)];

        let answer = match on_token {
            Some(callback) => self.llm.stream(&messages, callback).await?,
            None => self.llm.complete(&messages).await?,
        };

        self.memory.lock().await.save_context(question, &answer);

        Ok(QaResult {
            answer,
            sources: results.into_iter().map(SourceChunk::from).collect(),
        })
    }
}

#[async_trait]
impl SemanticAnswerer for SemanticQaTool {
    async fn ask(&self, question: &str, on_token: Option<TokenCallback<'_>>) -> Result<QaResult> {
        self.answer(question, on_token).await.map_err(|e| {
            tracing::error!("Error in semantic QA: {:#}", e);
            e
        })
    }

    async fn clear_memory(&self) {
        self.memory.lock().await.clear();
    }

    async fn chat_history(&self) -> Vec<ChatMessage> {
        self.memory.lock().await.messages().to_vec()
    }
}

/// QA 프롬프트 구성
fn build_prompt(results: &[SearchResult], history: &str, question: &str) -> String {
    let context = results
        .iter()
        .map(|r| format!("[Page {}]\n{}", r.page_number, r.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\nContext:\n{}\n\nChat History:\n{}\n\nHuman: {}\nAssistant: Let me help you with that.",
        QA_INSTRUCTIONS, context, history, question
    )
}

// ============================================================================
// Tests
// ============================================================================
