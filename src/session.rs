//! Chat Session - 호출자가 소유하는 대화 기록
//!
//! 라우터는 상태를 갖지 않으므로, 대화 화면에 보여줄 질문/답변과
//! 근거 출처는 이 세션에 누적합니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::llm::Role;
use crate::router::{QueryOutcome, QueryResult};

/// 출처 스니펫 최대 길이 (문자)
const SOURCE_SNIPPET_CHARS: usize = 200;

/// 답변 근거 출처
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub page_number: usize,
    pub snippet: String,
}

/// 세션 메시지
#[derive(Debug, Clone, Serialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub sources: Vec<SourceRef>,
    pub timestamp: DateTime<Utc>,
}

impl SessionMessage {
    fn new(role: Role, content: impl Into<String>, sources: Vec<SourceRef>) -> Self {
        Self {
            role,
            content: content.into(),
            sources,
            timestamp: Utc::now(),
        }
    }
}

/// 대화 세션
#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    id: Uuid,
    document_name: String,
    model: String,
    messages: Vec<SessionMessage>,
}

impl ChatSession {
    pub fn new(document_name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_name: document_name.into(),
            model: model.into(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 질문과 처리 결과를 기록
    pub fn record_query(&mut self, question: &str, result: &QueryResult) {
        self.messages
            .push(SessionMessage::new(Role::User, question, Vec::new()));

        let assistant = match &result.result {
            QueryOutcome::ExactMatch(matches) => {
                let sources = matches
                    .snippets()
                    .map(|(page_number, snippet)| SourceRef {
                        page_number,
                        snippet: snippet.to_string(),
                    })
                    .collect();
                SessionMessage::new(
                    Role::Assistant,
                    format!("Found {} matches", matches.count),
                    sources,
                )
            }
            QueryOutcome::SemanticQa(qa) => {
                let sources = qa
                    .sources
                    .iter()
                    .map(|s| SourceRef {
                        page_number: s.page_number,
                        snippet: s.text.chars().take(SOURCE_SNIPPET_CHARS).collect(),
                    })
                    .collect();
                SessionMessage::new(Role::Assistant, qa.answer.clone(), sources)
            }
        };

        self.messages.push(assistant);
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
