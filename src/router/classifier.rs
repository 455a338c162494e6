//! Classifier - LLM 기반 라우팅 분류 및 검색어 추출
//!
//! 패턴 규칙으로 결정되지 않은 질문에 대해 언어 모델에 모드 라벨을 묻고,
//! 따옴표가 없는 질문에서 검색할 핵심 구절을 추출합니다.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::llm::{ChatMessage, LanguageModel};

const ROUTING_PROMPT: &str = r#"You are a query routing agent that determines whether a user's question requires exact text matching or semantic question answering.

Question: {question}

Determine if this question requires:
1. EXACT_MATCH - for questions about:
   - Counting occurrences (e.g., "how many times", "count of", "number of occurrences")
   - Finding specific phrases (e.g., "find the exact phrase", "where does X appear")
   - Checking presence (e.g., "does X appear", "is X mentioned", "occurs", "appears")
   - Frequency analysis (e.g., "how frequently", "how often")

2. SEMANTIC_QA - for questions requiring:
   - Understanding and explanation
   - Summarization or analysis
   - Complex reasoning
   - Multiple document context
   - Answering "why" or "how" questions (unless specifically counting)

Examples:
- "How many times is 'neural network' mentioned?" -> EXACT_MATCH
- "Where does the phrase 'machine learning' appear?" -> EXACT_MATCH
- "Count the occurrences of 'AI' in the document" -> EXACT_MATCH
- "What are the main benefits of AI?" -> SEMANTIC_QA
- "Explain how neural networks work" -> SEMANTIC_QA

Output only one word: EXACT_MATCH or SEMANTIC_QA"#;

const EXTRACTION_PROMPT: &str = r#"Extract the exact text or phrase to search for from this question.
Look for text in quotes first, if not found, identify the key phrase to search for.
Output only the text to search for, nothing else.

Examples:
- Question: "How many times does 'neural network' appear?"
  Output: neural network
- Question: "Count occurrences of artificial intelligence in the text"
  Output: artificial intelligence
- Question: "Find all mentions of 'deep learning' in the document"
  Output: deep learning

Question: {question}"#;

// ============================================================================
// Classifier Trait
// ============================================================================

/// 라우팅 분류 협력자
///
/// 두 호출은 서로 상태를 공유하지 않습니다.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 질문의 모드 라벨 (`EXACT_MATCH` 또는 `SEMANTIC_QA`)
    async fn classify_mode(&self, question: &str) -> Result<String>;

    /// 질문에서 검색할 구절 추출
    async fn extract_term(&self, question: &str) -> Result<String>;
}

// ============================================================================
// LlmClassifier
// ============================================================================

/// 언어 모델을 사용하는 분류기
pub struct LlmClassifier {
    llm: Arc<dyn LanguageModel>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    async fn ask(&self, template: &str, question: &str) -> Result<String> {
        let prompt = template.replace("{question}", question);
        let response = self.llm.complete(&[ChatMessage::user(prompt)]).await?;
        Ok(response.trim().to_string())
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify_mode(&self, question: &str) -> Result<String> {
        self.ask(ROUTING_PROMPT, question).await
    }

    async fn extract_term(&self, question: &str) -> Result<String> {
        self.ask(EXTRACTION_PROMPT, question).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            Ok(self.reply.clone())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn scripted(reply: &str) -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_classify_mode_trims_response() {
        let model = scripted("  SEMANTIC_QA\n");
        let classifier = LlmClassifier::new(model.clone());

        let label = classifier.classify_mode("Explain transformers").await.unwrap();

        assert_eq!(label, "SEMANTIC_QA");
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Question: Explain transformers"));
        assert!(prompts[0].contains("Output only one word"));
    }

    #[tokio::test]
    async fn test_extract_term_uses_extraction_prompt() {
        let model = scripted("artificial intelligence");
        let classifier = LlmClassifier::new(model.clone());

        let term = classifier
            .extract_term("Count occurrences of artificial intelligence")
            .await
            .unwrap();

        assert_eq!(term, "artificial intelligence");
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Extract the exact text"));
    }
}
