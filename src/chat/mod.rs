//! Generation side of the pipeline: retrieve excerpts, compose the
//! prompt, call the model.

pub mod prompt;

pub use prompt::PromptMode;

use std::sync::Arc;

use crate::core::config::{AppConfig, ChatSettings, RagSettings};
use crate::core::errors::ApiError;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest};
use crate::rag::VectorIndex;

/// What the doctor sees when any pipeline step fails. The real error is
/// logged server-side only.
pub const FALLBACK_MESSAGE: &str =
    "Sorry, something went wrong while answering your question. Please try again.";

pub struct ChatEngine {
    provider: Arc<dyn LlmProvider>,
    index: Arc<VectorIndex>,
    chat: ChatSettings,
    rag: RagSettings,
}

impl ChatEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, index: Arc<VectorIndex>, config: &AppConfig) -> Self {
        Self {
            provider,
            index,
            chat: config.chat.clone(),
            rag: config.rag.clone(),
        }
    }

    /// Answer a query against the reference index. Never fails from the
    /// caller's point of view: any embedding, index or model error is
    /// swallowed into the fixed fallback message.
    pub async fn answer(
        &self,
        query: &str,
        history: &[ChatMessage],
        mode: PromptMode,
    ) -> String {
        match self.try_answer(query, history, mode).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!("Chat pipeline failed: {}", err);
                FALLBACK_MESSAGE.to_string()
            }
        }
    }

    async fn try_answer(
        &self,
        query: &str,
        history: &[ChatMessage],
        mode: PromptMode,
    ) -> Result<String, ApiError> {
        let embeddings = self
            .provider
            .embed(&[query.to_string()], &self.rag.embedding_model)
            .await?;
        let query_embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("Empty embedding response".to_string()))?;

        let excerpts = self.index.search(&query_embedding, self.rag.top_k).await?;
        let context = prompt::format_excerpts(&excerpts, self.rag.max_context_chars);
        let messages = prompt::build_messages(mode, &context, history, query);

        let request = ChatRequest::new(messages).with_temperature(self.chat.temperature);
        self.provider.chat(request, &self.chat.model).await
    }
}
