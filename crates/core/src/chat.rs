use crate::embeddings::EmbeddingProvider;
use crate::error::{ProviderError, RagError};
use crate::models::{ChatAnswer, ChatOptions, ChatRequest, SemanticQuery};
use crate::prompt::{compose_turns, PreviousExchange, NOTHING_TO_SAY};
use crate::traits::{GenerationProvider, SearchStore};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info};

pub const CHAT_FAILURE_MESSAGE: &str = "An error occurred while generating the chat response.";

/// Outcome of a chat call; `generated` is false when the model returned no text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub answer: ChatAnswer,
    pub generated: bool,
}

pub struct ChatOrchestrator<E, G, S> {
    embedder: Arc<E>,
    generator: Arc<G>,
    store: Arc<S>,
    options: ChatOptions,
}

impl<E, G, S> ChatOrchestrator<E, G, S>
where
    E: EmbeddingProvider,
    G: GenerationProvider,
    S: SearchStore,
{
    pub fn new(embedder: Arc<E>, generator: Arc<G>, store: Arc<S>, options: ChatOptions) -> Self {
        Self {
            embedder,
            generator,
            store,
            options,
        }
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome, RagError> {
        if request.question.trim().is_empty() {
            return Err(RagError::invalid("Your question is required for chatting."));
        }
        if request.document_id <= 0 {
            return Err(RagError::invalid("Document id is required."));
        }

        match timeout(self.options.timeout, self.answer(request)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err((stage, cause))) => {
                error!(document_id = request.document_id, stage, error = %cause, "chat request failed");
                Err(RagError::Internal(CHAT_FAILURE_MESSAGE.to_string()))
            }
            Err(_) => {
                error!(document_id = request.document_id, stage = "timeout", "chat request timed out");
                Err(RagError::Internal(CHAT_FAILURE_MESSAGE.to_string()))
            }
        }
    }

    async fn answer(&self, request: &ChatRequest) -> Result<ChatOutcome, (&'static str, RagError)> {
        let embedding = self
            .embedder
            .embed(&request.question)
            .await
            .map_err(|error| ("embed", RagError::from(error)))?;

        let mut fragments = self
            .store
            .search_by_semantic(&SemanticQuery {
                document_id: request.document_id,
                embedding,
            })
            .await
            .map_err(|error| ("retrieve", RagError::from(error)))?;
        fragments.truncate(self.options.max_fragments);

        let previous = PreviousExchange::from_parts(
            request.previous_question.as_deref(),
            request.previous_response.as_deref(),
        );
        let turns = compose_turns(&fragments, &request.question, previous);

        let generated = self
            .generator
            .generate(&turns)
            .await
            .map_err(|error: ProviderError| ("generate", RagError::from(error)))?
            .filter(|text| !text.trim().is_empty());

        info!(
            document_id = request.document_id,
            fragments = fragments.len(),
            generated = generated.is_some(),
            "chat answer composed"
        );

        Ok(ChatOutcome {
            generated: generated.is_some(),
            answer: ChatAnswer {
                document_id: request.document_id,
                answer_lines: vec![generated.unwrap_or_else(|| NOTHING_TO_SAY.to_string())],
                cited_pages: fragments,
            },
        })
    }
}
