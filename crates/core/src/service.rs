use crate::chat::ChatOrchestrator;
use crate::embeddings::EmbeddingProvider;
use crate::error::{ErrorKind, RagError};
use crate::extractor::{number_pages, TextExtractor};
use crate::ingest::IngestionPipeline;
use crate::models::{
    ChatAnswer, ChatOptions, ChatRequest, IngestionOptions, IngestionReport, Reply,
    RetrievalOptions, SearchHit, SearchTermRequest, TitleSuggestion,
};
use crate::retrieval::RetrievalService;
use crate::suggestions::SuggestionService;
use crate::traits::{GenerationProvider, SearchStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub ingestion: IngestionOptions,
    pub retrieval: RetrievalOptions,
    pub chat: ChatOptions,
    pub suggestion_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            ingestion: IngestionOptions::default(),
            retrieval: RetrievalOptions::default(),
            chat: ChatOptions::default(),
            suggestion_timeout: Duration::from_secs(60),
        }
    }
}

/// Operations the document flows call into. Every method answers with a [`Reply`].
pub struct DocumentService<X, E, G, S> {
    extractor: Arc<X>,
    pipeline: IngestionPipeline<E, S>,
    retrieval: RetrievalService<S>,
    chat: ChatOrchestrator<E, G, S>,
    suggestions: SuggestionService<G>,
}

impl<X, E, G, S> DocumentService<X, E, G, S>
where
    X: TextExtractor,
    E: EmbeddingProvider,
    G: GenerationProvider,
    S: SearchStore,
{
    pub fn new(
        extractor: Arc<X>,
        embedder: Arc<E>,
        generator: Arc<G>,
        store: Arc<S>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            extractor,
            pipeline: IngestionPipeline::new(embedder.clone(), store.clone(), options.ingestion),
            retrieval: RetrievalService::new(store.clone(), options.retrieval),
            chat: ChatOrchestrator::new(embedder, generator.clone(), store, options.chat),
            suggestions: SuggestionService::new(generator, options.suggestion_timeout),
        }
    }

    pub fn extract_document_text(&self, raw: &[u8]) -> Reply<Vec<String>> {
        match self.extractor.extract_pages(raw) {
            Ok(pages) => Reply::success(format!("{} page(s) extracted.", pages.len()), pages),
            Err(error) => {
                warn!(stage = "extract", error = %error, "document text extraction failed");
                failure(RagError::from(error))
            }
        }
    }

    pub async fn index_document_pages(
        &self,
        document_id: i64,
        document_name: &str,
        pages: &[String],
    ) -> Reply<IngestionReport> {
        if document_id <= 0 {
            return failure(RagError::invalid("Document id is required."));
        }

        let pages = number_pages(pages.to_vec());
        let report = self.pipeline.ingest(document_id, document_name, &pages).await;
        let message = format!("Indexed {} of {} page(s).", report.succeeded, report.total);

        if report.is_complete() {
            Reply::success(message, report)
        } else {
            let kind = dominant_failure_kind(&report);
            Reply::partial(kind, message, report)
        }
    }

    pub async fn search_term(&self, request: &SearchTermRequest) -> Reply<Vec<SearchHit>> {
        match self.retrieval.search_term(request).await {
            Ok(reply) => reply,
            Err(error) => failure(error),
        }
    }

    pub async fn chat_with_document(&self, request: &ChatRequest) -> Reply<ChatAnswer> {
        match self.chat.chat(request).await {
            Ok(outcome) if outcome.generated => {
                Reply::success("Response got successfully.", outcome.answer)
            }
            Ok(outcome) => Reply::partial(
                ErrorKind::ProviderUnavailable,
                "Found error to get text.",
                outcome.answer,
            ),
            Err(error) => failure(error),
        }
    }

    pub async fn suggest_titles(
        &self,
        file_name: &str,
        content_sample: &str,
    ) -> Reply<Vec<TitleSuggestion>> {
        match self.suggestions.suggest(file_name, content_sample).await {
            Ok(suggestions) => Reply::success("Response got successfully.", suggestions),
            Err(error) => failure(error),
        }
    }
}

fn failure<T>(error: RagError) -> Reply<T> {
    Reply::failure(error.kind(), error.user_message())
}

fn dominant_failure_kind(report: &IngestionReport) -> ErrorKind {
    if report
        .failed
        .iter()
        .any(|failure| failure.kind == ErrorKind::IndexUnavailable)
    {
        ErrorKind::IndexUnavailable
    } else {
        report
            .failed
            .first()
            .map(|failure| failure.kind)
            .unwrap_or(ErrorKind::Internal)
    }
}
