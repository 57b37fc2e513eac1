use crate::embeddings::EmbeddingProvider;
use crate::error::{ErrorKind, RagError, SearchError};
use crate::models::{IndexablePage, IngestionOptions, IngestionReport, PageFailure, SourcePage};
use crate::traits::SearchStore;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Embeds each page and upserts it into the search store, one failure per page at most.
pub struct IngestionPipeline<E, S> {
    embedder: Arc<E>,
    store: Arc<S>,
    options: IngestionOptions,
}

impl<E, S> IngestionPipeline<E, S>
where
    E: EmbeddingProvider,
    S: SearchStore,
{
    pub fn new(embedder: Arc<E>, store: Arc<S>, options: IngestionOptions) -> Self {
        Self {
            embedder,
            store,
            options,
        }
    }

    pub async fn ingest(
        &self,
        document_id: i64,
        document_name: &str,
        pages: &[SourcePage],
    ) -> IngestionReport {
        let total = pages.len();
        info!(document_id, pages = total, "indexing document pages");

        if total == 0 {
            return IngestionReport {
                document_id,
                total,
                succeeded: 0,
                failed: Vec::new(),
            };
        }

        if let Err(provision_error) = self.store.ensure_index().await {
            error!(document_id, stage = "provision", error = %provision_error, "search index unavailable");
            let failed = pages
                .iter()
                .map(|page| PageFailure {
                    page_number: page.ordinal,
                    kind: ErrorKind::IndexUnavailable,
                    reason: provision_error.to_string(),
                })
                .collect();
            return IngestionReport {
                document_id,
                total,
                succeeded: 0,
                failed,
            };
        }

        let outcomes: Vec<Result<u32, PageFailure>> = stream::iter(pages)
            .map(|page| self.index_page(document_id, document_name, page.ordinal, &page.text))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut succeeded = 0;
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(_) => succeeded += 1,
                Err(failure) => failed.push(failure),
            }
        }
        failed.sort_by_key(|failure| failure.page_number);

        info!(
            document_id,
            pages = total,
            succeeded,
            failed = failed.len(),
            "document indexing finished"
        );

        IngestionReport {
            document_id,
            total,
            succeeded,
            failed,
        }
    }

    async fn index_page(
        &self,
        document_id: i64,
        document_name: &str,
        page_number: u32,
        text: &str,
    ) -> Result<u32, PageFailure> {
        let attempt = self.embed_and_upsert(document_id, document_name, page_number, text);

        let (stage, failure) = match timeout(self.options.page_timeout, attempt).await {
            Ok(Ok(())) => return Ok(page_number),
            Ok(Err((stage, error))) => (
                stage,
                PageFailure {
                    page_number,
                    kind: error.kind(),
                    reason: error.to_string(),
                },
            ),
            Err(_) => (
                "timeout",
                PageFailure {
                    page_number,
                    kind: ErrorKind::ProviderUnavailable,
                    reason: format!(
                        "page timed out after {}s",
                        self.options.page_timeout.as_secs_f32()
                    ),
                },
            ),
        };

        warn!(document_id, page_number, stage, reason = %failure.reason, "page was not indexed");
        Err(failure)
    }

    async fn embed_and_upsert(
        &self,
        document_id: i64,
        document_name: &str,
        page_number: u32,
        text: &str,
    ) -> Result<(), (&'static str, RagError)> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|error| ("embed", RagError::from(error)))?;

        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err((
                "upsert",
                SearchError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                }
                .into(),
            ));
        }

        let page = IndexablePage {
            document_id,
            document_name: document_name.to_string(),
            page_number,
            content: text.to_string(),
            embedding,
        };

        self.store
            .upsert(&page)
            .await
            .map_err(|error| ("upsert", RagError::from(error)))
    }
}
