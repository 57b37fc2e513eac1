use crate::error::{RagError, SearchError};
use crate::models::{Reply, RetrievalOptions, SearchHit, SearchScope, SearchTermRequest, TermQuery};
use crate::traits::SearchStore;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info};

pub struct RetrievalService<S> {
    store: Arc<S>,
    options: RetrievalOptions,
}

impl<S> RetrievalService<S>
where
    S: SearchStore,
{
    pub fn new(store: Arc<S>, options: RetrievalOptions) -> Self {
        Self { store, options }
    }

    pub async fn search_term(
        &self,
        request: &SearchTermRequest,
    ) -> Result<Reply<Vec<SearchHit>>, RagError> {
        let query = validate_term_request(request)?;

        let hits = timeout(self.options.timeout, self.store.search_by_term(&query))
            .await
            .map_err(|_| SearchError::Timeout("term search".to_string()))
            .and_then(|result| result)
            .map_err(|search_error| {
                error!(
                    scope = ?request.scope,
                    document_id = ?query.document_id,
                    error = %search_error,
                    "term search failed"
                );
                RagError::from(search_error)
            })?;

        info!(scope = ?request.scope, hits = hits.len(), "term search finished");

        let message = if hits.is_empty() {
            "Empty result.".to_string()
        } else {
            format!("{} record(s) found.", hits.len())
        };

        Ok(Reply::success(message, hits))
    }
}

pub fn validate_term_request(request: &SearchTermRequest) -> Result<TermQuery, RagError> {
    let term = request.term.trim();
    if term.is_empty() {
        return Err(RagError::invalid("Search term is required."));
    }

    let document_id = match (request.scope, request.document_id) {
        (SearchScope::Corpus, Some(_)) => {
            return Err(RagError::invalid(
                "A document id is not allowed when scope is 'corpus'; all documents are searched.",
            ))
        }
        (SearchScope::Corpus, None) => None,
        (SearchScope::Document, Some(id)) if id > 0 => Some(id),
        (SearchScope::Document, _) => {
            return Err(RagError::invalid(
                "A positive document id is required when scope is 'document'.",
            ))
        }
    };

    Ok(TermQuery {
        document_id,
        term: term.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{IndexablePage, SemanticQuery};
    use crate::stores::InMemorySearchStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchStore for CountingStore {
        async fn ensure_index(&self) -> Result<(), SearchError> {
            Ok(())
        }

        async fn upsert(&self, _page: &IndexablePage) -> Result<(), SearchError> {
            Ok(())
        }

        async fn search_by_term(&self, _query: &TermQuery) -> Result<Vec<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SearchError::BackendResponse {
                backend: "fake".to_string(),
                details: "500".to_string(),
            })
        }

        async fn search_by_semantic(
            &self,
            _query: &SemanticQuery,
        ) -> Result<Vec<SearchHit>, SearchError> {
            Ok(Vec::new())
        }
    }

    struct StalledStore;

    #[async_trait]
    impl SearchStore for StalledStore {
        async fn ensure_index(&self) -> Result<(), SearchError> {
            Ok(())
        }

        async fn upsert(&self, _page: &IndexablePage) -> Result<(), SearchError> {
            Ok(())
        }

        async fn search_by_term(&self, _query: &TermQuery) -> Result<Vec<SearchHit>, SearchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn search_by_semantic(
            &self,
            _query: &SemanticQuery,
        ) -> Result<Vec<SearchHit>, SearchError> {
            Ok(Vec::new())
        }
    }

    fn request(scope: SearchScope, term: &str, document_id: Option<i64>) -> SearchTermRequest {
        SearchTermRequest {
            scope,
            term: term.to_string(),
            document_id,
        }
    }

    #[tokio::test]
    async fn empty_term_is_rejected_before_the_store_is_called() {
        let store = Arc::new(CountingStore::default());
        let service = RetrievalService::new(store.clone(), RetrievalOptions::default());

        let result = service.search_term(&request(SearchScope::Corpus, "   ", None)).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidRequest);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn scope_and_document_id_must_agree() {
        let corpus_with_id = validate_term_request(&request(SearchScope::Corpus, "x", Some(4)));
        assert!(matches!(corpus_with_id, Err(RagError::InvalidRequest(_))));

        let document_without_id = validate_term_request(&request(SearchScope::Document, "x", None));
        assert!(matches!(document_without_id, Err(RagError::InvalidRequest(_))));

        let non_positive = validate_term_request(&request(SearchScope::Document, "x", Some(0)));
        assert!(matches!(non_positive, Err(RagError::InvalidRequest(_))));

        let scoped = validate_term_request(&request(SearchScope::Document, " x ", Some(4))).unwrap();
        assert_eq!(scoped.document_id, Some(4));
        assert_eq!(scoped.term, "x");
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_provider_error() {
        let service = RetrievalService::new(Arc::new(CountingStore::default()), RetrievalOptions::default());

        let result = service.search_term(&request(SearchScope::Corpus, "agile", None)).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::ProviderUnavailable);
    }

    #[tokio::test]
    async fn corpus_search_reports_record_count() {
        let store = Arc::new(InMemorySearchStore::new(1));
        store
            .upsert(&IndexablePage {
                document_id: 1,
                document_name: "process.pdf".to_string(),
                page_number: 1,
                content: "...we follow an agile process...".to_string(),
                embedding: vec![1.0],
            })
            .await
            .unwrap();
        let service = RetrievalService::new(store, RetrievalOptions::default());

        let found = service
            .search_term(&request(SearchScope::Corpus, "agile", None))
            .await
            .unwrap();
        assert_eq!(found.message, "1 record(s) found.");
        assert_eq!(found.result.as_ref().map(Vec::len), Some(1));
        let hits = found.result.unwrap_or_default();
        assert!(hits[0].content.contains("<em>agile</em>"));

        let missing = service
            .search_term(&request(SearchScope::Corpus, "kanban", None))
            .await
            .unwrap();
        assert_eq!(missing.message, "Empty result.");
        assert!(missing.success);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out_instead_of_returning_empty() {
        let options = RetrievalOptions {
            timeout: Duration::from_secs(2),
        };
        let service = RetrievalService::new(Arc::new(StalledStore), options);

        let result = service.search_term(&request(SearchScope::Corpus, "agile", None)).await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ProviderUnavailable);
        assert!(matches!(error, RagError::Search(SearchError::Timeout(_))));
    }
}
