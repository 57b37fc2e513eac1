use crate::error::{ProviderError, SearchError};
use crate::models::{ChatTurn, IndexablePage, SearchHit, SemanticQuery, TermQuery};
use async_trait::async_trait;

/// Hybrid term/vector index holding one record per document page.
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Creates the index with its dense-vector mapping when it does not exist yet.
    /// Must treat an index that already exists as success.
    async fn ensure_index(&self) -> Result<(), SearchError>;

    /// Writes the page under its `(document, page)` key, replacing any previous copy.
    async fn upsert(&self, page: &IndexablePage) -> Result<(), SearchError>;

    async fn search_by_term(&self, query: &TermQuery) -> Result<Vec<SearchHit>, SearchError>;

    /// Pages of one document ranked by `cosine + 1.0`, best first.
    async fn search_by_semantic(
        &self,
        query: &SemanticQuery,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns `None` when the model produced no text.
    async fn generate(&self, turns: &[ChatTurn]) -> Result<Option<String>, ProviderError>;
}
