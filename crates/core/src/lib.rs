pub mod chat;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod service;
pub mod stores;
pub mod suggestions;
pub mod traits;

pub use chat::{ChatOrchestrator, ChatOutcome};
pub use embeddings::{
    known_embedding_dimensions, CharacterNgramEmbedder, EmbeddingProvider,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ErrorKind, ExtractError, ProviderError, RagError, SearchError};
pub use extractor::{decode_base64_document, number_pages, LopdfExtractor, TextExtractor};
pub use ingest::IngestionPipeline;
pub use models::{
    ChatAnswer, ChatOptions, ChatRequest, ChatRole, ChatTurn, HighlightOptions, IndexablePage,
    IngestionOptions, IngestionReport, PageFailure, Reply, RetrievalOptions, SearchHit,
    SearchScope, SearchTermRequest, SemanticQuery, SourcePage, TermQuery, TitleSuggestion,
};
pub use providers::{OpenAiChatClient, OpenAiConfig, OpenAiEmbedder};
pub use retrieval::RetrievalService;
pub use service::{DocumentService, ServiceOptions};
pub use stores::{ElasticsearchConfig, ElasticsearchStore, InMemorySearchStore};
pub use suggestions::SuggestionService;
pub use traits::{GenerationProvider, SearchStore};
