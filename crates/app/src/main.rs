use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use docrag_core::{
    decode_base64_document, known_embedding_dimensions, CharacterNgramEmbedder, ChatOptions,
    ChatRequest, DocumentService, ElasticsearchConfig, ElasticsearchStore, EmbeddingProvider,
    HighlightOptions, InMemorySearchStore, IngestionOptions, LopdfExtractor, OpenAiChatClient,
    OpenAiConfig, OpenAiEmbedder, RetrievalOptions, SearchScope, SearchStore, SearchTermRequest,
    ServiceOptions, DEFAULT_EMBEDDING_DIMENSIONS,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docrag", version, about = "Index PDF documents and chat with them")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    Elasticsearch,
    /// Process-local store; contents live only for the current invocation.
    Memory,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    Openai,
    /// Hashed character trigrams, no network.
    Ngram,
}

#[derive(Args)]
struct Settings {
    /// Search backend
    #[arg(long, global = true, value_enum, default_value = "elasticsearch")]
    store: StoreKind,

    /// Embedding backend
    #[arg(long, global = true, value_enum, default_value = "openai")]
    embedder: EmbedderKind,

    /// Elasticsearch base URL
    #[arg(long, global = true, env = "ELASTICSEARCH_URL", default_value = "http://localhost:9200")]
    elasticsearch_url: String,

    /// Elasticsearch index holding one entry per page
    #[arg(long, global = true, env = "ELASTICSEARCH_INDEX_NAME", default_value = "document_pages")]
    elasticsearch_index: String,

    #[arg(long, global = true, env = "ELASTICSEARCH_USER")]
    elasticsearch_user: Option<String>,

    #[arg(long, global = true, env = "ELASTICSEARCH_PASSWORD", hide_env_values = true)]
    elasticsearch_password: Option<String>,

    /// Takes precedence over user/password
    #[arg(long, global = true, env = "ELASTICSEARCH_API_KEY", hide_env_values = true)]
    elasticsearch_api_key: Option<String>,

    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    openai_api_key: String,

    #[arg(long, global = true, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    #[arg(long, global = true, env = "OPENAI_CHAT_MODEL", default_value = "gpt-4-turbo")]
    openai_chat_model: String,

    #[arg(long, global = true, env = "OPENAI_EMBEDDING_MODEL", default_value = "text-embedding-ada-002")]
    openai_embedding_model: String,

    /// Defaults to the known size of the embedding model
    #[arg(long, global = true, env = "EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    #[arg(long, global = true, env = "OPENAI_MAX_TOKENS", default_value = "1000")]
    openai_max_tokens: u32,

    #[arg(long, global = true, env = "OPENAI_CHAT_TEMPERATURE", default_value = "0.7")]
    openai_chat_temperature: f32,

    /// Per-request timeout for every external call
    #[arg(long, global = true, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,

    #[arg(long, global = true, env = "HIGHLIGHT_FRAGMENT_SIZE", default_value = "350")]
    highlight_fragment_size: usize,

    #[arg(long, global = true, env = "HIGHLIGHT_FRAGMENTS", default_value = "3")]
    highlight_fragments: usize,

    /// Pages embedded and indexed at once
    #[arg(long, global = true, env = "INGEST_CONCURRENCY", default_value = "4")]
    ingest_concurrency: usize,

    #[arg(long, global = true, env = "CHAT_MAX_FRAGMENTS", default_value = "5")]
    chat_max_fragments: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Extract per-page text from a PDF.
    Extract {
        #[arg(long)]
        file: String,
        /// The file holds a base64 payload instead of raw PDF bytes.
        #[arg(long, default_value_t = false)]
        base64: bool,
    },
    /// Extract a PDF and index every page.
    Ingest {
        #[arg(long)]
        file: String,
        #[arg(long)]
        document_id: i64,
        /// Display name stored with each page; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = false)]
        base64: bool,
    },
    /// Find pages containing a term.
    Search {
        #[arg(long)]
        term: String,
        /// corpus or document
        #[arg(long, default_value = "corpus")]
        scope: SearchScope,
        #[arg(long)]
        document_id: Option<i64>,
    },
    /// Ask a question about one document.
    Chat {
        #[arg(long)]
        document_id: i64,
        #[arg(long)]
        question: String,
        #[arg(long)]
        previous_question: Option<String>,
        #[arg(long)]
        previous_response: Option<String>,
    },
    /// Suggest titles and descriptions for an uploaded file.
    Suggest {
        #[arg(long)]
        file_name: String,
        #[arg(long)]
        sample: String,
    },
}

impl Settings {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn openai(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            chat_model: self.openai_chat_model.clone(),
            embedding_model: self.openai_embedding_model.clone(),
            temperature: self.openai_chat_temperature,
            max_tokens: self.openai_max_tokens,
            timeout: self.timeout(),
        }
    }

    fn highlight(&self) -> HighlightOptions {
        HighlightOptions {
            fragment_size: self.highlight_fragment_size,
            number_of_fragments: self.highlight_fragments,
            ..HighlightOptions::default()
        }
    }

    fn dimensions(&self) -> anyhow::Result<usize> {
        if let Some(dimensions) = self.embedding_dimensions {
            return Ok(dimensions);
        }
        match self.embedder {
            EmbedderKind::Ngram => Ok(DEFAULT_EMBEDDING_DIMENSIONS),
            EmbedderKind::Openai => known_embedding_dimensions(&self.openai_embedding_model)
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "unknown dimensions for embedding model '{}'; set EMBEDDING_DIMENSIONS",
                        self.openai_embedding_model
                    )
                }),
        }
    }

    fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            ingestion: IngestionOptions {
                concurrency: self.ingest_concurrency.max(1),
                page_timeout: self.timeout(),
            },
            retrieval: RetrievalOptions {
                timeout: self.timeout(),
            },
            chat: ChatOptions {
                max_fragments: self.chat_max_fragments,
                timeout: self.timeout() * 2,
            },
            suggestion_timeout: self.timeout() * 2,
        }
    }

    fn elasticsearch(&self, dimensions: usize) -> anyhow::Result<ElasticsearchStore> {
        let store = ElasticsearchStore::new(ElasticsearchConfig {
            endpoint: self.elasticsearch_url.clone(),
            index_name: self.elasticsearch_index.clone(),
            username: self.elasticsearch_user.clone(),
            password: self.elasticsearch_password.clone(),
            api_key: self.elasticsearch_api_key.clone(),
            dimensions,
            highlight: self.highlight(),
            timeout: self.timeout(),
            ..ElasticsearchConfig::default()
        })?;
        Ok(store)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = &cli.settings;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store = ?settings.store,
        embedder = ?settings.embedder,
        "docrag boot"
    );

    let dimensions = settings.dimensions()?;
    let generator = Arc::new(OpenAiChatClient::new(&settings.openai())?);

    match (settings.store, settings.embedder) {
        (StoreKind::Elasticsearch, EmbedderKind::Openai) => {
            let embedder = OpenAiEmbedder::new(&settings.openai(), dimensions)?;
            let store = settings.elasticsearch(dimensions)?;
            run(&cli, Arc::new(embedder), generator, Arc::new(store)).await
        }
        (StoreKind::Elasticsearch, EmbedderKind::Ngram) => {
            let store = settings.elasticsearch(dimensions)?;
            run(&cli, Arc::new(CharacterNgramEmbedder { dimensions }), generator, Arc::new(store)).await
        }
        (StoreKind::Memory, EmbedderKind::Openai) => {
            let embedder = OpenAiEmbedder::new(&settings.openai(), dimensions)?;
            let store = InMemorySearchStore::with_highlight(dimensions, settings.highlight());
            run(&cli, Arc::new(embedder), generator, Arc::new(store)).await
        }
        (StoreKind::Memory, EmbedderKind::Ngram) => {
            let store = InMemorySearchStore::with_highlight(dimensions, settings.highlight());
            run(&cli, Arc::new(CharacterNgramEmbedder { dimensions }), generator, Arc::new(store)).await
        }
    }
}

async fn run<E, S>(
    cli: &Cli,
    embedder: Arc<E>,
    generator: Arc<OpenAiChatClient>,
    store: Arc<S>,
) -> anyhow::Result<()>
where
    E: EmbeddingProvider,
    S: SearchStore,
{
    let service = DocumentService::new(
        Arc::new(LopdfExtractor),
        embedder,
        generator,
        store,
        cli.settings.service_options(),
    );

    match &cli.command {
        Command::Extract { file, base64 } => {
            let raw = read_document(file, *base64).await?;
            print_reply(&service.extract_document_text(&raw))
        }
        Command::Ingest {
            file,
            document_id,
            name,
            base64,
        } => {
            let raw = read_document(file, *base64).await?;
            let extracted = service.extract_document_text(&raw);
            let Some(pages) = extracted.result.as_deref() else {
                return print_reply(&extracted);
            };

            let name = name.clone().unwrap_or_else(|| file_display_name(file));
            info!(document_id, name = %name, pages = pages.len(), "indexing document");
            let reply = service.index_document_pages(*document_id, &name, pages).await;
            if !reply.success {
                warn!(document_id, message = %reply.message, "document indexed partially");
            }
            print_reply(&reply)
        }
        Command::Search {
            term,
            scope,
            document_id,
        } => {
            let request = SearchTermRequest {
                scope: *scope,
                term: term.clone(),
                document_id: *document_id,
            };
            print_reply(&service.search_term(&request).await)
        }
        Command::Chat {
            document_id,
            question,
            previous_question,
            previous_response,
        } => {
            let request = ChatRequest {
                document_id: *document_id,
                question: question.clone(),
                previous_question: previous_question.clone(),
                previous_response: previous_response.clone(),
            };
            print_reply(&service.chat_with_document(&request).await)
        }
        Command::Suggest { file_name, sample } => {
            print_reply(&service.suggest_titles(file_name, sample).await)
        }
    }
}

async fn read_document(file: &str, base64: bool) -> anyhow::Result<Vec<u8>> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|error| anyhow::anyhow!("failed to read {file}: {error}"))?;
    if !base64 {
        return Ok(bytes);
    }

    let payload = String::from_utf8(bytes)
        .map_err(|error| anyhow::anyhow!("base64 payload in {file} is not utf-8: {error}"))?;
    Ok(decode_base64_document(&payload)?)
}

fn file_display_name(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

fn print_reply<T: Serialize>(reply: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(reply)?);
    Ok(())
}
