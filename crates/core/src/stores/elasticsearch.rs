use crate::models::{HighlightOptions, IndexablePage, SearchHit, SemanticQuery, TermQuery};
use crate::traits::SearchStore;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

const BACKEND: &str = "elasticsearch";

#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub endpoint: String,
    pub index_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub highlight: HighlightOptions,
    pub max_hits: usize,
    pub timeout: Duration,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index_name: "document_pages".to_string(),
            username: None,
            password: None,
            api_key: None,
            dimensions: 1536,
            highlight: HighlightOptions::default(),
            max_hits: 10,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct ElasticsearchStore {
    client: Client,
    base: Url,
    config: ElasticsearchConfig,
    provisioned: OnceCell<()>,
}

impl ElasticsearchStore {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let mut base = Url::parse(&config.endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            base,
            config,
            provisioned: OnceCell::new(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    fn index_url(&self, suffix: &str) -> Result<Url, SearchError> {
        Ok(self
            .base
            .join(&format!("{}{}", self.config.index_name, suffix))?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(api_key) = &self.config.api_key {
            request.header(AUTHORIZATION, format!("ApiKey {api_key}"))
        } else if let Some(username) = &self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    fn unavailable(&self, details: impl Into<String>) -> SearchError {
        SearchError::IndexUnavailable {
            index: self.config.index_name.clone(),
            details: details.into(),
        }
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), SearchError> {
        if actual != self.config.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.config.dimensions,
                actual,
            });
        }
        Ok(())
    }

    async fn provision(&self) -> Result<(), SearchError> {
        let response = self
            .authorize(self.client.head(self.index_url("")?))
            .send()
            .await
            .map_err(|error| transport_error(error, "index existence check"))?;

        if classify_existence(response.status()).map_err(|details| self.unavailable(details))? {
            return Ok(());
        }

        info!(index = %self.config.index_name, dimensions = self.config.dimensions, "creating search index");

        let response = self
            .authorize(self.client.put(self.index_url("")?))
            .json(&index_mapping(self.config.dimensions))
            .send()
            .await
            .map_err(|error| transport_error(error, "index creation"))?;

        let status = response.status();
        let body = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        classify_creation(status, &body).map_err(|details| self.unavailable(details))?;

        if !status.is_success() {
            debug!(index = %self.config.index_name, "index was created concurrently");
        }
        Ok(())
    }

    async fn search(&self, body: &Value) -> Result<Value, SearchError> {
        let response = self
            .authorize(self.client.post(self.index_url("/_search")?))
            .json(body)
            .send()
            .await
            .map_err(|error| transport_error(error, "search"))?;

        // Nothing has been ingested yet.
        if response.status() == StatusCode::NOT_FOUND {
            debug!(index = %self.config.index_name, "search on missing index");
            return Ok(Value::Null);
        }

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SearchStore for ElasticsearchStore {
    async fn ensure_index(&self) -> Result<(), SearchError> {
        self.provisioned
            .get_or_try_init(|| self.provision())
            .await
            .map(|_| ())
    }

    async fn upsert(&self, page: &IndexablePage) -> Result<(), SearchError> {
        self.check_dimensions(page.embedding.len())?;
        self.ensure_index().await?;

        let response = self
            .authorize(
                self.client
                    .put(self.index_url(&format!("/_doc/{}", page.key()))?),
            )
            .json(page)
            .send()
            .await
            .map_err(|error| match transport_error(error, "page upsert") {
                SearchError::Http(error) => self.unavailable(error.to_string()),
                other => other,
            })?;

        if !response.status().is_success() {
            return Err(self.unavailable(format!(
                "upsert of page {} returned {}",
                page.key(),
                response.status()
            )));
        }

        Ok(())
    }

    async fn search_by_term(&self, query: &TermQuery) -> Result<Vec<SearchHit>, SearchError> {
        let body = term_query_body(query, &self.config.highlight, self.config.max_hits);
        let response = self.search(&body).await?;
        Ok(parse_term_hits(&response, &self.config.highlight))
    }

    async fn search_by_semantic(
        &self,
        query: &SemanticQuery,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.check_dimensions(query.embedding.len())?;
        let body = semantic_query_body(query, self.config.max_hits);
        let response = self.search(&body).await?;
        Ok(parse_semantic_hits(&response))
    }
}

fn transport_error(error: reqwest::Error, operation: &str) -> SearchError {
    if error.is_timeout() {
        SearchError::Timeout(format!("{BACKEND} {operation}"))
    } else {
        SearchError::Http(error)
    }
}

/// `Ok(true)` when the index exists, `Ok(false)` when it has to be created.
pub fn classify_existence(status: StatusCode) -> Result<bool, String> {
    match status {
        StatusCode::OK => Ok(true),
        StatusCode::NOT_FOUND => Ok(false),
        other => Err(format!("existence check returned {other}")),
    }
}

/// Index creation succeeds when the index was created, or another writer created it first.
pub fn classify_creation(status: StatusCode, body: &str) -> Result<(), String> {
    if status.is_success()
        || (status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception"))
    {
        Ok(())
    } else {
        Err(format!("index creation returned {status}: {body}"))
    }
}

pub fn index_mapping(dimensions: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                "documentId": {"type": "integer"},
                "documentName": {"type": "text"},
                "pageNumber": {"type": "integer"},
                "content": {"type": "text"},
                "embedding": {
                    "type": "dense_vector",
                    "dims": dimensions
                }
            }
        }
    })
}

pub fn term_query_body(query: &TermQuery, highlight: &HighlightOptions, size: usize) -> Value {
    let mut filters = Vec::new();
    if let Some(document_id) = query.document_id {
        filters.push(json!({"term": {"documentId": document_id}}));
    }

    json!({
        "size": size,
        "_source": {"excludes": ["embedding"]},
        "query": {
            "bool": {
                "must": [term_clause(query.term.trim())],
                "filter": filters
            }
        },
        "highlight": {
            "fields": {
                "content": {
                    "fragment_size": highlight.fragment_size,
                    "number_of_fragments": highlight.number_of_fragments,
                    "pre_tags": [highlight.pre_tag],
                    "post_tags": [highlight.post_tag]
                }
            }
        }
    })
}

pub fn semantic_query_body(query: &SemanticQuery, size: usize) -> Value {
    json!({
        "size": size,
        "_source": {"excludes": ["embedding"]},
        "query": {
            "script_score": {
                "query": {
                    "bool": {
                        "filter": [
                            {"term": {"documentId": query.document_id}}
                        ]
                    }
                },
                "script": {
                    "source": "cosineSimilarity(params.query_vector, 'embedding') + 1.0",
                    "params": {
                        "query_vector": query.embedding
                    }
                }
            }
        }
    })
}

/// Wildcards only see single analyzed tokens, so multi-word terms go through `match_phrase`.
fn term_clause(term: &str) -> Value {
    if term.contains(char::is_whitespace) {
        json!({"match_phrase": {"content": term}})
    } else {
        json!({
            "wildcard": {
                "content": {
                    "value": format!("*{}*", escape_wildcard(term)),
                    "case_insensitive": true
                }
            }
        })
    }
}

fn escape_wildcard(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '*' | '?') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn raw_hits(response: &Value) -> Vec<Value> {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// `None` for hits whose source lacks a usable document id or page number.
fn hit_from_source(raw: &Value, content: String) -> Option<SearchHit> {
    let document_id = raw.pointer("/_source/documentId").and_then(Value::as_i64);
    let page_number = raw
        .pointer("/_source/pageNumber")
        .and_then(Value::as_u64)
        .and_then(|number| u32::try_from(number).ok());

    let (Some(document_id), Some(page_number)) = (document_id, page_number) else {
        warn!(id = ?raw.pointer("/_id"), "skipping malformed search hit");
        return None;
    };

    Some(SearchHit {
        document_id,
        document_name: raw
            .pointer("/_source/documentName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        page_number,
        content,
        score: raw.pointer("/_score").and_then(Value::as_f64),
    })
}

fn parse_term_hits(response: &Value, highlight: &HighlightOptions) -> Vec<SearchHit> {
    raw_hits(response)
        .iter()
        .filter_map(|raw| {
            let fragments = raw
                .pointer("/highlight/content")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .filter(|joined| !joined.is_empty());

            let content = fragments.unwrap_or_else(|| {
                raw.pointer("/_source/content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .chars()
                    .take(highlight.fragment_size)
                    .collect()
            });

            let mut hit = hit_from_source(raw, content)?;
            hit.score = None;
            Some(hit)
        })
        .collect()
}

fn parse_semantic_hits(response: &Value) -> Vec<SearchHit> {
    raw_hits(response)
        .iter()
        .filter_map(|raw| {
            let content = raw
                .pointer("/_source/content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            hit_from_source(raw, content)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Responder = fn(&str, &str) -> (u16, &'static str);

    /// Minimal HTTP/1.1 cluster stand-in; records `METHOD path` for every request.
    async fn fake_cluster(respond: Responder) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, respond, log.clone()));
            }
        });

        (format!("http://{address}"), seen)
    }

    async fn serve(mut socket: TcpStream, respond: Responder, log: Arc<Mutex<Vec<String>>>) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let read = socket.read(&mut chunk).await.unwrap_or(0);
            if read == 0 {
                return;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
                break end + 4;
            }
        };

        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() < header_end + content_length {
            let read = socket.read(&mut chunk).await.unwrap_or(0);
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
        }

        let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();
        log.lock().unwrap().push(format!("{method} {path}"));

        let (status, body) = respond(&method, &path);
        let payload = if method == "HEAD" { "" } else { body };
        let response = format!(
            "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
            payload.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }

    fn store_at(endpoint: &str) -> ElasticsearchStore {
        ElasticsearchStore::new(ElasticsearchConfig {
            endpoint: endpoint.to_string(),
            index_name: "pages".to_string(),
            dimensions: 2,
            ..ElasticsearchConfig::default()
        })
        .expect("store should build")
    }

    #[test]
    fn existence_check_classification() {
        assert_eq!(classify_existence(StatusCode::OK), Ok(true));
        assert_eq!(classify_existence(StatusCode::NOT_FOUND), Ok(false));
        assert!(classify_existence(StatusCode::INTERNAL_SERVER_ERROR).is_err());
        assert!(classify_existence(StatusCode::FORBIDDEN).is_err());
    }

    #[test]
    fn creation_tolerates_concurrent_creator() {
        let already = r#"{"error":{"type":"resource_already_exists_exception"},"status":400}"#;
        assert_eq!(classify_creation(StatusCode::OK, ""), Ok(()));
        assert_eq!(classify_creation(StatusCode::BAD_REQUEST, already), Ok(()));

        let mapping_error = r#"{"error":{"type":"mapper_parsing_exception"},"status":400}"#;
        assert!(classify_creation(StatusCode::BAD_REQUEST, mapping_error).is_err());
        assert!(classify_creation(StatusCode::SERVICE_UNAVAILABLE, "").is_err());
    }

    #[tokio::test]
    async fn concurrent_first_writers_provision_once() {
        let (endpoint, seen) = fake_cluster(|method, _| match method {
            "HEAD" => (404, ""),
            _ => (200, r#"{"acknowledged":true}"#),
        })
        .await;
        let store = store_at(&endpoint);

        let results = futures::future::join_all((0..8).map(|_| store.ensure_index())).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(*seen.lock().unwrap(), vec!["HEAD /pages", "PUT /pages"]);
    }

    #[tokio::test]
    async fn index_created_by_someone_else_counts_as_provisioned() {
        let (endpoint, _) = fake_cluster(|method, _| match method {
            "HEAD" => (404, ""),
            _ => (
                400,
                r#"{"error":{"type":"resource_already_exists_exception"},"status":400}"#,
            ),
        })
        .await;

        assert!(store_at(&endpoint).ensure_index().await.is_ok());
    }

    #[tokio::test]
    async fn unexpected_existence_status_is_index_unavailable() {
        let (endpoint, seen) = fake_cluster(|_, _| (500, "")).await;

        let error = store_at(&endpoint).ensure_index().await.unwrap_err();

        assert!(matches!(error, SearchError::IndexUnavailable { .. }));
        assert_eq!(*seen.lock().unwrap(), vec!["HEAD /pages"]);
    }

    #[tokio::test]
    async fn searching_a_missing_index_finds_nothing() {
        let (endpoint, _) = fake_cluster(|_, _| {
            (404, r#"{"error":{"type":"index_not_found_exception"},"status":404}"#)
        })
        .await;
        let store = store_at(&endpoint);

        let terms = store
            .search_by_term(&TermQuery {
                document_id: None,
                term: "agile".to_string(),
            })
            .await
            .unwrap();
        let semantic = store
            .search_by_semantic(&SemanticQuery {
                document_id: 1,
                embedding: vec![1.0, 0.0],
            })
            .await
            .unwrap();

        assert!(terms.is_empty());
        assert!(semantic.is_empty());
    }

    #[test]
    fn multi_word_term_is_a_phrase_query() {
        let query = TermQuery {
            document_id: None,
            term: " agile process ".to_string(),
        };
        let body = term_query_body(&query, &HighlightOptions::default(), 10);

        assert_eq!(
            body.pointer("/query/bool/must/0/match_phrase/content"),
            Some(&json!("agile process"))
        );
        assert!(body.pointer("/query/bool/must/0/wildcard").is_none());
        assert_eq!(
            body.pointer("/highlight/fields/content/pre_tags/0"),
            Some(&json!("<em>"))
        );
    }

    #[test]
    fn hits_with_out_of_range_page_numbers_are_skipped() {
        let response = json!({
            "hits": {
                "hits": [
                    {
                        "_id": "1-huge",
                        "_source": {"documentId": 1, "pageNumber": 5_000_000_000u64, "content": "x"}
                    },
                    {
                        "_id": "1-2",
                        "_source": {"documentId": 1, "documentName": "a.pdf", "pageNumber": 2, "content": "y"}
                    },
                    {
                        "_id": "no-document",
                        "_source": {"pageNumber": 3, "content": "z"}
                    }
                ]
            }
        });

        let hits = parse_semantic_hits(&response);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page_number, 2);
    }

    #[test]
    fn mapping_declares_dense_vector_with_dimensions() {
        let mapping = index_mapping(1536);
        assert_eq!(
            mapping.pointer("/mappings/properties/embedding/type"),
            Some(&json!("dense_vector"))
        );
        assert_eq!(
            mapping.pointer("/mappings/properties/embedding/dims"),
            Some(&json!(1536))
        );
        assert_eq!(
            mapping.pointer("/mappings/properties/documentId/type"),
            Some(&json!("integer"))
        );
    }

    #[test]
    fn corpus_wide_term_query_has_no_document_filter() {
        let query = TermQuery {
            document_id: None,
            term: "agile".to_string(),
        };
        let body = term_query_body(&query, &HighlightOptions::default(), 10);

        assert_eq!(
            body.pointer("/query/bool/must/0/wildcard/content/value"),
            Some(&json!("*agile*"))
        );
        assert_eq!(
            body.pointer("/query/bool/must/0/wildcard/content/case_insensitive"),
            Some(&json!(true))
        );
        assert_eq!(body.pointer("/query/bool/filter"), Some(&json!([])));
        assert_eq!(
            body.pointer("/highlight/fields/content/fragment_size"),
            Some(&json!(350))
        );
        assert_eq!(
            body.pointer("/highlight/fields/content/number_of_fragments"),
            Some(&json!(3))
        );
    }

    #[test]
    fn document_scoped_term_query_filters_by_document() {
        let query = TermQuery {
            document_id: Some(42),
            term: "a*b?".to_string(),
        };
        let body = term_query_body(&query, &HighlightOptions::default(), 10);

        assert_eq!(
            body.pointer("/query/bool/filter/0/term/documentId"),
            Some(&json!(42))
        );
        assert_eq!(
            body.pointer("/query/bool/must/0/wildcard/content/value"),
            Some(&json!("*a\\*b\\?*"))
        );
    }

    #[test]
    fn semantic_query_scores_by_shifted_cosine() {
        let query = SemanticQuery {
            document_id: 3,
            embedding: vec![0.25, 0.75],
        };
        let body = semantic_query_body(&query, 10);

        assert_eq!(
            body.pointer("/query/script_score/query/bool/filter/0/term/documentId"),
            Some(&json!(3))
        );
        assert_eq!(
            body.pointer("/query/script_score/script/source"),
            Some(&json!("cosineSimilarity(params.query_vector, 'embedding') + 1.0"))
        );
        assert_eq!(
            body.pointer("/query/script_score/script/params/query_vector"),
            Some(&json!([0.25, 0.75]))
        );
    }

    #[test]
    fn term_hits_join_highlight_fragments() {
        let response = json!({
            "hits": {
                "hits": [
                    {
                        "_id": "1-4",
                        "_score": 1.0,
                        "_source": {
                            "documentId": 1,
                            "documentName": "process.pdf",
                            "pageNumber": 4,
                            "content": "long page text"
                        },
                        "highlight": {
                            "content": ["we follow an agile", "agile review"]
                        }
                    }
                ]
            }
        });

        let hits = parse_term_hits(&response, &HighlightOptions::default());

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, 1);
        assert_eq!(hits[0].document_name, "process.pdf");
        assert_eq!(hits[0].page_number, 4);
        assert_eq!(hits[0].content, "we follow an agile agile review");
    }

    #[test]
    fn semantic_hits_keep_full_page_text_and_score() {
        let response = json!({
            "hits": {
                "hits": [
                    {
                        "_score": 1.9,
                        "_source": {
                            "documentId": 9,
                            "documentName": "report.pdf",
                            "pageNumber": 1,
                            "content": "full page"
                        }
                    }
                ]
            }
        });

        let hits = parse_semantic_hits(&response);

        assert_eq!(hits[0].content, "full page");
        assert_eq!(hits[0].score, Some(1.9));
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimensions_before_any_request() {
        let store = ElasticsearchStore::new(ElasticsearchConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            dimensions: 4,
            ..ElasticsearchConfig::default()
        })
        .expect("store should build");

        let page = IndexablePage {
            document_id: 1,
            document_name: "a.pdf".to_string(),
            page_number: 1,
            content: "x".to_string(),
            embedding: vec![0.0; 3],
        };

        let result = store.upsert(&page).await;
        assert!(matches!(
            result,
            Err(SearchError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn endpoint_path_is_preserved_when_joining() {
        let store = ElasticsearchStore::new(ElasticsearchConfig {
            endpoint: "http://search.local:9200/es".to_string(),
            index_name: "pages".to_string(),
            ..ElasticsearchConfig::default()
        })
        .expect("store should build");

        let url = store.index_url("/_search").expect("url should join");
        assert_eq!(url.as_str(), "http://search.local:9200/es/pages/_search");
    }
}
