use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePage {
    pub ordinal: u32,
    pub text: String,
}

/// One page as persisted in the search store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexablePage {
    pub document_id: i64,
    pub document_name: String,
    pub page_number: u32,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl IndexablePage {
    /// Store key; re-indexing a page overwrites the record under this key.
    pub fn key(&self) -> String {
        page_key(self.document_id, self.page_number)
    }
}

pub fn page_key(document_id: i64, page_number: u32) -> String {
    format!("{document_id}-{page_number}")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermQuery {
    pub document_id: Option<i64>,
    pub term: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticQuery {
    pub document_id: i64,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub document_id: i64,
    pub document_name: String,
    pub page_number: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub document_id: i64,
    pub answer_lines: Vec<String>,
    pub cited_pages: Vec<SearchHit>,
}

/// Which part of the corpus a term search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    #[default]
    Corpus,
    Document,
}

impl std::str::FromStr for SearchScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "corpus" => Ok(Self::Corpus),
            "document" => Ok(Self::Document),
            other => Err(format!("unknown search scope '{other}', expected corpus or document")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTermRequest {
    #[serde(default)]
    pub scope: SearchScope,
    pub term: String,
    #[serde(default)]
    pub document_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub document_id: i64,
    pub question: String,
    #[serde(default)]
    pub previous_question: Option<String>,
    #[serde(default)]
    pub previous_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFailure {
    pub page_number: u32,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub document_id: i64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<PageFailure>,
}

impl IngestionReport {
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleSuggestion {
    pub title: String,
    pub description: String,
}

/// Structured result handed across the core boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply<T> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub result: Option<T>,
}

impl<T> Reply<T> {
    pub fn success(message: impl Into<String>, result: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: None,
            result: Some(result),
        }
    }

    pub fn partial(kind: ErrorKind, message: impl Into<String>, result: T) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: Some(kind),
            result: Some(result),
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: Some(kind),
            result: None,
        }
    }
}

/// Highlight settings for term queries. Matches are wrapped in `pre_tag`/`post_tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightOptions {
    pub fragment_size: usize,
    pub number_of_fragments: usize,
    pub pre_tag: String,
    pub post_tag: String,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            fragment_size: 350,
            number_of_fragments: 3,
            pre_tag: "<em>".to_string(),
            post_tag: "</em>".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub concurrency: usize,
    pub page_timeout: Duration,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            page_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub timeout: Duration,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub max_fragments: usize,
    pub timeout: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_fragments: 5,
            timeout: Duration::from_secs(60),
        }
    }
}
