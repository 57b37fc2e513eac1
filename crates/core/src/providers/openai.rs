use crate::embeddings::EmbeddingProvider;
use crate::error::ProviderError;
use crate::models::ChatTurn;
use crate::traits::GenerationProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BACKEND: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Shared HTTP plumbing for the embedding and chat endpoints.
#[derive(Clone)]
struct OpenAiHttp {
    client: Client,
    base: Url,
    api_key: String,
}

impl OpenAiHttp {
    fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let mut base = Url::parse(&config.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            base,
            api_key: config.api_key.clone(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.base.join(path)?)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ProviderError::Timeout(format!("{BACKEND} {path}"))
                } else {
                    ProviderError::Http(error)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::BackendResponse {
                backend: BACKEND.to_string(),
                details: status.to_string(),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|error| ProviderError::MalformedResponse {
                backend: BACKEND.to_string(),
                details: error.to_string(),
            })
    }
}

pub struct OpenAiEmbedder {
    http: OpenAiHttp,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig, dimensions: usize) -> Result<Self, ProviderError> {
        Ok(Self {
            http: OpenAiHttp::new(config)?,
            model: config.embedding_model.clone(),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let response: EmbeddingResponse = self.http.post("embeddings", &request).await?;

        first_embedding(response)
    }
}

fn first_embedding(response: EmbeddingResponse) -> Result<Vec<f32>, ProviderError> {
    response
        .data
        .into_iter()
        .next()
        .map(|item| item.embedding)
        .ok_or_else(|| ProviderError::MalformedResponse {
            backend: BACKEND.to_string(),
            details: "embedding response had no data".to_string(),
        })
}

pub struct OpenAiChatClient {
    http: OpenAiHttp,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChatClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: OpenAiHttp::new(config)?,
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChatClient {
    async fn generate(&self, turns: &[ChatTurn]) -> Result<Option<String>, ProviderError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: turns,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response: CompletionResponse = self.http.post("chat/completions", &request).await?;
        debug!(choices = response.choices.len(), "chat completion received");

        Ok(first_choice_text(response))
    }
}

fn first_choice_text(response: CompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
