//! HTTP client for OpenAI-compatible `/chat/completions` and `/embeddings`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use kgagent_core::config::OpenAiConfig;

use crate::error::{LlmError, Result};

/// One message of a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options for a chat completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl ChatOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Client for an OpenAI-compatible API. Clone is cheap.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    embedding_dimensions: usize,
}

impl LlmClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.llm_model.clone(),
            embedding_model: config.embedding_model.clone(),
            embedding_dimensions: config.embedding_dimensions,
        })
    }

    /// Model used for chat completions.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run a chat completion and return the assistant's text.
    pub async fn chat(&self, messages: &[LlmMessage], options: ChatOptions) -> Result<String> {
        let mut request = json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
        });
        if let Some(max_tokens) = options.max_tokens {
            request["max_tokens"] = json!(max_tokens);
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, messages = messages.len(), "Sending chat completion");
        let response = self.post(&url, &request).await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LlmError::EmptyResponse)?;
        Ok(content.to_string())
    }

    /// Embed each text, returning vectors in input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = json!({
            "model": self.embedding_model,
            "input": texts,
        });
        if supports_dimensions(&self.embedding_model) {
            request["dimensions"] = json!(self.embedding_dimensions);
        }
        let url = format!("{}/embeddings", self.base_url);
        let response = self.post(&url, &request).await?;

        let embeddings = parse_embeddings_response(&response)?;
        if embeddings.len() != texts.len() {
            return Err(LlmError::InvalidJson(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        // Vectors of the wrong size would be rejected by the vector index.
        if let Some(bad) = embeddings
            .iter()
            .find(|v| v.len() != self.embedding_dimensions)
        {
            return Err(LlmError::InvalidJson(format!(
                "embedding has {} dimensions, expected {}",
                bad.len(),
                self.embedding_dimensions
            )));
        }
        Ok(embeddings)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or(LlmError::EmptyResponse)
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Only the `text-embedding-3` family accepts a `dimensions` parameter.
fn supports_dimensions(model: &str) -> bool {
    model.starts_with("text-embedding-3")
}

fn parse_embeddings_response(value: &Value) -> Result<Vec<Vec<f32>>> {
    let data = value["data"]
        .as_array()
        .ok_or_else(|| LlmError::InvalidJson("embedding response has no data array".to_string()))?;

    let mut indexed: Vec<(u64, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().unwrap_or(position as u64);
        let vector = item["embedding"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidJson("embedding item has no vector".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn client_for(server: &mockito::Server) -> LlmClient {
        let config = OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: server.url(),
            llm_model: "gpt-test".to_string(),
            embedding_model: "embed-test".to_string(),
            embedding_dimensions: 2,
            ..OpenAiConfig::default()
        };
        LlmClient::new(&config).unwrap()
    }

    pub(crate) fn completion_body(content: &str) -> String {
        json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_chat_returns_assistant_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-test",
                "max_tokens": 50
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("Hello there"))
            .create_async()
            .await;

        let client = client_for(&server);
        let reply = client
            .chat(
                &[LlmMessage::user("Hi")],
                ChatOptions::with_temperature(0.2).max_tokens(50),
            )
            .await
            .unwrap();

        assert_eq!(reply, "Hello there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_maps_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .chat(&[LlmMessage::user("Hi")], ChatOptions::default())
            .await
            .unwrap_err();

        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_chat_without_choices_is_empty_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .chat(&[LlmMessage::user("Hi")], ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_embed_orders_by_index() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let vectors = client
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embed_empty_input_skips_request() {
        let server = mockito::Server::new_async().await;
        let client = client_for(&server);
        assert!(client.embed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_sends_configured_dimensions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "text-embedding-3-small",
                "dimensions": 3
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }] }).to_string(),
            )
            .create_async()
            .await;

        let client = LlmClient::new(&OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: server.url(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 3,
            ..OpenAiConfig::default()
        })
        .unwrap();

        let vector = client.embed_one("Ada").await.unwrap();
        assert_eq!(vector.len(), 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_embed_rejects_vectors_of_the_wrong_size() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }] }).to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.embed_one("Ada").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidJson(_)));
    }

    #[test]
    fn test_dimensions_only_for_models_that_accept_them() {
        assert!(supports_dimensions("text-embedding-3-large"));
        assert!(!supports_dimensions("text-embedding-ada-002"));
    }

    #[test]
    fn test_parse_embeddings_rejects_missing_data() {
        assert!(parse_embeddings_response(&json!({"error": "x"})).is_err());
    }
}
