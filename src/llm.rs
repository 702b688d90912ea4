use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;

// Deterministic sampling keeps answers reproducible across runs.
const TEMPERATURE: f32 = 0.0;
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: missing {0}")]
    Malformed(&'static str),
}

/// Trait for chat model backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a single-turn completion request and return the response text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Configuration for the chat deployment
#[derive(Clone)]
pub struct ChatConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

impl ChatConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(ChatConfig {
            endpoint: env::var("AZURE_OPENAI_CHAT_ENDPOINT")
                .context("AZURE_OPENAI_CHAT_ENDPOINT is not set")?,
            api_key: env::var("AZURE_OPENAI_CHAT_KEY")
                .context("AZURE_OPENAI_CHAT_KEY is not set")?,
            deployment: env::var("AZURE_OPENAI_CHAT_DEPLOYMENT")
                .context("AZURE_OPENAI_CHAT_DEPLOYMENT is not set")?,
            api_version: env::var("AZURE_OPENAI_CHAT_API_VERSION")
                .context("AZURE_OPENAI_CHAT_API_VERSION is not set")?,
        })
    }
}

/// Client for the chat completions API
#[derive(Clone)]
pub struct ChatClient {
    config: ChatConfig,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(config: ChatConfig) -> Self {
        let client = reqwest::Client::new();
        ChatClient { config, client }
    }

    fn request_url(&self) -> String {
        format!(
            "{}openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint, self.config.deployment, self.config.api_version
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: String,
}

/// Validate the response shape before use.
fn extract_answer(response: ChatResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or(LlmError::Malformed("choices[0].message.content"))
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(self.request_url())
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Api { status, body });
        }

        let response_data: ChatResponse = response.json().await?;
        extract_answer(response_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_choices_is_a_malformed_response() {
        let err = extract_answer(ChatResponse { choices: vec![] }).unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }

    #[test]
    fn first_choice_wins() {
        let response = ChatResponse {
            choices: vec![
                Choice {
                    message: ResponseMessage {
                        content: "first".to_string(),
                    },
                },
                Choice {
                    message: ResponseMessage {
                        content: "second".to_string(),
                    },
                },
            ],
        };
        assert_eq!(extract_answer(response).unwrap(), "first");
    }

    #[test]
    fn request_url_targets_the_deployment() {
        let client = ChatClient::new(ChatConfig {
            endpoint: "https://example.openai.azure.com/".to_string(),
            api_key: "secret".to_string(),
            deployment: "gpt-4o-mini".to_string(),
            api_version: "2024-02-01".to_string(),
        });

        assert_eq!(
            client.request_url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-02-01"
        );
    }
}
