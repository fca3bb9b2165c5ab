use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AgentConfig;
use crate::models::chat::ChatMessage;

/// External agent that turns a message history into a reply
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AgentGateway: Send + Sync {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Agent backed by an OpenAI-compatible chat completion endpoint
#[derive(Clone)]
pub struct LlmAgent {
    client: Client,
    config: AgentConfig,
}

impl LlmAgent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl AgentGateway for LlmAgent {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!("Invoking agent with {} messages", messages.len());

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call agent API: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Agent API error: {} - {}", status, body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse agent response: {}", e))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No choices returned from agent"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> AgentConfig {
        AgentConfig {
            base_url,
            api_key: "gsk-test".to_string(),
            model: "test-model".to_string(),
            table: "orders".to_string(),
            system_prompt: "only {{TABLE}}".to_string(),
            timeout_seconds: 5,
            max_tokens: 64,
            temperature: 0.0,
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 3306,
                user: "reader".to_string(),
                password: "s3cret".to_string(),
                name: "shop".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_invoke_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer gsk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "only orders"},
                    {"role": "user", "content": "how many rows?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "42 rows"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let agent = LlmAgent::new(config(format!("{}/", server.uri()))).unwrap();
        let reply = agent
            .invoke(&[ChatMessage::system("only orders"), ChatMessage::user("how many rows?")])
            .await
            .unwrap();
        assert_eq!(reply, "42 rows");

        let sent = &server.received_requests().await.unwrap()[0];
        assert!(!String::from_utf8_lossy(&sent.body).contains("s3cret"));
    }

    #[tokio::test]
    async fn test_invoke_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let agent = LlmAgent::new(config(server.uri())).unwrap();
        let err = agent.invoke(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_invoke_rejects_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let agent = LlmAgent::new(config(server.uri())).unwrap();
        assert!(agent.invoke(&[ChatMessage::user("hi")]).await.is_err());
    }
}
