use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use poise::serenity_prelude::UserId;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const MODEL: &str = "meta-llama/llama-3-8b-instruct";
const MAX_TOKENS: u32 = 250;
const TEMPERATURE: f32 = 0.2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const SYSTEM_PROMPT: &str = "\
Você é \"Demônio\", uma assistente de Discord. Sua personalidade é fria, concisa e direta.
Responda com objetividade, frases curtas, sem emojis, sem desculpas desnecessárias.
Se a mensagem for claramente uma saudação simples, responda de forma curta e neutra.
Se a entrada for comando técnico ou pergunta, responda de forma útil porém seca.
Não use falas programadas, não finja servidão, não invente afeto.
Limite as respostas a ~1-5 sentenças. Seja cortês apenas quando necessário.
";

/// Something that turns user text into a reply.
///
/// `None` means no usable reply was produced; the reason has already been
/// logged by the implementation.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, user_text: &str, user_id: UserId) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message; 2],
    max_tokens: u32,
    temperature: f32,
    user: String,
}

impl<'a> CompletionRequest<'a> {
    fn new(model: &'a str, user_text: &str, user_id: UserId) -> Self {
        Self {
            model,
            messages: [
                Message {
                    role: MessageRole::System,
                    content: Some(SYSTEM_PROMPT.to_string()),
                },
                Message {
                    role: MessageRole::User,
                    content: Some(user_text.to_string()),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            user: user_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

/// Only the text is read back; role and tool fields are ignored.
#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenRouterClient {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(api_key: String, api_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            api_key,
            api_url,
            client,
        })
    }

    /// Send one completion request. No retries.
    pub async fn try_complete(&self, user_text: &str, user_id: UserId) -> Result<String> {
        debug!("Sending completion request to OpenRouter for user {user_id}");

        let request = CompletionRequest::new(MODEL, user_text, user_id);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response: {e}"));
            return Err(BotError::OpenRouterApi { status, message });
        }

        let body = response.text().await?;
        let api_response: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| BotError::OpenRouterResponse(format!("Malformed response: {e}")))?;

        let reply = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BotError::OpenRouterResponse("No choices in response".to_string()))?
            .message
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(BotError::OpenRouterResponse(
                "First choice has no text".to_string(),
            ));
        }

        debug!("Received response from OpenRouter API");
        Ok(reply)
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    async fn complete(&self, user_text: &str, user_id: UserId) -> Option<String> {
        match self.try_complete(user_text, user_id).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!("OpenRouter completion failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    const PATH: &str = "/api/v1/chat/completions";

    fn client(server: &mockito::ServerGuard) -> OpenRouterClient {
        OpenRouterClient::new("test-key".to_string(), format!("{}{PATH}", server.url()))
            .expect("client should build")
    }

    #[test]
    fn request_has_fixed_shape() {
        let request = CompletionRequest::new(MODEL, "hello", UserId::new(12345));
        let value = serde_json::to_value(&request).expect("request serializes");

        assert_eq!(value["model"], "meta-llama/llama-3-8b-instruct");
        assert_eq!(value["max_tokens"], 250);
        assert_eq!(value["user"], "12345");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "hello");
        let temperature = value["temperature"].as_f64().expect("temperature is a number");
        assert!((temperature - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn returns_trimmed_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("authorization", "Bearer test-key")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "model": MODEL,
                "user": "12345",
                "max_tokens": 250
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "  Olá.  \n" } },
                        { "message": { "role": "assistant", "content": "second" } }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let reply = client(&server).complete("hello", UserId::new(12345)).await;
        assert_eq!(reply.as_deref(), Some("Olá."));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn reads_content_regardless_of_role() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(
                json!({
                    "choices": [
                        { "message": { "role": "tool", "content": "Feito." } }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client(&server);
        assert_eq!(
            client.complete("hi", UserId::new(1)).await.as_deref(),
            Some("Feito.")
        );
    }

    #[tokio::test]
    async fn reads_content_without_role() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(json!({ "choices": [{ "message": { "content": "Sim." } }] }).to_string())
            .create_async()
            .await;

        assert_eq!(
            client(&server)
                .complete("hi", UserId::new(1))
                .await
                .as_deref(),
            Some("Sim.")
        );
    }

    #[tokio::test]
    async fn http_error_yields_no_result() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(429)
            .with_body(r#"{"error":"rate limited"}"#)
            .create_async()
            .await;

        let client = client(&server);
        let err = client
            .try_complete("hello", UserId::new(1))
            .await
            .expect_err("429 should fail");
        assert!(matches!(
            err,
            BotError::OpenRouterApi { status, .. } if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        ));
        assert!(client.complete("hello", UserId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn empty_choices_yield_no_result() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(json!({ "choices": [] }).to_string())
            .create_async()
            .await;

        assert!(client(&server).complete("hi", UserId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn malformed_body_yields_no_result() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let client = client(&server);
        assert!(matches!(
            client.try_complete("hi", UserId::new(1)).await,
            Err(BotError::OpenRouterResponse(_))
        ));
        assert!(client.complete("hi", UserId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn blank_content_yields_no_result() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(
                json!({ "choices": [{ "message": { "role": "assistant", "content": "   " } }] })
                    .to_string(),
            )
            .create_async()
            .await;

        assert!(client(&server).complete("hi", UserId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn connection_failure_yields_no_result() {
        let client = OpenRouterClient::new(
            "test-key".to_string(),
            "http://127.0.0.1:9/api/v1/chat/completions".to_string(),
        )
        .expect("client should build");

        assert!(client.complete("hi", UserId::new(1)).await.is_none());
    }
}
