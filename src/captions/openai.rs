use super::TextGenerator;
use crate::error::CaptionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(http: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_URL.to_string(),
            temperature: 0.7,
            max_tokens: 300,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// First non-empty completion in a response, trimmed
fn first_completion(response: ChatResponse) -> Result<String, CaptionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CaptionError::InvalidResponse("no completion in response".into()))
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CaptionError> {
        if self.api_key.is_empty() {
            return Err(CaptionError::MissingApiKey);
        }

        let request = ChatRequest {
            model: &self.model,
            messages: [
                WireMessage { role: "system", content: system },
                WireMessage { role: "user", content: prompt },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, "OpenAI chat request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(CaptionError::Api { status, message });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CaptionError::InvalidResponse(e.to_string()))?;
        first_completion(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_as_chat_completion() {
        let request = ChatRequest {
            model: "gpt-4",
            messages: [
                WireMessage { role: "system", content: "sys" },
                WireMessage { role: "user", content: "hi" },
            ],
            temperature: 0.7,
            max_tokens: 300,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["max_tokens"], 300);
    }

    #[test]
    fn completion_is_trimmed_and_required() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  caption \n"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_completion(body).unwrap(), "caption");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_completion(empty),
            Err(CaptionError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let client = OpenAiClient::new(Client::new(), "", "gpt-4");
        let err = client.complete("sys", "prompt").await.unwrap_err();
        assert!(matches!(err, CaptionError::MissingApiKey));
    }
}
