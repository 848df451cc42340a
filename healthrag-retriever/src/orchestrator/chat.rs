//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiKey, LanguageModel, LlmConfig};
use crate::error::{Result, RetrieverError};

/// Calls `POST {endpoint}` with a single user message. Works against Groq,
/// OpenAI and other servers speaking the same protocol.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RetrieverError::Llm(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn request_body<'a>(prompt: &'a str, config: &'a LlmConfig) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        top_p: config.top_p,
    }
}

fn first_choice(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .ok_or_else(|| RetrieverError::Llm("response contained no message content".to_string()))
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, prompt: &str, config: &LlmConfig, api_key: &ApiKey) -> Result<String> {
        debug!("Requesting completion from {} ({})", config.endpoint, config.model);
        let response = self
            .client
            .post(&config.endpoint)
            .bearer_auth(api_key.expose())
            .json(&request_body(prompt, config))
            .send()
            .await
            .map_err(|e| RetrieverError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RetrieverError::Llm(format!("{} returned {}: {}", config.endpoint, status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RetrieverError::Llm(format!("failed to parse response: {e}")))?;
        first_choice(parsed)
    }
}
