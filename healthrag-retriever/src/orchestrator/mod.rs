//! Answer generation: retrieve sources, build a prompt, call a hosted
//! language model with bounded retry.
//!
//! ## Key Components
//!
//! - **LanguageModel**: the seam to a hosted chat model
//! - **ChatCompletionsClient**: OpenAI-compatible `/chat/completions` client (Groq by default)
//! - **AnswerOrchestrator**: retrieval + context block + model call + retry
//! - **ApiKey**: credential passed explicitly on every call
//!
//! The instruction text that precedes the context block is supplied by the
//! caller through [`AnswerOrchestrator::with_preamble`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Result, RetrieverError};
use crate::retrieval::{RetrievalEngine, SearchHit};

pub mod chat;

pub use chat::ChatCompletionsClient;

pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.1-8b-instant";
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

const DEFAULT_PREAMBLE: &str =
    "Answer the user's health question using only the information listed below.";

/// A credential for the hosted model. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Read the key from `var`, ignoring empty values.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Self)
    }

    pub fn expose(&self) -> &str {
        self.0.trim()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Hosted model and sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub top_p: f32,
    /// Total attempts per answer, including the first
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    /// Number of sources retrieved per question
    pub top_k: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            top_p: 0.9,
            max_retries: 3,
            retry_delay_ms: 500,
            top_k: 5,
        }
    }
}

impl LlmConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(RetrieverError::Config(
                "llm.max_retries must be at least 1".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(RetrieverError::Config("llm.top_k must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) || !(0.0..=1.0).contains(&self.top_p) {
            return Err(RetrieverError::Config(format!(
                "llm sampling out of range: temperature {}, top_p {}",
                self.temperature, self.top_p
            )));
        }
        Ok(())
    }
}

/// A hosted chat model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one prompt and return the completion text.
    async fn complete(&self, prompt: &str, config: &LlmConfig, api_key: &ApiKey) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub model_used: String,
    pub relevant_docs_count: usize,
    pub top_doc_score: Option<f32>,
    /// 1-based attempt that succeeded
    pub attempt: usize,
    pub response_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<SearchHit>,
    pub metadata: AnswerMetadata,
}

/// Label for the kind of collection a source path belongs to.
pub fn content_type_label(source: &str) -> &'static str {
    if source.contains("ai-medical-chatbot.csv") {
        "Medical Q&A Database"
    } else if source.contains("medquad.csv") {
        "Medical Knowledge Base"
    } else if source.contains("NIH") {
        "NIH Health Information"
    } else if source.contains("who") {
        "WHO Health Guidelines"
    } else {
        "Health Data"
    }
}

/// Render retrieved sources as the context block of a prompt.
pub fn build_context(hits: &[SearchHit]) -> String {
    let mut lines = Vec::with_capacity(hits.len() * 4);
    for (i, hit) in hits.iter().enumerate() {
        lines.push(format!(
            "[Source {}: {}]",
            i + 1,
            content_type_label(&hit.metadata.source)
        ));
        lines.push(format!("Relevance Score: {:.3}", hit.score));
        lines.push(format!("File: {}", hit.metadata.file_name()));
        lines.push("---".to_string());
    }
    lines.join("\n")
}

pub struct AnswerOrchestrator {
    engine: Arc<RetrievalEngine>,
    model: Arc<dyn LanguageModel>,
    config: LlmConfig,
    preamble: String,
}

impl AnswerOrchestrator {
    pub fn new(
        engine: Arc<RetrievalEngine>,
        model: Arc<dyn LanguageModel>,
        config: LlmConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            model,
            config,
            preamble: DEFAULT_PREAMBLE.to_string(),
        })
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn build_prompt(&self, query: &str, hits: &[SearchHit]) -> String {
        format!(
            "{}\n\nRELEVANT MEDICAL INFORMATION:\n{}\n\nUSER QUESTION: {}\n\nRESPONSE:",
            self.preamble,
            build_context(hits),
            query
        )
    }

    /// Retrieve sources for `query` and generate an answer from them.
    ///
    /// Retrieval errors are returned immediately. The model call is attempted
    /// up to `max_retries` times; the last error is returned if all fail.
    pub async fn answer(&self, query: &str, api_key: &ApiKey) -> Result<Answer> {
        let sources = self.engine.search(query, self.config.top_k).await?;
        let prompt = self.build_prompt(query, &sources);
        let delay = Duration::from_millis(self.config.retry_delay_ms);

        let mut last_error = None;
        for attempt in 1..=self.config.max_retries {
            match self.model.complete(&prompt, &self.config, api_key).await {
                Ok(response) => {
                    info!(
                        "Generated answer with {} on attempt {} from {} sources",
                        self.config.model,
                        attempt,
                        sources.len()
                    );
                    let metadata = AnswerMetadata {
                        query: query.to_string(),
                        timestamp: Utc::now(),
                        model_used: self.config.model.clone(),
                        relevant_docs_count: sources.len(),
                        top_doc_score: sources.first().map(|hit| hit.score),
                        attempt,
                        response_length: response.chars().count(),
                    };
                    return Ok(Answer {
                        response,
                        sources,
                        metadata,
                    });
                }
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < self.config.max_retries && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(RetrieverError::Llm(format!(
            "all {} attempts failed; last error: {}",
            self.config.max_retries,
            last_error.map_or_else(|| "none".to_string(), |e| e.to_string())
        )))
    }
}
