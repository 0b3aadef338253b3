//! HTTP extractor against an Anthropic-style messages endpoint. Requests are
//! non-streaming; the single text block in the reply must be a JSON object
//! describing one candidate task.

use crate::context::ExtractionContext;
use crate::extractor::{ExtractError, Extractor};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

pub struct HttpExtractor {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl HttpExtractor {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Reads `ANTHROPIC_API_KEY` from the environment.
    pub fn from_env() -> Result<Self, ExtractError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ExtractError::ApiKey("ANTHROPIC_API_KEY not set".to_string()))?;
        if api_key.is_empty() {
            return Err(ExtractError::ApiKey("ANTHROPIC_API_KEY is empty".to_string()));
        }
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    fn system_prompt(context: &ExtractionContext) -> String {
        let context_json =
            serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());
        format!(
            "You extract a single actionable task from a clinical transcript.\n\
             Respond with ONLY a JSON object, no prose, with keys:\n\
             description (string), participant_id (integer or null),\n\
             patient_id (integer or null), category_id (integer or null),\n\
             due_date (RFC 3339 string or null), confidence (number 0..1),\n\
             source_spans (array of {{start, end}} character offsets).\n\
             Resolve names against this reference data. When a name does not\n\
             match any entry, or the match is ambiguous, use null for that id\n\
             rather than guessing.\n\n{context_json}"
        )
    }

    fn parse_body(body: &str) -> Result<Value, ExtractError> {
        let response: MessagesResponse =
            serde_json::from_str(body).map_err(|e| ExtractError::Malformed(e.to_string()))?;
        let text = response
            .content
            .iter()
            .find(|b| b.block_type == "text")
            .map(|b| b.text.trim())
            .filter(|t| !t.is_empty())
            .ok_or(ExtractError::EmptyResponse)?;
        // Models sometimes wrap JSON in a fenced block despite instructions.
        let text = text
            .strip_prefix("```json")
            .or_else(|| text.strip_prefix("```"))
            .map(|t| t.trim_end_matches("```").trim())
            .unwrap_or(text);
        serde_json::from_str(text).map_err(|e| ExtractError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(
        &self,
        transcript: &str,
        context: &ExtractionContext,
    ) -> Result<Value, ExtractError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Self::system_prompt(context),
            messages: vec![ApiMessage {
                role: "user",
                content: transcript.to_string(),
            }],
        };

        debug!(model = %self.model, transcript_len = transcript.len(), "extraction request");

        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;
        Self::parse_body(&body)
    }
}
