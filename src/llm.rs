use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{AppError, Result};

/// How the model is asked to shape its answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Output constrained to a JSON Schema.
    JsonSchema { name: String, schema: Value, strict: bool },
    /// Any syntactically valid JSON object.
    JsonObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
    pub format: ResponseFormat,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one request and return the model's output text, if it produced any.
    async fn respond(&self, request: ModelRequest) -> Result<Option<String>>;
}

#[derive(Serialize)]
struct InputText<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: Vec<InputText<'a>>,
}

impl<'a> InputMessage<'a> {
    fn new(role: &'static str, text: &'a str) -> Self {
        Self {
            role,
            content: vec![InputText { kind: "input_text", text }],
        }
    }
}

#[derive(Serialize)]
struct TextOptions {
    format: Value,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    text: TextOptions,
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesReply {
    fn output_text(self) -> Option<String> {
        let text: String = self
            .output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

fn format_value(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::JsonSchema { name, schema, strict } => serde_json::json!({
            "type": "json_schema",
            "name": name,
            "strict": strict,
            "schema": schema,
        }),
        ResponseFormat::JsonObject => serde_json::json!({ "type": "json_object" }),
    }
}

/// Client for the OpenAI Responses API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn respond(&self, request: ModelRequest) -> Result<Option<String>> {
        let body = ResponsesRequest {
            model: &self.model,
            input: vec![
                InputMessage::new("system", &request.system),
                InputMessage::new("user", &request.user),
            ],
            text: TextOptions {
                format: format_value(&request.format),
            },
            temperature: 1.0,
            top_p: 1.0,
            max_output_tokens: 2048,
        };

        debug!(model = %self.model, input_chars = request.user.len(), "calling language model");
        let res = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LlmError(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "language model request failed");
            return Err(AppError::LlmError(format!("status {}: {}", status.as_u16(), detail)));
        }

        let reply: ResponsesReply = res
            .json()
            .await
            .map_err(|e| AppError::LlmError(format!("Invalid response format from LLM: {}", e)))?;
        Ok(reply.output_text())
    }
}
