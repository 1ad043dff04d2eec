use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_core::error::AppError;
use sift_core::schema::SEQUENCE_KEY;
use sift_core::traits::{CompletionProvider, CompletionRequest};

const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI-compatible chat completion client for schema-guided extraction.
///
/// Model and API base are taken from each [`CompletionRequest`], so one
/// provider serves every configuration. Works with any OpenAI-compatible
/// API, including:
/// - OpenAI directly (`https://api.openai.com/v1`)
/// - Gemini via compatibility layer (`https://generativelanguage.googleapis.com/v1beta/openai`)
/// - Local servers such as vLLM or llama.cpp (`http://localhost:8000/v1`)
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new() -> Result<Self, AppError> {
        Self::build(None, DEFAULT_LLM_TIMEOUT)
    }

    /// Send `Authorization: Bearer <key>` with every call.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(self.api_key, timeout)
    }

    fn build(api_key: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            timeout_secs: timeout.as_secs(),
        })
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Message<'a>>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaWrapper,
}

#[derive(Serialize)]
struct JsonSchemaWrapper {
    name: String,
    strict: bool,
    schema: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<Vec<Value>, AppError> {
        let url = format!("{}/chat/completions", request.api_base.trim_end_matches('/'));
        let schema = request.schema.sequence_json_schema();

        let body = ChatRequest {
            model: request.model_id,
            temperature: request.temperature,
            messages: vec![
                Message {
                    role: "system",
                    content: request.system_message.into(),
                },
                Message {
                    role: "user",
                    content: format!(
                        "Extract every matching record according to this JSON schema:\n```json\n{}\n```\n\nFrom the following web content:\n\n{}",
                        serde_json::to_string_pretty(&schema)?,
                        request.user_message
                    )
                    .into(),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaWrapper {
                    name: schema_name(&request.schema.name),
                    strict: true,
                    schema,
                },
            },
        };

        let mut call = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();

            if status_code == 429 {
                return Err(AppError::RateLimitExceeded);
            }

            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {}: {}", status_code, body));

            return Err(AppError::LlmError {
                message,
                status_code,
                retryable: status_code >= 500,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse LLM response: {}", e)))?;

        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| AppError::LlmError {
                message: "Empty response from LLM".into(),
                status_code: status.as_u16(),
                retryable: false,
            })?;

        parse_instances(content)
    }
}

/// OpenAI restricts schema names to `[a-zA-Z0-9_-]`.
fn schema_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "extraction".to_string()
    } else {
        cleaned
    }
}

/// Accepts `{"items": [...]}`, a bare array, or a single object.
fn parse_instances(content: &str) -> Result<Vec<Value>, AppError> {
    let json = strip_code_fence(content);
    let value: Value = serde_json::from_str(json).map_err(|e| {
        AppError::SchemaValidationError(format!(
            "LLM returned invalid JSON: {}. Raw: {}",
            e, content
        ))
    })?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(SEQUENCE_KEY) {
            Some(Value::Array(items)) if map.is_empty() => Ok(items),
            Some(other) => {
                map.insert(SEQUENCE_KEY.to_string(), other);
                Ok(vec![Value::Object(map)])
            }
            None => Ok(vec![Value::Object(map)]),
        },
        other => Err(AppError::SchemaValidationError(format!(
            "LLM returned {} instead of a list of records",
            other
        ))),
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
