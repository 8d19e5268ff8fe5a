//! OpenAI-compatible chat completion client for vision models.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use geo_vision::{ChatMessage, ResponseFormat, VisionError, VisionModel, VisionResult};

use crate::config::EndpointSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Vision model reached over HTTP at a `/chat/completions` endpoint.
pub struct HttpVisionModel {
    client: Client,
    settings: EndpointSettings,
}

impl HttpVisionModel {
    pub fn new(settings: EndpointSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl VisionModel for HttpVisionModel {
    async fn complete(&self, messages: Vec<ChatMessage>, response_format: ResponseFormat) -> VisionResult<String> {
        let body = CompletionRequest {
            model: &self.settings.model,
            messages: &messages,
            response_format,
            temperature: Some(0.2),
        };

        let mut request = self.client.post(&self.settings.endpoint).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!("POST {} (model {})", self.settings.endpoint, self.settings.model);
        let response = request
            .send()
            .await
            .map_err(|e| VisionError::ModelInvocation(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(VisionError::ModelInvocation(format!("{status}: {message}")));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| VisionError::ModelInvocation(format!("Failed to parse response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| VisionError::ModelInvocation("No completion in response".to_string()))
    }
}

impl std::fmt::Debug for HttpVisionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVisionModel")
            .field("endpoint", &self.settings.endpoint)
            .field("model", &self.settings.model)
            .field("api_key", &self.settings.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
