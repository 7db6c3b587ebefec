// Auraluxe Engine — OpenAI-Compatible Provider
// Handles: OpenAI, Groq and any OpenAI-compatible `/chat/completions` API.
// Implements the AiProvider trait with a non-streaming request.

use crate::atoms::traits::{AiProvider, ProviderError};
use crate::engine::http::{
    classify_status, is_retryable_status, parse_retry_after, retry_delay, CircuitBreaker, MAX_RETRIES,
};
use crate::engine::types::{
    truncate_utf8, Completion, CompletionRequest, ContentBlock, FunctionCall, Message, MessageContent,
    ProviderConfig, ProviderKind, ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

// ── OpenAI provider struct ─────────────────────────────────────────────────

pub struct OpenAiProvider {
    client: Client,
    name: String,
    kind: ProviderKind,
    base_url: String,
    api_key: String,
    default_model: String,
    max_retries: u32,
    circuit: CircuitBreaker,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        let name = if config.id.is_empty() { config.kind.label().to_string() } else { config.id.clone() };
        OpenAiProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            name,
            kind: config.kind,
            base_url,
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone().unwrap_or_default(),
            max_retries: MAX_RETRIES,
            circuit: CircuitBreaker::default(),
        }
    }

    /// Override the same-provider retry budget for transient 5xx/transport errors.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    fn format_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let content_val = match &msg.content {
                    MessageContent::Text(s) => json!(s),
                    MessageContent::Blocks(blocks) => {
                        let parts: Vec<Value> = blocks
                            .iter()
                            .map(|b| match b {
                                ContentBlock::Text { text } => json!({"type": "text", "text": text}),
                                ContentBlock::ImageUrl { image_url } => json!({
                                    "type": "image_url",
                                    "image_url": {
                                        "url": image_url.url,
                                        "detail": image_url.detail.as_deref().unwrap_or("auto"),
                                    }
                                }),
                            })
                            .collect();
                        json!(parts)
                    }
                };
                let mut m = json!({
                    "role": msg.role,
                    "content": content_val,
                });
                if let Some(tc) = &msg.tool_calls {
                    m["tool_calls"] = json!(tc);
                }
                if let Some(id) = &msg.tool_call_id {
                    m["tool_call_id"] = json!(id);
                }
                if let Some(name) = &msg.name {
                    m["name"] = json!(name);
                }
                m
            })
            .collect()
    }

    fn format_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": t.tool_type,
                    "function": {
                        "name": t.function.name,
                        "description": t.function.description,
                        "parameters": t.function.parameters,
                    }
                })
            })
            .collect()
    }

    /// Extract text + tool calls from a `chat.completion` response body.
    pub(crate) fn parse_response(v: &Value) -> Result<Completion, ProviderError> {
        let choice = v["choices"]
            .get(0)
            .ok_or_else(|| ProviderError::Parse("response has no choices".into()))?;
        let message = &choice["message"];
        let text = message["content"].as_str().unwrap_or_default().to_string();

        let tool_calls: Vec<ToolCall> = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        let name = tc["function"]["name"].as_str()?;
                        Some(ToolCall {
                            id: tc["id"].as_str().unwrap_or_default().to_string(),
                            call_type: "function".into(),
                            function: FunctionCall {
                                name: name.to_string(),
                                arguments: tc["function"]["arguments"].as_str().unwrap_or("{}").to_string(),
                            },
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Completion {
            text,
            tool_calls,
            model: v["model"].as_str().map(|s| s.to_string()),
        })
    }
}

// ── AiProvider implementation ──────────────────────────────────────────────

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let model = if request.model.is_empty() { self.default_model.as_str() } else { request.model.as_str() };

        let mut body = json!({
            "model": model,
            "messages": Self::format_messages(&request.messages),
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(Self::format_tools(&request.tools));
            body["tool_choice"] = json!("auto");
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = json!(max);
        }

        info!("[provider] {} request to {} model={}", self.name, url, model);

        if let Err(msg) = self.circuit.check() {
            return Err(ProviderError::Transport(msg));
        }

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1).await;
                warn!("[provider] {} retry {}/{} after {}ms", self.name, attempt, self.max_retries, delay.as_millis());
            }

            let response = match self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    self.circuit.record_failure();
                    if attempt < self.max_retries {
                        attempt += 1;
                        continue;
                    }
                    return Err(ProviderError::Transport(format!("HTTP request failed: {}", e)));
                }
            };

            let status = response.status().as_u16();
            if !response.status().is_success() {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body_text = response.text().await.unwrap_or_default();
                error!("[provider] {} error {}: {}", self.name, status, truncate_utf8(&body_text, 500));
                self.circuit.record_failure();

                if is_retryable_status(status) && attempt < self.max_retries {
                    attempt += 1;
                    continue;
                }
                return Err(classify_status(status, &body_text, retry_after));
            }

            let v: Value = response
                .json()
                .await
                .map_err(|e| ProviderError::Parse(format!("invalid response body: {}", e)))?;
            self.circuit.record_success();
            return Self::parse_response(&v);
        }
    }
}
