// Auraluxe Engine — Google Gemini Provider
// Implements the AiProvider trait over `models/{model}:generateContent`.
// Remote image references are fetched and sent as inline base64 data.

use crate::atoms::traits::{AiProvider, ProviderError};
use crate::engine::http::{
    classify_status, is_retryable_status, parse_retry_after, retry_delay, CircuitBreaker, MAX_RETRIES,
};
use crate::engine::types::*;
use async_trait::async_trait;
use base64::Engine as _;
use log::{error, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

// ── Struct ────────────────────────────────────────────────────────────────────

pub struct GoogleProvider {
    client: Client,
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    max_retries: u32,
    circuit: CircuitBreaker,
}

impl GoogleProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        let name = if config.id.is_empty() { config.kind.label().to_string() } else { config.id.clone() };
        GoogleProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            name,
            base_url,
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone().unwrap_or_default(),
            max_retries: MAX_RETRIES,
            circuit: CircuitBreaker::default(),
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Replace every remote image reference with an inline `data:` URL.
    async fn inline_remote_images(&self, messages: &[Message]) -> Result<Vec<Message>, ProviderError> {
        let mut out = Vec::with_capacity(messages.len());
        for msg in messages {
            let mut msg = msg.clone();
            if let MessageContent::Blocks(blocks) = &mut msg.content {
                for block in blocks.iter_mut() {
                    if let ContentBlock::ImageUrl { image_url } = block {
                        if !image_url.url.starts_with("data:") {
                            image_url.url = self.fetch_as_data_url(&image_url.url).await?;
                        }
                    }
                }
            }
            out.push(msg);
        }
        Ok(out)
    }

    async fn fetch_as_data_url(&self, url: &str) -> Result<String, ProviderError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("image fetch failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Transport(format!("image fetch {} returned {}", url, resp.status())));
        }
        let mime = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .filter(|m| m.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(format!("image read failed: {}", e)))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{};base64,{}", mime, encoded))
    }

    fn format_messages(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
        let mut system_texts: Vec<String> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_texts.push(msg.content.as_text()),
                Role::Function | Role::Tool => {
                    let fn_name = msg
                        .name
                        .clone()
                        .or_else(|| msg.tool_call_id.clone())
                        .unwrap_or_else(|| "tool".into());
                    let result: Value = serde_json::from_str(&msg.content.as_text())
                        .unwrap_or_else(|_| json!(msg.content.as_text()));
                    contents.push(json!({
                        "role": "function",
                        "parts": [{
                            "functionResponse": {
                                "name": fn_name,
                                "response": { "result": result }
                            }
                        }]
                    }));
                }
                Role::User | Role::Assistant => {
                    let role = if msg.role == Role::Assistant { "model" } else { "user" };
                    let mut parts: Vec<Value> = Vec::new();
                    match &msg.content {
                        MessageContent::Text(s) => parts.push(json!({"text": s})),
                        MessageContent::Blocks(blocks) => {
                            for block in blocks {
                                match block {
                                    ContentBlock::Text { text } => parts.push(json!({"text": text})),
                                    ContentBlock::ImageUrl { image_url } => {
                                        if let Some((mime_type, b64)) = image_url
                                            .url
                                            .strip_prefix("data:")
                                            .and_then(|rest| rest.split_once(";base64,"))
                                        {
                                            parts.push(json!({
                                                "inlineData": { "mimeType": mime_type, "data": b64 }
                                            }));
                                        }
                                    }
                                }
                            }
                        }
                    }
                    if let Some(calls) = &msg.tool_calls {
                        for tc in calls {
                            let args: Value = serde_json::from_str(&tc.function.arguments).unwrap_or(json!({}));
                            parts.push(json!({"functionCall": {"name": tc.function.name, "args": args}}));
                        }
                    }
                    contents.push(json!({"role": role, "parts": parts}));
                }
            }
        }

        // ── Merge consecutive same-role messages ──────────────────────
        // Gemini requires strictly alternating user/model turns.
        let mut merged: Vec<Value> = Vec::new();
        for entry in contents {
            let entry_role = entry["role"].as_str().unwrap_or("").to_string();
            let can_merge = entry_role != "function"
                && merged.last().and_then(|e| e["role"].as_str()) == Some(entry_role.as_str());
            match merged.last_mut() {
                Some(last) if can_merge => {
                    if let (Some(existing), Some(new_parts)) = (last["parts"].as_array().cloned(), entry["parts"].as_array()) {
                        let mut combined = existing;
                        combined.extend(new_parts.iter().cloned());
                        last["parts"] = json!(combined);
                    }
                }
                _ => merged.push(entry),
            }
        }

        let system_instruction = (!system_texts.is_empty())
            .then(|| json!({"parts": [{"text": system_texts.join("\n\n")}]}));
        (system_instruction, merged)
    }

    /// Strip schema fields Gemini rejects (`additionalProperties`, empty
    /// `required`, empty `properties`).
    fn sanitize_schema(val: &Value) -> Value {
        match val {
            Value::Object(map) => {
                let mut clean = serde_json::Map::new();
                for (k, v) in map {
                    if k == "additionalProperties" || k == "$schema" || k == "$ref" {
                        continue;
                    }
                    if (k == "required" && v.as_array().is_some_and(|a| a.is_empty()))
                        || (k == "properties" && v.as_object().is_some_and(|o| o.is_empty()))
                    {
                        continue;
                    }
                    clean.insert(k.clone(), Self::sanitize_schema(v));
                }
                if clean.get("type").and_then(|v| v.as_str()) == Some("object") && !clean.contains_key("properties") {
                    clean.remove("type");
                }
                Value::Object(clean)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(Self::sanitize_schema).collect()),
            other => other.clone(),
        }
    }

    fn format_tools(tools: &[ToolDefinition]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.function.name,
                    "description": t.function.description,
                    "parameters": Self::sanitize_schema(&t.function.parameters),
                })
            })
            .collect();
        json!([{ "functionDeclarations": declarations }])
    }

    pub(crate) fn parse_response(v: &Value) -> Result<Completion, ProviderError> {
        let candidate = v["candidates"]
            .get(0)
            .ok_or_else(|| ProviderError::Parse("response has no candidates".into()))?;
        let parts = candidate["content"]["parts"].as_array().cloned().unwrap_or_default();

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in &parts {
            if part["thought"].as_bool() == Some(true) {
                continue;
            }
            if let Some(t) = part["text"].as_str() {
                text.push_str(t);
            }
            if let Some(fc) = part.get("functionCall") {
                if let Some(name) = fc["name"].as_str() {
                    tool_calls.push(ToolCall {
                        id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                        call_type: "function".into(),
                        function: FunctionCall {
                            name: name.to_string(),
                            arguments: fc.get("args").cloned().unwrap_or(json!({})).to_string(),
                        },
                    });
                }
            }
        }

        if text.is_empty() && tool_calls.is_empty() {
            let reason = candidate["finishReason"].as_str().unwrap_or("unknown");
            return Err(ProviderError::Parse(format!("empty candidate (finishReason={})", reason)));
        }

        Ok(Completion { text, tool_calls, model: v["modelVersion"].as_str().map(|s| s.to_string()) })
    }
}

// ── AiProvider implementation ─────────────────────────────────────────────────

#[async_trait]
impl AiProvider for GoogleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let model = if request.model.is_empty() { self.default_model.as_str() } else { request.model.as_str() };
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(model),
            urlencoding::encode(&self.api_key)
        );

        let messages = self.inline_remote_images(&request.messages).await?;
        let (system_instruction, contents) = Self::format_messages(&messages);
        if contents.is_empty() {
            return Err(ProviderError::Parse("no user content to send".into()));
        }

        let mut body = json!({ "contents": contents });
        if let Some(sys) = system_instruction {
            body["systemInstruction"] = sys;
        }
        if !request.tools.is_empty() {
            body["tools"] = Self::format_tools(&request.tools);
        }
        let mut generation = serde_json::Map::new();
        if let Some(temp) = request.temperature {
            generation.insert("temperature".into(), json!(temp));
        }
        if let Some(max) = request.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(max));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        info!("[provider] {} request model={}", self.name, model);

        if let Err(msg) = self.circuit.check() {
            return Err(ProviderError::Transport(msg));
        }

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1).await;
                warn!("[provider] {} retry {}/{} after {}ms", self.name, attempt, self.max_retries, delay.as_millis());
            }

            let response = match self.client.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    self.circuit.record_failure();
                    if attempt < self.max_retries {
                        attempt += 1;
                        continue;
                    }
                    // reqwest errors can embed the URL (and so the key); keep only the kind.
                    let kind = if e.is_timeout() { "timeout" } else if e.is_connect() { "connect" } else { "request" };
                    return Err(ProviderError::Transport(format!("HTTP {} failure", kind)));
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
