use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;

use crate::sse::parse_sse_stream;
use crate::types::*;
use crate::{Provider, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-opus-4-6";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub fn default_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo {
            id: "claude-opus-4-6".into(),
            name: "Claude Opus 4.6".into(),
            provider: "anthropic".into(),
            context_window: 500_000,
            max_output_tokens: 64_000,
            supports_tools: true,
            supports_streaming: true,
            supports_vision: true,
            input_price_per_m: 15.0,
            output_price_per_m: 75.0,
            cache_read_price_per_m: 1.5,
            cache_write_price_per_m: 18.75,
            tier: ModelTier::Advanced,
            thinking: Some(ThinkingSupport::anthropic_budget(32_000)),
        },
        ModelInfo {
            id: "claude-sonnet-4-6".into(),
            name: "Claude Sonnet 4.6".into(),
            provider: "anthropic".into(),
            context_window: 500_000,
            max_output_tokens: 64_000,
            supports_tools: true,
            supports_streaming: true,
            supports_vision: true,
            input_price_per_m: 3.0,
            output_price_per_m: 15.0,
            cache_read_price_per_m: 0.3,
            cache_write_price_per_m: 3.75,
            tier: ModelTier::Standard,
            thinking: Some(ThinkingSupport::anthropic_budget(16_000)),
        },
        ModelInfo {
            id: "claude-haiku-4-6".into(),
            name: "Claude Haiku 4.6".into(),
            provider: "anthropic".into(),
            context_window: 200_000,
            max_output_tokens: 32_000,
            supports_tools: true,
            supports_streaming: true,
            supports_vision: true,
            input_price_per_m: 0.8,
            output_price_per_m: 4.0,
            cache_read_price_per_m: 0.08,
            cache_write_price_per_m: 1.0,
            tier: ModelTier::Light,
            thinking: None,
        },
    ]
}

pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    models: Vec<ModelInfo>,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            models: default_models(),
        }
    }

    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        if !models.is_empty() {
            self.models = models;
        }
        self
    }

    fn build_messages(&self, request: &ChatRequest) -> Vec<serde_json::Value> {
        request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|msg| {
                let role = if msg.role == Role::Tool {
                    "user"
                } else {
                    role_str(&msg.role)
                };
                match &msg.content {
                    MessageContent::Text(text) => json!({"role": role, "content": text}),
                    MessageContent::Parts(parts) => {
                        let content: Vec<serde_json::Value> = parts
                            .iter()
                            .map(|p| match p {
                                ContentPart::Text { text } => {
                                    json!({"type": "text", "text": text})
                                }
                                ContentPart::Image { media_type, data } => json!({
                                    "type": "image",
                                    "source": {
                                        "type": "base64",
                                        "media_type": media_type,
                                        "data": data,
                                    }
                                }),
                                ContentPart::ToolUse { id, name, input } => json!({
                                    "type": "tool_use",
                                    "id": id,
                                    "name": name,
                                    "input": input,
                                }),
                                ContentPart::ToolResult { tool_use_id, content } => json!({
                                    "type": "tool_result",
                                    "tool_use_id": tool_use_id,
                                    "content": content,
                                }),
                            })
                            .collect();
                        json!({"role": role, "content": content})
                    }
                }
            })
            .collect()
    }

    fn build_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect()
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "user",
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supported_models(&self) -> &[ModelInfo] {
        &self.models
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(8192),
            "messages": self.build_messages(request),
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(self.build_tools(&request.tools));
        }
        if let Some(thinking) = &request.thinking {
            if thinking.enabled {
                body["thinking"] = json!({
                    "type": "enabled",
                    "budget_tokens": thinking.budget_tokens.unwrap_or(16_000),
                });
            }
        }

        let url = format!("{}/messages", self.base_url);
        let resp = self.request(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let body = resp.text().await.unwrap_or_default();
            return Err(
                ProviderError::from_http(status.as_u16(), body, retry_after.as_deref()).into(),
            );
        }

        let data: serde_json::Value = resp.json().await?;
        let content = data["content"]
            .as_array()
            .and_then(|parts| parts.iter().find(|p| p["type"] == "text"))
            .and_then(|p| p["text"].as_str())
            .unwrap_or("")
            .to_string();

        Ok(ChatResponse {
            message: Message {
                role: Role::Assistant,
                content: MessageContent::Text(content),
            },
            usage: Some(Usage {
                input_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
                output_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
                cache_read_tokens: data["usage"]["cache_read_input_tokens"]
                    .as_u64()
                    .unwrap_or(0) as u32,
                cache_creation_tokens: data["usage"]["cache_creation_input_tokens"]
                    .as_u64()
                    .unwrap_or(0) as u32,
            }),
            finish_reason: data["stop_reason"].as_str().map(String::from),
        })
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(8192),
            "messages": self.build_messages(request),
            "stream": true,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(self.build_tools(&request.tools));
        }
        if let Some(thinking) = &request.thinking {
            if thinking.enabled {
                body["thinking"] = json!({
                    "type": "enabled",
                    "budget_tokens": thinking.budget_tokens.unwrap_or(16_000),
                });
            }
        }

        let url = format!("{}/messages", self.base_url);
        let resp = self.request(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let body = resp.text().await.unwrap_or_default();
            return Err(
                ProviderError::from_http(status.as_u16(), body, retry_after.as_deref()).into(),
            );
        }

        let sse_stream = parse_sse_stream(resp);
        let event_stream = sse_stream.map(|result| {
            result.and_then(|sse| {
                let data: serde_json::Value = serde_json::from_str(&sse.data)?;
                let event_type = sse.event.as_deref().unwrap_or("");

                match event_type {
                    "content_block_delta" => {
                        let delta = &data["delta"];
                        match delta["type"].as_str() {
                            Some("text_delta") => Ok(StreamEvent::TextDelta(
                                delta["text"].as_str().unwrap_or("").to_string(),
                            )),
                            Some("thinking_delta") => Ok(StreamEvent::ThinkingDelta(
                                delta["thinking"].as_str().unwrap_or("").to_string(),
                            )),
                            Some("input_json_delta") => Ok(StreamEvent::ToolCallDelta {
                                index: data["index"].as_u64().unwrap_or(0) as u32,
                                arguments_delta: delta["partial_json"]
                                    .as_str()
                                    .unwrap_or("")
                                    .to_string(),
                            }),
                            _ => Ok(StreamEvent::TextDelta(String::new())),
                        }
                    }
                    "content_block_start" => {
                        let block = &data["content_block"];
                        if block["type"] == "tool_use" {
                            Ok(StreamEvent::ToolCallStart {
                                index: data["index"].as_u64().unwrap_or(0) as u32,
                                id: block["id"].as_str().unwrap_or("").to_string(),
                                name: block["name"].as_str().unwrap_or("").to_string(),
                            })
                        } else {
                            Ok(StreamEvent::TextDelta(String::new()))
                        }
                    }
                    "content_block_stop" => Ok(StreamEvent::ToolCallDone {
                        index: data["index"].as_u64().unwrap_or(0) as u32,
                    }),
                    "message_delta" => Ok(StreamEvent::Usage(Usage {
                        input_tokens: 0,
                        output_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
                        cache_read_tokens: 0,
                        cache_creation_tokens: 0,
                    })),
                    "message_stop" => Ok(StreamEvent::Done),
                    "error" => Ok(StreamEvent::Error(
                        data["error"]["message"].as_str().unwrap_or("").to_string(),
                    )),
                    _ => Ok(StreamEvent::TextDelta(String::new())),
                }
            })
        });

        Ok(Box::pin(event_stream))
    }
}
