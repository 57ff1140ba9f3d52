use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;

use crate::sse::parse_sse_stream;
use crate::types::*;
use crate::{Provider, ProviderError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-3-pro";

pub fn default_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo {
            id: "gemini-3-pro".into(),
            name: "Gemini 3 Pro".into(),
            provider: "gemini".into(),
            context_window: 1_000_000,
            max_output_tokens: 65_536,
            supports_tools: true,
            supports_streaming: true,
            supports_vision: true,
            input_price_per_m: 1.25,
            output_price_per_m: 10.0,
            cache_read_price_per_m: 0.3125,
            cache_write_price_per_m: 0.0,
            tier: ModelTier::Advanced,
            thinking: Some(ThinkingSupport::gemini_levels(&["low", "medium", "high"])),
        },
        ModelInfo {
            id: "gemini-3-flash".into(),
            name: "Gemini 3 Flash".into(),
            provider: "gemini".into(),
            context_window: 1_000_000,
            max_output_tokens: 65_536,
            supports_tools: true,
            supports_streaming: true,
            supports_vision: true,
            input_price_per_m: 0.15,
            output_price_per_m: 0.6,
            cache_read_price_per_m: 0.0375,
            cache_write_price_per_m: 0.0,
            tier: ModelTier::Standard,
            thinking: Some(ThinkingSupport::gemini_levels(&["low", "medium", "high"])),
        },
        ModelInfo {
            id: "gemini-3-flash-lite".into(),
            name: "Gemini 3 Flash Lite".into(),
            provider: "gemini".into(),
            context_window: 1_000_000,
            max_output_tokens: 32_768,
            supports_tools: true,
            supports_streaming: true,
            supports_vision: false,
            input_price_per_m: 0.05,
            output_price_per_m: 0.2,
            cache_read_price_per_m: 0.0125,
            cache_write_price_per_m: 0.0,
            tier: ModelTier::Light,
            thinking: None,
        },
    ]
}

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    models: Vec<ModelInfo>,
}

impl GeminiProvider {
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

    fn build_contents(&self, request: &ChatRequest) -> Vec<serde_json::Value> {
        request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|msg| {
                let role = match msg.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                let parts: Vec<serde_json::Value> = match &msg.content {
                    MessageContent::Text(text) => vec![json!({"text": text})],
                    MessageContent::Parts(parts) => parts
                        .iter()
                        .map(|p| match p {
                            ContentPart::Text { text } => json!({"text": text}),
                            ContentPart::Image { media_type, data } => json!({
                                "inlineData": {"mimeType": media_type, "data": data}
                            }),
                            ContentPart::ToolUse { name, input, .. } => json!({
                                "functionCall": {"name": name, "args": input}
                            }),
                            ContentPart::ToolResult { tool_use_id, content } => json!({
                                "functionResponse": {
                                    "name": tool_use_id,
                                    "response": {"content": content},
                                }
                            }),
                        })
                        .collect(),
                };
                json!({"role": role, "parts": parts})
            })
            .collect()
    }

    fn build_tools(&self, tools: &[ToolDefinition]) -> serde_json::Value {
        let declarations: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        json!([{"functionDeclarations": declarations}])
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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

        let mut body = json!({ "contents": self.build_contents(request) });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        let mut generation_config = json!({});
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            generation_config["temperature"] = json!(temp);
        }
        if generation_config.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
            body["generationConfig"] = generation_config;
        }
        if !request.tools.is_empty() {
            body["tools"] = self.build_tools(&request.tools);
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let resp = self.client.post(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_http(status.as_u16(), body, None).into());
        }

        let data: serde_json::Value = resp.json().await?;
        let candidate = &data["candidates"][0];
        let content = candidate["content"]["parts"]
            .as_array()
            .and_then(|parts| parts.iter().find_map(|p| p["text"].as_str()))
            .unwrap_or("")
            .to_string();

        Ok(ChatResponse {
            message: Message {
                role: Role::Assistant,
                content: MessageContent::Text(content),
            },
            usage: Some(Usage {
                input_tokens: data["usageMetadata"]["promptTokenCount"]
                    .as_u64()
                    .unwrap_or(0) as u32,
                output_tokens: data["usageMetadata"]["candidatesTokenCount"]
                    .as_u64()
                    .unwrap_or(0) as u32,
                cache_read_tokens: data["usageMetadata"]["cachedContentTokenCount"]
                    .as_u64()
                    .unwrap_or(0) as u32,
                cache_creation_tokens: 0,
            }),
            finish_reason: candidate["finishReason"].as_str().map(String::from),
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

        let mut body = json!({ "contents": self.build_contents(request) });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        let mut generation_config = json!({});
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            generation_config["temperature"] = json!(temp);
        }
        if generation_config.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
            body["generationConfig"] = generation_config;
        }
        if !request.tools.is_empty() {
            body["tools"] = self.build_tools(&request.tools);
        }

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, self.api_key
        );
        let resp = self.client.post(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_http(status.as_u16(), body, None).into());
        }

        let sse_stream = parse_sse_stream(resp);
        let event_stream = sse_stream.map(|result| {
            result.and_then(|sse| {
                let data: serde_json::Value = serde_json::from_str(&sse.data)?;
                let candidate = &data["candidates"][0];

                if let Some(usage) = data.get("usageMetadata") {
                    if candidate["finishReason"].is_string() {
                        return Ok(StreamEvent::Usage(Usage {
                            input_tokens: usage["promptTokenCount"].as_u64().unwrap_or(0) as u32,
                            output_tokens: usage["candidatesTokenCount"].as_u64().unwrap_or(0)
                                as u32,
                            cache_read_tokens: usage["cachedContentTokenCount"]
                                .as_u64()
                                .unwrap_or(0) as u32,
                            cache_creation_tokens: 0,
                        }));
                    }
                }

                if let Some(parts) = candidate["content"]["parts"].as_array() {
                    for part in parts {
                        if let Some(text) = part["text"].as_str() {
                            return Ok(StreamEvent::TextDelta(text.to_string()));
                        }
                        if let Some(call) = part.get("functionCall") {
                            return Ok(StreamEvent::ToolCallStart {
                                index: 0,
                                id: call["name"].as_str().unwrap_or("").to_string(),
                                name: call["name"].as_str().unwrap_or("").to_string(),
                            });
                        }
                    }
                }

                Ok(StreamEvent::TextDelta(String::new()))
            })
        });

        Ok(Box::pin(event_stream))
    }
}
