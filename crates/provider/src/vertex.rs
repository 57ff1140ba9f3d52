use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;

use crate::sse::parse_sse_stream;
use crate::types::*;
use crate::{Provider, ProviderError};

const DEFAULT_MODEL: &str = "gemini-3-pro";

pub fn default_models() -> Vec<ModelInfo> {
    crate::gemini::default_models()
        .into_iter()
        .map(|mut m| {
            m.provider = "vertex".into();
            m
        })
        .collect()
}

/// Gemini models fronted by Vertex AI, authenticated with a bearer access
/// token instead of an API key query parameter.
pub struct VertexProvider {
    client: reqwest::Client,
    endpoint_base: String,
    access_token: String,
    default_model: String,
    models: Vec<ModelInfo>,
}

impl VertexProvider {
    pub fn new(access_token: String, endpoint_base: Option<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            endpoint_base: endpoint_base.unwrap_or_default(),
            access_token,
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
                let text = msg.content.as_text().to_string();
                json!({"role": role, "parts": [{"text": text}]})
            })
            .collect()
    }
}

#[async_trait]
impl Provider for VertexProvider {
    fn name(&self) -> &str {
        "vertex"
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

        let url = format!("{}/{}:generateContent", self.endpoint_base, model);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

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
                cache_read_tokens: 0,
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

        let url = format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.endpoint_base, model
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

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

                if let Some(parts) = candidate["content"]["parts"].as_array() {
                    for part in parts {
                        if let Some(text) = part["text"].as_str() {
                            return Ok(StreamEvent::TextDelta(text.to_string()));
                        }
                    }
                }
                if candidate["finishReason"].is_string() {
                    return Ok(StreamEvent::Done);
                }

                Ok(StreamEvent::TextDelta(String::new()))
            })
        });

        Ok(Box::pin(event_stream))
    }
}
