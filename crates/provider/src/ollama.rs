use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::openai::OpenAIProvider;
use crate::types::*;
use crate::Provider;

const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL: &str = "llama3.3";

pub fn default_models() -> Vec<ModelInfo> {
    vec![ModelInfo {
        id: "llama3.3".into(),
        name: "Llama 3.3".into(),
        provider: "ollama".into(),
        context_window: 128_000,
        max_output_tokens: 8_192,
        supports_tools: true,
        supports_streaming: true,
        supports_vision: false,
        input_price_per_m: 0.0,
        output_price_per_m: 0.0,
        cache_read_price_per_m: 0.0,
        cache_write_price_per_m: 0.0,
        tier: ModelTier::Standard,
        thinking: None,
    }]
}

/// Local Ollama server, wire-compatible with the OpenAI chat completions API.
/// No credential is required; `api_key` is an arbitrary placeholder the
/// server ignores.
pub struct OllamaProvider {
    inner: OpenAIProvider,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            inner: OpenAIProvider::new("ollama".to_string(), Some(base_url), Some(model))
                .with_models(default_models()),
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn supported_models(&self) -> &[ModelInfo] {
        self.inner.supported_models()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.inner.chat(request).await
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.inner.chat_stream(request).await
    }
}
