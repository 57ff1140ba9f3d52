use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::openai::OpenAIProvider;
use crate::types::*;
use crate::Provider;

const DEFAULT_BASE_URL: &str = "https://models.inference.ai.azure.com";
const DEFAULT_MODEL: &str = "gpt-5.2";

pub fn default_models() -> Vec<ModelInfo> {
    crate::openai::default_models()
        .into_iter()
        .map(|mut m| {
            m.provider = "gh".into();
            m.input_price_per_m = 0.0;
            m.output_price_per_m = 0.0;
            m
        })
        .collect()
}

/// GitHub Models, wire-compatible with the OpenAI chat completions API.
pub struct GitHubModelsProvider {
    inner: OpenAIProvider,
}

impl GitHubModelsProvider {
    pub fn new(token: String, base_url: Option<String>, model: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            inner: OpenAIProvider::new(token, Some(base_url), Some(model))
                .with_models(default_models()),
        }
    }
}

#[async_trait]
impl Provider for GitHubModelsProvider {
    fn name(&self) -> &str {
        "gh"
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
