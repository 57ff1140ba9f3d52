#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {status} - {body}")]
    HttpError { status: u16, body: String },

    #[error("SSE stream error: {0}")]
    StreamError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("context window exceeded: {0}")]
    ContextOverflow(String),

    #[error("authentication failed for provider '{0}'")]
    AuthenticationFailed(String),

    #[error("malformed request: {0}")]
    RequestMalformed(String),

    #[error("every provider in the fallback chain is cooling, retry after {retry_after_secs}s")]
    AllProvidersCooling { retry_after_secs: u64 },
}

impl ProviderError {
    /// Classifies an HTTP failure response into the taxonomy the fallback
    /// chain reasons over: authentication/malformed errors fail fast,
    /// everything else (rate limit, timeout, 5xx) is transient and eligible
    /// for fallback.
    pub fn from_http(status: u16, body: String, retry_after: Option<&str>) -> Self {
        match status {
            401 | 403 => ProviderError::AuthenticationFailed(body),
            400 | 404 | 422 => ProviderError::RequestMalformed(body),
            429 => {
                let retry_after_ms = retry_after
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
                    .unwrap_or(30_000);
                ProviderError::RateLimited { retry_after_ms }
            }
            _ => ProviderError::HttpError { status, body },
        }
    }

    /// Transient failures are eligible for fallback; auth/malformed errors fail fast.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::HttpError { .. }
                | ProviderError::RateLimited { .. }
                | ProviderError::StreamError(_)
        )
    }
}
