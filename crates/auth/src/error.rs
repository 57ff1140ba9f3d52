#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no credential found for provider '{provider}'. Set {env_var}{oauth_hint}")]
    NoCredential {
        provider: String,
        env_var: String,
        oauth_hint: String,
    },

    #[error("no API key found for provider '{provider}'. Set {env_var} or configure in ~/.warden/config.toml")]
    NoApiKey { provider: String, env_var: String },
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("vault already initialized at {0} (pass force=true to overwrite)")]
    AlreadyInitialized(std::path::PathBuf),

    #[error("vault not initialized; run `warden secret init` first")]
    NotInitialized,

    #[error("authentication_failed: wrong master password or corrupted ciphertext")]
    AuthenticationFailed,

    #[error("secret not found for service '{service}' key '{key}'")]
    NotFound { service: String, key: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] toml::de::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
