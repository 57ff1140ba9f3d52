use anyhow::Result;

use crate::{AuthError, Credential};

pub fn env_var_name(provider: &str) -> &str {
    warden_config::find_provider_def(provider)
        .map(|p| p.env_var)
        .unwrap_or("UNKNOWN_API_KEY")
}

pub fn from_env(provider: &str) -> Result<Credential> {
    let var = env_var_name(provider);
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(Credential::ApiKey(key)),
        _ => Err(AuthError::NoApiKey {
            provider: provider.to_string(),
            env_var: var.to_string(),
        }
        .into()),
    }
}
