pub mod api_key;
pub mod vault;

mod error;

pub use error::{AuthError, VaultError};
pub use vault::Vault;

use anyhow::Result;

#[derive(Debug, Clone)]
pub enum Credential {
    ApiKey(String),
    Bearer(String),
}

impl Credential {
    pub fn header_value(&self) -> String {
        match self {
            Credential::ApiKey(key) => key.clone(),
            Credential::Bearer(token) => token.clone(),
        }
    }

    pub fn is_bearer(&self) -> bool {
        matches!(self, Credential::Bearer(_))
    }
}

/// Resolves a credential for `provider`: explicit config key, then
/// environment variable, then the local vault at `vault_dir` (if opened).
/// Callers never branch on "secret vs env" — the vault falls back to the
/// environment transparently when no vault entry exists.
pub fn resolve_credential(
    provider: &str,
    config_key: Option<&str>,
    vault: Option<&Vault>,
) -> Result<Credential> {
    if let Some(key) = config_key {
        return Ok(Credential::ApiKey(key.to_string()));
    }

    if let Ok(cred) = api_key::from_env(provider) {
        return Ok(cred);
    }

    if let Some(vault) = vault {
        let env_var = api_key::env_var_name(provider);
        if let Ok(value) = vault.get(provider, env_var) {
            return Ok(Credential::ApiKey(value));
        }
    }

    let env_var = api_key::env_var_name(provider);
    Err(AuthError::NoCredential {
        provider: provider.to_string(),
        env_var: env_var.to_string(),
        oauth_hint: String::new(),
    }
    .into())
}

/// Returns the auth status string for a provider, for display purposes.
pub fn auth_status(provider: &str, vault: Option<&Vault>) -> &'static str {
    if api_key::from_env(provider).is_ok() {
        return "env";
    }
    if let Some(vault) = vault {
        let env_var = api_key::env_var_name(provider);
        if vault.get(provider, env_var).is_ok() {
            return "vault";
        }
    }
    "not connected"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_credential_prefers_explicit_config_key() {
        let cred = resolve_credential("openai", Some("explicit-key"), None).unwrap();
        assert!(matches!(cred, Credential::ApiKey(k) if k == "explicit-key"));
    }

    #[test]
    fn resolve_credential_errors_with_env_var_hint_when_absent() {
        std::env::remove_var("UNKNOWN_API_KEY");
        let err = resolve_credential("nonexistent-provider", None, None).unwrap_err();
        assert!(err.to_string().contains("UNKNOWN_API_KEY"));
    }
}
