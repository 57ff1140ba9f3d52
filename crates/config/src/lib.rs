use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown panel engine '{0}' (expected legacy, parallel, or adk)")]
    UnknownPanelEngine(String),
    #[error("invalid provider '{provider}': {reason}")]
    InvalidProvider { provider: String, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
    #[serde(default)]
    pub secrets: SecretStoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

// ---------------------------------------------------------------------------
// Provider configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Exactly one provider is active at a time.
    #[serde(default = "default_provider")]
    pub active: String,
    /// Ordered sequence of fallback providers. Never contains `active`.
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    #[serde(default, flatten)]
    pub providers: HashMap<String, ProviderEntry>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            active: default_provider(),
            fallback_chain: Vec::new(),
            providers: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    pub fn entry(&self, name: &str) -> Option<&ProviderEntry> {
        self.providers.get(name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for id in &self.fallback_chain {
            if id == &self.active {
                return Err(ConfigError::InvalidProvider {
                    provider: id.clone(),
                    reason: "fallback chain must not contain the active provider".into(),
                });
            }
            if !seen.insert(id) {
                return Err(ConfigError::InvalidProvider {
                    provider: id.clone(),
                    reason: "fallback chain contains a duplicate entry".into(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_style: Option<String>,
    #[serde(default)]
    pub context_window: Option<u32>,
    #[serde(default)]
    pub cost_per_1k_in: Option<f64>,
    #[serde(default)]
    pub cost_per_1k_out: Option<f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostPreference {
    Minimize,
    Balance,
    Performance,
}

impl Default for CostPreference {
    fn default() -> Self {
        CostPreference::Balance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub cost_preference: CostPreference,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: None,
            cost_preference: CostPreference::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Governance: panel engine selector, token budget, council scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelEngine {
    Legacy,
    Parallel,
    Adk,
}

impl Default for PanelEngine {
    fn default() -> Self {
        PanelEngine::Parallel
    }
}

impl std::str::FromStr for PanelEngine {
    type Err = ConfigError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" => Ok(PanelEngine::Legacy),
            "parallel" => Ok(PanelEngine::Parallel),
            "adk" => Ok(PanelEngine::Adk),
            other => Err(ConfigError::UnknownPanelEngine(other.to_string())),
        }
    }
}

fn default_max_parallel() -> usize {
    3
}

fn default_max_steps_per_role() -> u32 {
    10
}

fn default_max_depth() -> u32 {
    2
}

fn default_deadline_ms() -> u64 {
    5 * 60 * 1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub panel_engine: PanelEngine,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_max_steps_per_role")]
    pub max_steps_per_role: u32,
    /// Non-configurable in spirit; exposed so callers can assert it, not raise it.
    #[serde(default = "default_max_depth")]
    pub max_delegation_depth: u32,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub token_budget: TokenBudgetConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            panel_engine: PanelEngine::default(),
            max_parallel: default_max_parallel(),
            max_steps_per_role: default_max_steps_per_role(),
            max_delegation_depth: default_max_depth(),
            deadline_ms: default_deadline_ms(),
            interactive: false,
            token_budget: TokenBudgetConfig::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

fn default_per_request_cap() -> u32 {
    32_000
}
fn default_per_session_cap() -> u32 {
    500_000
}
fn default_per_day_cap() -> u32 {
    2_000_000
}
fn default_alert_ratio() -> f64 {
    0.8
}
fn default_hard_stop_ratio() -> f64 {
    0.95
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudgetConfig {
    #[serde(default = "default_per_request_cap")]
    pub per_request_cap: u32,
    #[serde(default = "default_per_session_cap")]
    pub per_session_cap: u32,
    #[serde(default = "default_per_day_cap")]
    pub per_day_cap: u32,
    #[serde(default = "default_alert_ratio")]
    pub alert_ratio: f64,
    #[serde(default = "default_hard_stop_ratio")]
    pub hard_stop_ratio: f64,
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self {
            per_request_cap: default_per_request_cap(),
            per_session_cap: default_per_session_cap(),
            per_day_cap: default_per_day_cap(),
            alert_ratio: default_alert_ratio(),
            hard_stop_ratio: default_hard_stop_ratio(),
        }
    }
}

impl TokenBudgetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hard_stop_ratio < self.alert_ratio {
            return Err(ConfigError::InvalidProvider {
                provider: "token_budget".into(),
                reason: format!(
                    "hard_stop_ratio ({}) must be >= alert_ratio ({})",
                    self.hard_stop_ratio, self.alert_ratio
                ),
            });
        }
        Ok(())
    }
}

fn default_initial_backoff_secs() -> u64 {
    30
}
fn default_max_backoff_secs() -> u64 {
    300
}

/// Backoff sequence: `min(initial * 2^k, max)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl FallbackConfig {
    pub fn backoff_secs(&self, attempt: u32) -> u64 {
        let scaled = self.initial_backoff_secs.saturating_mul(1u64 << attempt.min(16));
        scaled.min(self.max_backoff_secs)
    }
}

// ---------------------------------------------------------------------------
// Secret store
// ---------------------------------------------------------------------------

fn default_pbkdf2_iterations() -> u32 {
    100_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretStoreConfig {
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

// ---------------------------------------------------------------------------
// Local vector index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub embedding_mode: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

// ---------------------------------------------------------------------------
// Known provider registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProviderDef {
    pub id: &'static str,
    pub name: &'static str,
    pub env_var: &'static str,
    pub default_base_url: &'static str,
    pub api_style: &'static str,
}

pub const BUILT_IN_PROVIDERS: &[ProviderDef] = &[
    ProviderDef {
        id: "openai",
        name: "OpenAI",
        env_var: "OPENAI_API_KEY",
        default_base_url: "https://api.openai.com/v1",
        api_style: "openai",
    },
    ProviderDef {
        id: "anthropic",
        name: "Anthropic",
        env_var: "ANTHROPIC_API_KEY",
        default_base_url: "https://api.anthropic.com/v1",
        api_style: "anthropic",
    },
    ProviderDef {
        id: "gemini",
        name: "Google Gemini",
        env_var: "GEMINI_API_KEY",
        default_base_url: "https://generativelanguage.googleapis.com/v1beta",
        api_style: "gemini",
    },
    ProviderDef {
        id: "vertex",
        name: "Google Vertex AI",
        env_var: "GOOGLE_CLOUD_PROJECT",
        default_base_url: "https://us-central1-aiplatform.googleapis.com/v1",
        api_style: "gemini",
    },
    ProviderDef {
        id: "gh",
        name: "GitHub Models",
        env_var: "GITHUB_TOKEN",
        default_base_url: "https://models.inference.ai.azure.com",
        api_style: "openai",
    },
    ProviderDef {
        id: "ollama",
        name: "Ollama (local)",
        env_var: "OLLAMA_HOST",
        default_base_url: "http://localhost:11434/v1",
        api_style: "openai",
    },
];

pub fn find_provider_def(id: &str) -> Option<&'static ProviderDef> {
    BUILT_IN_PROVIDERS.iter().find(|p| p.id == id)
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading, merging, persistence
// ---------------------------------------------------------------------------

impl Config {
    /// Resolves the layered-file precedence: global config merged with an
    /// optional project-local config. Flag/env overrides are applied by callers.
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        match Self::load_project(&std::env::current_dir().unwrap_or_default())? {
            Some(project) => Ok(Self::merge(&global, &project)),
            None => Ok(global),
        }
    }

    fn load_global() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })
                .context("failed to read global config")?;
            toml::from_str(&content)
                .map_err(|source| ConfigError::Parse { path, source })
                .context("failed to parse global config")
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn data_dir() -> PathBuf {
        Self::config_dir().join("data")
    }

    pub fn secrets_dir() -> PathBuf {
        Self::config_dir().join("secrets")
    }

    pub fn audit_dir() -> PathBuf {
        Self::config_dir().join("audit")
    }

    pub fn ensure_dirs() -> Result<()> {
        std::fs::create_dir_all(Self::config_dir())?;
        std::fs::create_dir_all(Self::data_dir())?;
        std::fs::create_dir_all(Self::secrets_dir())?;
        std::fs::create_dir_all(Self::audit_dir())?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        Self::ensure_dirs()?;
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&path, content).context("failed to write config file")?;
        Ok(())
    }

    pub fn load_project(project_root: &std::path::Path) -> Result<Option<Self>> {
        let path = project_root.join(".warden").join("config.local.toml");
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })
                .context("failed to read project config")?;
            let config: Config = toml::from_str(&content)
                .map_err(|source| ConfigError::Parse { path, source })
                .context("failed to parse project config")?;
            Ok(Some(config))
        } else {
            Ok(None)
        }
    }

    /// Project config overrides global per-field only where it diverges from
    /// that field's own default, so an untouched project field never erases
    /// a meaningful global setting.
    pub fn merge(global: &Config, project: &Config) -> Config {
        let provider = {
            let mut merged = global.provider.providers.clone();
            for (k, proj_entry) in &project.provider.providers {
                let base = merged.remove(k).unwrap_or_default();
                merged.insert(k.clone(), merge_provider_entry(&base, proj_entry));
            }
            let fallback_chain = if !project.provider.fallback_chain.is_empty() {
                project.provider.fallback_chain.clone()
            } else {
                global.provider.fallback_chain.clone()
            };
            ProviderConfig {
                active: if project.provider.active != default_provider() {
                    project.provider.active.clone()
                } else {
                    global.provider.active.clone()
                },
                fallback_chain,
                providers: merged,
            }
        };

        Config {
            provider,
            models: ModelsConfig {
                max_tokens: if project.models.max_tokens != default_max_tokens() {
                    project.models.max_tokens
                } else {
                    global.models.max_tokens
                },
                temperature: project.models.temperature.or(global.models.temperature),
                cost_preference: project.models.cost_preference,
            },
            governance: GovernanceConfig {
                panel_engine: project.governance.panel_engine,
                max_parallel: if project.governance.max_parallel != default_max_parallel() {
                    project.governance.max_parallel
                } else {
                    global.governance.max_parallel
                },
                max_steps_per_role: project.governance.max_steps_per_role,
                max_delegation_depth: default_max_depth(),
                deadline_ms: if project.governance.deadline_ms != default_deadline_ms() {
                    project.governance.deadline_ms
                } else {
                    global.governance.deadline_ms
                },
                interactive: project.governance.interactive || global.governance.interactive,
                token_budget: project.governance.token_budget.clone(),
                fallback: project.governance.fallback.clone(),
            },
            secrets: global.secrets.clone(),
            index: IndexConfig {
                embedding_mode: if !project.index.embedding_mode.is_empty() {
                    project.index.embedding_mode.clone()
                } else {
                    global.index.embedding_mode.clone()
                },
                exclude: {
                    let mut ex = global.index.exclude.clone();
                    ex.extend(project.index.exclude.clone());
                    ex
                },
            },
        }
    }
}

fn merge_provider_entry(global: &ProviderEntry, project: &ProviderEntry) -> ProviderEntry {
    ProviderEntry {
        api_key: project.api_key.clone().or_else(|| global.api_key.clone()),
        base_url: project.base_url.clone().or_else(|| global.base_url.clone()),
        model: project.model.clone().or_else(|| global.model.clone()),
        api_style: project
            .api_style
            .clone()
            .or_else(|| global.api_style.clone()),
        context_window: project.context_window.or(global.context_window),
        cost_per_1k_in: project.cost_per_1k_in.or(global.cost_per_1k_in),
        cost_per_1k_out: project.cost_per_1k_out.or(global.cost_per_1k_out),
        enabled: project.enabled && global.enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_budget_rejects_inverted_ratios() {
        let budget = TokenBudgetConfig {
            hard_stop_ratio: 0.5,
            alert_ratio: 0.8,
            ..TokenBudgetConfig::default()
        };
        assert!(budget.validate().is_err());
    }

    #[test]
    fn provider_config_rejects_active_in_fallback() {
        let cfg = ProviderConfig {
            active: "anthropic".into(),
            fallback_chain: vec!["anthropic".into()],
            providers: HashMap::new(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn provider_config_rejects_duplicate_fallback() {
        let cfg = ProviderConfig {
            active: "anthropic".into(),
            fallback_chain: vec!["openai".into(), "openai".into()],
            providers: HashMap::new(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn panel_engine_parses_known_values() {
        assert_eq!("parallel".parse::<PanelEngine>().unwrap(), PanelEngine::Parallel);
        assert_eq!("ADK".parse::<PanelEngine>().unwrap(), PanelEngine::Adk);
        assert!("bogus".parse::<PanelEngine>().is_err());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = Config::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.provider.active, cfg.provider.active);
    }

    #[test]
    fn merge_prefers_project_overrides() {
        let global = Config::default();
        let mut project = Config::default();
        project.provider.active = "openai".into();
        let merged = Config::merge(&global, &project);
        assert_eq!(merged.provider.active, "openai");
    }

    #[test]
    fn fallback_backoff_caps_at_max() {
        let cfg = FallbackConfig::default();
        assert_eq!(cfg.backoff_secs(0), 30);
        assert_eq!(cfg.backoff_secs(1), 60);
        assert_eq!(cfg.backoff_secs(10), 300);
    }
}
