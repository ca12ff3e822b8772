use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{CommitOrder, Credential, ProviderType};

/// Top-level configuration loaded from `~/.gitfleet/config.toml`.
///
/// **Security**: tokens never live in this file. The `[tokens]` section only
/// names the environment variables that hold them; see [`CredentialProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub clone: CloneConfig,
    #[serde(default)]
    pub blame: BlameConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
}

impl Config {
    /// Load config from `~/.gitfleet/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.clone.validate()?;
        if self.blame.max_concurrent == Some(0) {
            return Err(ConfigError::Validation(
                "blame.max_concurrent must be at least 1".into(),
            ));
        }
        if self.history.stream_buffer == 0 {
            return Err(ConfigError::Validation(
                "history.stream_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gitfleet")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "human" | "json") {
            return Err(ConfigError::Validation(format!(
                "general.log_format must be \"human\" or \"json\", got {:?}",
                self.log_format
            )));
        }
        Ok(())
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneConfig {
    #[serde(default = "default_clone_concurrency")]
    pub max_concurrent: usize,
    /// Shallow clone depth. `None` clones full history.
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Parent directory for workspaces. `None` uses the system temp dir.
    #[serde(default)]
    pub workspace_root: Option<String>,
    #[serde(default = "default_workspace_prefix")]
    pub workspace_prefix: String,
    #[serde(default)]
    pub branch: Option<String>,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_clone_concurrency(),
            depth: None,
            timeout_secs: None,
            workspace_root: None,
            workspace_prefix: default_workspace_prefix(),
            branch: None,
        }
    }
}

impl CloneConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "clone.max_concurrent must be at least 1".into(),
            ));
        }
        if self.depth == Some(0) {
            return Err(ConfigError::Validation(
                "clone.depth must be at least 1 (omit it for a full clone)".into(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "clone.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn default_clone_concurrency() -> usize {
    5
}
fn default_workspace_prefix() -> String {
    "gitfleet-".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlameConfig {
    /// Defaults to the number of available CPU cores.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

impl BlameConfig {
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrent.unwrap_or_else(available_cores)
    }
}

pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub order: CommitOrder,
    #[serde(default)]
    pub include_stats: bool,
    #[serde(default)]
    pub max_count: Option<usize>,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            order: CommitOrder::default(),
            include_stats: false,
            max_count: None,
            stream_buffer: default_stream_buffer(),
        }
    }
}

fn default_stream_buffer() -> usize {
    256
}

/// Env-var names for provider token lists. Values are comma-separated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    #[serde(default = "default_github_env")]
    pub github_tokens_env: String,
    #[serde(default = "default_gitlab_env")]
    pub gitlab_tokens_env: String,
    #[serde(default = "default_bitbucket_env")]
    pub bitbucket_tokens_env: String,
    /// How long a clone may wait for a token reset before failing.
    #[serde(default)]
    pub max_wait_secs: u64,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            github_tokens_env: default_github_env(),
            gitlab_tokens_env: default_gitlab_env(),
            bitbucket_tokens_env: default_bitbucket_env(),
            max_wait_secs: 0,
        }
    }
}

impl TokensConfig {
    pub fn env_var(&self, provider: ProviderType) -> &str {
        match provider {
            ProviderType::GitHub => &self.github_tokens_env,
            ProviderType::GitLab => &self.gitlab_tokens_env,
            ProviderType::BitBucket => &self.bitbucket_tokens_env,
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

fn default_github_env() -> String {
    "GITHUB_TOKENS".into()
}
fn default_gitlab_env() -> String {
    "GITLAB_TOKENS".into()
}
fn default_bitbucket_env() -> String {
    "BITBUCKET_TOKENS".into()
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Resolves provider tokens from the environment at runtime.
pub struct CredentialProvider;

impl CredentialProvider {
    /// Tokens for `provider`, read from the env var named in `tokens`.
    ///
    /// Falls back to the singular variable (`GITHUB_TOKEN` for
    /// `GITHUB_TOKENS`) when the list variable is unset or empty.
    pub fn tokens_for(tokens: &TokensConfig, provider: ProviderType) -> Vec<Credential> {
        let var = tokens.env_var(provider);
        let mut found = std::env::var(var)
            .map(|v| Self::split_tokens(&v))
            .unwrap_or_default();
        if found.is_empty() {
            if let Some(single) = var.strip_suffix('S') {
                found = std::env::var(single)
                    .map(|v| Self::split_tokens(&v))
                    .unwrap_or_default();
            }
        }
        found.into_iter().map(Credential::new).collect()
    }

    /// Split a comma-separated token list, dropping blanks.
    pub fn split_tokens(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.clone.max_concurrent, 5);
        assert_eq!(cfg.clone.workspace_prefix, "gitfleet-");
        assert_eq!(cfg.history.stream_buffer, 256);
        assert_eq!(cfg.tokens.github_tokens_env, "GITHUB_TOKENS");
        assert!(cfg.blame.effective_concurrency() >= 1);
    }

    #[test]
    fn split_tokens_trims_and_drops_blanks() {
        assert_eq!(
            CredentialProvider::split_tokens(" a, b,,c ,"),
            vec!["a".to_string(), "b".into(), "c".into()]
        );
        assert!(CredentialProvider::split_tokens("").is_empty());
    }

    #[test]
    fn env_var_per_provider() {
        let t = TokensConfig::default();
        assert_eq!(t.env_var(ProviderType::GitLab), "GITLAB_TOKENS");
        assert_eq!(t.env_var(ProviderType::BitBucket), "BITBUCKET_TOKENS");
    }
}
