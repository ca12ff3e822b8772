//! One entry point wired from [`Config`]: token pool, clone orchestrator,
//! blame engine and commit extractor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use gf_core::config::{Config, ConfigError};
use gf_core::git2_ops::{BlameError, CloneOptions, HistoryError};
use gf_core::types::{BlameResult, CloneStatus, CloneTask, CommitRecord, Credential};
use gf_core::workspace::WorkspaceAllocator;
use gf_harness::token_manager::TokenManager;
use gf_telemetry::logging::init_from_settings;
use gf_telemetry::metrics::global_metrics;

use crate::blame::BulkBlameEngine;
use crate::history::CommitExtractor;
use crate::orchestrator::{CleanupReport, CloneOrchestrator};

const SERVICE_NAME: &str = "gitfleet";

pub struct RepoManager {
    config: Config,
    tokens: Arc<TokenManager>,
    orchestrator: CloneOrchestrator,
    blame: BulkBlameEngine,
    history: CommitExtractor,
}

impl RepoManager {
    /// Load `~/.gitfleet/config.toml` (or defaults) and build from it.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_config(Config::load()?)
    }

    /// Tokens are read from the env vars named in `[tokens]`.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let tokens = Arc::new(TokenManager::from_env(&config.tokens));
        Self::with_tokens(config, tokens)
    }

    /// Build around an existing token pool.
    pub fn with_tokens(config: Config, tokens: Arc<TokenManager>) -> Result<Self, ConfigError> {
        config.validate()?;
        let orchestrator = CloneOrchestrator::new(
            config.clone.max_concurrent,
            WorkspaceAllocator::from_config(&config.clone),
        )
        .with_options(CloneOptions::from(&config.clone))
        .with_token_manager(Arc::clone(&tokens), config.tokens.max_wait());

        info!(
            clone_pool = config.clone.max_concurrent,
            blame_pool = config.blame.effective_concurrency(),
            "repo manager ready"
        );

        Ok(Self {
            blame: BulkBlameEngine::from_config(&config.blame),
            history: CommitExtractor::from_config(&config.history),
            orchestrator,
            tokens,
            config,
        })
    }

    /// Install the `tracing` subscriber described by `[general]`.
    pub fn init_logging(&self) {
        init_from_settings(
            SERVICE_NAME,
            &self.config.general.log_level,
            self.config.general.json_logs(),
        );
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn orchestrator(&self) -> &CloneOrchestrator {
        &self.orchestrator
    }

    pub fn blame_engine(&self) -> &BulkBlameEngine {
        &self.blame
    }

    pub fn extractor(&self) -> &CommitExtractor {
        &self.history
    }

    // -----------------------------------------------------------------------
    // Clones
    // -----------------------------------------------------------------------

    pub async fn clone_all<I, S>(
        &self,
        urls: I,
        credential: Option<Credential>,
    ) -> BTreeMap<String, CloneTask>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.orchestrator.request_clone_all(urls, credential).await
    }

    pub async fn clone_one(&self, url: &str, credential: Option<Credential>) -> CloneTask {
        self.orchestrator.request_clone(url, credential).await
    }

    pub async fn snapshot(&self) -> BTreeMap<String, CloneTask> {
        self.orchestrator.snapshot().await
    }

    pub async fn cleanup(&self) -> CleanupReport {
        self.orchestrator.cleanup().await
    }

    /// Workspace of a completed clone.
    pub async fn workspace_for(&self, url: &str) -> Option<PathBuf> {
        self.orchestrator
            .get(url)
            .await
            .filter(|task| task.status == CloneStatus::Completed)
            .and_then(|task| task.workspace_path)
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    pub async fn bulk_blame<I, S>(
        &self,
        workspace: impl AsRef<Path>,
        paths: I,
    ) -> Result<BTreeMap<String, BlameResult>, BlameError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blame.bulk_blame(workspace, paths).await
    }

    pub async fn extract_commits(
        &self,
        workspace: impl AsRef<Path>,
    ) -> Result<Vec<CommitRecord>, HistoryError> {
        self.history.extract(workspace).await
    }

    pub fn stream_commits(
        &self,
        workspace: impl AsRef<Path>,
    ) -> flume::Receiver<Result<CommitRecord, HistoryError>> {
        self.history.stream(workspace)
    }

    /// Fleet metrics in Prometheus text format.
    pub fn metrics_text(&self) -> String {
        global_metrics().export_prometheus()
    }

    /// The same metrics as a JSON document with `counters`, `gauges` and
    /// `histograms` sections.
    pub fn metrics_json(&self) -> serde_json::Value {
        global_metrics().export_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_refused() {
        let mut config = Config::default();
        config.clone.max_concurrent = 0;
        assert!(matches!(
            RepoManager::from_config(config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn pools_follow_config() {
        let mut config = Config::default();
        config.clone.max_concurrent = 7;
        config.blame.max_concurrent = Some(2);
        let manager = RepoManager::with_tokens(config, Arc::new(TokenManager::new())).unwrap();
        assert_eq!(manager.orchestrator().pool().size(), 7);
        assert_eq!(manager.blame_engine().pool().size(), 2);
    }

    #[test]
    fn metrics_export_in_both_formats() {
        let manager =
            RepoManager::with_tokens(Config::default(), Arc::new(TokenManager::new())).unwrap();
        assert!(manager.metrics_text().contains("gitfleet_clones_in_flight"));

        let json = manager.metrics_json();
        assert!(json["gauges"]["gitfleet_clones_in_flight"].is_i64());
        let duration = &json["histograms"]["gitfleet_clone_duration_seconds"];
        assert!(duration["count"].is_u64(), "{json}");
        assert!(json["counters"].is_object());
    }
}
