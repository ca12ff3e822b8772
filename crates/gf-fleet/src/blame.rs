//! Bulk blame: per-file blame fanned out over its own bounded pool.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, Instrument};

use gf_core::config::BlameConfig;
use gf_core::git2_ops::{BlameError, Git2ReadOps};
use gf_core::types::BlameResult;
use gf_telemetry::metrics::{global_metrics, BLAME_FILES_TOTAL};
use gf_telemetry::tracing_setup::{create_child_span, create_operation_span};

use crate::scheduler::WorkerPool;

pub struct BulkBlameEngine {
    pool: WorkerPool,
}

impl BulkBlameEngine {
    pub fn new(concurrency: usize) -> Self {
        Self {
            pool: WorkerPool::new("blame", concurrency),
        }
    }

    /// Pool sized from `[blame] max_concurrent`, or the CPU count.
    pub fn from_config(cfg: &BlameConfig) -> Self {
        Self::new(cfg.effective_concurrency())
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Blame every path in `workspace`.
    ///
    /// The result has one entry per distinct path. A file that cannot be
    /// blamed carries its error message and leaves the rest untouched. Only a
    /// workspace that is not a repository fails the whole call.
    pub async fn bulk_blame<I, S>(
        &self,
        workspace: impl AsRef<Path>,
        paths: I,
    ) -> Result<BTreeMap<String, BlameResult>, BlameError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let workspace = Arc::new(workspace.as_ref().to_path_buf());
        let paths: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        let (span, trace_id) = create_operation_span("bulk_blame");
        self.run(workspace, paths, &trace_id).instrument(span).await
    }

    async fn run(
        &self,
        workspace: Arc<PathBuf>,
        paths: BTreeSet<String>,
        trace_id: &str,
    ) -> Result<BTreeMap<String, BlameResult>, BlameError> {
        let target = Arc::clone(&workspace);
        tokio::task::spawn_blocking(move || Git2ReadOps::open(&target).map(|_| ()))
            .await
            .map_err(|e| BlameError::Git(e.to_string()))??;

        info!(
            workspace = %workspace.display(),
            files = paths.len(),
            pool = self.pool.size(),
            "bulk blame started"
        );

        let jobs = paths.into_iter().map(|path| {
            let workspace = Arc::clone(&workspace);
            let span = create_child_span(trace_id, "blame", &path);
            async move {
                let result = self.blame_one(workspace, path.clone()).await;
                (path, result)
            }
            .instrument(span)
        });
        let results: BTreeMap<String, BlameResult> = join_all(jobs).await.into_iter().collect();

        let failed = results.values().filter(|r| !r.is_ok()).count();
        info!(files = results.len(), failed, "bulk blame finished");
        Ok(results)
    }

    async fn blame_one(&self, workspace: Arc<PathBuf>, path: String) -> BlameResult {
        let _permit = match self.pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => return BlameResult::Error(e.to_string()),
        };

        let result = tokio::task::spawn_blocking(move || {
            BlameResult::from(Git2ReadOps::blame_file(&workspace, &path))
        })
        .await
        .unwrap_or_else(|e| BlameResult::Error(format!("blame worker aborted: {}", e)));

        let status = if result.is_ok() { "ok" } else { "error" };
        if let Some(error) = result.error() {
            debug!(error = %error, "file not blamed");
        }
        global_metrics().increment_counter(BLAME_FILES_TOTAL, &[("status", status)]);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_follows_config() {
        let engine = BulkBlameEngine::from_config(&BlameConfig {
            max_concurrent: Some(3),
        });
        assert_eq!(engine.pool().size(), 3);
        assert_eq!(engine.pool().name(), "blame");
    }

    #[tokio::test]
    async fn non_repository_fails_whole_call() {
        let dir = tempfile::tempdir().unwrap();
        let engine = BulkBlameEngine::new(2);
        let err = engine
            .bulk_blame(dir.path(), ["a.rs", "b.rs"])
            .await
            .unwrap_err();
        assert!(matches!(err, BlameError::InvalidRepository(_)));
    }

    #[tokio::test]
    async fn empty_path_list_is_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        let engine = BulkBlameEngine::new(2);
        let result = engine
            .bulk_blame(dir.path(), Vec::<String>::new())
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
