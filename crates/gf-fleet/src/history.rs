//! Commit extraction off the async runtime.
//!
//! libgit2 walks are blocking, so every walk runs on `spawn_blocking`.
//! [`CommitExtractor::extract`] returns the whole history or one error;
//! [`CommitExtractor::stream`] hands records over a bounded channel as the
//! walk produces them.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn, Instrument};

use gf_core::config::HistoryConfig;
use gf_core::git2_ops::{HistoryError, HistoryOptions, HistoryReader};
use gf_core::types::CommitRecord;
use gf_telemetry::metrics::{global_metrics, COMMITS_EXTRACTED_TOTAL};
use gf_telemetry::tracing_setup::create_operation_span;

pub type Result<T> = std::result::Result<T, HistoryError>;

const DEFAULT_STREAM_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct CommitExtractor {
    options: HistoryOptions,
    stream_buffer: usize,
}

impl Default for CommitExtractor {
    fn default() -> Self {
        Self::new(HistoryOptions::default())
    }
}

impl CommitExtractor {
    pub fn new(options: HistoryOptions) -> Self {
        Self {
            options,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn from_config(cfg: &HistoryConfig) -> Self {
        Self::new(HistoryOptions::from(cfg)).with_stream_buffer(cfg.stream_buffer)
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    pub fn options(&self) -> &HistoryOptions {
        &self.options
    }

    /// Open `workspace` for a lazy walk on the calling thread.
    pub fn reader(&self, workspace: impl AsRef<Path>) -> Result<HistoryReader> {
        HistoryReader::open(workspace.as_ref())
    }

    /// Every commit reachable from `HEAD`, in the configured order.
    /// Either the complete list or a single error, never a partial list.
    pub async fn extract(&self, workspace: impl AsRef<Path>) -> Result<Vec<CommitRecord>> {
        let workspace = workspace.as_ref().to_path_buf();
        let options = self.options.clone();
        let (span, _trace_id) = create_operation_span("extract_commits");

        async move {
            let shown = workspace.display().to_string();
            let records = tokio::task::spawn_blocking(move || {
                HistoryReader::open(&workspace)?.collect(&options)
            })
            .await
            .map_err(|e| HistoryError::Corrupt(format!("history worker aborted: {}", e)))?;

            match &records {
                Ok(commits) => {
                    global_metrics().increment_counter_by(
                        COMMITS_EXTRACTED_TOTAL,
                        &[],
                        commits.len() as u64,
                    );
                    info!(workspace = %shown, commits = commits.len(), "history extracted");
                }
                Err(e) => warn!(workspace = %shown, error = %e, "history extraction failed"),
            }
            records
        }
        .instrument(span)
        .await
    }

    /// Walk `workspace` in the background and yield records as they come.
    ///
    /// The channel holds at most `stream_buffer` records; the walk waits for
    /// the consumer. It ends after the last commit or the first error, and
    /// stops early when the receiver is dropped. Must be called from within a
    /// tokio runtime.
    pub fn stream(&self, workspace: impl AsRef<Path>) -> flume::Receiver<Result<CommitRecord>> {
        let (tx, rx) = flume::bounded(self.stream_buffer);
        let workspace: PathBuf = workspace.as_ref().to_path_buf();
        let options = self.options.clone();
        let (span, _trace_id) = create_operation_span("stream_commits");

        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let reader = match HistoryReader::open(&workspace) {
                Ok(reader) => reader,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            let walk = match reader.commits(&options) {
                Ok(walk) => walk,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };

            let mut sent = 0u64;
            for record in walk {
                if tx.send(record).is_err() {
                    debug!(sent, "history consumer went away");
                    break;
                }
                sent += 1;
            }
            global_metrics().increment_counter_by(COMMITS_EXTRACTED_TOTAL, &[], sent);
        });

        rx
    }
}
