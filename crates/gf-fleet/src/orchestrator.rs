//! Clone orchestrator: owns the table of clone tasks and runs clones through
//! a bounded worker pool.
//!
//! Each requested URL gets one [`CloneTask`]. Work for a task runs on its own
//! tokio task: validate the URL, pick a credential (possibly waiting for a
//! token reset), wait for a pool slot, allocate a workspace, then hand the
//! blocking libgit2 clone to `spawn_blocking` while progress flows back over
//! a channel into the table. A failure is recorded on that task only; the
//! batch always runs to the end.
//!
//! Every task carries a `watch` flag that flips once it is terminal, so a
//! caller re-requesting a URL another caller is already cloning waits for
//! that clone instead of returning early.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn, Instrument};

use gf_core::git2_ops::{CloneError, CloneOptions, Git2Cloner, GitCloner, RemoteUrl};
use gf_core::types::{CloneStatus, CloneTask, Credential, ProviderType};
use gf_core::workspace::{label_for_url, WorkspaceAllocator, WorkspaceError};
use gf_harness::token_manager::{RateLimitError, TokenManager};
use gf_telemetry::metrics::{
    global_metrics, CLONES_IN_FLIGHT, CLONES_TOTAL, CLONE_DURATION_SECONDS,
};
use gf_telemetry::tracing_setup::{create_child_span, create_operation_span};

use crate::scheduler::WorkerPool;

/// Per-URL outcome of [`CloneOrchestrator::cleanup`].
pub type CleanupReport = BTreeMap<String, Result<(), WorkspaceError>>;

/// A task plus the flag its waiters watch.
struct Slot {
    task: CloneTask,
    done: watch::Sender<bool>,
}

impl Slot {
    fn new(task: CloneTask) -> Self {
        let (done, _) = watch::channel(false);
        Self { task, done }
    }
}

/// What a request should do about one URL.
enum Registration {
    /// Start a clone, reusing the workspace when given.
    Launch(Option<PathBuf>),
    /// Someone else is cloning it; wait for the flag.
    Await(watch::Receiver<bool>),
    /// Already completed.
    Settled,
}

// ---------------------------------------------------------------------------
// CloneOrchestrator
// ---------------------------------------------------------------------------

/// Runs clones concurrently and tracks the state of every requested URL.
///
/// Cheap to clone; clones share the same task table and pool.
#[derive(Clone)]
pub struct CloneOrchestrator {
    tasks: Arc<RwLock<HashMap<String, Slot>>>,
    pool: WorkerPool,
    allocator: WorkspaceAllocator,
    cloner: Arc<dyn GitCloner>,
    tokens: Option<Arc<TokenManager>>,
    token_wait: Duration,
    options: CloneOptions,
}

impl CloneOrchestrator {
    /// Orchestrator backed by libgit2 with `pool_size` concurrent clones.
    pub fn new(pool_size: usize, allocator: WorkspaceAllocator) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            pool: WorkerPool::new("clone", pool_size),
            allocator,
            cloner: Arc::new(Git2Cloner),
            tokens: None,
            token_wait: Duration::ZERO,
            options: CloneOptions::default(),
        }
    }

    /// Swap the clone primitive (useful for testing).
    pub fn with_cloner(mut self, cloner: Arc<dyn GitCloner>) -> Self {
        self.cloner = cloner;
        self
    }

    /// Draw credentials from `tokens` for URLs on a known provider when the
    /// caller passes none. A clone waits up to `max_wait` for a token reset.
    pub fn with_token_manager(mut self, tokens: Arc<TokenManager>, max_wait: Duration) -> Self {
        self.tokens = Some(tokens);
        self.token_wait = max_wait;
        self
    }

    pub fn with_options(mut self, options: CloneOptions) -> Self {
        self.options = options;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Clone every URL and wait until each of them is terminal.
    ///
    /// Returns the state of every requested URL. Completed URLs are not
    /// cloned again and URLs already in flight are awaited rather than
    /// restarted; failed ones are retried.
    pub async fn request_clone_all<I, S>(
        &self,
        urls: I,
        credential: Option<Credential>,
    ) -> BTreeMap<String, CloneTask>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        let (span, trace_id) = create_operation_span("clone_batch");

        async {
            info!(count = urls.len(), pool = self.pool.size(), "clone batch started");
            let mut launched = Vec::new();
            let mut pending = Vec::new();
            for url in &urls {
                match self.register(url).await {
                    Registration::Launch(reuse) => {
                        let handle =
                            self.launch(url.clone(), reuse, credential.clone(), &trace_id);
                        launched.push((url.clone(), handle));
                    }
                    Registration::Await(done) => pending.push(done),
                    Registration::Settled => {}
                }
            }
            self.await_workers(launched).await;
            // A dropped sender means the slot was replaced after it settled.
            join_all(pending.into_iter().map(|mut done| async move {
                let _ = done.wait_for(|finished| *finished).await;
            }))
            .await;

            let tasks = self.tasks.read().await;
            let result: BTreeMap<String, CloneTask> = urls
                .iter()
                .filter_map(|u| tasks.get(u).map(|slot| (u.clone(), slot.task.clone())))
                .collect();
            let failed = result
                .values()
                .filter(|t| matches!(t.status, CloneStatus::Failed { .. }))
                .count();
            info!(total = result.len(), failed, "clone batch finished");
            result
        }
        .instrument(span)
        .await
    }

    /// Clone a single URL and wait for it to finish.
    pub async fn request_clone(
        &self,
        url: impl Into<String>,
        credential: Option<Credential>,
    ) -> CloneTask {
        let url = url.into();
        let mut result = self.request_clone_all([url.clone()], credential).await;
        result.remove(&url).unwrap_or_else(|| CloneTask::new(url))
    }

    /// Consistent copy of every task. Never waits on a running clone.
    pub async fn snapshot(&self) -> BTreeMap<String, CloneTask> {
        self.tasks
            .read()
            .await
            .iter()
            .map(|(url, slot)| (url.clone(), slot.task.clone()))
            .collect()
    }

    pub async fn get(&self, url: &str) -> Option<CloneTask> {
        self.tasks.read().await.get(url).map(|slot| slot.task.clone())
    }

    /// Remove every allocated workspace. Tasks stay in the table with their
    /// path cleared. Running tasks report [`WorkspaceError::Busy`].
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::new();
        let mut to_remove = Vec::new();
        {
            let mut tasks = self.tasks.write().await;
            for (url, Slot { task, .. }) in tasks.iter_mut() {
                // Detached before removal so a retry never reuses a dying path.
                match task.workspace_path.take() {
                    None => {
                        report.insert(url.clone(), Ok(()));
                    }
                    Some(path) if !task.status.is_terminal() => {
                        report.insert(
                            url.clone(),
                            Err(WorkspaceError::Busy(path.display().to_string())),
                        );
                        task.workspace_path = Some(path);
                    }
                    Some(path) => to_remove.push((url.clone(), path)),
                }
            }
        }

        let removals = to_remove.into_iter().map(|(url, path)| {
            let allocator = self.allocator.clone();
            async move {
                let target = path.clone();
                let outcome = tokio::task::spawn_blocking(move || allocator.remove(&target))
                    .await
                    .unwrap_or_else(|e| {
                        Err(WorkspaceError::Remove {
                            path: path.display().to_string(),
                            reason: e.to_string(),
                        })
                    });
                (url, path, outcome)
            }
        });

        for (url, path, outcome) in join_all(removals).await {
            if let Err(e) = &outcome {
                warn!(url = %url, error = %e, "workspace removal failed");
                let mut tasks = self.tasks.write().await;
                if let Some(slot) = tasks.get_mut(&url) {
                    if slot.task.workspace_path.is_none() {
                        slot.task.workspace_path = Some(path);
                    }
                }
            }
            report.insert(url, outcome);
        }
        report
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Decide what to do about `url`. A failed task is never edited back to
    /// `Queued`: its slot is replaced by a fresh task that inherits only the
    /// workspace.
    async fn register(&self, url: &str) -> Registration {
        let mut tasks = self.tasks.write().await;
        let reuse = match tasks.get(url) {
            None => None,
            Some(slot) => match &slot.task.status {
                CloneStatus::Failed { .. } => {
                    debug!(url = %url, "retrying failed clone");
                    slot.task.workspace_path.clone()
                }
                CloneStatus::Completed => return Registration::Settled,
                status => {
                    debug!(url = %url, status = %status, "clone in flight, waiting for it");
                    return Registration::Await(slot.done.subscribe());
                }
            },
        };
        let task = CloneTask {
            workspace_path: reuse.clone(),
            ..CloneTask::new(url)
        };
        tasks.insert(url.to_string(), Slot::new(task));
        Registration::Launch(reuse)
    }

    fn launch(
        &self,
        url: String,
        reuse: Option<PathBuf>,
        credential: Option<Credential>,
        trace_id: &str,
    ) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        let span = create_child_span(trace_id, "clone", &url);
        tokio::spawn(async move { this.run(url, reuse, credential).await }.instrument(span))
    }

    /// Wait for workers. A worker that died without finishing is failed here.
    async fn await_workers(&self, launched: Vec<(String, tokio::task::JoinHandle<()>)>) {
        let (urls, handles): (Vec<_>, Vec<_>) = launched.into_iter().unzip();
        for (url, joined) in urls.into_iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                warn!(url = %url, error = %e, "clone worker aborted");
                self.finish(&url, Err(format!("clone worker aborted: {}", e)))
                    .await;
            }
        }
    }

    async fn run(&self, url: String, reuse: Option<PathBuf>, credential: Option<Credential>) {
        let remote = match RemoteUrl::parse(&url) {
            Ok(remote) => remote,
            Err(e) => {
                warn!(url = %url, "rejecting malformed clone URL");
                self.finish(&url, Err(e.to_string())).await;
                return;
            }
        };

        // Token waits happen outside the pool; slots only bound clone I/O.
        let (credential, pooled) = match self.pick_credential(&remote, credential).await {
            Ok(picked) => picked,
            Err(e) => {
                self.finish(&url, Err(e.to_string())).await;
                return;
            }
        };

        let _permit = match self.pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                self.finish(&url, Err(e.to_string())).await;
                return;
            }
        };
        let _in_flight = InFlight::enter();
        let started = Instant::now();

        let path = match self.prepare_workspace(&url, reuse).await {
            Ok(path) => path,
            Err(e) => {
                self.finish(&url, Err(e.to_string())).await;
                return;
            }
        };

        {
            let mut tasks = self.tasks.write().await;
            if let Some(slot) = tasks.get_mut(&url) {
                slot.task.workspace_path = Some(path.clone());
                slot.task.status = CloneStatus::Cloning { progress: 0 };
            }
        }
        info!(url = %url, workspace = %path.display(), "clone started");

        let outcome = self.clone_blocking(&url, remote, path, credential).await;

        if let (Err(e), Some((provider, cred))) = (&outcome, &pooled) {
            if e.is_auth() {
                if let Some(tokens) = &self.tokens {
                    let _ = tokens.mark_rejected(*provider, cred.secret());
                }
            }
        }

        global_metrics().record_histogram(CLONE_DURATION_SECONDS, started.elapsed().as_secs_f64());
        self.finish(&url, outcome.map_err(|e| e.to_string())).await;
    }

    /// The caller's credential wins. Otherwise draw one from the token pool
    /// for the URL's provider; with no pooled tokens the clone is anonymous.
    async fn pick_credential(
        &self,
        remote: &RemoteUrl,
        explicit: Option<Credential>,
    ) -> Result<(Option<Credential>, Option<(ProviderType, Credential)>), RateLimitError> {
        if explicit.is_some() {
            return Ok((explicit, None));
        }
        let (Some(tokens), Some(provider)) = (&self.tokens, remote.provider()) else {
            return Ok((None, None));
        };
        match tokens.acquire(provider, self.token_wait).await {
            Ok(cred) => Ok((Some(cred.clone()), Some((provider, cred)))),
            Err(RateLimitError::NoTokens { .. }) => {
                debug!(provider = %provider, "no pooled token, cloning anonymously");
                Ok((None, None))
            }
            Err(e) => Err(e),
        }
    }

    async fn prepare_workspace(
        &self,
        url: &str,
        reuse: Option<PathBuf>,
    ) -> Result<PathBuf, WorkspaceError> {
        let allocator = self.allocator.clone();
        let label = label_for_url(url);
        let root = allocator.root().display().to_string();
        tokio::task::spawn_blocking(move || match reuse {
            Some(path) => allocator.reset(&path).map(|()| path),
            None => allocator.allocate(&label),
        })
        .await
        .unwrap_or_else(|e| {
            Err(WorkspaceError::Allocate {
                root,
                reason: e.to_string(),
            })
        })
    }

    /// Run the libgit2 clone on a blocking thread, relaying progress into
    /// the task table as it arrives.
    ///
    /// With a configured timeout the wait is bounded here as well as inside
    /// libgit2. A blocking thread cannot be cancelled, so on expiry it is
    /// abandoned: the task fails and its pool slot is released while the
    /// thread winds down on its own socket timeout.
    async fn clone_blocking(
        &self,
        url: &str,
        remote: RemoteUrl,
        path: PathBuf,
        credential: Option<Credential>,
    ) -> Result<(), CloneError> {
        let (tx, rx) = flume::unbounded::<u8>();
        let cloner = Arc::clone(&self.cloner);
        let options = self.options.clone();

        let handle = tokio::task::spawn_blocking(move || {
            cloner.clone_repo(&remote, &path, credential.as_ref(), &options, &mut |pct| {
                let _ = tx.send(pct);
            })
        });

        let relay = async {
            // Ends when the blocking side drops its sender.
            while let Ok(pct) = rx.recv_async().await {
                self.set_progress(url, pct).await;
            }
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(CloneError::Other(format!("clone thread failed: {}", e))),
            }
        };

        let Some(limit) = self.options.timeout else {
            return relay.await;
        };
        tokio::time::timeout(limit, relay).await.unwrap_or_else(|_| {
            warn!(url = %url, timeout = ?limit, "clone timed out, abandoning libgit2 thread");
            Err(CloneError::Timeout(limit.as_secs()))
        })
    }

    async fn set_progress(&self, url: &str, pct: u8) {
        let next = CloneStatus::Cloning { progress: pct };
        let mut tasks = self.tasks.write().await;
        if let Some(slot) = tasks.get_mut(url) {
            if slot.task.status.can_transition_to(&next) {
                slot.task.status = next;
            }
        }
    }

    async fn finish(&self, url: &str, outcome: Result<(), String>) {
        let (next, label) = match outcome {
            Ok(()) => (CloneStatus::Completed, "completed"),
            Err(error) => (CloneStatus::Failed { error }, "failed"),
        };

        let mut tasks = self.tasks.write().await;
        let Some(Slot { task, done }) = tasks.get_mut(url) else {
            return;
        };
        if !task.status.can_transition_to(&next) {
            warn!(url = %url, from = %task.status, to = %next, "ignoring invalid clone transition");
            return;
        }
        match &next {
            CloneStatus::Failed { error } => warn!(url = %url, error = %error, "clone failed"),
            _ => info!(url = %url, "clone completed"),
        }
        task.status = next;
        done.send_replace(true);
        global_metrics().increment_counter(CLONES_TOTAL, &[("status", label)]);
    }
}

/// Keeps the in-flight gauge honest on every exit path.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        global_metrics().add_gauge(CLONES_IN_FLIGHT, 1);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        global_metrics().add_gauge(CLONES_IN_FLIGHT, -1);
    }
}
