//! Git capability backed by libgit2 (git2 crate).
//!
//! Three entry points, all synchronous and meant to run on a blocking
//! thread:
//!
//! - [`Git2Cloner`] clones a remote into a fresh directory, reporting
//!   progress as a 0-100 percentage.
//! - [`Git2ReadOps::blame_file`] attributes every line of a file at `HEAD`.
//! - [`HistoryReader`] walks the commit graph lazily.
//!
//! Raw `git2::Error`s never leave this module; they are folded into the
//! [`CloneError`], [`BlameError`] and [`HistoryError`] categories.

use std::cell::{Cell, RefCell};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use git2::{ErrorClass, ErrorCode};
use tracing::debug;
use url::Url;

use crate::config::{CloneConfig, HistoryConfig};
use crate::types::{BlameEntry, CommitOrder, CommitRecord, Credential, ProviderType};

// ---------------------------------------------------------------------------
// Remote URLs
// ---------------------------------------------------------------------------

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "ssh", "git", "file"];

/// A clone source that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUrl {
    /// `https://host/owner/repo.git`, `ssh://git@host/...`, `git://...`
    Network(Url),
    /// scp-like syntax: `git@github.com:owner/repo.git`
    Scp {
        user: Option<String>,
        host: String,
        path: String,
    },
    /// `file://` URL or a filesystem path.
    Local(PathBuf),
}

impl RemoteUrl {
    pub fn parse(raw: &str) -> Result<Self, CloneError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(CloneError::InvalidUrl);
        }

        if raw.contains("://") {
            let url = Url::parse(raw).map_err(|_| CloneError::InvalidUrl)?;
            if !ALLOWED_SCHEMES.contains(&url.scheme()) {
                return Err(CloneError::InvalidUrl);
            }
            if url.scheme() == "file" {
                let path = url.to_file_path().map_err(|_| CloneError::InvalidUrl)?;
                return Ok(RemoteUrl::Local(path));
            }
            match url.host_str() {
                Some(host) if !host.is_empty() => {}
                _ => return Err(CloneError::InvalidUrl),
            }
            if url.path().trim_matches('/').is_empty() {
                return Err(CloneError::InvalidUrl);
            }
            return Ok(RemoteUrl::Network(url));
        }

        let path = Path::new(raw);
        if path.is_absolute() || raw.starts_with("./") || raw.starts_with("../") {
            return Ok(RemoteUrl::Local(path.to_path_buf()));
        }

        Self::parse_scp(raw).ok_or(CloneError::InvalidUrl)
    }

    fn parse_scp(raw: &str) -> Option<Self> {
        let (authority, path) = raw.split_once(':')?;
        if path.is_empty() || authority.contains('/') {
            return None;
        }
        let (user, host) = match authority.split_once('@') {
            Some((user, host)) if !user.is_empty() => (Some(user.to_string()), host),
            Some(_) => return None,
            None => (None, authority),
        };
        // A single letter is a Windows drive, not a host.
        if host.len() < 2 || !host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
            return None;
        }
        Some(RemoteUrl::Scp {
            user,
            host: host.to_string(),
            path: path.to_string(),
        })
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            RemoteUrl::Network(url) => url.host_str(),
            RemoteUrl::Scp { host, .. } => Some(host),
            RemoteUrl::Local(_) => None,
        }
    }

    pub fn provider(&self) -> Option<ProviderType> {
        self.host().and_then(ProviderType::from_host)
    }

    /// The string handed to libgit2.
    pub fn to_git_url(&self) -> String {
        match self {
            RemoteUrl::Network(url) => url.to_string(),
            RemoteUrl::Scp { user, host, path } => match user {
                Some(user) => format!("{}@{}:{}", user, host, path),
                None => format!("{}:{}", host, path),
            },
            RemoteUrl::Local(path) => path.to_string_lossy().into_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloneError {
    #[error("invalid URL")]
    InvalidUrl,
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("disk error: {0}")]
    Disk(String),
    #[error("clone timed out after {0}s")]
    Timeout(u64),
    #[error("clone failed: {0}")]
    Other(String),
}

impl CloneError {
    pub fn is_auth(&self) -> bool {
        matches!(self, CloneError::Auth(_))
    }
}

impl From<git2::Error> for CloneError {
    fn from(e: git2::Error) -> Self {
        let message = e.message().to_string();
        if e.code() == ErrorCode::Auth {
            return CloneError::Auth(message);
        }
        match e.class() {
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh => {
                // libgit2 reports HTTP 401/403 as a generic HTTP error.
                if message.contains("401") || message.contains("403") {
                    CloneError::Auth(message)
                } else {
                    CloneError::Network(message)
                }
            }
            ErrorClass::Os | ErrorClass::Filesystem => CloneError::Disk(message),
            _ => CloneError::Other(message),
        }
    }
}

/// Per-clone knobs taken from `[clone]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    pub depth: Option<u32>,
    pub branch: Option<String>,
    pub timeout: Option<Duration>,
}

impl From<&CloneConfig> for CloneOptions {
    fn from(cfg: &CloneConfig) -> Self {
        Self {
            depth: cfg.depth,
            branch: cfg.branch.clone(),
            timeout: cfg.timeout(),
        }
    }
}

/// Abstraction over the clone primitive so the orchestrator can be driven
/// by a scripted implementation in tests.
pub trait GitCloner: Send + Sync {
    fn clone_repo(
        &self,
        url: &RemoteUrl,
        dest: &Path,
        credential: Option<&Credential>,
        opts: &CloneOptions,
        progress: &mut dyn FnMut(u8),
    ) -> Result<(), CloneError>;
}

/// Forwards a percentage only when it moves forward.
struct ProgressRelay<'a> {
    last: Option<u8>,
    sink: &'a mut dyn FnMut(u8),
}

impl ProgressRelay<'_> {
    fn report(&mut self, pct: u8) {
        let pct = pct.min(100);
        if self.last.is_none_or(|last| pct > last) {
            self.last = Some(pct);
            (self.sink)(pct);
        }
    }
}

// Network transfer covers 0..=90, checkout the rest.
const TRANSFER_SHARE: usize = 90;

fn scaled(done: usize, total: usize, share: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) * share) / total) as u8
}

/// Last socket timeout handed to libgit2, in milliseconds.
static SOCKET_TIMEOUT_MS: Mutex<Option<i32>> = Mutex::new(None);

/// Bound libgit2's connect and read waits so a server that accepts the
/// connection and then goes quiet still fails the clone. The setting is
/// process-wide in libgit2; writers are serialized here and only a changed
/// value is written.
fn apply_socket_timeout(limit: Duration) {
    let millis = limit.as_millis().clamp(1, i32::MAX as u128) as i32;
    let mut current = SOCKET_TIMEOUT_MS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if *current == Some(millis) {
        return;
    }
    // SAFETY: both options are plain integers read by libgit2 when it opens
    // or reads a socket; `git2` initialises the library before writing them.
    let applied = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
    };
    match applied {
        Ok(()) => *current = Some(millis),
        Err(e) => debug!(error = %e, "libgit2 socket timeout not applied"),
    }
}

/// Clones through libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Cloner;

impl GitCloner for Git2Cloner {
    fn clone_repo(
        &self,
        url: &RemoteUrl,
        dest: &Path,
        credential: Option<&Credential>,
        opts: &CloneOptions,
        progress: &mut dyn FnMut(u8),
    ) -> Result<(), CloneError> {
        let relay = RefCell::new(ProgressRelay {
            last: None,
            sink: progress,
        });
        if let Some(limit) = opts.timeout {
            apply_socket_timeout(limit);
        }
        let deadline = opts.timeout.map(|t| Instant::now() + t);
        let past_deadline = || deadline.is_some_and(|d| Instant::now() >= d);
        let timed_out = Cell::new(false);
        let auth_attempts = Cell::new(0u32);

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, allowed| {
            // libgit2 keeps asking while the server rejects us.
            let attempt = auth_attempts.get() + 1;
            auth_attempts.set(attempt);
            if attempt > 1 {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Http,
                    "credential rejected by remote",
                ));
            }
            match credential {
                Some(cred) if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) => {
                    git2::Cred::userpass_plaintext(cred.username(), cred.secret())
                }
                _ if allowed.contains(git2::CredentialType::SSH_KEY) => {
                    git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
                }
                _ => git2::Cred::default(),
            }
        });
        callbacks.transfer_progress(|stats| {
            if past_deadline() {
                timed_out.set(true);
                return false;
            }
            relay.borrow_mut().report(scaled(
                stats.received_objects(),
                stats.total_objects(),
                TRANSFER_SHARE,
            ));
            true
        });

        let mut fetch = git2::FetchOptions::new();
        fetch.remote_callbacks(callbacks);
        if let Some(depth) = opts.depth {
            fetch.depth(depth.min(i32::MAX as u32) as i32);
        }

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.progress(|_path, done, total| {
            let pct = TRANSFER_SHARE as u8 + scaled(done, total, 100 - TRANSFER_SHARE);
            relay.borrow_mut().report(pct);
        });

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch).with_checkout(checkout);
        if let Some(branch) = &opts.branch {
            builder.branch(branch);
        }

        debug!(url = %url.to_git_url(), dest = %dest.display(), "libgit2 clone starting");
        match builder.clone(&url.to_git_url(), dest) {
            Ok(_repo) => {
                relay.borrow_mut().report(100);
                Ok(())
            }
            Err(_) if timed_out.get() || past_deadline() => Err(CloneError::Timeout(
                opts.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            )),
            Err(e) => Err(CloneError::from(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Blame
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlameError {
    #[error("invalid repository: {0}")]
    InvalidRepository(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file is not tracked: {0}")]
    NotTracked(String),
    #[error("file is binary: {0}")]
    Binary(String),
    #[error("not a regular file: {0}")]
    NotAFile(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("git: {0}")]
    Git(String),
}

impl From<git2::Error> for BlameError {
    fn from(e: git2::Error) -> Self {
        BlameError::Git(e.message().to_string())
    }
}

/// Read-only queries against a working copy.
///
/// Stateless. Each call opens the repository itself, which keeps calls
/// independent across threads (`git2::Repository` is not `Sync`).
pub struct Git2ReadOps;

impl Git2ReadOps {
    /// Open the repository rooted exactly at `workdir`.
    pub fn open(workdir: &Path) -> Result<git2::Repository, BlameError> {
        git2::Repository::open(workdir)
            .map_err(|e| BlameError::InvalidRepository(format!("{}: {}", workdir.display(), e.message())))
    }

    /// Blame `file_path` (relative to `workdir`) at `HEAD`.
    pub fn blame_file(workdir: &Path, file_path: &str) -> Result<Vec<BlameEntry>, BlameError> {
        let rel = Self::relative_path(file_path)?;
        let repo = Self::open(workdir)?;

        let head = match repo.head() {
            Ok(head) => head.peel_to_commit()?,
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                return Err(BlameError::NotTracked(file_path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let tree = head.tree()?;

        let entry = match tree.get_path(&rel) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => {
                let on_disk = workdir.join(&rel);
                return Err(if on_disk.is_dir() {
                    BlameError::NotAFile(file_path.to_string())
                } else if on_disk.exists() {
                    BlameError::NotTracked(file_path.to_string())
                } else {
                    BlameError::NotFound(file_path.to_string())
                });
            }
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(git2::ObjectType::Blob) {
            return Err(BlameError::NotAFile(file_path.to_string()));
        }

        let blob = repo.find_blob(entry.id())?;
        if blob.is_binary() {
            return Err(BlameError::Binary(file_path.to_string()));
        }
        let lines = split_lines(blob.content());

        let mut opts = git2::BlameOptions::new();
        opts.newest_commit(head.id());
        let blame = repo.blame_file(&rel, Some(&mut opts))?;

        let mut entries = Vec::with_capacity(lines.len());
        for hunk in blame.iter() {
            let sig = hunk.final_signature();
            let commit_id = hunk.final_commit_id().to_string();
            let author_name = String::from_utf8_lossy(sig.name_bytes()).into_owned();
            let author_email = String::from_utf8_lossy(sig.email_bytes()).into_owned();
            let timestamp = to_utc(sig.when());

            for offset in 0..hunk.lines_in_hunk() {
                let line_number = hunk.final_start_line() + offset;
                entries.push(BlameEntry {
                    line_number,
                    orig_line_number: hunk.orig_start_line() + offset,
                    commit_id: commit_id.clone(),
                    author_name: author_name.clone(),
                    author_email: author_email.clone(),
                    timestamp,
                    line_content: lines
                        .get(line_number.saturating_sub(1))
                        .cloned()
                        .unwrap_or_default(),
                });
            }
        }
        entries.sort_by_key(|e| e.line_number);
        Ok(entries)
    }

    /// Reject paths that would escape the working copy.
    fn relative_path(file_path: &str) -> Result<PathBuf, BlameError> {
        let path = Path::new(file_path);
        let clean = !file_path.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if clean {
            Ok(path.components().collect())
        } else {
            Err(BlameError::InvalidPath(file_path.to_string()))
        }
    }
}

fn split_lines(content: &[u8]) -> Vec<String> {
    let mut lines: Vec<String> = content
        .split(|b| *b == b'\n')
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .collect();
    // Trailing newline leaves an empty tail.
    if content.ends_with(b"\n") || content.is_empty() {
        lines.pop();
    }
    lines
}

fn to_utc(time: git2::Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.seconds(), 0).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("invalid repository: {0}")]
    InvalidRepository(String),
    #[error("unreadable history: {0}")]
    Corrupt(String),
}

impl From<git2::Error> for HistoryError {
    fn from(e: git2::Error) -> Self {
        HistoryError::Corrupt(e.message().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryOptions {
    pub order: CommitOrder,
    pub max_count: Option<usize>,
    pub include_stats: bool,
}

impl From<&HistoryConfig> for HistoryOptions {
    fn from(cfg: &HistoryConfig) -> Self {
        Self {
            order: cfg.order,
            max_count: cfg.max_count,
            include_stats: cfg.include_stats,
        }
    }
}

/// An open repository whose history can be walked any number of times.
pub struct HistoryReader {
    repo: git2::Repository,
    repo_name: String,
}

impl HistoryReader {
    pub fn open(workdir: &Path) -> Result<Self, HistoryError> {
        let repo = git2::Repository::open(workdir).map_err(|e| {
            HistoryError::InvalidRepository(format!("{}: {}", workdir.display(), e.message()))
        })?;
        let repo_name = repo_name(&repo, workdir);
        Ok(Self { repo, repo_name })
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    /// Start a fresh walk from `HEAD`. An unborn `HEAD` yields no commits.
    pub fn commits(&self, opts: &HistoryOptions) -> Result<CommitWalk<'_>, HistoryError> {
        let revwalk = match self.repo.head() {
            Ok(_) => {
                let mut revwalk = self.repo.revwalk()?;
                revwalk.push_head()?;
                revwalk.set_sorting(match opts.order {
                    CommitOrder::NewestFirst => git2::Sort::TIME,
                    CommitOrder::OldestFirst => git2::Sort::TIME | git2::Sort::REVERSE,
                    CommitOrder::Topological => git2::Sort::TOPOLOGICAL | git2::Sort::TIME,
                })?;
                Some(revwalk)
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };
        Ok(CommitWalk {
            reader: self,
            revwalk,
            remaining: opts.max_count,
            include_stats: opts.include_stats,
        })
    }

    /// Materialize the whole walk, or fail with the first error.
    pub fn collect(&self, opts: &HistoryOptions) -> Result<Vec<CommitRecord>, HistoryError> {
        self.commits(opts)?.collect()
    }

    fn record(&self, oid: git2::Oid, include_stats: bool) -> Result<CommitRecord, HistoryError> {
        let commit = self.repo.find_commit(oid)?;
        let author = commit.author();
        let committer = commit.committer();
        let parents: Vec<String> = commit.parent_ids().map(|id| id.to_string()).collect();

        let (additions, deletions) = if include_stats {
            let tree = commit.tree()?;
            let parent_tree = match commit.parent(0) {
                Ok(parent) => Some(parent.tree()?),
                Err(_) => None,
            };
            let diff = self
                .repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
            let stats = diff.stats()?;
            (Some(stats.insertions()), Some(stats.deletions()))
        } else {
            (None, None)
        };

        Ok(CommitRecord {
            sha: oid.to_string(),
            repo_name: self.repo_name.clone(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
            author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
            author_timestamp: to_utc(author.when()),
            author_offset: author.when().offset_minutes(),
            committer_name: String::from_utf8_lossy(committer.name_bytes()).into_owned(),
            committer_email: String::from_utf8_lossy(committer.email_bytes()).into_owned(),
            committer_timestamp: to_utc(committer.when()),
            committer_offset: committer.when().offset_minutes(),
            is_merge: parents.len() > 1,
            parents,
            additions,
            deletions,
        })
    }
}

/// Lazy walk over a repository's commits. Ends after the first error.
pub struct CommitWalk<'r> {
    reader: &'r HistoryReader,
    revwalk: Option<git2::Revwalk<'r>>,
    remaining: Option<usize>,
    include_stats: bool,
}

impl Iterator for CommitWalk<'_> {
    type Item = Result<CommitRecord, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        let oid = match self.revwalk.as_mut()?.next()? {
            Ok(oid) => oid,
            Err(e) => {
                self.revwalk = None;
                return Some(Err(e.into()));
            }
        };
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        let record = self.reader.record(oid, self.include_stats);
        if record.is_err() {
            self.revwalk = None;
        }
        Some(record)
    }
}

/// `owner/repo.git` → `repo`, from `origin` when there is one.
fn repo_name(repo: &git2::Repository, workdir: &Path) -> String {
    let from_origin = repo
        .find_remote("origin")
        .ok()
        .and_then(|remote| remote.url().map(str::to_string))
        .and_then(|url| {
            url.trim_end_matches('/')
                .rsplit(['/', ':'])
                .next()
                .map(|last| last.trim_end_matches(".git").to_string())
        })
        .filter(|name| !name.is_empty());

    from_origin.unwrap_or_else(|| {
        workdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_network_urls() {
        let url = RemoteUrl::parse("https://github.com/owner/repo.git").unwrap();
        assert_eq!(url.host(), Some("github.com"));
        assert_eq!(url.provider(), Some(ProviderType::GitHub));

        let ssh = RemoteUrl::parse("ssh://git@gitlab.com/group/proj.git").unwrap();
        assert_eq!(ssh.provider(), Some(ProviderType::GitLab));
    }

    #[test]
    fn parses_scp_syntax() {
        let url = RemoteUrl::parse("git@bitbucket.org:team/repo.git").unwrap();
        assert_eq!(
            url,
            RemoteUrl::Scp {
                user: Some("git".into()),
                host: "bitbucket.org".into(),
                path: "team/repo.git".into(),
            }
        );
        assert_eq!(url.to_git_url(), "git@bitbucket.org:team/repo.git");
        assert_eq!(url.provider(), Some(ProviderType::BitBucket));
    }

    #[test]
    fn parses_local_paths() {
        assert!(matches!(
            RemoteUrl::parse("/srv/git/repo").unwrap(),
            RemoteUrl::Local(_)
        ));
        assert!(matches!(
            RemoteUrl::parse("file:///srv/git/repo").unwrap(),
            RemoteUrl::Local(_)
        ));
    }

    #[test]
    fn rejects_malformed_urls() {
        for raw in [
            "",
            "   ",
            "not a url",
            "not-a-valid-url",
            "ftp://example.com/repo.git",
            "https://",
            "https://github.com/",
            "git@:repo.git",
            "C:repo",
        ] {
            assert_eq!(RemoteUrl::parse(raw), Err(CloneError::InvalidUrl), "{raw:?}");
        }
        assert_eq!(CloneError::InvalidUrl.to_string(), "invalid URL");
    }

    #[test]
    fn git2_errors_are_categorized() {
        let auth = git2::Error::new(ErrorCode::Auth, ErrorClass::Http, "nope");
        assert!(CloneError::from(auth).is_auth());

        let net = git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "unreachable");
        assert!(matches!(CloneError::from(net), CloneError::Network(_)));

        let disk = git2::Error::new(ErrorCode::GenericError, ErrorClass::Os, "disk full");
        assert!(matches!(CloneError::from(disk), CloneError::Disk(_)));
    }

    #[test]
    fn progress_relay_is_monotonic() {
        let mut seen = Vec::new();
        {
            let mut sink = |p| seen.push(p);
            let mut relay = ProgressRelay {
                last: None,
                sink: &mut sink,
            };
            for p in [0, 0, 10, 5, 50, 50, 120] {
                relay.report(p);
            }
        }
        assert_eq!(seen, vec![0, 10, 50, 100]);
    }

    #[test]
    fn scaled_handles_unknown_totals() {
        assert_eq!(scaled(5, 0, 90), 0);
        assert_eq!(scaled(50, 100, 90), 45);
        assert_eq!(scaled(200, 100, 90), 90);
    }

    #[test]
    fn split_lines_drops_trailing_newline() {
        assert_eq!(split_lines(b"a\nb\n"), vec!["a", "b"]);
        assert_eq!(split_lines(b"a\nb"), vec!["a", "b"]);
        assert!(split_lines(b"").is_empty());
    }

    #[test]
    fn relative_path_rejects_escapes() {
        assert!(Git2ReadOps::relative_path("src/lib.rs").is_ok());
        assert!(Git2ReadOps::relative_path("../etc/passwd").is_err());
        assert!(Git2ReadOps::relative_path("/etc/passwd").is_err());
        assert!(Git2ReadOps::relative_path("").is_err());
    }
}
