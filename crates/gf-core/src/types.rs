use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

// ---------------------------------------------------------------------------
// ProviderType
// ---------------------------------------------------------------------------

/// Git hosting provider a credential or remote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    GitHub,
    GitLab,
    BitBucket,
}

impl ProviderType {
    /// Map a remote host name to its provider, if it is one we know.
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.trim().to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        match host {
            "github.com" | "api.github.com" => Some(ProviderType::GitHub),
            "gitlab.com" => Some(ProviderType::GitLab),
            "bitbucket.org" | "api.bitbucket.org" => Some(ProviderType::BitBucket),
            _ => None,
        }
    }

    pub fn all() -> &'static [ProviderType] {
        &[
            ProviderType::GitHub,
            ProviderType::GitLab,
            ProviderType::BitBucket,
        ]
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderType::GitHub => "GitHub",
            ProviderType::GitLab => "GitLab",
            ProviderType::BitBucket => "BitBucket",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Username used for HTTPS token auth when none is given. GitHub, GitLab and
/// Bitbucket all accept an arbitrary user name alongside a token.
const TOKEN_USERNAME: &str = "x-access-token";

/// A provider credential. The token is wiped from memory on drop and never
/// printed by `Debug`.
#[derive(Clone)]
pub struct Credential {
    username: Option<String>,
    token: Zeroizing<String>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            username: None,
            token: Zeroizing::new(token.into()),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(TOKEN_USERNAME)
    }

    /// The raw token value. Callers must not log it.
    pub fn secret(&self) -> &str {
        self.token.as_str()
    }

    /// Short non-secret identifier (`…abcd`) for logs and status views.
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("…{}", tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &self.fingerprint())
            .finish()
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username && self.secret() == other.secret()
    }
}

impl Eq for Credential {}

// ---------------------------------------------------------------------------
// CloneStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a single clone task.
///
/// `Queued -> Cloning -> {Completed | Failed}`. A task that never starts
/// (rejected URL, no workspace, no credential) may go straight from `Queued`
/// to `Failed`. Terminal states never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CloneStatus {
    Queued,
    Cloning { progress: u8 },
    Completed,
    Failed { error: String },
}

impl CloneStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloneStatus::Completed | CloneStatus::Failed { .. })
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            CloneStatus::Cloning { progress } => Some(*progress),
            _ => None,
        }
    }

    /// Returns `true` when a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &CloneStatus) -> bool {
        match (self, target) {
            (CloneStatus::Queued, CloneStatus::Cloning { .. })
            | (CloneStatus::Queued, CloneStatus::Failed { .. })
            | (CloneStatus::Cloning { .. }, CloneStatus::Completed)
            | (CloneStatus::Cloning { .. }, CloneStatus::Failed { .. }) => true,
            (CloneStatus::Cloning { progress: from }, CloneStatus::Cloning { progress: to }) => {
                to >= from && *to <= 100
            }
            _ => false,
        }
    }
}

impl fmt::Display for CloneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneStatus::Queued => write!(f, "queued"),
            CloneStatus::Cloning { progress } => write!(f, "cloning ({}%)", progress),
            CloneStatus::Completed => write!(f, "completed"),
            CloneStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

// ---------------------------------------------------------------------------
// CloneTask
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneTask {
    pub url: String,
    pub status: CloneStatus,
    pub workspace_path: Option<PathBuf>,
}

impl CloneTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: CloneStatus::Queued,
            workspace_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Blame
// ---------------------------------------------------------------------------

/// Attribution of one line of a file at `HEAD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameEntry {
    /// 1-indexed line number in the blamed revision.
    pub line_number: usize,
    /// 1-indexed line number in the commit that introduced the line.
    pub orig_line_number: usize,
    pub commit_id: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub line_content: String,
}

/// Per-file blame outcome: the ordered lines, or why the file could not be
/// blamed. Never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BlameResult {
    Entries(Vec<BlameEntry>),
    Error(String),
}

impl BlameResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, BlameResult::Entries(_))
    }

    pub fn entries(&self) -> Option<&[BlameEntry]> {
        match self {
            BlameResult::Entries(entries) => Some(entries),
            BlameResult::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BlameResult::Entries(_) => None,
            BlameResult::Error(message) => Some(message),
        }
    }
}

impl<E: fmt::Display> From<Result<Vec<BlameEntry>, E>> for BlameResult {
    fn from(result: Result<Vec<BlameEntry>, E>) -> Self {
        match result {
            Ok(entries) => BlameResult::Entries(entries),
            Err(e) => BlameResult::Error(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

/// One revision of a repository's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub repo_name: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_timestamp: DateTime<Utc>,
    /// Author's UTC offset in minutes.
    pub author_offset: i32,
    pub committer_name: String,
    pub committer_email: String,
    pub committer_timestamp: DateTime<Utc>,
    pub committer_offset: i32,
    pub parents: Vec<String>,
    pub is_merge: bool,
    /// Lines added against the first parent; only filled when stats are requested.
    pub additions: Option<usize>,
    pub deletions: Option<usize>,
}

/// Order in which history is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    Topological,
}
