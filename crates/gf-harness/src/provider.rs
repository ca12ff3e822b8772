//! Provider-facing types: rate-limit telemetry and the error categories a
//! provider API client reports back to the engine.
//!
//! # Overview
//!
//! Every Git hosting API answers with rate-limit headers. GitHub and
//! Bitbucket use `x-ratelimit-*`, GitLab uses `ratelimit-*`. A client passes
//! the raw headers to [`RateLimitInfo::from_headers`] and the resulting value
//! to [`TokenManager::record_usage`](crate::token_manager::TokenManager::record_usage).
//!
//! Failed responses go through [`classify_response`], which maps HTTP status
//! codes and rate-limit state onto [`ProviderError`].
//!
//! ```rust
//! use gf_core::types::ProviderType;
//! use gf_harness::provider::RateLimitInfo;
//!
//! let headers = [
//!     ("X-RateLimit-Limit", "5000"),
//!     ("X-RateLimit-Remaining", "4990"),
//!     ("X-RateLimit-Reset", "1700000000"),
//! ];
//! let info = RateLimitInfo::from_headers(ProviderType::GitHub, headers).unwrap();
//! assert_eq!(info.used, 10);
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use gf_core::types::ProviderType;

// ---------------------------------------------------------------------------
// RateLimitInfo
// ---------------------------------------------------------------------------

/// Header prefixes, tried in order.
const HEADER_PREFIXES: &[&str] = &["x-ratelimit-", "ratelimit-"];

/// Used when a 403/429 carries no reset hint at all.
const DEFAULT_RETRY_SECS: i64 = 60;
const MAX_RETRY_SECS: i64 = 7 * 24 * 3600;

/// Authoritative quota state reported by a provider response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub provider: ProviderType,
    pub limit: u32,
    pub remaining: u32,
    pub used: u32,
    pub reset_time: DateTime<Utc>,
}

impl RateLimitInfo {
    pub fn new(provider: ProviderType, limit: u32, remaining: u32, reset_time: DateTime<Utc>) -> Self {
        Self {
            provider,
            limit,
            remaining,
            used: limit.saturating_sub(remaining),
            reset_time,
        }
    }

    /// Parse rate-limit headers. Header names are matched case-insensitively.
    ///
    /// Returns `None` unless limit, remaining and reset are all present and
    /// numeric. `used` falls back to `limit - remaining`.
    pub fn from_headers<'a, I>(provider: ProviderType, headers: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let headers: Vec<(String, &str)> = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
            .collect();

        let field = |name: &str| {
            HEADER_PREFIXES.iter().find_map(|prefix| {
                let key = format!("{}{}", prefix, name);
                headers
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| *v)
            })
        };

        let limit = field("limit")?.parse::<u32>().ok()?;
        let remaining = field("remaining")?.parse::<u32>().ok()?;
        let reset = field("reset")?.parse::<i64>().ok()?;
        let reset_time = DateTime::from_timestamp(reset, 0)?;

        let mut info = Self::new(provider, limit, remaining, reset_time);
        if let Some(used) = field("used").and_then(|v| v.parse::<u32>().ok()) {
            info.used = used;
        }
        Some(info)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Error categories reported by provider API clients.
///
/// Clients map transport and HTTP failures onto these variants, usually via
/// [`classify_response`]. The engine only ever branches on the category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The credential was refused (HTTP 401, or 403 without rate-limit signs).
    #[error("authentication error: {0}")]
    Auth(String),

    /// The provider throttled the request. Retry after `reset_time`.
    #[error("rate limit exceeded, resets at {reset_time}")]
    RateLimited {
        /// When the quota is restored.
        reset_time: DateTime<Utc>,
    },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Map an HTTP response onto a [`ProviderError`].
///
/// - 2xx → `Ok(())`
/// - 401 → [`ProviderError::Auth`]
/// - 403 / 429 with an exhausted quota, a `retry-after` header, or a
///   "rate limit" message → [`ProviderError::RateLimited`]
/// - other 403 → [`ProviderError::Auth`]
/// - 404 → [`ProviderError::NotFound`]
/// - anything else → [`ProviderError::RequestFailed`]
pub fn classify_response<'a, I>(
    provider: ProviderType,
    status: u16,
    headers: I,
    message: &str,
) -> Result<(), ProviderError>
where
    I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
{
    if (200..300).contains(&status) {
        return Ok(());
    }

    match status {
        401 => Err(ProviderError::Auth(message.to_string())),
        403 | 429 => {
            let info = RateLimitInfo::from_headers(provider, headers.clone());
            let retry_after = headers
                .into_iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("retry-after"))
                .and_then(|(_, v)| v.trim().parse::<i64>().ok());
            let says_rate_limit = message.to_ascii_lowercase().contains("rate limit");

            let exhausted = info.as_ref().is_some_and(RateLimitInfo::is_exhausted);
            if exhausted || retry_after.is_some() || says_rate_limit || status == 429 {
                let reset_time = match (info, retry_after) {
                    (Some(info), _) if info.is_exhausted() => info.reset_time,
                    (_, Some(secs)) => Utc::now() + ChronoDuration::seconds(secs.clamp(0, MAX_RETRY_SECS)),
                    (Some(info), None) => info.reset_time,
                    (None, None) => Utc::now() + ChronoDuration::seconds(DEFAULT_RETRY_SECS),
                };
                Err(ProviderError::RateLimited { reset_time })
            } else {
                Err(ProviderError::Auth(message.to_string()))
            }
        }
        404 => Err(ProviderError::NotFound(message.to_string())),
        _ => Err(ProviderError::RequestFailed(format!(
            "HTTP {}: {}",
            status, message
        ))),
    }
}
