use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use gf_core::config::{CredentialProvider, TokensConfig};
use gf_core::types::{Credential, ProviderType};
use gf_telemetry::metrics::{global_metrics, TOKEN_EXHAUSTED_TOTAL, TOKEN_REJECTED_TOTAL};

use crate::provider::RateLimitInfo;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// No credential can be handed out right now.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Every live credential has `remaining == 0` and a reset in the future.
    #[error("all {provider} tokens exhausted, earliest reset at {reset_time}")]
    AllTokensExhausted {
        provider: ProviderType,
        reset_time: DateTime<Utc>,
    },
    /// Nothing registered for the provider, or every token was rejected.
    #[error("no usable {provider} tokens")]
    NoTokens { provider: ProviderType },
}

impl RateLimitError {
    pub fn reset_time(&self) -> Option<DateTime<Utc>> {
        match self {
            RateLimitError::AllTokensExhausted { reset_time, .. } => Some(*reset_time),
            RateLimitError::NoTokens { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token {fingerprint} is not registered for {provider}")]
    UnknownToken {
        provider: ProviderType,
        fingerprint: String,
    },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quota {
    limit: u32,
    remaining: u32,
    reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TokenRecord {
    credential: Credential,
    /// `None` until the provider first reports on this token.
    quota: Option<Quota>,
    rejected: bool,
}

impl TokenRecord {
    fn exhausted_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.quota {
            Some(q) if q.remaining == 0 && q.reset_time > now => Some(q.reset_time),
            _ => None,
        }
    }

    /// Restore the full quota once its window has passed.
    fn refresh(&mut self, now: DateTime<Utc>) {
        if let Some(q) = self.quota.as_mut() {
            if q.reset_time <= now && q.remaining < q.limit {
                q.remaining = q.limit;
            }
        }
    }
}

#[derive(Debug, Default)]
struct ProviderPool {
    records: Vec<TokenRecord>,
    cursor: usize,
}

impl ProviderPool {
    fn position(&self, token: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.credential.secret() == token)
    }
}

/// Redacted per-token view for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStatus {
    pub provider: ProviderType,
    pub fingerprint: String,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_time: Option<DateTime<Utc>>,
    pub rejected: bool,
    pub exhausted: bool,
}

// ---------------------------------------------------------------------------
// TokenManager
// ---------------------------------------------------------------------------

/// Pools credentials per provider and hands them out round-robin, skipping
/// tokens whose quota is spent until their reset passes.
///
/// Selection decrements the cached `remaining` so that concurrent callers
/// spread across tokens before the provider reports back. Authoritative
/// numbers arrive through [`TokenManager::record_usage`].
#[derive(Debug, Default)]
pub struct TokenManager {
    pools: DashMap<ProviderType, ProviderPool>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manager from the env vars named in `[tokens]`.
    pub fn from_env(tokens: &TokensConfig) -> Self {
        let manager = Self::new();
        for provider in ProviderType::all() {
            let creds = CredentialProvider::tokens_for(tokens, *provider);
            if !creds.is_empty() {
                info!(provider = %provider, count = creds.len(), "loaded tokens from environment");
            }
            for cred in creds {
                manager.add_token(*provider, cred);
            }
        }
        manager
    }

    /// Register a credential with unknown quota. Returns `false` if the same
    /// token is already registered for `provider`.
    pub fn add_token(&self, provider: ProviderType, credential: Credential) -> bool {
        let mut pool = self.pools.entry(provider).or_default();
        if pool.position(credential.secret()).is_some() {
            return false;
        }
        debug!(provider = %provider, token = %credential.fingerprint(), "token registered");
        pool.records.push(TokenRecord {
            credential,
            quota: None,
            rejected: false,
        });
        true
    }

    pub fn token_count(&self, provider: ProviderType) -> usize {
        self.pools
            .get(&provider)
            .map(|p| p.records.iter().filter(|r| !r.rejected).count())
            .unwrap_or(0)
    }

    /// Pick the next usable credential for `provider`.
    pub fn select_token(&self, provider: ProviderType) -> Result<Credential, RateLimitError> {
        self.select_token_at(provider, Utc::now())
    }

    /// [`select_token`](Self::select_token) against an explicit clock.
    pub fn select_token_at(
        &self,
        provider: ProviderType,
        now: DateTime<Utc>,
    ) -> Result<Credential, RateLimitError> {
        let mut pool = match self.pools.get_mut(&provider) {
            Some(pool) => pool,
            None => return Err(RateLimitError::NoTokens { provider }),
        };

        let len = pool.records.len();
        let start = pool.cursor % len.max(1);
        let mut earliest: Option<DateTime<Utc>> = None;

        for step in 0..len {
            let idx = (start + step) % len;
            let record = &mut pool.records[idx];
            if record.rejected {
                continue;
            }
            record.refresh(now);
            if let Some(reset) = record.exhausted_at(now) {
                earliest = Some(earliest.map_or(reset, |e| e.min(reset)));
                continue;
            }
            if let Some(q) = record.quota.as_mut() {
                q.remaining = q.remaining.saturating_sub(1);
            }
            let credential = record.credential.clone();
            pool.cursor = (idx + 1) % len;
            return Ok(credential);
        }

        match earliest {
            Some(reset_time) => {
                warn!(provider = %provider, %reset_time, "all tokens exhausted");
                let label = provider.to_string();
                global_metrics().increment_counter(TOKEN_EXHAUSTED_TOTAL, &[("provider", label.as_str())]);
                Err(RateLimitError::AllTokensExhausted {
                    provider,
                    reset_time,
                })
            }
            None => Err(RateLimitError::NoTokens { provider }),
        }
    }

    /// Overwrite a token's quota with what the provider just reported.
    pub fn record_usage(&self, token: &str, info: &RateLimitInfo) -> Result<(), TokenError> {
        let mut pool = self
            .pools
            .get_mut(&info.provider)
            .ok_or_else(|| unknown(info.provider, token))?;
        let idx = pool
            .position(token)
            .ok_or_else(|| unknown(info.provider, token))?;
        let record = &mut pool.records[idx];
        record.quota = Some(Quota {
            limit: info.limit,
            remaining: info.remaining,
            reset_time: info.reset_time,
        });
        debug!(
            provider = %info.provider,
            token = %record.credential.fingerprint(),
            remaining = info.remaining,
            limit = info.limit,
            "rate limit recorded"
        );
        Ok(())
    }

    /// Take a token the provider refused out of rotation for good.
    pub fn mark_rejected(&self, provider: ProviderType, token: &str) -> Result<(), TokenError> {
        let mut pool = self
            .pools
            .get_mut(&provider)
            .ok_or_else(|| unknown(provider, token))?;
        let idx = pool.position(token).ok_or_else(|| unknown(provider, token))?;
        let record = &mut pool.records[idx];
        if !record.rejected {
            record.rejected = true;
            warn!(provider = %provider, token = %record.credential.fingerprint(), "token rejected by provider");
            let label = provider.to_string();
            global_metrics().increment_counter(TOKEN_REJECTED_TOTAL, &[("provider", label.as_str())]);
        }
        Ok(())
    }

    /// Like [`select_token`](Self::select_token), but when every token is
    /// exhausted and the earliest reset falls within `max_wait`, sleep until
    /// then and try again.
    pub async fn acquire(
        &self,
        provider: ProviderType,
        max_wait: Duration,
    ) -> Result<Credential, RateLimitError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let err = match self.select_token(provider) {
                Ok(credential) => return Ok(credential),
                Err(err) => err,
            };
            let Some(reset_time) = err.reset_time() else {
                return Err(err);
            };
            let wait = (reset_time - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            let wake = tokio::time::Instant::now() + wait;
            if wake > deadline {
                return Err(err);
            }
            info!(provider = %provider, ?wait, "waiting for token reset");
            // Reset timestamps have whole-second precision.
            tokio::time::sleep_until(wake + Duration::from_millis(10)).await;
        }
    }

    /// Redacted quota state of every token registered for `provider`.
    pub fn status(&self, provider: ProviderType) -> Vec<TokenStatus> {
        let now = Utc::now();
        self.pools
            .get(&provider)
            .map(|pool| {
                pool.records
                    .iter()
                    .map(|r| TokenStatus {
                        provider,
                        fingerprint: r.credential.fingerprint(),
                        limit: r.quota.map(|q| q.limit),
                        remaining: r.quota.map(|q| q.remaining),
                        reset_time: r.quota.map(|q| q.reset_time),
                        rejected: r.rejected,
                        exhausted: r.exhausted_at(now).is_some(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn unknown(provider: ProviderType, token: &str) -> TokenError {
    TokenError::UnknownToken {
        provider,
        fingerprint: Credential::new(token).fingerprint(),
    }
}
