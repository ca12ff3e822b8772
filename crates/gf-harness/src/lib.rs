//! Harness: credential pooling and provider rate-limit telemetry.
//!
//! The engine never talks HTTP itself. Whoever does (a provider API client)
//! feeds response headers into [`provider::RateLimitInfo`] and hands them to
//! the [`token_manager::TokenManager`], which decides which credential the
//! next request or clone should use.

pub mod provider;
pub mod token_manager;
