//! Core data model and Git capability for the gitfleet engine.
//!
//! - `types`: clone tasks, blame entries, commit records, credentials
//! - `config`: TOML configuration and env-var credential resolution
//! - `workspace`: per-clone temporary directories
//! - `git2_ops`: clone, blame and history walks through libgit2

pub mod config;
pub mod git2_ops;
pub mod types;
pub mod workspace;
