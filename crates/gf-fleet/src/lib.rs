//! Fleet operations over many repositories.
//!
//! [`orchestrator::CloneOrchestrator`] clones batches of URLs through a
//! bounded pool and tracks each one as a [`gf_core::types::CloneTask`].
//! [`blame::BulkBlameEngine`] and [`history::CommitExtractor`] analyse the
//! resulting workspaces. [`manager::RepoManager`] wires all of them from a
//! [`gf_core::config::Config`].

pub mod blame;
pub mod history;
pub mod manager;
pub mod orchestrator;
pub mod scheduler;

pub use manager::RepoManager;
