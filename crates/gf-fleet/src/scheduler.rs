use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("worker pool `{0}` is closed")]
pub struct PoolClosed(pub &'static str);

/// Pool size used when a caller asks for zero workers.
const DEFAULT_POOL_SIZE: usize = 5;

/// A fixed number of worker slots.
///
/// Every unit of work (one clone, one blamed file) holds a permit for as
/// long as it runs. Clone and blame each get their own pool so I/O-bound and
/// CPU-bound work never starve each other.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: &'static str,
    gate: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(name: &'static str, size: usize) -> Self {
        let size = if size == 0 {
            warn!(pool = name, "pool size was 0, defaulting to {DEFAULT_POOL_SIZE}");
            DEFAULT_POOL_SIZE
        } else {
            size
        };
        Self {
            name,
            gate: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, PoolClosed> {
        Arc::clone(&self.gate)
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed(self.name))
    }

    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
