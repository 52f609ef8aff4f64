//! The task subsystem (C6): a FIFO worker pool, a completion-notification
//! transport, and the race-free lifecycle protocol that lets a host abandon
//! a submitted task without leaking resources or double-freeing.

pub mod handle;
pub mod lifecycle;
pub mod notify;
pub mod pool;

pub use handle::{new_pair, TaskHandle, TaskOutput, WorkerSide};
pub use lifecycle::{FreeResponsibility, TaskState};
pub use notify::{NotifyReader, NotifyWriter};
pub use pool::WorkerPool;

use std::sync::Arc;

use parking_lot::Mutex;

static GLOBAL_POOL: Mutex<Option<Arc<WorkerPool>>> = Mutex::new(None);

/// The process-wide worker pool the async API submits tasks to (spec.md
/// §3: "Global worker pool. Process-wide, lazily initialised, torn down
/// explicitly"), built lazily on first use. Mirrors
/// [`crate::net::transport::shared_client`]'s lazy-singleton pattern rather
/// than spec's lock-free-pointer-swap teardown: a `Mutex<Option<Arc<_>>>`
/// gives the same externally observable behavior (concurrent callers either
/// get the existing pool or race harmlessly to create one) without unsafe
/// pointer games the rest of this codebase has no other use for.
pub fn global_pool() -> Arc<WorkerPool> {
    let mut slot = GLOBAL_POOL.lock();
    if let Some(pool) = slot.as_ref() {
        return Arc::clone(pool);
    }
    let pool = Arc::new(WorkerPool::new(0));
    *slot = Some(Arc::clone(&pool));
    pool
}

/// Tear down the process-wide worker pool. Outstanding [`TaskHandle`]s are
/// unaffected — they hold their own `Arc` into the task's shared state, not
/// into the pool. A subsequent [`global_pool`] call rebuilds it.
pub fn shutdown_global_pool() {
    GLOBAL_POOL.lock().take();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_pool_is_reused_until_shutdown() {
        shutdown_global_pool();
        let a = global_pool();
        let b = global_pool();
        assert!(Arc::ptr_eq(&a, &b));
        shutdown_global_pool();
        let c = global_pool();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
