//! [`TaskHandle`]: the host-facing half of a submitted asynchronous
//! comparison (spec.md §3's "Task" record and §4.6's "Result fetch").
//!
//! A task's worker and its host each hold one handle into the same shared
//! state. The [`crate::task::lifecycle::TaskState`] CAS decides who frees it;
//! in this crate "freeing" is just dropping the last `Arc`, but the protocol
//! is followed exactly so the two sides never race on the output slot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::diff::DiffResult;
use crate::engine::compare::CompareVerdict;
use crate::error::{Error, ErrorKind, Result};

use super::lifecycle::{FreeResponsibility, TaskState};
use super::notify::{NotifyReader, NotifyWriter};

/// What a completed task produced.
#[derive(Debug)]
pub enum TaskOutput {
    /// The result of `compare`/`compare_dir_urls`-style scalar operations.
    Verdict(CompareVerdict),
    /// The result of `compare_dir`/`compare_archive`-style operations.
    Diff(DiffResult),
}

struct Shared {
    state: TaskState,
    slot: Mutex<Option<Result<TaskOutput>>>,
}

/// The host's side of a submitted task: a readiness fd plus a result-fetch
/// method. Dropping it without having fetched the result runs the orphan
/// protocol, never leaking or double-freeing the shared state.
pub struct TaskHandle {
    shared: Arc<Shared>,
    notify: NotifyReader,
}

/// The worker's side of the same task, created alongside [`TaskHandle`] by
/// [`new_pair`]. A worker thread calls [`WorkerSide::complete`] exactly once
/// when it has a result.
pub struct WorkerSide {
    shared: Arc<Shared>,
    notify: NotifyWriter,
}

/// Create a fresh task and the two handles into it.
pub fn new_pair() -> Result<(TaskHandle, WorkerSide)> {
    let (notify_reader, notify_writer) = super::notify::create_pair()?;
    let shared = Arc::new(Shared {
        state: TaskState::new(),
        slot: Mutex::new(None),
    });
    Ok((
        TaskHandle {
            shared: Arc::clone(&shared),
            notify: notify_reader,
        },
        WorkerSide {
            shared,
            notify: notify_writer,
        },
    ))
}

impl TaskHandle {
    /// The fd the host should register with its I/O multiplexer, watching
    /// for readability. Valid until this handle is dropped.
    pub fn notification_fd(&self) -> super::notify::RawFd {
        self.notify.as_raw_fd()
    }

    /// `true` once the worker has recorded a result. The host must not call
    /// `fetch_result` before this (mirroring spec.md's "calling the fetcher
    /// without prior readiness is undefined" — here it returns an error
    /// instead of invoking undefined behavior, since Rust has no
    /// unchecked-access equivalent worth reaching for).
    pub fn is_ready(&self) -> bool {
        self.notify.drain().unwrap_or(false) || self.shared.state.is_done()
    }

    /// Fetch the task's result, transferring ownership out of the shared
    /// slot. Calling this before [`Self::is_ready`] returns an error rather
    /// than blocking.
    pub fn fetch_result(&self) -> Result<TaskOutput> {
        let mut slot = self.shared.slot.lock();
        slot.take().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidTaskState,
                "fetch_result called before the task signalled readiness",
            )
        })?
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        // Host abandonment: run the orphan protocol. `FreeNow` means the
        // worker already finished (or never will touch this task again);
        // `DeferToOtherSide` means the worker will observe `ORPHANED` on
        // its own completion CAS and must not write into a slot the host
        // has stopped watching — harmless here since the slot's `Arc` stays
        // alive until the worker's `Shared` clone is dropped too.
        let _ = self.shared.state.host_abandon();
    }
}

impl WorkerSide {
    /// Record the task's result and signal completion. Consumes `self`:
    /// a task completes exactly once.
    pub fn complete(self, result: Result<TaskOutput>) {
        *self.shared.slot.lock() = Some(result);
        match self.shared.state.worker_complete() {
            FreeResponsibility::DeferToOtherSide => {
                // The host (or nobody, if it already orphaned the task but
                // hasn't dropped yet) will observe readiness; signalling is
                // harmless either way since the fd is simply never drained.
                let _ = self.notify.signal();
            }
            FreeResponsibility::FreeNow => {
                // The host already abandoned the task. Nothing left to
                // signal; dropping `self` below releases the shared state.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_completes_before_host_fetches() {
        let (handle, worker) = new_pair().unwrap();
        worker.complete(Ok(TaskOutput::Verdict(CompareVerdict::Equal)));
        assert!(handle.is_ready());
        match handle.fetch_result().unwrap() {
            TaskOutput::Verdict(v) => assert_eq!(v, CompareVerdict::Equal),
            TaskOutput::Diff(_) => panic!("expected a verdict"),
        }
    }

    #[test]
    fn fetch_before_ready_is_an_error() {
        let (handle, _worker) = new_pair().unwrap();
        let err = handle.fetch_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTaskState);
    }

    #[test]
    fn host_drop_before_completion_does_not_panic_worker() {
        let (handle, worker) = new_pair().unwrap();
        drop(handle);
        // Worker finishes after the host gave up; this must not panic or
        // deadlock even though nobody will ever fetch the result.
        worker.complete(Ok(TaskOutput::Verdict(CompareVerdict::Different)));
    }
}
