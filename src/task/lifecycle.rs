//! The race-free task-lifecycle protocol (C6): the only synchronisation
//! between a worker thread and a host that may abandon its task handle at
//! any moment.
//!
//! The state starts at `Running`. Exactly one of two transitions happens,
//! both compare-and-swap:
//!
//! - **Worker path**, on completion: `Running -> Done`. If the CAS
//!   succeeds, the worker signals the notification fd and returns — the
//!   host will fetch the result and free the task. If the CAS fails (the
//!   host already orphaned it), the worker itself owns the final free and
//!   must perform it inline.
//! - **Host path**, on the host dropping its handle: if the state already
//!   reads `Done`, the host frees immediately. Otherwise CAS
//!   `Running -> Orphaned`; success means the host returns without
//!   freeing (the worker will, when it finishes); failure means the worker
//!   raced ahead to `Done` between the load and the CAS, so the host frees
//!   inline.
//!
//! The CAS itself is the happens-before edge: a worker's writes to a
//! task's output/error slot are visible to whichever side observes `Done`.

use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const DONE: u8 = 1;
const ORPHANED: u8 = 2;

/// Which side ended up owning the final free, after a transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeResponsibility {
    /// The caller of this transition must free the task now.
    FreeNow,
    /// The other side will free the task; the caller must not touch it
    /// again.
    DeferToOtherSide,
}

/// The atomic task-lifecycle state.
#[derive(Debug, Default)]
pub struct TaskState(AtomicU8);

impl TaskState {
    /// A fresh task state, initialised to `Running`.
    pub fn new() -> Self {
        Self(AtomicU8::new(RUNNING))
    }

    /// Worker-side transition on completion. Returns which side now owns
    /// the free.
    pub fn worker_complete(&self) -> FreeResponsibility {
        match self
            .0
            .compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => FreeResponsibility::DeferToOtherSide, // host frees after result-fetch
            Err(_) => FreeResponsibility::FreeNow, // host already orphaned it
        }
    }

    /// Host-side transition when the host drops its task handle. Returns
    /// which side now owns the free.
    pub fn host_abandon(&self) -> FreeResponsibility {
        // The initial load doubles as the acquire barrier that makes a
        // prior DONE's output-slot writes visible before we act on it.
        if self.0.load(Ordering::Acquire) == DONE {
            return FreeResponsibility::FreeNow;
        }
        match self
            .0
            .compare_exchange(RUNNING, ORPHANED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => FreeResponsibility::DeferToOtherSide, // worker frees when it finishes
            Err(_) => FreeResponsibility::FreeNow, // worker finished between load and CAS
        }
    }

    /// `true` once the worker has recorded completion (`Done`). The host
    /// must only call the result-fetcher after observing this (in practice,
    /// after the notification fd signals).
    pub fn is_done(&self) -> bool {
        self.0.load(Ordering::Acquire) == DONE
    }

    /// `true` if the host has abandoned the task while it was still
    /// running.
    pub fn is_orphaned(&self) -> bool {
        self.0.load(Ordering::Acquire) == ORPHANED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_completion_host_frees() {
        let state = TaskState::new();
        assert_eq!(state.worker_complete(), FreeResponsibility::DeferToOtherSide);
        assert!(state.is_done());
        // Host observes Done and frees.
        assert_eq!(state.host_abandon(), FreeResponsibility::FreeNow);
    }

    #[test]
    fn host_abandons_before_completion_worker_frees() {
        let state = TaskState::new();
        assert_eq!(state.host_abandon(), FreeResponsibility::DeferToOtherSide);
        assert!(state.is_orphaned());
        // Worker finishes afterwards and must free inline (CAS fails: not RUNNING).
        assert_eq!(state.worker_complete(), FreeResponsibility::FreeNow);
    }

    #[test]
    fn exactly_one_transition_wins_under_race() {
        use std::sync::Arc;
        use std::thread;

        for _ in 0..200 {
            let state = Arc::new(TaskState::new());
            let w = {
                let state = Arc::clone(&state);
                thread::spawn(move || state.worker_complete())
            };
            let h = {
                let state = Arc::clone(&state);
                thread::spawn(move || state.host_abandon())
            };
            let wr = w.join().unwrap();
            let hr = h.join().unwrap();
            // Exactly one side must end up responsible for the free.
            let frees = [wr, hr]
                .iter()
                .filter(|r| **r == FreeResponsibility::FreeNow)
                .count();
            assert_eq!(frees, 1, "exactly one side must free, got {wr:?} / {hr:?}");
        }
    }
}
