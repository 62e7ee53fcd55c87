//! The job queue. Plain FIFO, drained between turns; drain is
//! dequeue-and-call, so a job that enqueues more jobs (or a cleanup
//! callback that calls `cleanup_some` again) needs no special casing.

use super::atomics::{PendingWait, WaitOutcome};
use super::{JsResult, Realm};
use crate::types::JsValue;
use std::time::Instant;

#[derive(Debug)]
pub(crate) enum Job {
    Call {
        func: JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    },
    RegistryCleanup {
        registry: u64,
    },
}

impl Realm {
    pub fn enqueue_job(&mut self, func: JsValue, this: JsValue, args: Vec<JsValue>) {
        self.jobs.push_back(Job::Call { func, this, args });
    }

    pub(crate) fn enqueue_registry_cleanup(&mut self, registry: u64) {
        self.jobs.push_back(Job::RegistryCleanup { registry });
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_empty() || !self.pending_waits.is_empty()
    }

    /// Drain the queue. A job that throws has its error collected for
    /// `take_unhandled_errors`; the queue keeps going. The kept-alive list
    /// (objects pinned by `WeakRef::deref`) is cleared at each job
    /// boundary. Async waits whose wake or timeout has arrived are settled
    /// into callback jobs; waits still outstanding stay registered without
    /// blocking.
    pub fn run_jobs(&mut self) {
        loop {
            self.settle_pending_waits();
            let Some(job) = self.jobs.pop_front() else {
                break;
            };
            let result: JsResult = match job {
                Job::Call { func, this, args } => self.call(&func, &this, &args),
                Job::RegistryCleanup { registry } => self
                    .run_registry_cleanup(registry)
                    .map(|_| JsValue::Undefined),
            };
            if let Err(err) = result {
                self.unhandled_errors.push(err);
            }
            self.kept_alive.clear();
        }
        self.kept_alive.clear();
    }

    fn settle_pending_waits(&mut self) {
        let mut still_waiting = Vec::new();
        for wait in std::mem::take(&mut self.pending_waits) {
            let outcome = settle_one(&wait);
            match outcome {
                Some(outcome) => self.jobs.push_back(Job::Call {
                    func: wait.callback,
                    this: JsValue::Undefined,
                    args: vec![JsValue::string(outcome.as_str())],
                }),
                None => still_waiting.push(wait),
            }
        }
        self.pending_waits = still_waiting;
    }
}

fn settle_one(wait: &PendingWait) -> Option<WaitOutcome> {
    let mut waiters = wait.shared.waiters.lock();
    match waiters.entries.iter().position(|e| e.id == wait.waiter_id) {
        Some(pos) => {
            if waiters.entries[pos].woken {
                waiters.entries.remove(pos);
                Some(WaitOutcome::Ok)
            } else if wait.deadline.is_some_and(|d| Instant::now() >= d) {
                waiters.entries.remove(pos);
                Some(WaitOutcome::TimedOut)
            } else {
                None
            }
        }
        // Entry already gone: treat as woken.
        None => Some(WaitOutcome::Ok),
    }
}
