//! Priority job queue that serializes every state-changing engine operation.
//!
//! Jobs are ordered by kind (fetch first, sync last) with the running job
//! pinned at the head. A caller submits, polls until its job is at the head
//! and marked running, does its work, and drops the guard.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Fetch,
    Create,
    Rename,
    Modify,
    Delete,
    Sync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub trace: String,
    pub kind: JobKind,
    pub running: bool,
}

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a job and return its trace id.
    pub fn submit(&self, kind: JobKind) -> String {
        let trace = Ulid::new().to_string();
        let mut jobs = self.jobs();
        jobs.push(Job {
            trace: trace.clone(),
            kind,
            running: false,
        });
        jobs.sort_by_key(|job| (!job.running, job.kind));
        trace
    }

    /// Mark `trace` running if it is at the head and nothing else runs.
    pub fn try_start(&self, trace: &str) -> bool {
        let mut jobs = self.jobs();
        match jobs.first_mut() {
            Some(head) if head.trace == trace => {
                head.running = true;
                true
            }
            _ => false,
        }
    }

    pub fn finish(&self, trace: &str) {
        self.jobs().retain(|job| job.trace != trace);
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Submit a job and wait until it is the one running.
    pub async fn acquire(&self, kind: JobKind, poll: Duration) -> JobGuard<'_> {
        let guard = JobGuard {
            queue: self,
            trace: self.submit(kind),
            kind,
        };
        while !self.try_start(&guard.trace) {
            tokio::time::sleep(poll).await;
        }
        debug!(trace = %guard.trace, ?kind, "job started");
        guard
    }
}

/// Removes its job from the queue when dropped.
#[derive(Debug)]
pub struct JobGuard<'a> {
    queue: &'a JobQueue,
    trace: String,
    kind: JobKind,
}

impl JobGuard<'_> {
    pub fn trace(&self) -> &str {
        &self.trace
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.queue.finish(&self.trace);
        debug!(trace = %self.trace, kind = ?self.kind, "job finished");
    }
}
