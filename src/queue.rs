//! Speech job queue
//!
//! A [`JobQueue`] is an unbounded FIFO shared between many producers (one per
//! chat command) and the single [`Dispatcher`](crate::dispatcher::Dispatcher)
//! that drains it. All access goes through one mutex, so every interleaving of
//! `enqueue` and `pop_front` is consistent with the order in which the
//! `enqueue` calls completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::resolver::VolumeInfo;

/// Job identifier
pub type JobId = String;

/// One accepted speech request.
///
/// Fields are private; a job never changes after it has been created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    requester: String,
    text: String,
    volume: f64,
    volume_percent: i64,
    usage_count: u64,
    enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Create a job from already-sanitized text and a resolved volume
    pub fn new(requester: impl Into<String>, text: impl Into<String>, volume: VolumeInfo) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requester: requester.into(),
            text: text.into(),
            volume: volume.volume,
            volume_percent: volume.volume_percent,
            usage_count: volume.usage_count,
            enqueued_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Chat user who asked for this job
    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// Sanitized text to speak
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Volume in the resolver's native unit
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Volume as shown in chat
    pub fn volume_percent(&self) -> i64 {
        self.volume_percent
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}

/// Unbounded FIFO of pending jobs.
///
/// Cloning the queue clones the handle; all clones share the same jobs.
#[derive(Clone, Default)]
pub struct JobQueue {
    pending: Arc<Mutex<VecDeque<Job>>>,
}

impl JobQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail and return the new queue length.
    ///
    /// Never fails and never drops jobs; there is no capacity limit.
    pub async fn enqueue(&self, job: Job) -> usize {
        let mut pending = self.pending.lock().await;
        pending.push_back(job);
        pending.len()
    }

    /// Copy of the head job, if any
    pub async fn peek(&self) -> Option<Job> {
        self.pending.lock().await.front().cloned()
    }

    /// Remove and return the head job; `None` when empty
    pub async fn pop_front(&self) -> Option<Job> {
        self.pending.lock().await.pop_front()
    }

    /// Number of pending jobs
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Check if the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Copy of all pending jobs, head first
    pub async fn snapshot(&self) -> Vec<Job> {
        self.pending.lock().await.iter().cloned().collect()
    }
}
