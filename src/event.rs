//! Lifecycle events for the TTS pipeline
//!
//! Every stage of a request (queued, started, completed, failed) is broadcast
//! as a [`DispatchEvent`]. Nothing in the pipeline depends on anyone listening;
//! the events exist for logs, dashboards and tests.

use crate::queue::{Job, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// The job fields carried by every job event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub job_id: JobId,
    pub requester: String,
    pub volume_percent: i64,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id().to_string(),
            requester: job.requester().to_string(),
            volume_percent: job.volume_percent(),
        }
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    JobQueued { job: JobRef, queue_len: usize },
    JobStarted { job: JobRef },
    JobCompleted { job: JobRef, elapsed_ms: u64 },
    JobFailed { job: JobRef, error: String },
    /// Volume lookup failed; no job was created
    ResolverFailed { requester: String, error: String },
    NotifyFailed { error: String },
    DispatcherStarted,
    DispatcherShutdown,
}

/// A timestamped pipeline event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl DispatchEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Dotted key from [`events`], handy for filtering and logs
    pub fn key(&self) -> &'static str {
        match &self.kind {
            EventKind::JobQueued { .. } => events::JOB_QUEUED,
            EventKind::JobStarted { .. } => events::JOB_STARTED,
            EventKind::JobCompleted { .. } => events::JOB_COMPLETED,
            EventKind::JobFailed { .. } => events::JOB_FAILED,
            EventKind::ResolverFailed { .. } => events::RESOLVER_FAILED,
            EventKind::NotifyFailed { .. } => events::NOTIFY_FAILED,
            EventKind::DispatcherStarted => events::DISPATCHER_STARTED,
            EventKind::DispatcherShutdown => events::DISPATCHER_SHUTDOWN,
        }
    }

    /// The job this event is about, if any
    pub fn job(&self) -> Option<&JobRef> {
        match &self.kind {
            EventKind::JobQueued { job, .. }
            | EventKind::JobStarted { job }
            | EventKind::JobCompleted { job, .. }
            | EventKind::JobFailed { job, .. } => Some(job),
            _ => None,
        }
    }
}

/// Broadcasts events to any number of subscribers
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<DispatchEvent>>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event; dropped silently when nobody is subscribed
    pub fn emit(&self, kind: EventKind) {
        let _ = self.sender.send(DispatchEvent::new(kind));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the events matching `filter`
    pub fn subscribe_filtered(
        &self,
        filter: impl Fn(&DispatchEvent) -> bool + Send + Sync + 'static,
    ) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
            filter: Box::new(filter),
        }
    }
}

/// Filtered subscription; slow readers skip what they missed
pub struct EventStream {
    receiver: broadcast::Receiver<DispatchEvent>,
    filter: Box<dyn Fn(&DispatchEvent) -> bool + Send + Sync>,
}

impl EventStream {
    /// Next matching event, or `None` once every emitter is gone
    pub async fn recv(&mut self) -> Option<DispatchEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if (self.filter)(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Event keys
pub mod events {
    pub const JOB_QUEUED: &str = "job.queued";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const RESOLVER_FAILED: &str = "resolver.failed";
    pub const NOTIFY_FAILED: &str = "notify.failed";
    pub const DISPATCHER_STARTED: &str = "dispatcher.started";
    pub const DISPATCHER_SHUTDOWN: &str = "dispatcher.shutdown";
}
