//! Sequential speech dispatcher
//!
//! The dispatcher is the only consumer of the [`JobQueue`]. On every tick of a
//! fixed interval it takes the head job, if nothing is already being spoken,
//! and awaits synthesis before it looks at the queue again.
//!
//! ```text
//!            tick & queue non-empty
//!   Idle ─────────────────────────────▶ Speaking
//!    ▲                                     │
//!    └──────── synthesis finished ─────────┘
//!              (success or failure)
//! ```
//!
//! A job is attempted exactly once. Failed jobs are reported to the requester
//! and dropped; they are never re-enqueued and never stop the loop.

use crate::error::Result;
use crate::event::{EventEmitter, EventKind, JobRef};
use crate::notify::{notify_best_effort, ChatNotifier};
use crate::queue::{Job, JobId, JobQueue};
use crate::speech::{SpeechBackend, VoiceConfig};
use crate::DispatchStats;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DispatchState {
    /// No job in flight
    Idle = 0,
    /// Exactly one job in flight
    Speaking = 1,
}

impl DispatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Speaking,
            _ => Self::Idle,
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another job was already in flight
    Busy,
    /// Nothing was queued
    Idle,
    /// One job was taken from the queue and attempted
    Spoke { job_id: JobId, success: bool },
}

/// Single-consumer loop that speaks queued jobs one at a time
pub struct Dispatcher {
    queue: JobQueue,
    speech: Arc<dyn SpeechBackend>,
    notifier: Arc<dyn ChatNotifier>,
    voice: VoiceConfig,
    events: EventEmitter,
    poll_interval: Duration,
    state: AtomicU8,
    spoken: AtomicU64,
    failed: AtomicU64,
    is_shutting_down: AtomicBool,
    shutdown_notify: Notify,
}

impl Dispatcher {
    /// Create an idle dispatcher draining `queue`
    pub fn new(
        queue: JobQueue,
        speech: Arc<dyn SpeechBackend>,
        notifier: Arc<dyn ChatNotifier>,
        voice: VoiceConfig,
        events: EventEmitter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            speech,
            notifier,
            voice,
            events,
            poll_interval,
            state: AtomicU8::new(DispatchState::Idle as u8),
            spoken: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            is_shutting_down: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> DispatchState {
        DispatchState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The queue this dispatcher drains
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Take the head job and speak it, unless a job is already in flight.
    ///
    /// Returns once the job has finished, successfully or not.
    pub async fn tick(&self) -> TickOutcome {
        // Claim the single in-flight slot before touching the queue.
        if self
            .state
            .compare_exchange(
                DispatchState::Idle as u8,
                DispatchState::Speaking as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!("Dispatcher busy; skipping tick");
            return TickOutcome::Busy;
        }

        let Some(job) = self.queue.pop_front().await else {
            self.state
                .store(DispatchState::Idle as u8, Ordering::SeqCst);
            return TickOutcome::Idle;
        };

        let success = self.speak(&job).await.is_ok();
        self.state
            .store(DispatchState::Idle as u8, Ordering::SeqCst);

        TickOutcome::Spoke {
            job_id: job.id().to_string(),
            success,
        }
    }

    async fn speak(&self, job: &Job) -> Result<()> {
        info!(
            job_id = %job.id(),
            requester = %job.requester(),
            volume_percent = job.volume_percent(),
            text = %job.text(),
            "Speaking"
        );
        self.events.emit(EventKind::JobStarted {
            job: JobRef::from(job),
        });

        let started = Instant::now();
        let result = self
            .speech
            .speak(job.text(), &self.voice, job.volume())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => {
                self.spoken.fetch_add(1, Ordering::SeqCst);
                notify_best_effort(
                    self.notifier.as_ref(),
                    &self.events,
                    &format!("🎤 \"{}\" ({}% vol)", job.text(), job.volume_percent()),
                )
                .await;

                self.events.emit(EventKind::JobCompleted {
                    job: JobRef::from(job),
                    elapsed_ms,
                });
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    job_id = %job.id(),
                    requester = %job.requester(),
                    error = %err,
                    "TTS error; discarding job"
                );
                notify_best_effort(
                    self.notifier.as_ref(),
                    &self.events,
                    &format!("❌ TTS Error for @{}", job.requester()),
                )
                .await;

                self.events.emit(EventKind::JobFailed {
                    job: JobRef::from(job),
                    error: err.to_string(),
                });
            }
        }
        result
    }

    /// Poll the queue on the configured interval until [`shutdown`](Self::shutdown).
    ///
    /// Each tick is awaited inline, so no tick can start while a job is being
    /// spoken. An in-flight job always finishes before the loop exits.
    pub async fn run(&self) {
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Starting TTS dispatcher");
        self.events.emit(EventKind::DispatcherStarted);

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.is_shutting_down() {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = self.shutdown_notify.notified() => {}
            }
        }

        info!("TTS dispatcher stopped");
        self.events.emit(EventKind::DispatcherShutdown);
    }

    /// Spawn [`run`](Self::run) on the tokio runtime
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Ask the loop to stop after the current job, if any
    pub fn shutdown(&self) {
        self.is_shutting_down.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
    }

    /// Check if shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Point-in-time counters
    pub async fn stats(&self) -> DispatchStats {
        DispatchStats {
            pending: self.queue.len().await,
            in_flight: usize::from(self.state() == DispatchState::Speaking),
            spoken: self.spoken.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::event::events;
    use crate::resolver::VolumeInfo;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Speech backend that records what it spoke
    #[derive(Default)]
    struct RecordingSpeech {
        spoken: Mutex<Vec<String>>,
        fail_on: Option<String>,
        delay_ms: u64,
    }

    #[async_trait]
    impl SpeechBackend for RecordingSpeech {
        async fn speak(&self, text: &str, _voice: &VoiceConfig, _volume: f64) -> Result<()> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.spoken.lock().await.push(text.to_string());
            if self.fail_on.as_deref() == Some(text) {
                return Err(DispatchError::Synthesis("engine crashed".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatNotifier for RecordingNotifier {
        async fn notify(&self, text: &str) -> Result<()> {
            self.sent.lock().await.push(text.to_string());
            Ok(())
        }
    }

    struct BrokenNotifier;

    #[async_trait]
    impl ChatNotifier for BrokenNotifier {
        async fn notify(&self, _text: &str) -> Result<()> {
            Err(DispatchError::Notify("offline".to_string()))
        }
    }

    fn make_job(requester: &str, text: &str) -> Job {
        Job::new(
            requester,
            text,
            VolumeInfo {
                volume: 0.3,
                volume_percent: 30,
                usage_count: 5,
            },
        )
    }

    fn make_dispatcher(
        speech: Arc<RecordingSpeech>,
        notifier: Arc<dyn ChatNotifier>,
    ) -> Dispatcher {
        Dispatcher::new(
            JobQueue::new(),
            speech,
            notifier,
            VoiceConfig::default(),
            EventEmitter::new(100),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_dispatch_state_from_u8() {
        assert_eq!(DispatchState::from_u8(0), DispatchState::Idle);
        assert_eq!(DispatchState::from_u8(1), DispatchState::Speaking);
    }

    #[tokio::test]
    async fn test_new_dispatcher_is_idle() {
        let dispatcher = make_dispatcher(
            Arc::new(RecordingSpeech::default()),
            Arc::new(RecordingNotifier::default()),
        );
        assert_eq!(dispatcher.state(), DispatchState::Idle);
        assert_eq!(dispatcher.poll_interval(), Duration::from_millis(10));
        let stats = dispatcher.stats().await;
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_tick_idle_when_queue_empty() {
        let dispatcher = make_dispatcher(
            Arc::new(RecordingSpeech::default()),
            Arc::new(RecordingNotifier::default()),
        );
        assert_eq!(dispatcher.tick().await, TickOutcome::Idle);
        assert_eq!(dispatcher.state(), DispatchState::Idle);
    }

    #[tokio::test]
    async fn test_tick_speaks_head_and_notifies() {
        let speech = Arc::new(RecordingSpeech::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = make_dispatcher(speech.clone(), notifier.clone());

        let job = make_job("alice", "hello world");
        let job_id = job.id().to_string();
        dispatcher.queue().enqueue(job).await;
        dispatcher.queue().enqueue(make_job("bob", "second")).await;

        let outcome = dispatcher.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Spoke {
                job_id,
                success: true
            }
        );
        assert_eq!(*speech.spoken.lock().await, vec!["hello world"]);
        assert_eq!(
            *notifier.sent.lock().await,
            vec!["🎤 \"hello world\" (30% vol)"]
        );
        assert_eq!(dispatcher.queue().len().await, 1);
        assert_eq!(dispatcher.state(), DispatchState::Idle);
    }

    #[tokio::test]
    async fn test_tick_failure_discards_job() {
        let speech = Arc::new(RecordingSpeech {
            fail_on: Some("boom".to_string()),
            ..Default::default()
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = make_dispatcher(speech.clone(), notifier.clone());

        dispatcher.queue().enqueue(make_job("carol", "boom")).await;
        dispatcher.queue().enqueue(make_job("dave", "after")).await;

        let outcome = dispatcher.tick().await;
        assert!(matches!(outcome, TickOutcome::Spoke { success: false, .. }));
        assert_eq!(
            *notifier.sent.lock().await,
            vec!["❌ TTS Error for @carol"]
        );
        // not re-enqueued
        assert_eq!(dispatcher.queue().len().await, 1);
        assert_eq!(dispatcher.queue().peek().await.unwrap().text(), "after");

        let outcome = dispatcher.tick().await;
        assert!(matches!(outcome, TickOutcome::Spoke { success: true, .. }));

        let stats = dispatcher.stats().await;
        assert_eq!(stats.spoken, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_concurrent_tick_is_busy() {
        let speech = Arc::new(RecordingSpeech {
            delay_ms: 100,
            ..Default::default()
        });
        let dispatcher = Arc::new(make_dispatcher(
            speech.clone(),
            Arc::new(RecordingNotifier::default()),
        ));
        dispatcher.queue().enqueue(make_job("a", "one")).await;
        dispatcher.queue().enqueue(make_job("b", "two")).await;

        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.tick().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(dispatcher.state(), DispatchState::Speaking);
        assert_eq!(dispatcher.stats().await.in_flight, 1);
        assert_eq!(dispatcher.tick().await, TickOutcome::Busy);

        assert!(matches!(
            first.await.unwrap(),
            TickOutcome::Spoke { success: true, .. }
        ));
        assert_eq!(dispatcher.queue().len().await, 1);
    }

    #[tokio::test]
    async fn test_notify_failure_does_not_stop_dispatch() {
        let speech = Arc::new(RecordingSpeech::default());
        let dispatcher = make_dispatcher(speech.clone(), Arc::new(BrokenNotifier));
        let mut rx = dispatcher.events.subscribe();

        dispatcher.queue().enqueue(make_job("a", "one")).await;
        dispatcher.queue().enqueue(make_job("b", "two")).await;

        dispatcher.tick().await;
        dispatcher.tick().await;

        assert_eq!(*speech.spoken.lock().await, vec!["one", "two"]);
        let mut keys = Vec::new();
        while let Ok(event) = rx.try_recv() {
            keys.push(event.key());
        }
        assert!(keys.iter().any(|k| *k == events::NOTIFY_FAILED));
        assert_eq!(
            keys.iter().filter(|k| **k == events::JOB_COMPLETED).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_run_drains_in_order_and_shuts_down() {
        let speech = Arc::new(RecordingSpeech::default());
        let dispatcher = Arc::new(make_dispatcher(
            speech.clone(),
            Arc::new(RecordingNotifier::default()),
        ));
        for text in ["one", "two", "three"] {
            dispatcher.queue().enqueue(make_job("user", text)).await;
        }

        let handle = Arc::clone(&dispatcher).start();
        tokio::time::timeout(Duration::from_secs(2), async {
            while dispatcher.stats().await.spoken < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dispatcher did not drain the queue");

        dispatcher.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();

        assert!(dispatcher.is_shutting_down());
        assert_eq!(*speech.spoken.lock().await, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_exits() {
        let dispatcher = Arc::new(make_dispatcher(
            Arc::new(RecordingSpeech::default()),
            Arc::new(RecordingNotifier::default()),
        ));
        dispatcher.shutdown();
        tokio::time::timeout(Duration::from_secs(1), Arc::clone(&dispatcher).start())
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }
}
