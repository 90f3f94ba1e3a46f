//! Chat command handling
//!
//! [`TtsBot`] is the producer side of the pipeline. Each inbound chat message is
//! parsed; `!tts` requests resolve the requester's volume (once, no retry),
//! become a [`Job`] and are appended to the queue. The other commands are
//! answered directly and never create jobs.

use crate::chat::ChatEvent;
use crate::command::ChatCommand;
use crate::event::{EventEmitter, EventKind, JobRef};
use crate::notify::{notify_best_effort, ChatNotifier};
use crate::queue::{Job, JobId, JobQueue};
use crate::resolver::VolumeResolver;
use crate::sanitize::Sanitizer;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Reply to `!ttshelp`
pub const HELP_TEXT: &str =
    "🎤 TTS Commands: !tts <message> | !volume | Volume increases 2% per TTS use!";

/// Sent once the chat connection is up
pub const ONLINE_TEXT: &str = "🤖 TTS Bot is online! Use !tts <message> to test.";

/// What handling one chat message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A job was appended to the queue
    Queued { job_id: JobId, queue_len: usize },
    /// The volume lookup failed; nothing was queued
    Rejected,
    /// A direct answer was sent (`!volume`, `!ttshelp`, `!ttsstats`)
    Replied,
    /// Not a command
    Ignored,
}

/// Routes chat commands to the queue and the volume service
#[derive(Clone)]
pub struct TtsBot {
    queue: JobQueue,
    resolver: Arc<dyn VolumeResolver>,
    notifier: Arc<dyn ChatNotifier>,
    sanitizer: Sanitizer,
    events: EventEmitter,
}

impl TtsBot {
    pub fn new(
        queue: JobQueue,
        resolver: Arc<dyn VolumeResolver>,
        notifier: Arc<dyn ChatNotifier>,
        sanitizer: Sanitizer,
        events: EventEmitter,
    ) -> Self {
        Self {
            queue,
            resolver,
            notifier,
            sanitizer,
            events,
        }
    }

    /// Handle one inbound chat message
    pub async fn handle(&self, event: &ChatEvent) -> HandleOutcome {
        let command = ChatCommand::parse(&event.text, event.is_self);
        let user = event.speaker.as_str();

        match command {
            ChatCommand::None => HandleOutcome::Ignored,
            ChatCommand::Tts(payload) => self.request_tts(user, &payload).await,
            ChatCommand::Volume => {
                let reply = match self.resolver.volume_summary(user).await {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(user = %user, error = %err, "Volume summary failed");
                        format!("@{} Couldn't get volume info. API might be down.", user)
                    }
                };
                self.say(&reply).await;
                HandleOutcome::Replied
            }
            ChatCommand::Help => {
                self.say(HELP_TEXT).await;
                HandleOutcome::Replied
            }
            ChatCommand::Stats => {
                let reply = match self.resolver.stats().await {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "Stats lookup failed");
                        "Stats unavailable - API might be down.".to_string()
                    }
                };
                self.say(&reply).await;
                HandleOutcome::Replied
            }
        }
    }

    async fn request_tts(&self, user: &str, payload: &str) -> HandleOutcome {
        info!(user = %user, payload = %payload, "TTS request");

        let volume = match self.resolver.resolve_volume(user).await {
            Ok(volume) => volume,
            Err(err) => {
                warn!(user = %user, error = %err, "Error processing TTS request");
                self.events.emit(EventKind::ResolverFailed {
                    requester: user.to_string(),
                    error: err.to_string(),
                });
                self.say(&format!(
                    "@{} Sorry, TTS system error. Is the API running?",
                    user
                ))
                .await;
                return HandleOutcome::Rejected;
            }
        };

        let job = Job::new(user, self.sanitizer.sanitize(payload), volume);
        let job_id = job.id().to_string();
        let volume_percent = job.volume_percent();
        let job_ref = JobRef::from(&job);

        let queue_len = self.queue.enqueue(job).await;
        info!(
            job_id = %job_id,
            user = %user,
            volume_percent,
            queue_len,
            "TTS job queued"
        );
        self.events.emit(EventKind::JobQueued {
            job: job_ref,
            queue_len,
        });

        self.say(&format!(
            "🔊 @{} TTS queued at {}% volume! (Queue: {})",
            user, volume_percent, queue_len
        ))
        .await;

        HandleOutcome::Queued { job_id, queue_len }
    }

    /// Handle inbound chat until the stream ends or `shutdown` resolves.
    ///
    /// Each message runs on its own task. `shutdown` is polled across
    /// iterations, so a signal that fires while messages are pending is kept.
    pub async fn serve<F>(&self, mut inbound: mpsc::Receiver<ChatEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(message) = message else {
                        warn!("Chat stream ended");
                        return;
                    };
                    let bot = self.clone();
                    tokio::spawn(async move {
                        bot.handle(&message).await;
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return;
                }
            }
        }
    }

    /// Best-effort chat message
    pub async fn say(&self, text: &str) {
        notify_best_effort(self.notifier.as_ref(), &self.events, text).await;
    }
}
