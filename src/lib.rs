//! # chat-tts
//!
//! A chat-triggered text-to-speech dispatcher.
//!
//! Viewers type `!tts <message>` in chat; the bot looks up their volume from an
//! external service, queues the sanitized message and speaks queued messages
//! one at a time on the local audio device.
//!
//! ## Pipeline
//!
//! - [`TtsBot`] parses chat commands and enqueues [`Job`]s (many producers)
//! - [`JobQueue`] holds jobs in strict FIFO order, without a capacity limit
//! - [`Dispatcher`] polls the queue and speaks exactly one job at a time
//! - [`EventEmitter`] broadcasts lifecycle events (`job.queued`, `job.failed`, ...)
//!
//! External services sit behind traits so they can be swapped for fakes:
//! [`VolumeResolver`], [`SpeechBackend`] and [`ChatNotifier`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chat_tts::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfig::load()?;
//!     let events = EventEmitter::default();
//!     let queue = JobQueue::new();
//!     let (chat, inbound) = TwitchChat::connect(&config.chat).await?;
//!     let notifier: Arc<dyn ChatNotifier> = Arc::new(chat);
//!
//!     let dispatcher = Arc::new(Dispatcher::new(
//!         queue.clone(),
//!         Arc::new(SystemSpeech::detect()?),
//!         notifier.clone(),
//!         VoiceConfig::from(&config.tts),
//!         events.clone(),
//!         config.poll_interval,
//!     ));
//!     dispatcher.clone().start();
//!
//!     let bot = TtsBot::new(
//!         queue,
//!         Arc::new(HttpVolumeResolver::new(&config.volume_api)?),
//!         notifier,
//!         Sanitizer::new(config.tts.max_message_length),
//!         events,
//!     );
//!     bot.serve(inbound, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod chat;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod notify;
pub mod queue;
pub mod resolver;
pub mod sanitize;
pub mod speech;

pub use bot::{HandleOutcome, TtsBot};
pub use chat::{ChatEvent, TwitchChat};
pub use command::ChatCommand;
pub use config::{BotConfig, ChatConfig, TtsConfig, VolumeApiConfig};
pub use dispatcher::{DispatchState, Dispatcher, TickOutcome};
pub use error::{DispatchError, Result};
pub use event::{DispatchEvent, EventEmitter, EventKind, EventStream, JobRef};
pub use notify::{notify_best_effort, ChatNotifier, LogNotifier};
pub use queue::{Job, JobId, JobQueue};
pub use resolver::{HttpVolumeResolver, VolumeInfo, VolumeResolver};
pub use sanitize::{sanitize, Sanitizer};
pub use speech::{SpeechBackend, SystemSpeech, VoiceConfig};

use serde::{Deserialize, Serialize};

/// Dispatcher statistics snapshot
///
/// # Fields
///
/// * `pending` - Jobs waiting in the queue
/// * `in_flight` - Jobs being spoken right now (0 or 1)
/// * `spoken` - Jobs spoken successfully since start
/// * `failed` - Jobs discarded after a synthesis error since start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub pending: usize,
    pub in_flight: usize,
    pub spoken: u64,
    pub failed: u64,
}
