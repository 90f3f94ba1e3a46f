//! Outbound chat notifications
//!
//! Notifications are fire-and-forget. A failed send is logged and broadcast as
//! a `notify.failed` event, and never reaches the caller.

use crate::error::Result;
use crate::event::{EventEmitter, EventKind};
use async_trait::async_trait;
use tracing::warn;

/// Destination for status messages in chat
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Send `text` to the chat channel
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Send a notification, swallowing and logging any failure
pub async fn notify_best_effort(notifier: &dyn ChatNotifier, emitter: &EventEmitter, text: &str) {
    if let Err(err) = notifier.notify(text).await {
        warn!(error = %err, text = %text, "Failed to send chat notification");
        emitter.emit(EventKind::NotifyFailed {
            error: err.to_string(),
        });
    }
}

/// Notifier that only logs; used when no chat connection is configured
pub struct LogNotifier;

#[async_trait]
impl ChatNotifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        tracing::info!(text = %text, "chat");
        Ok(())
    }
}
