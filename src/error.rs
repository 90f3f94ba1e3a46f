//! Error types for the TTS dispatcher
//!
//! All errors implement the `std::error::Error` trait via `thiserror::Error`.
//!
//! # Error Handling
//!
//! Every failure is terminal for the job or request it affects:
//! - Resolver errors drop the request before it reaches the queue
//! - Synthesis errors discard the in-flight job
//! - Notify errors are logged and otherwise ignored
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_tts::DispatchError;
//!
//! match resolver.resolve_volume("alice").await {
//!     Ok(info) => { /* enqueue */ },
//!     Err(DispatchError::Resolver(reason)) => {
//!         tracing::warn!(%reason, "volume lookup failed");
//!     },
//!     Err(e) => {
//!         eprintln!("Unexpected error: {}", e);
//!     }
//! }
//! ```

use thiserror::Error;

/// Dispatcher error type
///
/// # Variants
///
/// * `Resolver` - Volume lookup failed (transport, status or payload)
/// * `Synthesis` - Speech backend reported an error for a job
/// * `Notify` - Outbound chat message could not be delivered
/// * `Chat` - Chat connection error
/// * `Config` - Invalid configuration
/// * `Io` - Underlying I/O failure
/// * `Other` - Catch-all for unexpected errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Volume lookup failed
    #[error("Volume lookup failed: {0}")]
    Resolver(String),

    /// Speech synthesis failed
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// Chat notification failed
    #[error("Chat notification failed: {0}")]
    Notify(String),

    /// Chat connection error
    #[error("Chat connection error: {0}")]
    Chat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Result type alias using DispatchError
pub type Result<T> = std::result::Result<T, DispatchError>;
