//! Error types for the lobby layer.

use duskfall_protocol::Username;

/// Errors that can occur while queueing or notifying participants.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The participant's notification stream is gone (their connection
    /// task exited). Broadcasts log this and move on.
    #[error("notification sink for {0} is closed")]
    SinkClosed(Username),

    /// The session manager stopped accepting batches. The promoted batch
    /// is dropped, which ends every member's notification stream.
    #[error("session intake is closed")]
    IntakeClosed,

    /// A queue cannot batch zero participants.
    #[error("invalid queue capacity {0}")]
    InvalidCapacity(usize),
}
