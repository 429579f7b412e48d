//! Error types for the protocol layer.
//!
//! Each crate in Duskfall defines its own error enum, so a
//! `ProtocolError` always means a framing or serialization problem and
//! never a game-rule problem.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, an unknown
    /// `type` tag, or a truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but is not meaningful, e.g. an empty username.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
