//! Unified error type for the Duskfall server.

use duskfall_lobby::LobbyError;
use duskfall_protocol::ProtocolError;
use duskfall_session::SessionError;
use duskfall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each wrapped variant lets `?` convert layer errors
/// directly.
#[derive(Debug, thiserror::Error)]
pub enum DuskfallError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lobby-level error (closed sink or intake, bad capacity).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// A session-level error (unknown session, protocol violation).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}
