//! Wire protocol for Duskfall.
//!
//! This crate defines the vocabulary clients and the server share:
//!
//! - **Types** ([`Username`], [`Role`], [`Command`], [`Notification`],
//!   [`ClientEnvelope`], [`ServerEnvelope`]): what travels on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how it becomes bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! ```text
//! Transport (bytes) → Protocol (envelopes) → Lobby / Session (game state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEnvelope, Command, Notification, Request, Role, ServerEnvelope,
    ServerPayload, SessionId, Username,
};
