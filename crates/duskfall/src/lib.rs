//! # Duskfall
//!
//! Matchmaking and session server for a four-player Mafia game.
//!
//! Players connect over WebSocket and join a queue. Every time four are
//! waiting, they are dealt secret roles and handed to a session engine that
//! runs alternating day (vote) and night (kill / check) rounds until either
//! the Mafia or the Civilians win.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duskfall::prelude::*;
//!
//! # async fn start() -> Result<(), DuskfallError> {
//! let server = DuskfallServer::builder()
//!     .bind("0.0.0.0:9000")
//!     .session_config(SessionConfig::default())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod chat;
mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::DuskfallError;
pub use server::{DuskfallServer, DuskfallServerBuilder};

/// Everything needed to run a server or write a client.
pub mod prelude {
    pub use crate::{DuskfallError, DuskfallServer, DuskfallServerBuilder, ServerConfig};
    pub use duskfall_lobby::QueueConfig;
    pub use duskfall_protocol::{
        ClientEnvelope, Codec, Command, JsonCodec, Notification, Request,
        Role, ServerEnvelope, ServerPayload, SessionId, Username,
    };
    pub use duskfall_session::{Phase, SessionConfig};
}
