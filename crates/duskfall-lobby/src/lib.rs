//! Participants and matchmaking for Duskfall.
//!
//! This crate handles players from the moment they connect until they are
//! handed to a game session:
//!
//! 1. **Participant handles** ([`Participant`]): identity, notification
//!    sink, and a best-effort disconnect signal
//! 2. **Queue** ([`Queue`]): accumulates participants and emits a batch
//!    to the session manager once capacity is reached
//!
//! ```text
//! Session Layer (above)  ← receives promoted batches through the intake
//!     ↕
//! Lobby Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← provides Username, Notification
//! ```

mod error;
mod participant;
mod queue;

pub use error::LobbyError;
pub use participant::{
    DisconnectSignal, NotificationSink, NotificationStream, Participant,
    broadcast,
};
pub use queue::{Admission, BatchReceiver, BatchSender, Queue, QueueConfig};
