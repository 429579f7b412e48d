//! Game sessions for Duskfall.
//!
//! Each session runs as an isolated Tokio task (actor model) that owns its
//! participants, their secret roles and the alive set, and drives them
//! through alternating day and night rounds until one side wins.
//!
//! # Key types
//!
//! - [`SessionManager`]: receives promoted batches, allocates ids, spawns
//!   and supervises engines, answers lookups
//! - [`SessionHandle`]: submit commands to a running engine
//! - [`Phase`]: the round state machine
//! - [`SessionConfig`]: grace period, phase deadline, inbox size
//! - [`GameState`] and the collectors in [`rules`]: the game itself

mod config;
mod engine;
mod error;
mod manager;
pub mod rules;

pub use config::{Phase, SessionConfig};
pub use engine::{Outcome, SessionHandle, SessionInfo};
pub use error::SessionError;
pub use manager::SessionManager;
pub use rules::{GameState, evaluate_win, role_deck, tally_votes};
