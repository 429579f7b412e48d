//! Session configuration and the round state machine.

use std::time::Duration;

use duskfall_protocol::Command;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Settings shared by every session the manager starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pause between dealing roles and the first round, so every client can
    /// render its role before the first prompt.
    pub grace_period: Duration,

    /// Deadline for each quorum phase. `None` waits forever, which lets a
    /// single stalled player block the session.
    ///
    /// When a deadline passes, missing players forfeit: a missing Pass
    /// counts as passed, a missing Vote abstains, a missing night action
    /// does nothing.
    pub phase_timeout: Option<Duration>,

    /// Capacity of the engine's command inbox. Submitters wait when full.
    pub inbox_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            phase_timeout: None,
            inbox_size: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a session is in its round cycle.
///
/// ```text
/// Starting → DayPass → NightPass → DayVote ⇄ NightActions
///                 ╲         ╲          ╲          ╲
///                  └─────────┴──────────┴──────────┴──→ Terminated
/// ```
///
/// - **Starting**: roles dealt, grace period running. No commands.
/// - **DayPass** / **NightPass**: first day and night. Every participant
///   sends `Pass`; nobody is eliminated.
/// - **DayVote**: every alive participant votes once.
/// - **NightActions**: the alive Mafia kills, the alive Detective checks.
/// - **Terminated**: a side won (or the session aborted). Absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Starting,
    DayPass,
    NightPass,
    DayVote,
    NightActions,
    Terminated,
}

impl Phase {
    /// Returns `true` if `command` is the kind this phase collects.
    pub fn accepts(self, command: &Command) -> bool {
        match self {
            Self::DayPass | Self::NightPass => {
                matches!(command, Command::Pass)
            }
            Self::DayVote => matches!(command, Command::Vote { .. }),
            Self::NightActions => {
                matches!(command, Command::Kill { .. } | Command::Check { .. })
            }
            Self::Starting | Self::Terminated => false,
        }
    }

    /// The phase that follows when nobody has won.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Starting => Some(Self::DayPass),
            Self::DayPass => Some(Self::NightPass),
            Self::NightPass => Some(Self::DayVote),
            Self::DayVote => Some(Self::NightActions),
            Self::NightActions => Some(Self::DayVote),
            Self::Terminated => None,
        }
    }

    /// Returns `true` if moving to `target` is a legal step.
    ///
    /// Any phase can end the session; otherwise only [`Phase::next`] is
    /// allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        match target {
            Self::Terminated => self != Self::Terminated,
            _ => self.next() == Some(target),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::DayPass => write!(f, "DayPass"),
            Self::NightPass => write!(f, "NightPass"),
            Self::DayVote => write!(f, "DayVote"),
            Self::NightActions => write!(f, "NightActions"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}
