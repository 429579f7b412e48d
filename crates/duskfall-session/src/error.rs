//! Error types for the session layer.

use duskfall_protocol::{Role, SessionId, Username};

use crate::Phase;

/// Errors that can occur while routing or validating session commands.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session with this id is registered.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The session exists but its engine has stopped (finished or aborted).
    #[error("session {0} is no longer running")]
    Unavailable(SessionId),

    /// The session manager's dispatcher is gone.
    #[error("session manager is shut down")]
    ManagerClosed,

    /// The sender is not one of the session's participants.
    #[error("{0} is not a participant in this session")]
    NotParticipant(Username),

    /// The sender has been eliminated.
    #[error("{0} has been eliminated")]
    NotAlive(Username),

    /// The command kind does not belong to the current phase.
    #[error("{command} is not accepted during {phase}")]
    WrongPhase { phase: Phase, command: &'static str },

    /// The sender's role cannot issue this command.
    #[error("{username} cannot do that: only the {required} can")]
    WrongRole { username: Username, required: Role },

    /// The sender already submitted a command this phase.
    #[error("{0} already acted this phase")]
    AlreadyActed(Username),

    /// The target is not an alive participant.
    #[error("{0} is not a valid target")]
    InvalidTarget(Username),

    /// The role deck is only defined for four participants.
    #[error("sessions of {0} participants are not supported")]
    UnsupportedCapacity(usize),
}

impl SessionError {
    /// Returns `true` for structurally valid commands that are illegal in
    /// the current game state. These are rejected back to the caller and
    /// leave the session untouched.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::NotParticipant(_)
                | Self::NotAlive(_)
                | Self::WrongPhase { .. }
                | Self::WrongRole { .. }
                | Self::AlreadyActed(_)
                | Self::InvalidTarget(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_protocol_violation_splits_violations_from_availability() {
        assert!(SessionError::AlreadyActed(Username::from("a")).is_protocol_violation());
        assert!(
            SessionError::WrongPhase {
                phase: Phase::DayPass,
                command: "Vote",
            }
            .is_protocol_violation()
        );
        assert!(!SessionError::NotFound(SessionId(3)).is_protocol_violation());
        assert!(!SessionError::Unavailable(SessionId(3)).is_protocol_violation());
        assert!(!SessionError::UnsupportedCapacity(5).is_protocol_violation());
    }

    #[test]
    fn test_wrong_role_message_names_required_role() {
        let err = SessionError::WrongRole {
            username: Username::from("cy"),
            required: Role::Mafia,
        };
        assert_eq!(err.to_string(), "cy cannot do that: only the Mafia can");
    }
}
