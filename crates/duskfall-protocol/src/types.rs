//! Core protocol types for Duskfall's wire format.
//!
//! Everything in this module travels between a client and the server:
//! identities, roles, the commands players issue each round, the
//! notifications the server pushes, and the envelopes that carry them.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's chosen name.
///
/// Usernames are the only identity a player has: they key the queue, the
/// role map, and the alive set. Uniqueness is the client's responsibility.
///
/// `#[serde(transparent)]` keeps it a bare JSON string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Creates a username from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrows the name as a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty string, which clients must not send.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Username {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for Username {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one game session.
///
/// Allocated by the session manager starting at 1, never reused. Signed
/// because clients treat it as an int64.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Game vocabulary
// ---------------------------------------------------------------------------

/// A secret role dealt at the start of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Kills one player each night after the first. Wins on parity.
    Mafia,
    /// Checks one player each night after the first.
    Detective,
    /// Votes during the day. Has no night action.
    Civilian,
}

impl Role {
    /// Returns `true` for roles that must act at night (after night 1).
    pub fn acts_at_night(self) -> bool {
        matches!(self, Self::Mafia | Self::Detective)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mafia => write!(f, "Mafia"),
            Self::Detective => write!(f, "Detective"),
            Self::Civilian => write!(f, "Civilian"),
        }
    }
}

/// One player's action for the current round.
///
/// Internally tagged: `{ "type": "Vote", "target": "bob" }`,
/// `{ "type": "Pass" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Day vote to eliminate `target`.
    Vote { target: Username },
    /// Mafia night kill.
    Kill { target: Username },
    /// Detective night check.
    Check { target: Username },
    /// Acknowledge the current phase without acting (first day and night).
    Pass,
}

impl Command {
    /// Short name of the command kind, used in logs and rejections.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Vote { .. } => "Vote",
            Self::Kill { .. } => "Kill",
            Self::Check { .. } => "Check",
            Self::Pass => "Pass",
        }
    }
}

/// Server-pushed events delivered on a participant's notification stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// Someone joined the queue. `members` is the queue in join order.
    ParticipantJoined {
        username: Username,
        members: Vec<Username>,
    },

    /// Someone left the queue. `members` is what remains.
    ParticipantLeft {
        username: Username,
        members: Vec<Username>,
    },

    /// The queue filled up and you were placed in a session.
    /// Sent privately: `role` is yours alone.
    EnteredSession { session_id: SessionId, role: Role },

    /// A new day began.
    RoundStart {
        day: u64,
        /// The player killed during the previous night.
        last_eliminated: Option<Username>,
        /// Set when the detective's last check hit the mafia.
        mafia_revealed: Option<Username>,
        alive: Vec<Username>,
    },

    /// Night fell. `voted_out` is the player eliminated by today's vote.
    Night {
        voted_out: Option<Username>,
        alive: Vec<Username>,
    },

    /// The game is over.
    Result { winner: Role },

    /// The session failed internally and will not continue.
    SessionAborted { session_id: SessionId, reason: String },

    /// A chat line from another participant of the session.
    ChatMessage {
        session_id: SessionId,
        username: Username,
        text: String,
    },
}

// ---------------------------------------------------------------------------
// Requests (client → server)
// ---------------------------------------------------------------------------

/// Everything a client can ask of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Join the matchmaking queue and open this connection's notification
    /// stream for `username`.
    ConnectQueue { username: Username },

    /// Leave the queue explicitly.
    DisconnectQueue { username: Username },

    /// Submit a round command to a running session.
    SendCommand {
        session_id: SessionId,
        username: Username,
        command: Command,
    },

    /// Subscribe this connection to a session's chat topic.
    JoinChat { session_id: SessionId },

    /// Publish a chat line to a session's topic.
    SendChat {
        session_id: SessionId,
        username: Username,
        text: String,
    },
}

impl Request {
    /// Short name of the request kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectQueue { .. } => "ConnectQueue",
            Self::DisconnectQueue { .. } => "DisconnectQueue",
            Self::SendCommand { .. } => "SendCommand",
            Self::JoinChat { .. } => "JoinChat",
            Self::SendChat { .. } => "SendChat",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// A client frame. `seq` is chosen by the client and echoed back in the
/// matching [`ServerPayload::Ack`] or [`ServerPayload::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub seq: u64,
    pub request: Request,
}

/// What a server frame carries.
///
/// Adjacently tagged: `{ "type": "Ack", "data": { "request_seq": 4 } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerPayload {
    /// The request with this sequence number succeeded.
    Ack { request_seq: u64 },

    /// The request failed. `code` follows HTTP conventions
    /// (400 rejected, 404 unknown session, 409 conflict, 410 gone).
    /// `request_seq` is 0 when the frame could not be decoded at all.
    Error {
        request_seq: u64,
        code: u16,
        message: String,
    },

    /// A pushed notification on this connection's stream.
    Notification(Notification),
}

/// A server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEnvelope {
    /// Per-connection counter, starting at 1.
    pub seq: u64,
    /// Milliseconds since the connection was accepted.
    pub timestamp: u64,
    pub payload: ServerPayload,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shapes below are what terminal clients parse, so the serde
    //! attributes are pinned here.

    use super::*;

    fn name(s: &str) -> Username {
        Username::from(s)
    }

    #[test]
    fn test_username_serializes_as_plain_string() {
        let json = serde_json::to_string(&name("ada")).unwrap();
        assert_eq!(json, "\"ada\"");
    }

    #[test]
    fn test_session_id_serializes_as_plain_number_and_displays() {
        assert_eq!(serde_json::to_string(&SessionId(12)).unwrap(), "12");
        assert_eq!(SessionId(12).to_string(), "S-12");
    }

    #[test]
    fn test_role_acts_at_night() {
        assert!(Role::Mafia.acts_at_night());
        assert!(Role::Detective.acts_at_night());
        assert!(!Role::Civilian.acts_at_night());
    }

    #[test]
    fn test_command_vote_json_format() {
        let json = serde_json::to_value(Command::Vote {
            target: name("bob"),
        })
        .unwrap();
        assert_eq!(json["type"], "Vote");
        assert_eq!(json["target"], "bob");
    }

    #[test]
    fn test_command_pass_json_format() {
        let json = serde_json::to_value(Command::Pass).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Pass" }));
    }

    #[test]
    fn test_command_kind() {
        assert_eq!(Command::Kill { target: name("eve") }.kind(), "Kill");
        assert_eq!(Command::Pass.kind(), "Pass");
    }

    #[test]
    fn test_notification_round_start_json_format() {
        let n = Notification::RoundStart {
            day: 2,
            last_eliminated: Some(name("cid")),
            mafia_revealed: None,
            alive: vec![name("ada"), name("bob")],
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "RoundStart");
        assert_eq!(json["day"], 2);
        assert_eq!(json["last_eliminated"], "cid");
        assert!(json["mafia_revealed"].is_null());
        assert_eq!(json["alive"], serde_json::json!(["ada", "bob"]));
    }

    #[test]
    fn test_notification_entered_session_json_format() {
        let n = Notification::EnteredSession {
            session_id: SessionId(1),
            role: Role::Detective,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "EnteredSession");
        assert_eq!(json["session_id"], 1);
        assert_eq!(json["role"], "Detective");
    }

    #[test]
    fn test_server_payload_notification_is_adjacently_tagged() {
        let payload = ServerPayload::Notification(Notification::Result {
            winner: Role::Mafia,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "Notification");
        assert_eq!(json["data"]["type"], "Result");
        assert_eq!(json["data"]["winner"], "Mafia");
    }

    #[test]
    fn test_client_envelope_parses_hand_written_json() {
        let raw = r#"{
            "seq": 7,
            "request": {
                "type": "SendCommand",
                "session_id": 2,
                "username": "ada",
                "command": { "type": "Check", "target": "bob" }
            }
        }"#;
        let env: ClientEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.seq, 7);
        assert_eq!(env.request.kind(), "SendCommand");
        match env.request {
            Request::SendCommand {
                session_id,
                command,
                ..
            } => {
                assert_eq!(session_id, SessionId(2));
                assert_eq!(command, Command::Check { target: name("bob") });
            }
            other => panic!("expected SendCommand, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_request_type_returns_error() {
        let unknown = r#"{"seq": 1, "request": {"type": "StealRole"}}"#;
        let result: Result<ClientEnvelope, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_command_missing_target_returns_error() {
        let wrong = r#"{"type": "Kill"}"#;
        let result: Result<Command, _> = serde_json::from_str(wrong);
        assert!(result.is_err());
    }
}
