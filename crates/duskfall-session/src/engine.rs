//! Session engine: one Tokio task per game.
//!
//! The engine owns its participants, their roles and the alive set. The
//! outside world reaches it only through a [`SessionHandle`], which pushes
//! messages into the engine's inbox and waits on a oneshot reply. Nothing
//! else ever touches the game state, so round steps never interleave.

use duskfall_lobby::{Participant, broadcast};
use duskfall_protocol::{Command, Notification, Role, SessionId, Username};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::rules::{GameState, NightActions, PassBarrier, Quorum, VoteBallot};
use crate::{Phase, SessionConfig, SessionError};

/// Messages accepted by the engine's inbox.
pub(crate) enum EngineMessage {
    /// A round command from a player. Answered once it has been validated
    /// (and recorded, on success).
    Command {
        username: Username,
        command: Command,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Request a snapshot of the session.
    Info { reply: oneshot::Sender<SessionInfo> },
}

impl std::fmt::Debug for EngineMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command {
                username, command, ..
            } => f
                .debug_struct("Command")
                .field("username", username)
                .field("command", command)
                .finish_non_exhaustive(),
            Self::Info { .. } => f.write_str("Info"),
        }
    }
}

/// A snapshot of a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    /// Current day; 0 until the first round starts.
    pub day: u64,
    pub phase: Phase,
    /// Alive participants in seat order.
    pub alive: Vec<Username>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub winner: Role,
    /// The day on which the game was decided.
    pub days: u64,
}

/// Handle to a running session engine.
///
/// Cheap to clone; the session manager keeps one per registered session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    sender: mpsc::Sender<EngineMessage>,
}

impl SessionHandle {
    /// The session's id.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Delivers one command into the session's inbox and waits for the
    /// engine's verdict.
    ///
    /// # Errors
    /// Protocol violations come back as the matching [`SessionError`];
    /// [`SessionError::Unavailable`] if the engine has stopped.
    pub async fn submit(
        &self,
        username: Username,
        command: Command,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(EngineMessage::Command {
                username,
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Unavailable(self.session_id))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Unavailable(self.session_id))?
    }

    /// Requests a snapshot of the session.
    pub async fn info(&self) -> Result<SessionInfo, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(EngineMessage::Info { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable(self.session_id))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Unavailable(self.session_id))
    }
}

/// What the inbox produced while a phase was waiting.
enum Inbound {
    Command {
        username: Username,
        command: Command,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Deadline,
}

/// The engine itself. Lives inside its own task until the game ends.
pub(crate) struct SessionEngine {
    session_id: SessionId,
    config: SessionConfig,
    participants: Vec<Participant>,
    inbox: mpsc::Receiver<EngineMessage>,
    phase: Phase,
    day: u64,
}

impl SessionEngine {
    /// Builds an engine for `participants` and the handle that reaches it.
    /// Nothing runs until [`SessionEngine::run`] is spawned.
    pub(crate) fn new(
        session_id: SessionId,
        config: SessionConfig,
        participants: Vec<Participant>,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(config.inbox_size.max(1));
        let engine = Self {
            session_id,
            config,
            participants,
            inbox: rx,
            phase: Phase::Starting,
            day: 0,
        };
        let handle = SessionHandle {
            session_id,
            sender: tx,
        };
        (engine, handle)
    }

    /// Plays the session to completion.
    ///
    /// On failure every participant receives
    /// [`Notification::SessionAborted`] before the error is returned.
    pub(crate) async fn run(mut self) -> Result<Outcome, SessionError> {
        let result = self.play().await;
        self.phase = Phase::Terminated;

        if let Err(e) = &result {
            tracing::error!(
                session_id = %self.session_id,
                day = self.day,
                error = %e,
                "session aborted"
            );
            broadcast(
                &self.participants,
                &Notification::SessionAborted {
                    session_id: self.session_id,
                    reason: e.to_string(),
                },
            );
        }
        result
    }

    async fn play(&mut self) -> Result<Outcome, SessionError> {
        let seats = self
            .participants
            .iter()
            .map(|p| p.username().clone())
            .collect();
        let mut game = GameState::deal(seats, &mut rand::rng())?;

        tracing::info!(
            session_id = %self.session_id,
            members = ?game.alive_list(),
            "session started"
        );
        for (participant, (_, role)) in self.participants.iter().zip(game.seats()) {
            tracing::debug!(
                session_id = %self.session_id,
                username = %participant.username(),
                "role dealt"
            );
            if let Err(e) = participant.notify(Notification::EnteredSession {
                session_id: self.session_id,
                role,
            }) {
                tracing::warn!(session_id = %self.session_id, error = %e, "role notification dropped");
            }
        }

        self.grace(&game).await?;

        let mut last_killed = None;
        let mut revealed = None;
        loop {
            self.day += 1;
            tracing::info!(session_id = %self.session_id, day = self.day, "round started");
            self.announce(Notification::RoundStart {
                day: self.day,
                last_eliminated: last_killed.take(),
                mafia_revealed: revealed.take(),
                alive: game.alive_list(),
            });

            // day
            let voted_out = if self.day == 1 {
                self.transition(Phase::DayPass);
                let mut barrier = PassBarrier::new(&game);
                self.collect(&game, &mut barrier).await?;
                None
            } else {
                self.transition(Phase::DayVote);
                let mut ballot = VoteBallot::new(&game);
                self.collect(&game, &mut ballot).await?;
                let eliminated = ballot.tally().filter(|u| game.eliminate(u));
                if let Some(username) = &eliminated {
                    tracing::info!(
                        session_id = %self.session_id,
                        day = self.day,
                        %username,
                        "voted out"
                    );
                }
                eliminated
            };
            if let Some(winner) = game.winner() {
                return Ok(self.finish(winner));
            }

            // night
            self.announce(Notification::Night {
                voted_out,
                alive: game.alive_list(),
            });
            if self.day == 1 {
                self.transition(Phase::NightPass);
                let mut barrier = PassBarrier::new(&game);
                self.collect(&game, &mut barrier).await?;
            } else {
                self.transition(Phase::NightActions);
                let mut actions = NightActions::new(&game);
                self.collect(&game, &mut actions).await?;
                let outcome = actions.resolve(&mut game);
                tracing::info!(
                    session_id = %self.session_id,
                    day = self.day,
                    killed = ?outcome.killed,
                    revealed = outcome.revealed.is_some(),
                    "night resolved"
                );
                last_killed = outcome.killed;
                revealed = outcome.revealed;
            }
            if let Some(winner) = game.winner() {
                return Ok(self.finish(winner));
            }
        }
    }

    /// Holds the first round back for the configured grace period.
    /// Commands arriving now are rejected; info requests are served.
    async fn grace(&mut self, game: &GameState) -> Result<(), SessionError> {
        if self.config.grace_period.is_zero() {
            return Ok(());
        }
        let deadline = Instant::now() + self.config.grace_period;
        loop {
            match self.next_message(game, Some(deadline)).await? {
                Inbound::Deadline => return Ok(()),
                Inbound::Command { command, reply, .. } => {
                    let _ = reply.send(Err(SessionError::WrongPhase {
                        phase: self.phase,
                        command: command.kind(),
                    }));
                }
            }
        }
    }

    /// Feeds commands into `quorum` until it is complete or the phase
    /// deadline passes. Rejected commands are answered and leave the
    /// quorum untouched.
    async fn collect<Q: Quorum>(
        &mut self,
        game: &GameState,
        quorum: &mut Q,
    ) -> Result<(), SessionError> {
        let deadline = self.config.phase_timeout.map(|t| Instant::now() + t);

        while !quorum.is_complete() {
            match self.next_message(game, deadline).await? {
                Inbound::Command {
                    username,
                    command,
                    reply,
                } => {
                    let kind = command.kind();
                    let result = self
                        .admit(game, &username, &command)
                        .and_then(|()| quorum.record(game, &username, command));
                    match &result {
                        Ok(()) => tracing::debug!(
                            session_id = %self.session_id,
                            %username,
                            command = kind,
                            "command accepted"
                        ),
                        Err(e) => tracing::warn!(
                            session_id = %self.session_id,
                            phase = %self.phase,
                            %username,
                            command = kind,
                            error = %e,
                            "command rejected"
                        ),
                    }
                    let _ = reply.send(result);
                }
                Inbound::Deadline => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        phase = %self.phase,
                        missing = ?quorum.missing(),
                        "phase timed out, missing players forfeit"
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    /// Checks that do not depend on the phase's collector.
    fn admit(
        &self,
        game: &GameState,
        username: &Username,
        command: &Command,
    ) -> Result<(), SessionError> {
        if !game.is_participant(username) {
            return Err(SessionError::NotParticipant(username.clone()));
        }
        if !self.phase.accepts(command) {
            return Err(SessionError::WrongPhase {
                phase: self.phase,
                command: command.kind(),
            });
        }
        Ok(())
    }

    /// Waits for the next command, serving info requests inline.
    ///
    /// # Errors
    /// Returns [`SessionError::Unavailable`] if every handle is gone, which
    /// leaves the session unable to make progress.
    async fn next_message(
        &mut self,
        game: &GameState,
        deadline: Option<Instant>,
    ) -> Result<Inbound, SessionError> {
        loop {
            let message = match deadline {
                Some(at) => {
                    tokio::select! {
                        msg = self.inbox.recv() => msg,
                        () = tokio::time::sleep_until(at) => return Ok(Inbound::Deadline),
                    }
                }
                None => self.inbox.recv().await,
            };

            match message {
                Some(EngineMessage::Command {
                    username,
                    command,
                    reply,
                }) => {
                    return Ok(Inbound::Command {
                        username,
                        command,
                        reply,
                    });
                }
                Some(EngineMessage::Info { reply }) => {
                    let _ = reply.send(self.info(game));
                }
                None => return Err(SessionError::Unavailable(self.session_id)),
            }
        }
    }

    fn transition(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal phase step {} -> {next}",
            self.phase
        );
        self.phase = next;
    }

    fn finish(&mut self, winner: Role) -> Outcome {
        self.transition(Phase::Terminated);
        tracing::info!(
            session_id = %self.session_id,
            day = self.day,
            %winner,
            "session decided"
        );
        self.announce(Notification::Result { winner });
        Outcome {
            winner,
            days: self.day,
        }
    }

    /// Broadcasts to every original participant; the dead keep watching.
    fn announce(&self, notification: Notification) {
        broadcast(&self.participants, &notification);
    }

    fn info(&self, game: &GameState) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id,
            day: self.day,
            phase: self.phase,
            alive: game.alive_list(),
        }
    }
}
