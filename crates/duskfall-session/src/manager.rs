//! Session manager: turns promoted batches into running sessions.
//!
//! A single dispatcher task owns the id counter and the session registry.
//! Everything else talks to it through a [`SessionManager`] handle, so the
//! registry never needs a lock.

use std::collections::HashMap;

use duskfall_lobby::{BatchReceiver, Participant};
use duskfall_protocol::{Command, SessionId, Username};
use tokio::sync::{mpsc, oneshot};

use crate::engine::SessionEngine;
use crate::{SessionConfig, SessionError, SessionHandle};

/// Channel size for lookups against the dispatcher.
const REQUEST_CHANNEL_SIZE: usize = 64;

/// Requests answered by the dispatcher.
enum ManagerRequest {
    Lookup {
        session_id: SessionId,
        reply: oneshot::Sender<Option<SessionHandle>>,
    },
    List {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
}

/// Handle to the session manager's dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    requests: mpsc::Sender<ManagerRequest>,
}

impl SessionManager {
    /// Starts the dispatcher. It consumes batches from `intake` in arrival
    /// order and runs until both the intake and every manager handle are
    /// gone. Running sessions are unaffected by the dispatcher stopping.
    pub fn spawn(config: SessionConfig, intake: BatchReceiver) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            config,
            next_id: 1,
            sessions: HashMap::new(),
            intake,
            requests: rx,
            ended_tx,
            ended_rx,
        };
        tokio::spawn(dispatcher.run());
        Self { requests: tx }
    }

    /// Looks up a running session.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] for ids that were never allocated or
    /// whose session has ended.
    pub async fn session_by_id(
        &self,
        session_id: SessionId,
    ) -> Result<SessionHandle, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(ManagerRequest::Lookup {
                session_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ManagerClosed)?;
        reply_rx
            .await
            .map_err(|_| SessionError::ManagerClosed)?
            .ok_or(SessionError::NotFound(session_id))
    }

    /// Routes one command into a session's inbox and returns the engine's
    /// verdict.
    pub async fn send_command(
        &self,
        session_id: SessionId,
        username: Username,
        command: Command,
    ) -> Result<(), SessionError> {
        let handle = self.session_by_id(session_id).await?;
        tracing::debug!(%session_id, %username, command = command.kind(), "routing command");
        handle.submit(username, command).await
    }

    /// Ids of every registered session, ascending.
    pub async fn active_sessions(&self) -> Vec<SessionId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .requests
            .send(ManagerRequest::List { reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }
}

/// The dispatcher task's state.
struct Dispatcher {
    config: SessionConfig,
    next_id: i64,
    sessions: HashMap<SessionId, SessionHandle>,
    intake: BatchReceiver,
    requests: mpsc::Receiver<ManagerRequest>,
    ended_tx: mpsc::UnboundedSender<SessionId>,
    ended_rx: mpsc::UnboundedReceiver<SessionId>,
}

impl Dispatcher {
    async fn run(mut self) {
        tracing::info!("session manager started");
        let mut intake_open = true;
        let mut requests_open = true;

        while intake_open || requests_open {
            tokio::select! {
                batch = self.intake.recv(), if intake_open => match batch {
                    Some(batch) => self.start_session(batch),
                    None => {
                        tracing::info!("session intake closed");
                        intake_open = false;
                    }
                },
                request = self.requests.recv(), if requests_open => match request {
                    Some(request) => self.answer(request),
                    None => requests_open = false,
                },
                Some(session_id) = self.ended_rx.recv() => {
                    self.sessions.remove(&session_id);
                    tracing::debug!(%session_id, active = self.sessions.len(), "session unregistered");
                }
            }
        }

        tracing::info!(active = self.sessions.len(), "session manager stopped");
    }

    fn start_session(&mut self, batch: Vec<Participant>) {
        let session_id = SessionId(self.next_id);
        self.next_id += 1;

        let (engine, handle) =
            SessionEngine::new(session_id, self.config.clone(), batch);
        self.sessions.insert(session_id, handle);
        tracing::info!(%session_id, active = self.sessions.len(), "session created");

        let task = tokio::spawn(engine.run());
        let ended = self.ended_tx.clone();
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(outcome)) => tracing::info!(
                    %session_id,
                    winner = %outcome.winner,
                    days = outcome.days,
                    "session finished"
                ),
                Ok(Err(e)) => {
                    tracing::error!(%session_id, error = %e, "session failed")
                }
                Err(e) => {
                    tracing::error!(%session_id, error = %e, "session task panicked")
                }
            }
            let _ = ended.send(session_id);
        });
    }

    fn answer(&self, request: ManagerRequest) {
        match request {
            ManagerRequest::Lookup { session_id, reply } => {
                let _ = reply.send(self.sessions.get(&session_id).cloned());
            }
            ManagerRequest::List { reply } => {
                let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
                ids.sort();
                let _ = reply.send(ids);
            }
        }
    }
}
