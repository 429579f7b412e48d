//! The matchmaking queue.
//!
//! Players wait here until `capacity` of them are present, at which point
//! the whole batch is moved out in one step and handed to the session
//! manager through its intake channel.
//!
//! # Concurrency note
//!
//! Every operation takes the queue's lock for its full duration,
//! including the membership broadcast. Sinks are unbounded channels, so a
//! write never waits on a slow client, and two joins or leaves can never
//! interleave their notifications.

use duskfall_protocol::{Notification, Username};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};

use crate::participant::broadcast;
use crate::{LobbyError, Participant};

/// Sending end of the session manager's intake.
pub type BatchSender = mpsc::UnboundedSender<Vec<Participant>>;

/// Receiving end of the session manager's intake.
pub type BatchReceiver = mpsc::UnboundedReceiver<Vec<Participant>>;

/// Queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How many participants make up one session. Default: 4.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 4 }
    }
}

impl QueueConfig {
    /// Rejects configurations the queue cannot run with.
    ///
    /// # Errors
    /// Returns [`LobbyError::InvalidCapacity`] for a capacity of zero.
    pub fn validated(self) -> Result<Self, LobbyError> {
        if self.capacity == 0 {
            return Err(LobbyError::InvalidCapacity(self.capacity));
        }
        Ok(self)
    }
}

/// What happened to a participant handed to [`Queue::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Still waiting; `position` is 1-based in join order.
    Waiting { position: usize },
    /// This join filled the queue and the batch went to the intake.
    Promoted,
}

/// The waiting room.
pub struct Queue {
    waiting: Mutex<Vec<Participant>>,
    capacity: usize,
    intake: BatchSender,
}

impl Queue {
    /// Creates an empty queue feeding `intake`.
    pub fn new(config: QueueConfig, intake: BatchSender) -> Self {
        Self {
            waiting: Mutex::new(Vec::with_capacity(config.capacity)),
            capacity: config.capacity,
            intake,
        }
    }

    /// Appends a participant.
    ///
    /// If this fills the queue, the whole batch is detached and sent to
    /// the intake and nobody is notified of the join. Otherwise every
    /// waiting participant, the newcomer included, receives
    /// [`Notification::ParticipantJoined`].
    ///
    /// # Errors
    /// Returns [`LobbyError::IntakeClosed`] if the session manager is gone.
    /// The queue is empty afterwards either way.
    pub async fn connect(
        &self,
        participant: Participant,
    ) -> Result<Admission, LobbyError> {
        let mut waiting = self.waiting.lock().await;
        let username = participant.username().clone();
        waiting.push(participant);

        if waiting.len() >= self.capacity {
            let batch = std::mem::take(&mut *waiting);
            let members: Vec<&str> =
                batch.iter().map(|p| p.username().as_str()).collect();
            tracing::info!(?members, "queue full, promoting batch");
            self.intake
                .send(batch)
                .map_err(|_| LobbyError::IntakeClosed)?;
            return Ok(Admission::Promoted);
        }

        let position = waiting.len();
        tracing::info!(%username, position, "participant queued");
        let notification = Notification::ParticipantJoined {
            username,
            members: usernames(&waiting),
        };
        broadcast(waiting.iter(), &notification);

        Ok(Admission::Waiting { position })
    }

    /// Removes every waiting entry named `username`.
    ///
    /// Each removed handle's disconnect signal fires before the handle is
    /// dropped. The remaining members then receive
    /// [`Notification::ParticipantLeft`], even if nothing was removed.
    /// Returns how many entries were removed.
    pub async fn disconnect(&self, username: &Username) -> usize {
        let mut waiting = self.waiting.lock().await;
        let (removed, kept): (Vec<_>, Vec<_>) = waiting
            .drain(..)
            .partition(|p| p.username() == username);
        *waiting = kept;

        for participant in &removed {
            participant.disconnect();
        }
        if removed.is_empty() {
            tracing::debug!(%username, "disconnect for participant not in queue");
        } else {
            tracing::info!(%username, remaining = waiting.len(), "participant left queue");
        }

        let notification = Notification::ParticipantLeft {
            username: username.clone(),
            members: usernames(&waiting),
        };
        broadcast(waiting.iter(), &notification);

        removed.len()
    }

    /// Names of everyone waiting, in join order.
    pub async fn members(&self) -> Vec<Username> {
        usernames(&self.waiting.lock().await)
    }

    /// Number of waiting participants.
    pub async fn len(&self) -> usize {
        self.waiting.lock().await.len()
    }

    /// Returns `true` if nobody is waiting.
    pub async fn is_empty(&self) -> bool {
        self.waiting.lock().await.is_empty()
    }
}

fn usernames(waiting: &[Participant]) -> Vec<Username> {
    waiting.iter().map(|p| p.username().clone()).collect()
}
