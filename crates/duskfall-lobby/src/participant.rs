//! The participant handle: one connected player as the core sees them.
//!
//! A [`Participant`] is deliberately not `Clone`. It is moved into the
//! queue on connect and moved again, as part of a batch, into a session on
//! promotion, so exactly one owner can ever write to its sink. Dropping the
//! handle closes the sink, which ends the player's notification stream.

use std::sync::Arc;

use duskfall_protocol::{Notification, Username};
use tokio::sync::{Notify, mpsc};

use crate::LobbyError;

/// Write side of a participant's notification stream.
pub type NotificationSink = mpsc::UnboundedSender<Notification>;

/// Read side of a participant's notification stream, held by the
/// connection task that forwards notifications to the client.
pub type NotificationStream = mpsc::UnboundedReceiver<Notification>;

/// One connected player: identity, outbound sink, disconnect signal.
#[derive(Debug)]
pub struct Participant {
    username: Username,
    sink: NotificationSink,
    disconnect: Arc<Notify>,
}

impl Participant {
    /// Wraps an existing sink. Returns the handle together with the
    /// listening end of its disconnect signal.
    pub fn new(
        username: Username,
        sink: NotificationSink,
    ) -> (Self, DisconnectSignal) {
        let notify = Arc::new(Notify::new());
        let signal = DisconnectSignal {
            notify: Arc::clone(&notify),
        };
        let participant = Self {
            username,
            sink,
            disconnect: notify,
        };
        (participant, signal)
    }

    /// Creates a handle with a fresh notification channel.
    pub fn connect(
        username: Username,
    ) -> (Self, NotificationStream, DisconnectSignal) {
        let (sink, stream) = mpsc::unbounded_channel();
        let (participant, signal) = Self::new(username, sink);
        (participant, stream, signal)
    }

    /// The player's name.
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// Pushes a notification onto this participant's stream.
    ///
    /// # Errors
    /// Returns [`LobbyError::SinkClosed`] if the stream's reader is gone.
    pub fn notify(&self, notification: Notification) -> Result<(), LobbyError> {
        self.sink
            .send(notification)
            .map_err(|_| LobbyError::SinkClosed(self.username.clone()))
    }

    /// Fires the disconnect signal.
    ///
    /// Best effort and at most once: only a task currently waiting in
    /// [`DisconnectSignal::wait`] is woken. Nothing is stored, so a signal
    /// fired while nobody waits is lost.
    pub fn disconnect(&self) {
        self.disconnect.notify_waiters();
    }
}

/// Listening end of a participant's disconnect signal.
#[derive(Debug, Clone)]
pub struct DisconnectSignal {
    notify: Arc<Notify>,
}

impl DisconnectSignal {
    /// Waits until [`Participant::disconnect`] is called while this future
    /// is pending.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Sends `notification` to every participant, logging and skipping the
/// ones whose sink is closed. Returns how many deliveries succeeded.
pub fn broadcast<'a>(
    participants: impl IntoIterator<Item = &'a Participant>,
    notification: &Notification,
) -> usize {
    let mut delivered = 0;
    for participant in participants {
        match participant.notify(notification.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(
                    username = %participant.username(),
                    error = %e,
                    "notification dropped"
                );
            }
        }
    }
    delivered
}
