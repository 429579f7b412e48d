//! Chat side-channel: one broadcast topic per session.
//!
//! Chat never touches game state. A topic is created the first time a
//! connection subscribes to a session's chat and dropped once nobody is
//! listening.

use std::collections::HashMap;

use duskfall_protocol::{Notification, SessionId, Username};
use duskfall_transport::ConnectionId;
use tokio::sync::{Mutex, broadcast};

/// Lines buffered per topic before slow subscribers start lagging.
const TOPIC_CAPACITY: usize = 64;

/// One published line, tagged with the connection that sent it so the
/// sender can skip its own echo.
#[derive(Debug, Clone)]
pub(crate) struct ChatLine {
    pub(crate) origin: ConnectionId,
    pub(crate) message: Notification,
}

/// All chat topics, keyed by session.
#[derive(Debug, Default)]
pub(crate) struct ChatHub {
    topics: Mutex<HashMap<SessionId, broadcast::Sender<ChatLine>>>,
}

impl ChatHub {
    /// Subscribes to `session_id`'s topic, creating it if needed.
    pub(crate) async fn subscribe(
        &self,
        session_id: SessionId,
    ) -> broadcast::Receiver<ChatLine> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publishes one line. Returns how many subscribers it reached,
    /// including the sender's own subscription if it has one.
    pub(crate) async fn publish(
        &self,
        origin: ConnectionId,
        session_id: SessionId,
        username: Username,
        text: String,
    ) -> usize {
        let mut topics = self.topics.lock().await;
        let Some(topic) = topics.get(&session_id) else {
            return 0;
        };
        let line = ChatLine {
            origin,
            message: Notification::ChatMessage {
                session_id,
                username,
                text,
            },
        };
        match topic.send(line) {
            Ok(reached) => reached,
            Err(_) => {
                topics.remove(&session_id);
                tracing::debug!(%session_id, "chat topic dropped, no subscribers");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_with_origin() {
        let hub = ChatHub::default();
        let mut a = hub.subscribe(SessionId(1)).await;
        let mut b = hub.subscribe(SessionId(1)).await;

        let reached = hub
            .publish(ConnectionId::new(9), SessionId(1), "ada".into(), "hi".into())
            .await;

        assert_eq!(reached, 2);
        for rx in [&mut a, &mut b] {
            let line = rx.recv().await.unwrap();
            assert_eq!(line.origin, ConnectionId::new(9));
            assert!(matches!(
                line.message,
                Notification::ChatMessage { ref text, .. } if text == "hi"
            ));
        }
    }

    #[tokio::test]
    async fn test_publish_topics_are_isolated_per_session() {
        let hub = ChatHub::default();
        let mut one = hub.subscribe(SessionId(1)).await;
        let _two = hub.subscribe(SessionId(2)).await;

        hub.publish(ConnectionId::new(1), SessionId(2), "b".into(), "x".into())
            .await;

        assert!(one.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_drops_topic() {
        let hub = ChatHub::default();
        drop(hub.subscribe(SessionId(3)).await);

        let reached = hub
            .publish(ConnectionId::new(1), SessionId(3), "c".into(), "y".into())
            .await;

        assert_eq!(reached, 0);
        assert!(hub.topics.lock().await.is_empty());
    }
}
