//! Integration tests for the matchmaking queue.

use std::time::Duration;

use duskfall_lobby::{
    Admission, BatchReceiver, LobbyError, NotificationStream, Participant, Queue,
    QueueConfig,
};
use duskfall_protocol::{Notification, Username};
use tokio::sync::mpsc;

fn name(s: &str) -> Username {
    Username::from(s)
}

fn names(list: &[&str]) -> Vec<Username> {
    list.iter().map(|s| name(s)).collect()
}

fn queue() -> (Queue, BatchReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Queue::new(QueueConfig::default(), tx), rx)
}

async fn join(queue: &Queue, who: &str) -> (Admission, NotificationStream) {
    let (p, stream, _signal) = Participant::connect(name(who));
    let admission = queue.connect(p).await.expect("intake open");
    (admission, stream)
}

fn drain(stream: &mut NotificationStream) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = stream.try_recv() {
        out.push(n);
    }
    out
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_connect_broadcasts_joined_to_everyone_including_newcomer() {
    let (queue, _rx) = queue();
    let (first, mut a) = join(&queue, "a").await;
    let (second, mut b) = join(&queue, "b").await;

    assert_eq!(first, Admission::Waiting { position: 1 });
    assert_eq!(second, Admission::Waiting { position: 2 });

    let expected = Notification::ParticipantJoined {
        username: name("b"),
        members: names(&["a", "b"]),
    };
    let a_seen = drain(&mut a);
    assert_eq!(a_seen.len(), 2, "a sees its own join and b's");
    assert_eq!(a_seen[1], expected);
    assert_eq!(drain(&mut b), vec![expected]);
}

#[tokio::test]
async fn test_connect_fourth_participant_promotes_single_batch() {
    let (queue, mut rx) = queue();
    let (_, _a) = join(&queue, "a").await;
    let (_, _b) = join(&queue, "b").await;
    let (_, _c) = join(&queue, "c").await;
    let (admission, mut d) = join(&queue, "d").await;

    assert_eq!(admission, Admission::Promoted);
    assert!(queue.is_empty().await);

    let batch = rx.try_recv().expect("one batch sent");
    let members: Vec<Username> =
        batch.iter().map(|p| p.username().clone()).collect();
    assert_eq!(members, names(&["a", "b", "c", "d"]));
    assert!(rx.try_recv().is_err(), "exactly one batch");

    assert!(
        drain(&mut d).is_empty(),
        "the promoting join is not broadcast"
    );
}

#[tokio::test]
async fn test_connect_eight_participants_promotes_two_batches() {
    let (queue, mut rx) = queue();
    let mut streams = Vec::new();
    for who in ["a", "b", "c", "d", "e", "f", "g", "h"] {
        streams.push(join(&queue, who).await.1);
    }

    let first = rx.try_recv().expect("first batch");
    let second = rx.try_recv().expect("second batch");
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 4);
    assert_eq!(second[0].username().as_str(), "e");
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_connect_intake_closed_returns_error_and_empties_queue() {
    let (queue, rx) = queue();
    drop(rx);
    let (_, _a) = join(&queue, "a").await;
    let (_, _b) = join(&queue, "b").await;
    let (_, _c) = join(&queue, "c").await;

    let (d, _stream, _signal) = Participant::connect(name("d"));
    let result = queue.connect(d).await;

    assert!(matches!(result, Err(LobbyError::IntakeClosed)));
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_connect_with_closed_sink_still_reaches_others() {
    let (queue, _rx) = queue();
    let (_, a_stream) = join(&queue, "a").await;
    drop(a_stream);
    let (_, mut b) = join(&queue, "b").await;

    assert_eq!(queue.members().await, names(&["a", "b"]));
    assert_eq!(drain(&mut b).len(), 1);
}

// =========================================================================
// Leaving
// =========================================================================

#[tokio::test]
async fn test_disconnect_removes_fires_signal_and_broadcasts_left() {
    let (queue, _rx) = queue();
    let (_, mut a) = join(&queue, "a").await;
    let (b, b_stream, b_signal) = Participant::connect(name("b"));
    queue.connect(b).await.expect("intake open");
    drain(&mut a);

    let waiter = tokio::spawn(async move { b_signal.wait().await });
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let removed = queue.disconnect(&name("b")).await;

    assert_eq!(removed, 1);
    assert_eq!(queue.members().await, names(&["a"]));
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("signal delivered")
        .expect("no panic");
    assert_eq!(
        drain(&mut a),
        vec![Notification::ParticipantLeft {
            username: name("b"),
            members: names(&["a"]),
        }]
    );

    // the removed handle was dropped, so b's stream has ended
    let mut b_stream = b_stream;
    drain(&mut b_stream);
    assert!(b_stream.recv().await.is_none());
}

#[tokio::test]
async fn test_disconnect_unknown_username_broadcasts_unchanged_list() {
    let (queue, _rx) = queue();
    let (_, mut a) = join(&queue, "a").await;
    drain(&mut a);

    let removed = queue.disconnect(&name("ghost")).await;

    assert_eq!(removed, 0);
    assert_eq!(
        drain(&mut a),
        vec![Notification::ParticipantLeft {
            username: name("ghost"),
            members: names(&["a"]),
        }]
    );
}

#[tokio::test]
async fn test_disconnect_removes_every_entry_with_that_name() {
    let (queue, _rx) = queue();
    let (_, _a1) = join(&queue, "a").await;
    let (_, _b) = join(&queue, "b").await;
    let (_, _a2) = join(&queue, "a").await;

    let removed = queue.disconnect(&name("a")).await;

    assert_eq!(removed, 2);
    assert_eq!(queue.members().await, names(&["b"]));
}
