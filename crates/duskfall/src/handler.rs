//! Per-connection handler: request routing and notification forwarding.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The connection is split so one loop can wait on all of these at once:
//!   1. Inbound frames → decode → dispatch → `Ack` or `Error`
//!   2. The participant's notification stream (after `ConnectQueue`)
//!   3. The participant's disconnect signal
//!   4. The chat topic (after `JoinChat`)

use std::sync::Arc;
use std::time::Instant;

use duskfall_lobby::{
    Admission, DisconnectSignal, LobbyError, NotificationStream, Participant,
};
use duskfall_protocol::{
    ClientEnvelope, Codec, Notification, Request, ServerEnvelope,
    ServerPayload, Username,
};
use duskfall_session::SessionError;
use duskfall_transport::{
    Connection, ConnectionId, FrameReceiver, FrameSender, WebSocketConnection,
    WebSocketReceiver, WebSocketSender,
};
use tokio::sync::broadcast;

use crate::chat::ChatLine;
use crate::server::ServerState;
use crate::DuskfallError;

/// A request the server refused, as it goes back on the wire.
#[derive(Debug)]
struct Rejection {
    code: u16,
    message: String,
}

impl Rejection {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            code: 409,
            message: message.into(),
        }
    }
}

impl From<SessionError> for Rejection {
    fn from(err: SessionError) -> Self {
        let code = match &err {
            e if e.is_protocol_violation() => 400,
            SessionError::NotFound(_) => 404,
            SessionError::Unavailable(_) | SessionError::ManagerClosed => 410,
            _ => 500,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<LobbyError> for Rejection {
    fn from(err: LobbyError) -> Self {
        let code = match err {
            LobbyError::IntakeClosed => 410,
            LobbyError::SinkClosed(_) | LobbyError::InvalidCapacity(_) => 400,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), DuskfallError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let (sender, mut receiver) = conn.split();
    let mut handler = ConnectionHandler {
        conn_id,
        state,
        sender,
        seq: 1,
        start: Instant::now(),
        username: None,
        in_session: false,
        notifications: None,
        disconnect: None,
        chat: None,
    };

    let result = handler.serve(&mut receiver).await;
    handler.leave_queue().await;
    result
}

/// Per-connection state. Lives for the duration of one socket.
struct ConnectionHandler<C: Codec> {
    conn_id: ConnectionId,
    state: Arc<ServerState<C>>,
    sender: WebSocketSender,
    seq: u64,
    start: Instant,
    /// The queue identity behind the open notification stream.
    username: Option<Username>,
    /// Set once the participant has left the queue for a session.
    in_session: bool,
    notifications: Option<NotificationStream>,
    disconnect: Option<DisconnectSignal>,
    chat: Option<broadcast::Receiver<ChatLine>>,
}

impl<C: Codec> ConnectionHandler<C> {
    async fn serve(
        &mut self,
        receiver: &mut WebSocketReceiver,
    ) -> Result<(), DuskfallError> {
        let conn_id = self.conn_id;
        loop {
            tokio::select! {
                frame = receiver.recv() => match frame {
                    Ok(Some(data)) => self.handle_frame(&data).await?,
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed cleanly");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        return Ok(());
                    }
                },
                notification = next_notification(&mut self.notifications) => {
                    match notification {
                        Some(n) => {
                            if matches!(n, Notification::EnteredSession { .. }) {
                                self.in_session = true;
                            }
                            self.push(n).await?;
                        }
                        None => {
                            tracing::debug!(%conn_id, username = ?self.username, "notification stream ended");
                            self.close_stream();
                        }
                    }
                }
                () = disconnected(&self.disconnect) => {
                    tracing::debug!(%conn_id, username = ?self.username, "disconnect signal received");
                    self.close_stream();
                }
                line = next_chat_line(&mut self.chat) => match line {
                    Ok(line) if line.origin != conn_id => self.push(line.message).await?,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%conn_id, skipped, "chat subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => self.chat = None,
                },
            }
        }
    }

    async fn handle_frame(&mut self, data: &[u8]) -> Result<(), DuskfallError> {
        let envelope: ClientEnvelope = match self.state.codec.decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(conn_id = %self.conn_id, error = %e, "failed to decode frame");
                let rejection = Rejection::bad_request(format!("invalid frame: {e}"));
                return self.reply(0, Err(rejection)).await;
            }
        };

        let request_seq = envelope.seq;
        tracing::debug!(
            conn_id = %self.conn_id,
            request_seq,
            request = envelope.request.kind(),
            "request received"
        );
        let outcome = self.dispatch(envelope.request).await;
        self.reply(request_seq, outcome).await
    }

    async fn dispatch(&mut self, request: Request) -> Result<(), Rejection> {
        match request {
            Request::ConnectQueue { username } => self.connect_queue(username).await,

            Request::DisconnectQueue { username } => {
                self.state.queue.disconnect(&username).await;
                if self.username.as_ref() == Some(&username) {
                    self.close_stream();
                }
                Ok(())
            }

            Request::SendCommand {
                session_id,
                username,
                command,
            } => {
                self.state
                    .sessions
                    .send_command(session_id, username, command)
                    .await?;
                Ok(())
            }

            Request::JoinChat { session_id } => {
                self.state.sessions.session_by_id(session_id).await?;
                self.chat = Some(self.state.chat.subscribe(session_id).await);
                Ok(())
            }

            Request::SendChat {
                session_id,
                username,
                text,
            } => {
                self.state.sessions.session_by_id(session_id).await?;
                let reached = self
                    .state
                    .chat
                    .publish(self.conn_id, session_id, username, text)
                    .await;
                tracing::debug!(%session_id, reached, "chat line published");
                Ok(())
            }
        }
    }

    async fn connect_queue(&mut self, username: Username) -> Result<(), Rejection> {
        if self.notifications.is_some() {
            return Err(Rejection::conflict(
                "this connection already has a notification stream",
            ));
        }
        if username.is_empty() {
            return Err(Rejection::bad_request("username must not be empty"));
        }

        let (participant, notifications, disconnect) =
            Participant::connect(username.clone());
        self.username = Some(username);
        self.notifications = Some(notifications);
        self.disconnect = Some(disconnect);

        match self.state.queue.connect(participant).await {
            Ok(Admission::Waiting { position }) => {
                tracing::debug!(conn_id = %self.conn_id, position, "waiting in queue");
                Ok(())
            }
            Ok(Admission::Promoted) => {
                self.in_session = true;
                Ok(())
            }
            Err(e) => {
                self.close_stream();
                Err(e.into())
            }
        }
    }

    /// Calls `DisconnectFromQueue` for the stream this connection opened,
    /// unless that participant already moved on to a session.
    async fn leave_queue(&mut self) {
        if self.notifications.is_none() || self.in_session {
            return;
        }
        if let Some(username) = self.username.take() {
            self.state.queue.disconnect(&username).await;
        }
        self.close_stream();
    }

    fn close_stream(&mut self) {
        self.username = None;
        self.in_session = false;
        self.notifications = None;
        self.disconnect = None;
    }

    async fn reply(
        &mut self,
        request_seq: u64,
        outcome: Result<(), Rejection>,
    ) -> Result<(), DuskfallError> {
        let payload = match outcome {
            Ok(()) => ServerPayload::Ack { request_seq },
            Err(Rejection { code, message }) => {
                tracing::debug!(conn_id = %self.conn_id, request_seq, code, %message, "request rejected");
                ServerPayload::Error {
                    request_seq,
                    code,
                    message,
                }
            }
        };
        self.send(payload).await
    }

    async fn push(&mut self, notification: Notification) -> Result<(), DuskfallError> {
        self.send(ServerPayload::Notification(notification)).await
    }

    async fn send(&mut self, payload: ServerPayload) -> Result<(), DuskfallError> {
        let envelope = ServerEnvelope {
            seq: next_seq(&mut self.seq),
            timestamp: self.start.elapsed().as_millis() as u64,
            payload,
        };
        let bytes = self.state.codec.encode(&envelope)?;
        self.sender.send(&bytes).await?;
        Ok(())
    }
}

async fn next_notification(
    stream: &mut Option<NotificationStream>,
) -> Option<Notification> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn disconnected(signal: &Option<DisconnectSignal>) {
    match signal {
        Some(signal) => signal.wait().await,
        None => std::future::pending().await,
    }
}

async fn next_chat_line(
    chat: &mut Option<broadcast::Receiver<ChatLine>>,
) -> Result<ChatLine, broadcast::error::RecvError> {
    match chat {
        Some(chat) => chat.recv().await,
        None => std::future::pending().await,
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
