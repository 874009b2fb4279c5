//! Server network layer: WebSocket transport for session events
//!
//! Every accepted socket gets two halves:
//! - a writer task draining the connection's outbox, one JSON text frame per `ServerEvent`
//! - a reader loop decoding `ClientEvent` frames and routing them to session actors
//!
//! A connection is bound to the `(session, user)` of its last `join`. Answers, actions and
//! realtime events act as that user, and closing the socket reports a transport-level
//! disconnect for that binding only.

use crate::error::SessionError;
use crate::participant::{ConnectionHandle, ConnectionId};
use crate::registry::Registry;
use crate::session::{SessionCommand, SessionHandle};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode, encode, ClientEvent, ServerEvent, UserId};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Accepts WebSocket clients and hands them to the session registry
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    next_connection_id: ConnectionId,
}

impl Server {
    pub async fn new(addr: &str, registry: Registry) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            registry,
            next_connection_id: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Each connection runs on its own task.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Server started successfully");

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            self.next_connection_id += 1;
            let connection_id = self.next_connection_id;
            let registry = self.registry.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, connection_id, registry).await {
                    error!("Connection {} from {} failed: {}", connection_id, addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_id: ConnectionId,
    registry: Registry,
) -> Result<(), BoxError> {
    let socket = tokio_tungstenite::accept_async(stream).await?;
    info!("Connection {} opened from {}", connection_id, addr);

    let (mut outgoing, mut incoming) = socket.split();
    let (sender, mut outbox) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let frame = match encode(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode {} event: {}", event.name(), e);
                    continue;
                }
            };
            if let Err(e) = outgoing.send(Message::Text(frame)).await {
                debug!("Connection {} stopped writing: {}", connection_id, e);
                break;
            }
        }
        let _ = outgoing.close().await;
    });

    let mut connection = Connection::new(ConnectionHandle::new(connection_id, sender), registry);
    while let Some(frame) = incoming.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.handle_frame(&text).await,
            Ok(Message::Binary(_)) => connection.reject("binary frame"),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Connection {} read error: {}", connection_id, e);
                break;
            }
        }
    }

    connection.closed("transport close");
    // Sessions keep clones of the outbox sender, so the writer has to be stopped here.
    writer.abort();
    info!("Connection {} from {} closed", connection_id, addr);
    Ok(())
}

struct Binding {
    session: SessionHandle,
    user_id: UserId,
}

/// Routing state of one client connection
pub struct Connection {
    handle: ConnectionHandle,
    registry: Registry,
    binding: Option<Binding>,
}

impl Connection {
    pub fn new(handle: ConnectionHandle, registry: Registry) -> Self {
        Self {
            handle,
            registry,
            binding: None,
        }
    }

    /// Decodes and routes one text frame. Failures are reported to this connection only.
    pub async fn handle_frame(&mut self, text: &str) {
        let event: ClientEvent = match decode(text) {
            Ok(event) => event,
            Err(e) => {
                self.reject(&e.to_string());
                return;
            }
        };

        if let Err(err) = self.route(event).await {
            warn!("Connection {}: {}", self.handle.id, err);
            self.handle.send(err.to_event());
        }
    }

    fn reject(&self, reason: &str) {
        warn!("Invalid message on connection {}: {}", self.handle.id, reason);
        self.handle.send(ServerEvent::error("Invalid message"));
    }

    async fn route(&mut self, event: ClientEvent) -> Result<(), SessionError> {
        match event {
            ClientEvent::Join {
                session_id,
                user_id,
            } => {
                let session = self.registry.create_or_get(&session_id).await?;
                session.send(SessionCommand::Join {
                    user_id: user_id.clone(),
                    connection: self.handle.clone(),
                })?;
                self.bind(session, user_id);
            }
            ClientEvent::Leave {
                session_id,
                user_id,
            } => {
                let session = self.registry.get(&session_id).await?;
                session.send(SessionCommand::Leave {
                    user_id: user_id.clone(),
                    connection: self.handle.clone(),
                })?;
                if self.is_bound_to(&session_id, &user_id) {
                    self.binding = None;
                }
            }
            ClientEvent::Start { session_id } => {
                let session = self.registry.get(&session_id).await?;
                session.send(SessionCommand::Start {
                    connection: self.handle.clone(),
                })?;
            }
            ClientEvent::Answer {
                session_id,
                question_id,
                answer,
                time_taken_ms,
                additional_data,
            } => {
                let (session, user_id) = self.bound_to(&session_id).await?;
                session.send(SessionCommand::Answer {
                    user_id,
                    connection: self.handle.clone(),
                    question_id,
                    answer,
                    time_taken_ms,
                    additional_data,
                })?;
            }
            ClientEvent::Action {
                session_id,
                action,
                payload,
            } => {
                let (session, user_id) = self.bound_to(&session_id).await?;
                session.send(SessionCommand::Action {
                    user_id,
                    connection: self.handle.clone(),
                    action,
                    payload,
                })?;
            }
            ClientEvent::Realtime {
                session_id,
                event_type,
                event_data,
            } => {
                let (session, user_id) = self.bound_to(&session_id).await?;
                session.send(SessionCommand::Realtime {
                    user_id,
                    event_type,
                    event_data,
                })?;
            }
        }
        Ok(())
    }

    fn bind(&mut self, session: SessionHandle, user_id: UserId) {
        if let Some(previous) = self.binding.take() {
            let same = previous.session.session_id() == session.session_id()
                && previous.user_id == user_id;
            if !same {
                let _ = previous.session.send(SessionCommand::Disconnected {
                    user_id: previous.user_id,
                    connection_id: self.handle.id,
                    reason: "switched session".to_string(),
                });
            }
        }
        self.binding = Some(Binding { session, user_id });
    }

    fn is_bound_to(&self, session_id: &str, user_id: &str) -> bool {
        self.binding.as_ref().map_or(false, |binding| {
            binding.session.session_id() == session_id && binding.user_id == user_id
        })
    }

    async fn bound_to(&self, session_id: &str) -> Result<(SessionHandle, UserId), SessionError> {
        match &self.binding {
            Some(binding) if binding.session.session_id() == session_id => {
                Ok((binding.session.clone(), binding.user_id.clone()))
            }
            _ => {
                self.registry.get(session_id).await?;
                Err(SessionError::invalid("Join the session first"))
            }
        }
    }

    /// Reports the end of the transport to the bound session, if any.
    pub fn closed(&mut self, reason: &str) {
        if let Some(binding) = self.binding.take() {
            let _ = binding.session.send(SessionCommand::Disconnected {
                user_id: binding.user_id,
                connection_id: self.handle.id,
                reason: reason.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{content, next_event, registry, HOST};
    use shared::Format;

    fn connection(id: ConnectionId, registry: &Registry) -> (Connection, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, events) = mpsc::unbounded_channel();
        (
            Connection::new(ConnectionHandle::new(id, sender), registry.clone()),
            events,
        )
    }

    #[tokio::test]
    async fn test_malformed_frames_are_rejected() {
        let (registry, _) = registry(content(Format::TriviaLightning, 1));
        let (mut conn, mut events) = connection(1, &registry);

        conn.handle_frame("not json").await;
        conn.handle_frame(r#"{"event": "teleport", "data": {}}"#).await;

        assert_eq!(events.recv().await, Some(ServerEvent::error("Invalid message")));
        assert_eq!(events.recv().await, Some(ServerEvent::error("Invalid message")));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (registry, _) = registry(content(Format::TriviaLightning, 1));
        let (mut conn, mut events) = connection(1, &registry);

        conn.handle_frame(r#"{"event": "join", "data": {"sessionId": "nope", "userId": "u1"}}"#)
            .await;
        assert_eq!(events.recv().await, Some(ServerEvent::error("Session not found")));

        conn.handle_frame(r#"{"event": "start", "data": {"sessionId": "nope"}}"#)
            .await;
        assert_eq!(events.recv().await, Some(ServerEvent::error("Session not found")));
    }

    #[tokio::test]
    async fn test_answer_requires_join() {
        let (registry, _) = registry(content(Format::TriviaLightning, 1));
        registry.create_or_get("s1").await.unwrap();
        let (mut conn, mut events) = connection(1, &registry);

        conn.handle_frame(
            r#"{"event": "answer", "data": {"sessionId": "s1", "questionId": "q1", "answer": "a", "timeTakenMs": 100}}"#,
        )
        .await;
        assert_eq!(
            events.recv().await,
            Some(ServerEvent::warning("Join the session first"))
        );
    }

    #[tokio::test]
    async fn test_join_binds_and_close_disconnects() {
        let (registry, _) = registry(content(Format::TriviaLightning, 1));
        let (mut host, mut host_events) = connection(1, &registry);
        let (mut guest, _guest_events) = connection(2, &registry);

        host.handle_frame(&format!(
            r#"{{"event": "join", "data": {{"sessionId": "s1", "userId": "{}"}}}}"#,
            HOST
        ))
        .await;
        next_event(&mut host_events, "joined").await;

        guest
            .handle_frame(r#"{"event": "join", "data": {"sessionId": "s1", "userId": "guest"}}"#)
            .await;
        next_event(&mut host_events, "participant_updated").await;

        guest.closed("transport close");
        match next_event(&mut host_events, "participant_disconnected").await {
            ServerEvent::ParticipantDisconnected { user_id, .. } => assert_eq!(user_id, "guest"),
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
