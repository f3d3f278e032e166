use futures::{stream::SplitSink, stream::SplitStream, SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{LinkError, LinkResult};
use crate::events::ManagerEvent;
use crate::node::protocol::{EventPayload, IncomingMessage};
use crate::node::Node;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Ready,
    Closed,
}

/// Mensaje pendiente de escritura y el canal por el que se confirma
pub(crate) struct Outgoing {
    pub payload: String,
    pub ack: oneshot::Sender<LinkResult<()>>,
}

/// Conexión WebSocket persistente con un nodo.
///
/// La lectura y la escritura corren en tareas separadas; los frames de un mismo
/// nodo se procesan en orden de llegada.
pub struct Socket {
    session_id: RwLock<Option<String>>,
    state: watch::Sender<SocketState>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    shutdown: CancellationToken,
}

impl Socket {
    fn new(outgoing: mpsc::UnboundedSender<Outgoing>) -> Self {
        let (state, _) = watch::channel(SocketState::Connecting);
        Self {
            session_id: RwLock::new(None),
            state,
            outgoing,
            shutdown: CancellationToken::new(),
        }
    }

    /// Abre el WebSocket y lanza las tareas de lectura y escritura
    pub(crate) async fn connect(
        node: &Arc<Node>,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> LinkResult<Arc<Socket>> {
        let mut request = url.into_client_request()?;
        for (name, value) in headers {
            request
                .headers_mut()
                .insert(*name, HeaderValue::from_str(value)?);
        }

        info!("🔌 Abriendo WebSocket de {} en {}", node.identifier(), url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (ws_tx, ws_rx) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(Socket::new(tx));

        tokio::spawn(write_loop(ws_tx, rx, socket.shutdown.clone()));
        tokio::spawn(read_loop(ws_rx, Arc::downgrade(node), socket.clone()));

        Ok(socket)
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SocketState> {
        self.state.subscribe()
    }

    /// Envía un payload ya serializado y espera a que se escriba
    pub(crate) async fn send(&self, payload: String) -> LinkResult<()> {
        if self.state() == SocketState::Closed {
            return Err(LinkError::Closed);
        }

        let (ack, written) = oneshot::channel();
        self.outgoing
            .send(Outgoing { payload, ack })
            .map_err(|_| LinkError::Closed)?;

        written.await.map_err(|_| LinkError::Closed)?
    }

    pub fn close(&self) {
        self.shutdown.cancel();
        self.state.send_replace(SocketState::Closed);
    }

    fn mark_ready(&self, session_id: String) {
        *self.session_id.write() = Some(session_id);
        self.state.send_replace(SocketState::Ready);
    }

    /// Socket sin red: cada payload llega al receptor devuelto
    #[cfg(test)]
    pub(crate) fn loopback(session_id: &str) -> (Arc<Socket>, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(Socket::new(tx));
        socket.mark_ready(session_id.to_string());
        (socket, rx)
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("session_id", &self.session_id())
            .field("state", &self.state())
            .finish()
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(Outgoing { payload, ack }) => {
                    let result = ws_tx.send(Message::Text(payload)).await.map_err(LinkError::from);
                    let _ = ack.send(result);
                }
                None => break,
            }
        }
    }

    if let Err(e) = ws_tx.close().await {
        debug!("Error al cerrar WebSocket: {}", e);
    }
}

async fn read_loop(mut ws_rx: SplitStream<WsStream>, node: Weak<Node>, socket: Arc<Socket>) {
    let reason = loop {
        tokio::select! {
            () = socket.shutdown.cancelled() => break "closed locally".to_string(),
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let Some(node) = node.upgrade() else {
                        break "node dropped".to_string();
                    };
                    dispatch(&node, &socket, &text).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => format!("closed by node ({}): {}", u16::from(frame.code), frame.reason),
                        None => "closed by node".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("❌ Error en WebSocket: {}", e);
                    break e.to_string();
                }
                None => break "stream ended".to_string(),
            }
        }
    };

    socket.close();
    if let Some(node) = node.upgrade() {
        node.on_socket_closed(&socket, reason);
    }
}

/// Decodifica un frame y lo aplica sobre el nodo y la sesión correspondiente.
///
/// Nunca falla: los frames que no se entienden se reportan como diagnóstico.
pub(crate) async fn dispatch(node: &Arc<Node>, socket: &Socket, text: &str) {
    let Some(manager) = node.manager() else {
        return;
    };

    let message = match IncomingMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("⚠️ Payload desconocido de {}: {}", node.identifier(), e);
            manager.emit(ManagerEvent::Debug(format!("Unknown payload\n{}", text)));
            return;
        }
    };

    match message {
        IncomingMessage::Ready(ready) => {
            info!(
                "✅ Nodo {} listo (sesión {}, resumed={})",
                node.identifier(),
                ready.session_id,
                ready.resumed
            );
            socket.mark_ready(ready.session_id);
            node.mark_ready();
        }
        IncomingMessage::Stats(stats) => {
            node.set_stats(stats.clone());
            manager.emit(ManagerEvent::NodeStats(node.clone(), stats));
        }
        IncomingMessage::PlayerUpdate(update) => {
            if let Some(player) = manager.get_player(&update.guild_id) {
                player.set_position(update.state.position.unwrap_or(0));
            }
        }
        IncomingMessage::Event(event) => {
            let Some(player) = manager.get_player(event.guild_id()) else {
                return;
            };

            match event {
                EventPayload::TrackStart(_) => {
                    player.mark_started();
                    let current = player.queue().current().cloned();
                    manager.emit(ManagerEvent::TrackStart(player, current));
                }
                EventPayload::TrackEnd(end) => {
                    if let Err(e) = player.handle_track_end(end.reason).await {
                        warn!("⚠️ Error al procesar fin de track en {}: {}", end.guild_id, e);
                        manager.emit(ManagerEvent::Debug(format!(
                            "Failed to handle track end for {}: {}",
                            end.guild_id, e
                        )));
                    }
                }
                EventPayload::TrackException(exception) => {
                    manager.emit(ManagerEvent::TrackError(player, exception.exception.to_string()));
                }
                EventPayload::TrackStuck(stuck) => {
                    manager.emit(ManagerEvent::TrackStuck(player, stuck));
                }
                EventPayload::WebSocketClosed(closed) => {
                    manager.emit(ManagerEvent::Debug(format!(
                        "Voice WebSocket closed for {} ({}): {} (by remote: {})",
                        closed.guild_id, closed.code, closed.reason, closed.by_remote
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{track, Harness};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_events_are_routed_to_the_guild_player() {
        let harness = Harness::new();
        let socket = harness.node.socket().unwrap();
        let player = harness.player("G1");
        player.queue().add(track("A", 3000)).add(track("B", 2000));
        harness.events();

        dispatch(
            &harness.node,
            &socket,
            r#"{"op":"event","type":"TrackStartEvent","guildId":"G1","track":"QAAAA"}"#,
        )
        .await;
        assert!(player.is_playing());

        dispatch(
            &harness.node,
            &socket,
            r#"{"op":"playerUpdate","guildId":"G1","state":{"time":1,"position":1500,"connected":true}}"#,
        )
        .await;
        assert_eq!(player.position(), 1500);

        dispatch(
            &harness.node,
            &socket,
            r#"{"op":"event","type":"TrackEndEvent","guildId":"G1","track":"QAAAA","reason":"FINISHED"}"#,
        )
        .await;
        assert_eq!(player.queue().current().map(|t| t.title.clone()), Some("B".to_string()));
        assert_eq!(harness.ops(), vec!["play"]);

        let names: Vec<_> = harness.events().iter().map(ManagerEvent::name).collect();
        assert_eq!(names, vec!["trackStart", "trackEnd"]);
    }

    #[tokio::test]
    async fn test_exception_stuck_and_closed_events() {
        let harness = Harness::new();
        let socket = harness.node.socket().unwrap();
        harness.player("G1");
        harness.events();

        dispatch(
            &harness.node,
            &socket,
            r#"{"op":"event","type":"TrackExceptionEvent","guildId":"G1",
                "exception":{"message":"Video unavailable","severity":"COMMON","cause":"x"}}"#,
        )
        .await;
        dispatch(
            &harness.node,
            &socket,
            r#"{"op":"event","type":"TrackStuckEvent","guildId":"G1","thresholdMs":10000}"#,
        )
        .await;
        dispatch(
            &harness.node,
            &socket,
            r#"{"op":"event","type":"WebSocketClosedEvent","guildId":"G1","code":4006,"reason":"Session invalid","byRemote":true}"#,
        )
        .await;

        let events = harness.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ManagerEvent::TrackError(_, cause) if cause == "Video unavailable (COMMON)"));
        assert!(matches!(&events[1], ManagerEvent::TrackStuck(_, stuck) if stuck.threshold_ms == 10_000));
        assert!(matches!(&events[2], ManagerEvent::Debug(message) if message.contains("4006")));
    }

    #[tokio::test]
    async fn test_unknown_guilds_and_event_types_are_dropped() {
        let harness = Harness::new();
        let socket = harness.node.socket().unwrap();

        dispatch(
            &harness.node,
            &socket,
            r#"{"op":"event","type":"TrackStartEvent","guildId":"nobody"}"#,
        )
        .await;
        assert!(harness.events().is_empty());

        harness.player("G1");
        harness.events();
        dispatch(
            &harness.node,
            &socket,
            r#"{"op":"event","type":"SomethingNewEvent","guildId":"G1"}"#,
        )
        .await;

        let events = harness.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ManagerEvent::Debug(message) if message.starts_with("Unknown payload")));
        assert!(harness.sent().is_empty());
    }

    #[tokio::test]
    async fn test_loopback_send_and_close() {
        let (socket, mut outgoing) = Socket::loopback("abc");
        assert_eq!(socket.session_id().as_deref(), Some("abc"));
        assert_eq!(socket.state(), SocketState::Ready);

        let echo = tokio::spawn(async move {
            let out = outgoing.recv().await.unwrap();
            let _ = out.ack.send(Ok(()));
            out.payload
        });
        socket.send("{}".to_string()).await.unwrap();
        assert_eq!(echo.await.unwrap(), "{}");

        socket.close();
        assert_eq!(socket.state(), SocketState::Closed);
        assert!(matches!(socket.send("{}".to_string()).await, Err(LinkError::Closed)));
    }
}
