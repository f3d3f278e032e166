//! # Node Module
//!
//! Un [`Node`] representa una instancia de Lavalink: su dirección, credenciales,
//! ciclo de vida (connect / reconnect / destroy), métricas agregadas y los dos
//! canales hacia ella:
//!
//! - [`socket`] - WebSocket persistente por el que llegan eventos y salen comandos
//! - [`rest`] - cliente HTTP para llamadas puntuales (búsqueda, decode, info)
//! - [`protocol`] - frames tipados del WebSocket
//!
//! La identidad efectiva de un nodo es su [`Node::url`]; host y puerto no cambian
//! durante su vida.

pub mod protocol;
pub mod rest;
pub mod socket;

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::NodeOptions;
use crate::error::{LinkError, LinkResult};
use crate::events::ManagerEvent;
use crate::manager::Manager;
use crate::CLIENT_NAME;

pub use protocol::NodeStats;
pub use rest::RestClient;
pub use socket::{Socket, SocketState};

/// Versión mayor de Lavalink soportada
pub const SUPPORTED_MAJOR: &str = "3";

pub struct Node {
    options: NodeOptions,
    client_id: RwLock<Option<String>>,
    connected: AtomicBool,
    ready: AtomicBool,
    version: RwLock<Option<String>>,
    stats: RwLock<NodeStats>,
    calls: Arc<AtomicU64>,
    socket: RwLock<Option<Arc<Socket>>>,
    rest: RwLock<Option<RestClient>>,
    manager: Weak<Manager>,
}

impl Node {
    pub(crate) fn new(options: NodeOptions, manager: Weak<Manager>, client_id: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            options,
            client_id: RwLock::new(client_id),
            connected: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            version: RwLock::new(None),
            stats: RwLock::new(NodeStats::default()),
            calls: Arc::new(AtomicU64::new(0)),
            socket: RwLock::new(None),
            rest: RwLock::new(None),
            manager,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.options.identifier
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// URL base del nodo, derivada de `secure`, `host` y `port`
    pub fn url(&self) -> String {
        let scheme = if self.options.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.options.host, self.options.port)
    }

    fn socket_url(&self) -> LinkResult<String> {
        let scheme = if self.options.secure { "wss" } else { "ws" };
        let url = Url::parse(&format!(
            "{}://{}:{}/v{}/websocket",
            scheme, self.options.host, self.options.port, SUPPORTED_MAJOR
        ))?;
        Ok(url.to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn version(&self) -> Option<String> {
        self.version.read().clone()
    }

    pub fn stats(&self) -> NodeStats {
        self.stats.read().clone()
    }

    /// Número de llamadas (REST + WebSocket) hechas al nodo
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn client_id(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    pub fn set_client_id(&self, client_id: impl Into<String>) {
        *self.client_id.write() = Some(client_id.into());
    }

    pub fn socket(&self) -> Option<Arc<Socket>> {
        self.socket.read().clone()
    }

    pub fn rest(&self) -> Option<RestClient> {
        self.rest.read().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.socket().and_then(|s| s.session_id())
    }

    pub(crate) fn manager(&self) -> Option<Arc<Manager>> {
        self.manager.upgrade()
    }

    fn emit(&self, event: ManagerEvent) {
        if let Some(manager) = self.manager() {
            manager.emit(event);
        }
    }

    /// Conecta con el nodo, reintentando con espera fija.
    ///
    /// Cada intento hace el handshake de versión por REST, abre el WebSocket y
    /// espera el frame `ready`. Agotados los reintentos, el nodo se destruye y
    /// se devuelve `ConnectionExhausted`. Sin client id no se intenta nada.
    pub async fn connect(self: &Arc<Self>) -> LinkResult<()> {
        let client_id = self
            .client_id()
            .ok_or_else(|| LinkError::invalid_argument("client id has not been set"))?;
        let mut attempts = 0u32;

        loop {
            match self.try_connect(&client_id).await {
                Ok(()) => {
                    self.connected.store(true, Ordering::Release);
                    info!("✅ Nodo {} conectado ({})", self.identifier(), self.url());
                    self.emit(ManagerEvent::NodeConnected(self.clone()));
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    warn!(
                        "⚠️ Intento {} de conexión a {} falló: {}",
                        attempts,
                        self.identifier(),
                        e
                    );
                    self.emit(ManagerEvent::Debug(e.to_string()));
                    self.teardown();

                    if attempts > self.options.retry_amount {
                        self.destroy();
                        return Err(LinkError::ConnectionExhausted {
                            identifier: self.identifier().to_string(),
                            attempts,
                        });
                    }

                    tokio::time::sleep(self.options.retry_delay).await;
                    info!("🔄 Reintentando conexión a {}", self.identifier());
                }
            }
        }
    }

    async fn try_connect(self: &Arc<Self>, client_id: &str) -> LinkResult<()> {
        let mut rest = RestClient::new(
            self.url(),
            self.options.password.as_str(),
            self.options.request_timeout,
            self.calls.clone(),
        )?;

        let version = rest.version().await?;
        *self.version.write() = Some(version.clone());

        if version.split('.').next() != Some(SUPPORTED_MAJOR) {
            return Err(LinkError::UnsupportedBackend(version));
        }

        rest.set_base_url(format!("{}/v{}", self.url(), SUPPORTED_MAJOR));
        *self.rest.write() = Some(rest);

        let headers = [
            ("Authorization", self.options.password.clone()),
            ("User-Id", client_id.to_string()),
            ("Client-Name", CLIENT_NAME.to_string()),
        ];

        let socket = Socket::connect(self, &self.socket_url()?, &headers).await?;
        *self.socket.write() = Some(socket.clone());

        let mut state = socket.subscribe();
        let settled = tokio::time::timeout(
            self.options.request_timeout,
            state.wait_for(|s| *s != SocketState::Connecting),
        )
        .await
        .map_err(|_| LinkError::Timeout(self.options.request_timeout))?
        .map(|s| *s)
        .map_err(|_| LinkError::Closed)?;

        match settled {
            SocketState::Ready => Ok(()),
            _ => Err(LinkError::Closed),
        }
    }

    /// Cierra la conexión y la vuelve a abrir
    pub async fn reconnect(self: &Arc<Self>) -> LinkResult<()> {
        self.teardown();
        self.connect().await
    }

    /// Cierra el transporte y suelta el cliente REST sin salir de la lista de nodos
    fn teardown(&self) {
        if let Some(socket) = self.socket.write().take() {
            socket.close();
        }
        self.rest.write().take();
        self.connected.store(false, Ordering::Release);
        self.ready.store(false, Ordering::Release);
    }

    /// Destruye el nodo y lo quita del gestor
    pub fn destroy(self: &Arc<Self>) {
        self.teardown();
        info!("🗑️ Nodo {} destruido", self.identifier());
        self.emit(ManagerEvent::NodeDestroyed(self.clone()));

        if let Some(manager) = self.manager() {
            manager.remove_node(&self.url());
        }
    }

    /// Serializa y envía un comando por el WebSocket.
    ///
    /// Solo se aceptan payloads que serialicen a un objeto JSON.
    pub async fn send<T: Serialize + ?Sized>(&self, command: &T) -> LinkResult<()> {
        let value = serde_json::to_value(command)?;
        if !value.is_object() {
            return Err(LinkError::InvalidCommand);
        }

        let socket = self
            .socket()
            .ok_or_else(|| LinkError::NodeUnavailable(self.identifier().to_string()))?;

        let payload = serde_json::to_string(&value)?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        debug!("📤 {} -> {}", self.identifier(), payload);
        self.emit(ManagerEvent::Payload(payload.clone()));

        socket.send(payload).await
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub(crate) fn set_stats(&self, stats: NodeStats) {
        *self.stats.write() = stats;
    }

    pub(crate) fn on_socket_closed(self: &Arc<Self>, socket: &Arc<Socket>, reason: String) {
        let current = self.socket.read().as_ref().is_some_and(|s| Arc::ptr_eq(s, socket));
        if !current {
            return;
        }

        warn!("🔌 WebSocket de {} cerrado: {}", self.identifier(), reason);
        self.connected.store(false, Ordering::Release);
        self.ready.store(false, Ordering::Release);
        self.emit(ManagerEvent::NodeError(self.clone(), reason));
    }

    #[cfg(test)]
    pub(crate) fn attach(&self, socket: Option<Arc<Socket>>, rest: Option<RestClient>) {
        *self.socket.write() = socket;
        *self.rest.write() = rest;
        self.connected.store(true, Ordering::Release);
        self.ready.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn calls_handle(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("identifier", &self.identifier())
            .field("url", &self.url())
            .field("connected", &self.is_connected())
            .field("ready", &self.is_ready())
            .field("calls", &self.calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerOptions;
    use crate::events::VoicePayload;
    use crate::test_support::Harness;
    use futures::{SinkExt, StreamExt};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::{mpsc, Notify};
    use tokio_tungstenite::tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::HeaderMap,
        Message,
    };
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_urls() {
        let manager = Manager::new(ManagerOptions::default(), |_: &str, _: VoicePayload| {});
        let node = manager.create_node(NodeOptions {
            secure: true,
            port: 443,
            ..NodeOptions::new("lava.example.com")
        });

        assert_eq!(node.url(), "https://lava.example.com:443");
        assert_eq!(node.socket_url().unwrap(), "wss://lava.example.com/v3/websocket");

        let plain = manager.create_node(NodeOptions::new("localhost"));
        assert_eq!(plain.socket_url().unwrap(), "ws://localhost:2333/v3/websocket");
    }

    #[tokio::test]
    async fn test_send_rejects_non_object_payloads() {
        let harness = Harness::new();

        let err = harness.node.send(&vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidCommand));
        assert!(harness.sent().is_empty());

        harness.node.send(&serde_json::json!({ "op": "stop", "guildId": "G1" })).await.unwrap();
        assert_eq!(harness.ops(), vec!["stop"]);
        assert_eq!(harness.node.calls(), 1);
    }

    #[tokio::test]
    async fn test_stats_frames_replace_snapshot() {
        let harness = Harness::new();
        let socket = harness.node.socket().unwrap();

        socket::dispatch(
            &harness.node,
            &socket,
            r#"{"op":"stats","players":7,"playingPlayers":2,"uptime":5,
                "memory":{"free":1,"used":1,"allocated":1,"reservable":1},
                "cpu":{"cores":2,"systemLoad":0.1,"lavalinkLoad":0.2}}"#,
        )
        .await;

        assert_eq!(harness.node.stats().players, 7);
        assert!(harness
            .events()
            .iter()
            .any(|e| matches!(e, ManagerEvent::NodeStats(_, stats) if stats.playing_players == 2)));
    }

    #[tokio::test]
    async fn test_unknown_frames_only_emit_debug() {
        let harness = Harness::new();
        let socket = harness.node.socket().unwrap();

        socket::dispatch(&harness.node, &socket, r#"{"op":"whatever"}"#).await;
        socket::dispatch(&harness.node, &socket, "{broken").await;

        let events = harness.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, ManagerEvent::Debug(_))));
        assert!(harness.node.is_ready());
    }

    #[tokio::test]
    async fn test_unsupported_version_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).set_body_string("4.0.0"))
            .expect(2)
            .mount(&server)
            .await;

        let address = server.address();
        let manager = Manager::new(
            ManagerOptions {
                nodes: vec![NodeOptions {
                    port: address.port(),
                    identifier: "main".to_string(),
                    retry_amount: 1,
                    retry_delay: Duration::from_millis(10),
                    ..NodeOptions::new(address.ip().to_string())
                }],
                client_id: Some("BOT".to_string()),
            },
            |_: &str, _: VoicePayload| {},
        );
        let mut events = manager.subscribe();
        let node = manager.nodes()[0].clone();

        match node.connect().await {
            Err(LinkError::ConnectionExhausted { identifier, attempts }) => {
                assert_eq!(identifier, "main");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert_eq!(node.version().as_deref(), Some("4.0.0"));
        assert!(!node.is_connected());
        assert!(manager.nodes().is_empty());

        let mut saw_destroyed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ManagerEvent::NodeDestroyed(_)) {
                saw_destroyed = true;
            }
        }
        assert!(saw_destroyed);
    }

    #[tokio::test]
    async fn test_connect_without_client_id_fails_fast() {
        let manager = Manager::new(ManagerOptions::default(), |_: &str, _: VoicePayload| {});
        let node = manager.create_node(NodeOptions {
            retry_amount: 5,
            retry_delay: Duration::from_secs(5),
            ..NodeOptions::new("127.0.0.1")
        });

        let result = tokio::time::timeout(Duration::from_secs(1), node.connect())
            .await
            .unwrap();

        assert!(matches!(result, Err(LinkError::InvalidArgument(_))));
        assert!(node.version().is_none());
        assert_eq!(node.calls(), 0);
        assert_eq!(manager.nodes().len(), 1);
    }

    struct Handshake {
        path: String,
        headers: HeaderMap,
        close: Arc<Notify>,
    }

    /// Servidor Lavalink mínimo: responde `/version` por HTTP y acepta el WebSocket
    /// en el mismo puerto, con sesiones `S1`, `S2`...
    async fn fake_lavalink(
        listener: TcpListener,
        handshakes: mpsc::UnboundedSender<Handshake>,
        frames: mpsc::UnboundedSender<String>,
    ) {
        let mut sessions = 0;
        while let Ok((mut stream, _)) = listener.accept().await {
            let head = read_head(&stream).await;
            if head.to_ascii_lowercase().contains("upgrade: websocket") {
                sessions += 1;
                tokio::spawn(serve_socket(
                    stream,
                    format!("S{}", sessions),
                    handshakes.clone(),
                    frames.clone(),
                ));
            } else {
                let mut request = vec![0; head.len()];
                let _ = stream.read_exact(&mut request).await;
                let body = "3.7.11";
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        }
    }

    async fn read_head(stream: &TcpStream) -> String {
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.peek(&mut buf).await.unwrap_or(0);
            if n == 0 {
                return String::new();
            }
            let text = String::from_utf8_lossy(&buf[..n]);
            if let Some(end) = text.find("\r\n\r\n") {
                return text[..end + 4].to_string();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn serve_socket(
        stream: TcpStream,
        session: String,
        handshakes: mpsc::UnboundedSender<Handshake>,
        frames: mpsc::UnboundedSender<String>,
    ) {
        let mut seen = None;
        let mut ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                seen = Some((request.uri().path().to_string(), request.headers().clone()));
                Ok(response)
            },
        )
        .await
        .unwrap();

        let (path, headers) = seen.unwrap();
        let close = Arc::new(Notify::new());
        let _ = handshakes.send(Handshake {
            path,
            headers,
            close: close.clone(),
        });

        let ready = serde_json::json!({ "op": "ready", "resumed": false, "sessionId": session });
        ws.send(Message::Text(ready.to_string())).await.unwrap();

        loop {
            tokio::select! {
                () = close.notified() => {
                    let _ = ws.close(None).await;
                    break;
                }
                message = ws.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        let _ = frames.send(text);
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    fn header<'a>(handshake: &'a Handshake, name: &str) -> Option<&'a str> {
        handshake.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_websocket_lifecycle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (handshake_tx, mut handshakes) = mpsc::unbounded_channel();
        let (frame_tx, mut frames) = mpsc::unbounded_channel();
        tokio::spawn(fake_lavalink(listener, handshake_tx, frame_tx));

        let manager = Manager::new(
            ManagerOptions {
                nodes: vec![NodeOptions {
                    port: address.port(),
                    identifier: "main".to_string(),
                    retry_amount: 0,
                    request_timeout: Duration::from_secs(5),
                    ..NodeOptions::new("127.0.0.1")
                }],
                client_id: None,
            },
            |_: &str, _: VoicePayload| {},
        );
        let mut events = manager.subscribe();
        let node = manager.nodes()[0].clone();

        manager.init(Some("BOT")).await.unwrap();

        let first = handshakes.recv().await.unwrap();
        assert_eq!(first.path, "/v3/websocket");
        assert_eq!(header(&first, "authorization"), Some("youshallnotpass"));
        assert_eq!(header(&first, "user-id"), Some("BOT"));
        assert_eq!(header(&first, "client-name"), Some(CLIENT_NAME));

        assert!(node.is_connected());
        assert!(node.is_ready());
        assert_eq!(node.version().as_deref(), Some("3.7.11"));
        assert_eq!(node.session_id().as_deref(), Some("S1"));

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        assert!(names.contains(&"nodeConnected"));

        // Comando saliente
        node.send(&serde_json::json!({ "op": "stop", "guildId": "G1" })).await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&frame).unwrap(),
            serde_json::json!({ "op": "stop", "guildId": "G1" })
        );

        // Reconexión: socket nuevo, el anterior queda cerrado
        let old = node.socket().unwrap();
        node.reconnect().await.unwrap();
        let current = node.socket().unwrap();

        assert!(!Arc::ptr_eq(&old, &current));
        assert_eq!(old.state(), SocketState::Closed);
        assert_eq!(current.state(), SocketState::Ready);
        assert_eq!(node.session_id().as_deref(), Some("S2"));
        assert!(node.is_connected());

        // Cierre desde el servidor
        let second = handshakes.recv().await.unwrap();
        assert_eq!(header(&second, "user-id"), Some("BOT"));
        second.close.notify_one();

        let reason = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(ManagerEvent::NodeError(_, reason)) = events.recv().await {
                    return reason;
                }
            }
        })
        .await
        .unwrap();

        assert!(reason.starts_with("closed by node"));
        assert!(!node.is_connected());
        assert!(!node.is_ready());
        assert_eq!(current.state(), SocketState::Closed);
        assert_eq!(manager.nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_unregisters() {
        let harness = Harness::new();
        let url = harness.node.url();

        harness.node.destroy();
        harness.node.destroy();

        assert!(harness.node.socket().is_none());
        assert!(!harness.node.is_connected());
        assert!(harness.manager.nodes().iter().all(|n| n.url() != url));
    }
}
