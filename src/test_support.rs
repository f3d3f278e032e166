//! Utilidades compartidas por los tests: tracks de ejemplo y un gestor con un
//! nodo conectado por loopback.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::audio::{
    player::{Player, PlayerOptions},
    track::{RestTrack, RestTrackInfo, Track},
};
use crate::config::{ManagerOptions, NodeOptions};
use crate::events::{ManagerEvent, VoicePayload};
use crate::manager::Manager;
use crate::node::{socket::Socket, Node, RestClient};

pub(crate) fn track(title: &str, duration: u64) -> Track {
    Track::new(
        RestTrack {
            encoded: format!("QAAA{}", title),
            info: RestTrackInfo {
                identifier: format!("id-{}", title),
                is_seekable: true,
                author: "Test".to_string(),
                length: duration,
                is_stream: false,
                position: 0,
                title: title.to_string(),
                source_name: "youtube".to_string(),
                uri: None,
            },
        },
        None,
    )
}

/// Gestor con un único nodo (`test`, cliente `BOT`) cuyo socket no toca la red.
///
/// Cada comando enviado se confirma al instante y queda registrado como JSON.
pub(crate) struct Harness {
    pub manager: Arc<Manager>,
    pub node: Arc<Node>,
    sent: Arc<Mutex<Vec<Value>>>,
    voice: Arc<Mutex<Vec<(String, VoicePayload)>>>,
    events: Mutex<broadcast::Receiver<ManagerEvent>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Igual que [`Harness::new`], con cliente REST apuntando a `base_url`
    pub fn with_rest(base_url: &str) -> Self {
        Self::build(Some(base_url))
    }

    fn build(base_url: Option<&str>) -> Self {
        let voice: Arc<Mutex<Vec<(String, VoicePayload)>>> = Arc::default();
        let recorder = voice.clone();

        let manager = Manager::new(
            ManagerOptions {
                nodes: vec![NodeOptions {
                    identifier: "test".to_string(),
                    ..NodeOptions::new("localhost")
                }],
                client_id: Some("BOT".to_string()),
            },
            move |guild: &str, payload: VoicePayload| {
                recorder.lock().push((guild.to_string(), payload));
            },
        );
        let node = manager.nodes()[0].clone();

        let rest = base_url.map(|url| {
            RestClient::new(url, "youshallnotpass", Duration::from_secs(5), node.calls_handle())
                .unwrap()
        });

        let (socket, mut outgoing) = Socket::loopback("session-1");
        node.attach(Some(socket), rest);

        let sent: Arc<Mutex<Vec<Value>>> = Arc::default();
        let log = sent.clone();
        tokio::spawn(async move {
            while let Some(out) = outgoing.recv().await {
                log.lock().push(serde_json::from_str(&out.payload).unwrap());
                let _ = out.ack.send(Ok(()));
            }
        });

        let events = Mutex::new(manager.subscribe());

        Self {
            manager,
            node,
            sent,
            voice,
            events,
        }
    }

    /// Player conectado al canal `VC1`
    pub fn player(&self, guild_id: &str) -> Arc<Player> {
        let player = self
            .manager
            .create_player(PlayerOptions::new(guild_id).voice_channel("VC1"), None)
            .unwrap();
        player.connect().unwrap();
        player
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    /// Campo `op` de cada comando enviado
    pub fn ops(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|v| v["op"].as_str().map(str::to_string))
            .collect()
    }

    pub fn voice(&self) -> Vec<(String, VoicePayload)> {
        self.voice.lock().clone()
    }

    /// Vacía y devuelve los eventos pendientes, sin contar los `Payload`
    pub fn events(&self) -> Vec<ManagerEvent> {
        let mut receiver = self.events.lock();
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            if !matches!(event, ManagerEvent::Payload(_)) {
                events.push(event);
            }
        }
        events
    }
}
