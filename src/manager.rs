use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use regex::Regex;
use std::sync::{Arc, LazyLock, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audio::{
    player::{Player, PlayerOptions},
    track::Track,
};
use crate::config::{ManagerOptions, NodeOptions};
use crate::error::{LinkError, LinkResult};
use crate::events::{ManagerEvent, VoiceGateway};
use crate::node::{
    rest::{LoadException, LoadType, PlaylistInfo},
    Node,
};
use crate::voice::VoiceSignal;

const EVENT_CAPACITY: usize = 256;

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(https?://)?(www\.)?(youtube\.com|youtu\.?be)/.+$")
        .expect("valid youtube url pattern")
});

/// Fuente de búsqueda de Lavalink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchSource {
    #[default]
    YouTube,
    YouTubeMusic,
    SoundCloud,
}

impl SearchSource {
    pub fn prefix(self) -> &'static str {
        match self {
            SearchSource::YouTube => "ytsearch:",
            SearchSource::YouTubeMusic => "ytmsearch:",
            SearchSource::SoundCloud => "scsearch:",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub source: SearchSource,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, source: SearchSource) -> Self {
        Self {
            query: query.into(),
            source,
        }
    }

    /// Identificador que se pasa a `loadtracks`. Las URLs de YouTube se cargan tal cual.
    pub fn identifier(&self) -> String {
        if YOUTUBE_URL.is_match(&self.query) {
            self.query.clone()
        } else {
            format!("{}{}", self.source.prefix(), self.query)
        }
    }
}

impl From<&str> for SearchQuery {
    fn from(query: &str) -> Self {
        Self::new(query, SearchSource::default())
    }
}

impl From<String> for SearchQuery {
    fn from(query: String) -> Self {
        Self::new(query, SearchSource::default())
    }
}

/// Resultado de una búsqueda, con los tracks ya envueltos
#[derive(Debug, Clone)]
pub struct LoadedTracks {
    pub load_type: LoadType,
    pub playlist_info: Option<PlaylistInfo>,
    pub tracks: Vec<Track>,
    pub exception: Option<LoadException>,
}

/// Registro central de nodos y players.
///
/// Es el único punto de entrada para la aplicación y para las señales de voz
/// del gateway. Se construye una vez y se comparte como `Arc<Manager>`.
pub struct Manager {
    nodes: RwLock<Vec<Arc<Node>>>,
    players: DashMap<String, Arc<Player>>,
    client_id: RwLock<Option<String>>,
    gateway: Arc<dyn VoiceGateway>,
    events: broadcast::Sender<ManagerEvent>,
    this: Weak<Manager>,
}

impl Manager {
    pub fn new(options: ManagerOptions, gateway: impl VoiceGateway + 'static) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let manager = Arc::new_cyclic(|this| Self {
            nodes: RwLock::new(Vec::new()),
            players: DashMap::new(),
            client_id: RwLock::new(options.client_id),
            gateway: Arc::new(gateway),
            events,
            this: this.clone(),
        });

        for node in options.nodes {
            manager.create_node(node);
        }

        manager
    }

    /// Canal de notificaciones para la aplicación
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ManagerEvent) {
        if let ManagerEvent::Debug(message) = &event {
            debug!("{}", message);
        }
        // Sin suscriptores el evento simplemente se descarta
        let _ = self.events.send(event);
    }

    pub fn gateway(&self) -> &dyn VoiceGateway {
        self.gateway.as_ref()
    }

    pub fn client_id(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    /// Conecta todos los nodos, uno detrás de otro
    pub async fn init(&self, client_id: Option<&str>) -> LinkResult<()> {
        let nodes = self.nodes();
        if nodes.is_empty() {
            return Err(LinkError::NoNodesConfigured);
        }

        if let Some(client_id) = client_id {
            *self.client_id.write() = Some(client_id.to_string());
            for node in &nodes {
                node.set_client_id(client_id);
            }
        }

        info!("🎼 Conectando {} nodo(s)", nodes.len());
        for node in &nodes {
            node.connect().await?;
        }

        Ok(())
    }

    pub fn create_node(&self, options: NodeOptions) -> Arc<Node> {
        let node = Node::new(options, self.this.clone(), self.client_id());
        info!("➕ Nodo registrado: {} ({})", node.identifier(), node.url());
        self.nodes.write().push(node.clone());
        node
    }

    /// Destruye el nodo con ese identificador
    pub fn destroy_node(&self, identifier: &str) -> LinkResult<()> {
        let node = self
            .nodes()
            .into_iter()
            .find(|n| n.identifier() == identifier)
            .ok_or_else(|| LinkError::NodeUnavailable(identifier.to_string()))?;

        node.destroy();
        Ok(())
    }

    pub(crate) fn remove_node(&self, url: &str) {
        self.nodes.write().retain(|n| n.url() != url);
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().clone()
    }

    /// Nodo con menos players activos; en empate gana el primero
    pub fn least_used_node(&self) -> LinkResult<Arc<Node>> {
        let nodes = self.nodes.read();
        let mut best: Option<&Arc<Node>> = None;

        for node in nodes.iter() {
            match best {
                Some(current) if current.stats().players <= node.stats().players => {}
                _ => best = Some(node),
            }
        }

        best.cloned().ok_or(LinkError::NoNodesAvailable)
    }

    /// Busca tracks en el nodo menos usado
    pub async fn search(
        &self,
        query: impl Into<SearchQuery>,
        requester_id: Option<&str>,
    ) -> LinkResult<LoadedTracks> {
        let query = query.into();
        let node = self.least_used_node()?;
        let rest = node
            .rest()
            .ok_or_else(|| LinkError::NodeUnavailable(node.identifier().to_string()))?;

        let identifier = query.identifier();
        debug!("🔍 Buscando '{}' en {}", identifier, node.identifier());
        let result = rest.load_tracks(&identifier).await?;

        let tracks = result
            .tracks
            .into_iter()
            .map(|t| Track::new(t, requester_id.map(str::to_string)))
            .collect();

        Ok(LoadedTracks {
            load_type: result.load_type,
            playlist_info: result.playlist_info,
            tracks,
            exception: result.exception,
        })
    }

    /// Crea el player de la guild, o devuelve el que ya existe
    pub fn create_player(
        &self,
        options: PlayerOptions,
        node: Option<Arc<Node>>,
    ) -> LinkResult<Arc<Player>> {
        let node = match node {
            Some(node) => node,
            None => self.least_used_node()?,
        };

        let player = match self.players.entry(options.guild_id.clone()) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let player = Player::new(options, node.clone(), self.this.clone());
                entry.insert(player.clone());
                player
            }
        };

        info!("🎵 Player creado para {} en {}", player.guild_id(), node.identifier());
        self.emit(ManagerEvent::PlayerCreated(node, player.clone()));
        Ok(player)
    }

    pub async fn destroy_player(&self, guild_id: &str) -> LinkResult<()> {
        let player = self
            .get_player(guild_id)
            .ok_or_else(|| LinkError::SessionNotFound(guild_id.to_string()))?;

        player.destroy(true).await
    }

    pub fn get_player(&self, guild_id: &str) -> Option<Arc<Player>> {
        self.players.get(guild_id).map(|p| p.value().clone())
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.players.iter().map(|p| p.value().clone()).collect()
    }

    /// Quita el player del registro solo si sigue siendo la misma instancia
    pub(crate) fn remove_player(&self, player: &Arc<Player>) {
        self.players
            .remove_if(player.guild_id(), |_, registered| Arc::ptr_eq(registered, player));
    }

    /// Combina las señales de voz del gateway y envía `voiceUpdate` cuando está completo
    pub async fn update_voice_state(&self, signal: impl Into<VoiceSignal>) -> LinkResult<()> {
        let Some(signal) = signal.into().resolve() else {
            return Ok(());
        };
        let Some(player) = signal.guild_id().and_then(|guild| self.get_player(guild)) else {
            return Ok(());
        };

        match signal {
            VoiceSignal::Server(server) => {
                debug!("🌐 Servidor de voz para {}: {:?}", server.guild_id, server.endpoint);
                player.set_voice_server(server);
            }
            VoiceSignal::State(state) => {
                if self.client_id().as_deref() != Some(state.user_id.as_str()) {
                    return Ok(());
                }

                match state.channel_id {
                    Some(channel_id) => {
                        let old_channel = player.voice_channel();
                        if old_channel.as_deref() != Some(channel_id.as_str()) {
                            info!("🔀 Player de {} movido a {}", state.guild_id, channel_id);
                            self.emit(ManagerEvent::PlayerMoved {
                                node: player.node().clone(),
                                player: player.clone(),
                                old_channel,
                                new_channel: channel_id.clone(),
                            });
                        }
                        player.set_voice_session(state.session_id, channel_id);
                    }
                    None => {
                        info!("🔇 Bot desconectado de voz en {}", state.guild_id);
                        self.emit(ManagerEvent::PlayerDestroyed(
                            player.node().clone(),
                            player.clone(),
                        ));
                        player.reset_voice();
                        if let Err(e) = player.pause(true).await {
                            warn!("⚠️ No se pudo pausar {}: {}", state.guild_id, e);
                        }
                    }
                }
            }
            VoiceSignal::Packet(_) => return Ok(()),
        }

        if let Some(update) = player.pending_voice_update() {
            debug!("📡 Enviando voiceUpdate para {}", update.guild_id);
            player.node().send(&update).await?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("nodes", &self.nodes.read().len())
            .field("players", &self.players.len())
            .field("client_id", &self.client_id())
            .finish()
    }
}
