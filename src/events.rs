use serde::Serialize;
use std::sync::Arc;

use crate::audio::{player::Player, track::Track};
use crate::node::{
    protocol::{TrackEndReason, TrackStuckEvent},
    Node, NodeStats,
};

/// Notificaciones que el gestor emite hacia la aplicación
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// Mensaje de diagnóstico
    Debug(String),
    /// Payload serializado justo antes de enviarlo a un nodo
    Payload(String),
    NodeConnected(Arc<Node>),
    NodeDestroyed(Arc<Node>),
    NodeStats(Arc<Node>, NodeStats),
    NodeError(Arc<Node>, String),
    PlayerCreated(Arc<Node>, Arc<Player>),
    PlayerDestroyed(Arc<Node>, Arc<Player>),
    PlayerMoved {
        node: Arc<Node>,
        player: Arc<Player>,
        old_channel: Option<String>,
        new_channel: String,
    },
    TrackStart(Arc<Player>, Option<Track>),
    TrackEnd(Arc<Player>, Option<Track>, TrackEndReason),
    TrackError(Arc<Player>, String),
    TrackStuck(Arc<Player>, TrackStuckEvent),
    QueueEnd(Arc<Player>),
}

impl ManagerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ManagerEvent::Debug(_) => "debug",
            ManagerEvent::Payload(_) => "payload",
            ManagerEvent::NodeConnected(_) => "nodeConnected",
            ManagerEvent::NodeDestroyed(_) => "nodeDestroyed",
            ManagerEvent::NodeStats(..) => "nodeStats",
            ManagerEvent::NodeError(..) => "nodeError",
            ManagerEvent::PlayerCreated(..) => "playerCreated",
            ManagerEvent::PlayerDestroyed(..) => "playerDestroyed",
            ManagerEvent::PlayerMoved { .. } => "playerMoved",
            ManagerEvent::TrackStart(..) => "trackStart",
            ManagerEvent::TrackEnd(..) => "trackEnd",
            ManagerEvent::TrackError(..) => "trackError",
            ManagerEvent::TrackStuck(..) => "trackStuck",
            ManagerEvent::QueueEnd(_) => "queueEnd",
        }
    }
}

/// Payload de voz (opcode 4 del gateway) para entrar o salir de un canal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoicePayload {
    pub op: u8,
    pub d: VoicePayloadData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoicePayloadData {
    pub guild_id: String,
    pub channel_id: Option<String>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl VoicePayload {
    pub fn join(guild_id: &str, channel_id: &str, self_mute: bool, self_deaf: bool) -> Self {
        Self {
            op: 4,
            d: VoicePayloadData {
                guild_id: guild_id.to_string(),
                channel_id: Some(channel_id.to_string()),
                self_mute,
                self_deaf,
            },
        }
    }

    pub fn leave(guild_id: &str) -> Self {
        Self {
            op: 4,
            d: VoicePayloadData {
                guild_id: guild_id.to_string(),
                channel_id: None,
                self_mute: false,
                self_deaf: false,
            },
        }
    }
}

/// Puente hacia el gateway de la plataforma de chat.
///
/// La aplicación lo implementa para reenviar los payloads de voz por el shard
/// que corresponda a la guild.
#[cfg_attr(test, mockall::automock)]
pub trait VoiceGateway: Send + Sync {
    fn send(&self, guild_id: &str, payload: VoicePayload);
}

impl<F> VoiceGateway for F
where
    F: Fn(&str, VoicePayload) + Send + Sync,
{
    fn send(&self, guild_id: &str, payload: VoicePayload) {
        self(guild_id, payload)
    }
}
