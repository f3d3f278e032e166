//! Señales de voz que llegan desde el gateway de la plataforma de chat.
//!
//! El gateway emite dos señales independientes por guild: `VOICE_SERVER_UPDATE`
//! (token + endpoint) y `VOICE_STATE_UPDATE` (session id + canal). El nodo
//! necesita ambas combinadas en un único comando `voiceUpdate`, que se acumula
//! en [`VoiceUpdate`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";
pub const VOICE_SERVER_UPDATE: &str = "VOICE_SERVER_UPDATE";

/// Asignación de servidor de voz (token + endpoint)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceServer {
    pub token: String,
    pub guild_id: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Cambio de estado de voz de un usuario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    pub guild_id: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Evento crudo del gateway (`{ t, d }`)
#[derive(Debug, Clone, Deserialize)]
pub struct VoicePacket {
    #[serde(default)]
    pub t: Option<String>,
    pub d: Value,
}

#[derive(Debug, Clone)]
pub enum VoiceSignal {
    Server(VoiceServer),
    State(VoiceState),
    Packet(VoicePacket),
}

impl VoiceSignal {
    /// Reduce la señal a server/state, descartando otros tipos de evento
    pub fn resolve(self) -> Option<VoiceSignal> {
        match self {
            VoiceSignal::Packet(packet) => {
                if let Some(t) = packet.t.as_deref() {
                    if t != VOICE_STATE_UPDATE && t != VOICE_SERVER_UPDATE {
                        return None;
                    }
                }

                let data = packet.d;
                if data.get("token").is_some() {
                    serde_json::from_value(data).ok().map(VoiceSignal::Server)
                } else if data.get("session_id").is_some() {
                    serde_json::from_value(data).ok().map(VoiceSignal::State)
                } else {
                    None
                }
            }
            other => Some(other),
        }
    }

    pub fn guild_id(&self) -> Option<&str> {
        match self {
            VoiceSignal::Server(server) => Some(&server.guild_id),
            VoiceSignal::State(state) => Some(&state.guild_id),
            VoiceSignal::Packet(packet) => packet.d.get("guild_id").and_then(Value::as_str),
        }
    }
}

impl From<VoiceServer> for VoiceSignal {
    fn from(server: VoiceServer) -> Self {
        VoiceSignal::Server(server)
    }
}

impl From<VoiceState> for VoiceSignal {
    fn from(state: VoiceState) -> Self {
        VoiceSignal::State(state)
    }
}

impl From<VoicePacket> for VoiceSignal {
    fn from(packet: VoicePacket) -> Self {
        VoiceSignal::Packet(packet)
    }
}

/// Acumulador del comando `voiceUpdate` de una sesión.
///
/// `op` y `guild_id` son fijos; `session_id` y `event` se completan a medida
/// que llegan las señales y persisten entre envíos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUpdate {
    pub op: &'static str,
    pub guild_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<VoiceServer>,
}

impl VoiceUpdate {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            op: "voiceUpdate",
            guild_id: guild_id.into(),
            session_id: None,
            event: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.event.is_some()
    }

    pub fn reset(&mut self) {
        self.session_id = None;
        self.event = None;
    }
}
