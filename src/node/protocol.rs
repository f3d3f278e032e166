use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::audio::filters::Filters;
use crate::error::{LinkError, LinkResult};

/// Frame entrante del WebSocket de un nodo, discriminado por `op`
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Ready(ReadyPayload),
    Stats(NodeStats),
    PlayerUpdate(PlayerUpdatePayload),
    Event(EventPayload),
}

impl IncomingMessage {
    /// Decodifica un frame de texto.
    ///
    /// Un `op` desconocido o un evento con `type` desconocido devuelve
    /// `LinkError::Protocol`; quien llama lo registra y sigue leyendo.
    pub fn decode(text: &str) -> LinkResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        let op = value
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| LinkError::Protocol("frame without op".to_string()))?
            .to_owned();

        let message = match op.as_str() {
            "ready" => IncomingMessage::Ready(serde_json::from_value(value)?),
            "stats" => IncomingMessage::Stats(serde_json::from_value(value)?),
            "playerUpdate" => IncomingMessage::PlayerUpdate(serde_json::from_value(value)?),
            "event" => IncomingMessage::Event(EventPayload::decode(value)?),
            other => return Err(LinkError::Protocol(format!("unknown op '{}'", other))),
        };

        Ok(message)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    #[serde(default)]
    pub resumed: bool,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdatePayload {
    pub guild_id: String,
    pub state: PlayerUpdateState,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerUpdateState {
    #[serde(default)]
    pub time: u64,
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub ping: Option<i64>,
}

/// Métricas agregadas de un nodo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub players: u32,
    pub playing_players: u32,
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    #[serde(default)]
    pub sent: i64,
    #[serde(default)]
    pub nulled: i64,
    #[serde(default)]
    pub deficit: i64,
}

/// Eventos de reproducción (`op: "event"`), discriminados por `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "TrackStartEvent")]
    TrackStart(TrackStartEvent),
    #[serde(rename = "TrackEndEvent")]
    TrackEnd(TrackEndEvent),
    #[serde(rename = "TrackExceptionEvent")]
    TrackException(TrackExceptionEvent),
    #[serde(rename = "TrackStuckEvent")]
    TrackStuck(TrackStuckEvent),
    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed(WebSocketClosedEvent),
}

impl EventPayload {
    fn decode(value: Value) -> LinkResult<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        serde_json::from_value(value)
            .map_err(|e| LinkError::Protocol(format!("event '{}': {}", kind, e)))
    }

    pub fn guild_id(&self) -> &str {
        match self {
            EventPayload::TrackStart(e) => &e.guild_id,
            EventPayload::TrackEnd(e) => &e.guild_id,
            EventPayload::TrackException(e) => &e.guild_id,
            EventPayload::TrackStuck(e) => &e.guild_id,
            EventPayload::WebSocketClosed(e) => &e.guild_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStartEvent {
    pub guild_id: String,
    #[serde(default)]
    pub encoded_track: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEndEvent {
    pub guild_id: String,
    #[serde(default)]
    pub encoded_track: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    pub reason: TrackEndReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TrackEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TrackEndReason::Finished => "FINISHED",
            TrackEndReason::LoadFailed => "LOAD_FAILED",
            TrackEndReason::Stopped => "STOPPED",
            TrackEndReason::Replaced => "REPLACED",
            TrackEndReason::Cleanup => "CLEANUP",
            TrackEndReason::Unknown => "UNKNOWN",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackExceptionEvent {
    pub guild_id: String,
    #[serde(default)]
    pub track: Option<String>,
    pub exception: TrackExceptionCause,
}

/// La causa puede llegar como texto plano o como objeto según la versión del nodo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackExceptionCause {
    Text(String),
    Detailed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        severity: Option<String>,
        #[serde(default)]
        cause: Option<String>,
    },
}

impl fmt::Display for TrackExceptionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackExceptionCause::Text(text) => f.write_str(text),
            TrackExceptionCause::Detailed {
                message,
                severity,
                cause,
            } => {
                let message = message.as_deref().or(cause.as_deref()).unwrap_or("unknown cause");
                match severity {
                    Some(severity) => write!(f, "{} ({})", message, severity),
                    None => f.write_str(message),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuckEvent {
    pub guild_id: String,
    #[serde(default)]
    pub encoded_track: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    pub threshold_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosedEvent {
    pub guild_id: String,
    pub code: u16,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub by_remote: bool,
}

/// Comandos salientes hacia el nodo
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Play {
        guild_id: String,
        track: String,
    },
    Pause {
        guild_id: String,
        pause: bool,
    },
    Stop {
        guild_id: String,
    },
    Seek {
        guild_id: String,
        position: u64,
    },
    Volume {
        guild_id: String,
        volume: u16,
    },
    Filters {
        guild_id: String,
        #[serde(flatten)]
        filters: Filters,
    },
    Destroy {
        guild_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::filters::FilterPreset;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_ready_and_stats() {
        let ready = IncomingMessage::decode(r#"{"op":"ready","resumed":false,"sessionId":"abc"}"#).unwrap();
        assert!(matches!(ready, IncomingMessage::Ready(ReadyPayload { ref session_id, .. }) if session_id == "abc"));

        let stats = IncomingMessage::decode(
            r#"{"op":"stats","players":3,"playingPlayers":1,"uptime":1000,
                "memory":{"free":1,"used":2,"allocated":3,"reservable":4},
                "cpu":{"cores":4,"systemLoad":0.5,"lavalinkLoad":0.1},
                "frameStats":{"sent":6000,"nulled":10,"deficit":-3000}}"#,
        )
        .unwrap();
        match stats {
            IncomingMessage::Stats(stats) => {
                assert_eq!(stats.players, 3);
                assert_eq!(stats.cpu.cores, 4);
                assert_eq!(stats.frame_stats.unwrap().deficit, -3000);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_events() {
        let end = IncomingMessage::decode(
            r#"{"op":"event","type":"TrackEndEvent","guildId":"G1","track":"xyz","reason":"FINISHED"}"#,
        )
        .unwrap();
        match end {
            IncomingMessage::Event(EventPayload::TrackEnd(event)) => {
                assert_eq!(event.guild_id, "G1");
                assert_eq!(event.reason, TrackEndReason::Finished);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let exception = IncomingMessage::decode(
            r#"{"op":"event","type":"TrackExceptionEvent","guildId":"G1",
                "exception":{"message":"boom","severity":"COMMON","cause":"io"}}"#,
        )
        .unwrap();
        match exception {
            IncomingMessage::Event(EventPayload::TrackException(event)) => {
                assert_eq!(event.exception.to_string(), "boom (COMMON)");
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let stuck = IncomingMessage::decode(
            r#"{"op":"event","type":"TrackStuckEvent","guildId":"G1","thresholdMs":10000}"#,
        )
        .unwrap();
        assert!(matches!(
            stuck,
            IncomingMessage::Event(EventPayload::TrackStuck(TrackStuckEvent { threshold_ms: 10000, .. }))
        ));
    }

    #[test]
    fn test_unknown_frames_are_protocol_errors() {
        assert!(matches!(
            IncomingMessage::decode(r#"{"op":"mystery"}"#),
            Err(LinkError::Protocol(_))
        ));
        assert!(matches!(
            IncomingMessage::decode(r#"{"op":"event","type":"SomethingNew","guildId":"G1"}"#),
            Err(LinkError::Protocol(_))
        ));
        assert!(IncomingMessage::decode("not json").is_err());
        assert!(IncomingMessage::decode(r#"{"noop":true}"#).is_err());
    }

    #[test]
    fn test_unknown_end_reason_is_tolerated() {
        let end = IncomingMessage::decode(
            r#"{"op":"event","type":"TrackEndEvent","guildId":"G1","reason":"SOMETHING"}"#,
        )
        .unwrap();
        assert!(matches!(
            end,
            IncomingMessage::Event(EventPayload::TrackEnd(TrackEndEvent { reason: TrackEndReason::Unknown, .. }))
        ));
    }

    #[test]
    fn test_command_wire_format() {
        let play = Command::Play {
            guild_id: "G1".to_string(),
            track: "enc".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&play).unwrap(),
            json!({ "op": "play", "guildId": "G1", "track": "enc" })
        );

        let clear = Command::Filters {
            guild_id: "G1".to_string(),
            filters: Filters::default(),
        };
        assert_eq!(
            serde_json::to_value(&clear).unwrap(),
            json!({ "op": "filters", "guildId": "G1" })
        );

        let tremolo = Command::Filters {
            guild_id: "G1".to_string(),
            filters: FilterPreset::Tremolo.filters(),
        };
        assert_eq!(
            serde_json::to_value(&tremolo).unwrap(),
            json!({ "op": "filters", "guildId": "G1", "tremolo": { "frequency": 4.0, "depth": 0.75 } })
        );
    }
}
