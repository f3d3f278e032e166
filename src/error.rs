use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type LinkResult<T> = Result<T, LinkError>;

#[derive(Error, Debug)]
pub enum LinkError {
    // Configuración
    #[error("No nodes were provided")]
    NoNodesConfigured,
    #[error("No nodes are available")]
    NoNodesAvailable,

    // Protocolo
    #[error("Unsupported Lavalink version {0} (v3 required)")]
    UnsupportedBackend(String),
    #[error("Malformed payload: {0}")]
    Protocol(String),
    #[error("Command does not serialize to a JSON object")]
    InvalidCommand,

    // Estado de la sesión
    #[error("Player is not connected")]
    NotConnected,
    #[error("No voice channel has been set")]
    NoVoiceChannel,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Out of range: {0}")]
    OutOfRange(String),
    #[error("No player was found for guild {0}")]
    SessionNotFound(String),
    #[error("Player for guild {0} has been destroyed")]
    SessionDestroyed(String),
    #[error("Node {0} has no open connection")]
    NodeUnavailable(String),

    // Backend
    #[error("Lavalink returned an error: {0}")]
    Backend(String),
    #[error("Failed to connect to node {identifier} after {attempts} attempts")]
    ConnectionExhausted { identifier: String, attempts: u32 },

    // Transporte
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] tungstenite::http::header::InvalidHeaderValue),
    #[error("Invalid node url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection closed")]
    Closed,
}

impl LinkError {
    pub fn out_of_range(reason: impl Into<String>) -> Self {
        LinkError::OutOfRange(reason.into())
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        LinkError::InvalidArgument(reason.into())
    }
}
