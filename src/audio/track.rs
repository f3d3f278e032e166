use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Track tal como lo devuelve la API REST del nodo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestTrack {
    pub encoded: String,
    pub info: RestTrackInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestTrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    /// Duración en milisegundos
    pub length: u64,
    pub is_stream: bool,
    pub position: u64,
    pub title: String,
    pub source_name: String,
    #[serde(default)]
    pub uri: Option<String>,
}

/// Tamaños de miniatura que expone YouTube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbnailSize {
    #[default]
    Default,
    Medium,
    High,
    Standard,
    Max,
}

impl ThumbnailSize {
    fn as_str(self) -> &'static str {
        match self {
            ThumbnailSize::Default => "default",
            ThumbnailSize::Medium => "mqdefault",
            ThumbnailSize::High => "hqdefault",
            ThumbnailSize::Standard => "sddefault",
            ThumbnailSize::Max => "maxresdefault",
        }
    }
}

/// Un elemento reproducible con sus metadatos.
///
/// Se construye a partir de un resultado de búsqueda o decodificación y no
/// cambia después, salvo `position`, que se actualiza desde fuera cuando el
/// nodo informa progreso.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Duración en milisegundos
    pub duration: u64,
    /// Payload opaco emitido por el nodo
    pub encoded: String,
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub is_seekable: bool,
    pub is_stream: bool,
    pub source_name: String,
    pub uri: Option<String>,
    pub position: u64,
    pub requester_id: Option<String>,
}

impl Track {
    pub fn new(data: RestTrack, requester_id: Option<String>) -> Self {
        let RestTrack { encoded, info } = data;

        Self {
            duration: info.length,
            encoded,
            identifier: info.identifier,
            title: info.title,
            author: info.author,
            is_seekable: info.is_seekable,
            is_stream: info.is_stream,
            source_name: info.source_name,
            uri: info.uri,
            position: info.position,
            requester_id,
        }
    }

    /// Alias de `duration`, en milisegundos
    pub fn length(&self) -> u64 {
        self.duration
    }

    pub fn duration_as_std(&self) -> Duration {
        Duration::from_millis(self.duration)
    }

    pub fn thumbnail(&self) -> String {
        self.display_thumbnail(ThumbnailSize::Medium)
    }

    pub fn display_thumbnail(&self, size: ThumbnailSize) -> String {
        format!(
            "https://img.youtube.com/vi/{}/{}.jpg",
            self.identifier,
            size.as_str()
        )
    }
}

impl From<RestTrack> for Track {
    fn from(data: RestTrack) -> Self {
        Self::new(data, None)
    }
}
