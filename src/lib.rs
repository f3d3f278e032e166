//! # lavabridge
//!
//! Cliente para uno o varios nodos [Lavalink](https://github.com/lavalink-devs/Lavalink) (v3).
//!
//! Mantiene una copia local del estado de reproducción de cada guild y hace de
//! puente entre las señales de voz del gateway de Discord y el protocolo de
//! comandos del nodo.
//!
//! ## Componentes
//!
//! - [`Manager`] - registro de nodos y players, selección de nodo, búsqueda y
//!   reconciliación de estado de voz
//! - [`Node`] - un nodo Lavalink: handshake, reintentos, estadísticas, REST
//! - [`Player`] - máquina de estados de una guild y su [`Queue`]
//! - [`ManagerEvent`] - notificaciones hacia la aplicación (`Manager::subscribe`)
//!
//! ## Ejemplo
//!
//! ```rust,no_run
//! use lavabridge::{Manager, ManagerOptions, NodeOptions, PlayerOptions, VoicePayload};
//!
//! # async fn run() -> lavabridge::LinkResult<()> {
//! let manager = Manager::new(
//!     ManagerOptions {
//!         nodes: vec![NodeOptions::new("localhost")],
//!         client_id: None,
//!     },
//!     |guild_id: &str, payload: VoicePayload| {
//!         // reenviar `payload` por el shard de `guild_id`
//!         let _ = (guild_id, payload);
//!     },
//! );
//! manager.init(Some("123456789")).await?;
//!
//! let player = manager.create_player(PlayerOptions::new("G1").voice_channel("VC1"), None)?;
//! player.connect()?;
//!
//! let found = manager.search("never gonna give you up", None).await?;
//! if let Some(track) = found.tracks.into_iter().next() {
//!     player.queue().add(track);
//!     player.play().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod node;
pub mod voice;

#[cfg(test)]
mod test_support;

pub use audio::{
    filters::{FilterPreset, Filters},
    player::{Player, PlayerOptions, PlayerState},
    queue::Queue,
    track::Track,
};
pub use config::{ManagerOptions, NodeOptions};
pub use error::{LinkError, LinkResult};
pub use events::{ManagerEvent, VoiceGateway, VoicePayload};
pub use manager::{LoadedTracks, Manager, SearchQuery, SearchSource};
pub use node::{Node, NodeStats};
pub use voice::{VoicePacket, VoiceServer, VoiceSignal, VoiceState};

/// Valor del header `Client-Name` y del user agent REST
pub const CLIENT_NAME: &str = concat!("lavabridge/", env!("CARGO_PKG_VERSION"));
