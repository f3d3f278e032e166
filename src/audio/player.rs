use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use tracing::{debug, info, warn};

use crate::audio::{filters::Filters, queue::Queue};
use crate::error::{LinkError, LinkResult};
use crate::events::{ManagerEvent, VoicePayload};
use crate::manager::Manager;
use crate::node::{
    protocol::{Command, TrackEndReason},
    Node,
};
use crate::voice::{VoiceServer, VoiceUpdate};

pub const DEFAULT_VOLUME: u16 = 100;
pub const MAX_VOLUME: u16 = 1000;

/// Opciones para crear un player
#[derive(Debug, Clone, Default)]
pub struct PlayerOptions {
    pub guild_id: String,
    pub text_channel: Option<String>,
    pub voice_channel: Option<String>,
    pub volume: Option<u16>,
    pub self_mute: bool,
    pub self_deafen: bool,
    pub filters: Option<Filters>,
}

impl PlayerOptions {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            ..Default::default()
        }
    }

    pub fn voice_channel(mut self, channel: impl Into<String>) -> Self {
        self.voice_channel = Some(channel.into());
        self
    }

    pub fn text_channel(mut self, channel: impl Into<String>) -> Self {
        self.text_channel = Some(channel.into());
        self
    }

    pub fn volume(mut self, volume: u16) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn self_mute(mut self, mute: bool) -> Self {
        self.self_mute = mute;
        self
    }

    pub fn self_deafen(mut self, deafen: bool) -> Self {
        self.self_deafen = deafen;
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Connected,
    Connecting,
    Disconnected,
    Disconnecting,
    Destroying,
}

#[derive(Debug)]
struct PlayerInner {
    state: PlayerState,
    voice_channel: Option<String>,
    text_channel: Option<String>,
    self_mute: bool,
    self_deaf: bool,
    volume: u16,
    looping: bool,
    playing: bool,
    paused: bool,
    position: u64,
    filters: Option<Filters>,
    voice_state: VoiceUpdate,
}

/// Estado de reproducción de una guild.
///
/// Los comandos se envían por el nodo al que quedó asignado al crearse; no hay
/// failover si ese nodo se cae. Ningún lock se mantiene a través de un `.await`.
pub struct Player {
    guild_id: String,
    node: Arc<Node>,
    manager: Weak<Manager>,
    queue: Mutex<Queue>,
    inner: RwLock<PlayerInner>,
    destroyed: AtomicBool,
}

impl Player {
    pub(crate) fn new(options: PlayerOptions, node: Arc<Node>, manager: Weak<Manager>) -> Arc<Self> {
        let inner = PlayerInner {
            state: PlayerState::Disconnected,
            voice_channel: options.voice_channel,
            text_channel: options.text_channel,
            self_mute: options.self_mute,
            self_deaf: options.self_deafen,
            volume: options.volume.unwrap_or(DEFAULT_VOLUME).min(MAX_VOLUME),
            looping: false,
            playing: false,
            paused: false,
            position: 0,
            filters: options.filters,
            voice_state: VoiceUpdate::new(options.guild_id.clone()),
        };

        Arc::new(Self {
            guild_id: options.guild_id,
            node,
            manager,
            queue: Mutex::new(Queue::new()),
            inner: RwLock::new(inner),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Acceso a la cola. No mantener el guard a través de un `.await`.
    pub fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock()
    }

    pub fn state(&self) -> PlayerState {
        self.inner.read().state
    }

    pub fn voice_channel(&self) -> Option<String> {
        self.inner.read().voice_channel.clone()
    }

    pub fn text_channel(&self) -> Option<String> {
        self.inner.read().text_channel.clone()
    }

    pub fn self_mute(&self) -> bool {
        self.inner.read().self_mute
    }

    pub fn self_deaf(&self) -> bool {
        self.inner.read().self_deaf
    }

    pub fn volume(&self) -> u16 {
        self.inner.read().volume
    }

    pub fn is_looping(&self) -> bool {
        self.inner.read().looping
    }

    pub fn is_playing(&self) -> bool {
        self.inner.read().playing
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().paused
    }

    /// Última posición conocida en milisegundos
    pub fn position(&self) -> u64 {
        self.inner.read().position
    }

    pub fn filters(&self) -> Option<Filters> {
        self.inner.read().filters.clone()
    }

    pub fn voice_state(&self) -> VoiceUpdate {
        self.inner.read().voice_state.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn manager(&self) -> LinkResult<Arc<Manager>> {
        self.manager.upgrade().ok_or(LinkError::Closed)
    }

    fn ensure_live(&self) -> LinkResult<()> {
        if self.is_destroyed() {
            return Err(LinkError::SessionDestroyed(self.guild_id.clone()));
        }
        Ok(())
    }

    fn set_state(&self, state: PlayerState) {
        self.inner.write().state = state;
    }

    fn emit(&self, event: ManagerEvent) {
        if let Some(manager) = self.manager.upgrade() {
            manager.emit(event);
        }
    }

    /// Pide al gateway unirse al canal de voz configurado
    pub fn connect(&self) -> LinkResult<()> {
        self.ensure_live()?;

        let (channel, mute, deaf) = {
            let inner = self.inner.read();
            let channel = inner.voice_channel.clone().ok_or(LinkError::NoVoiceChannel)?;
            (channel, inner.self_mute, inner.self_deaf)
        };
        let manager = self.manager()?;

        self.set_state(PlayerState::Connecting);
        manager
            .gateway()
            .send(&self.guild_id, VoicePayload::join(&self.guild_id, &channel, mute, deaf));
        self.set_state(PlayerState::Connected);

        info!("🔊 Conectado al canal {} en {}", channel, self.guild_id);
        Ok(())
    }

    /// Pausa y sale del canal de voz. El estado local se limpia aunque la pausa falle.
    pub async fn disconnect(&self) -> LinkResult<()> {
        if self.voice_channel().is_none() {
            return Ok(());
        }

        self.set_state(PlayerState::Disconnecting);
        let paused = self.send_pause(true).await;

        if let Some(manager) = self.manager.upgrade() {
            manager.gateway().send(&self.guild_id, VoicePayload::leave(&self.guild_id));
        }

        {
            let mut inner = self.inner.write();
            inner.voice_channel = None;
            inner.state = PlayerState::Disconnected;
        }

        info!("👋 Desconectado del canal de voz en {}", self.guild_id);
        paused
    }

    /// Pausa o reanuda. No envía nada si ya está en ese estado.
    pub async fn pause(&self, pause: bool) -> LinkResult<()> {
        self.ensure_live()?;
        self.send_pause(pause).await
    }

    async fn send_pause(&self, pause: bool) -> LinkResult<()> {
        if self.is_paused() == pause {
            return Ok(());
        }

        self.node
            .send(&Command::Pause {
                guild_id: self.guild_id.clone(),
                pause,
            })
            .await?;

        let mut inner = self.inner.write();
        inner.paused = pause;
        inner.playing = !pause;
        Ok(())
    }

    /// Reproduce el track actual o, si no hay, el siguiente de la cola
    pub async fn play(&self) -> LinkResult<()> {
        self.ensure_live()?;
        if self.state() != PlayerState::Connected {
            return Err(LinkError::NotConnected);
        }

        let (current, head) = {
            let queue = self.queue.lock();
            (queue.current().cloned(), queue.front().cloned())
        };
        let (track, from_queue) = match (current, head) {
            (Some(current), _) => (current, false),
            (None, _) if self.is_paused() => return self.pause(false).await,
            (None, Some(head)) => (head, true),
            (None, None) => return Ok(()),
        };

        self.node
            .send(&Command::Play {
                guild_id: self.guild_id.clone(),
                track: track.encoded.clone(),
            })
            .await?;

        if from_queue {
            self.queue.lock().advance();
        }

        let mut inner = self.inner.write();
        inner.playing = true;
        inner.paused = false;
        drop(inner);

        info!("▶️ Reproduciendo en {}: {}", self.guild_id, track.title);
        Ok(())
    }

    /// Ajusta el volumen, limitado a `0..=1000`
    pub async fn set_volume(&self, volume: f64) -> LinkResult<()> {
        self.ensure_live()?;
        if !volume.is_finite() {
            return Err(LinkError::invalid_argument(format!("volume {} is not a number", volume)));
        }
        let volume = volume.clamp(0.0, f64::from(MAX_VOLUME)).round() as u16;

        self.node
            .send(&Command::Volume {
                guild_id: self.guild_id.clone(),
                volume,
            })
            .await?;

        self.inner.write().volume = volume;
        debug!("🔊 Volumen de {}: {}", self.guild_id, volume);
        Ok(())
    }

    pub fn set_loop(&self, looping: bool) -> LinkResult<()> {
        self.ensure_live()?;
        self.inner.write().looping = looping;
        Ok(())
    }

    /// Detiene el track actual. Con `skip > 1` descarta además `skip - 1` tracks de la cola.
    pub async fn stop(&self, skip: Option<usize>) -> LinkResult<()> {
        self.ensure_live()?;
        if let Some(amount) = skip.filter(|amount| *amount > 1) {
            let mut queue = self.queue.lock();
            if amount > queue.len() {
                return Err(LinkError::out_of_range(format!(
                    "cannot skip {} tracks, queue has {}",
                    amount,
                    queue.len()
                )));
            }
            queue.skip(amount - 1);
        }

        self.node
            .send(&Command::Stop {
                guild_id: self.guild_id.clone(),
            })
            .await
    }

    /// Salta a `position` (ms). La posición local se actualiza sin esperar al nodo.
    pub async fn seek(&self, position: u64) -> LinkResult<()> {
        self.ensure_live()?;
        self.node
            .send(&Command::Seek {
                guild_id: self.guild_id.clone(),
                position,
            })
            .await?;

        self.inner.write().position = position;
        Ok(())
    }

    pub async fn set_filters(&self, filters: Filters) -> LinkResult<()> {
        self.ensure_live()?;
        self.node
            .send(&Command::Filters {
                guild_id: self.guild_id.clone(),
                filters: filters.clone(),
            })
            .await?;

        self.inner.write().filters = Some(filters);
        Ok(())
    }

    pub async fn clear_filters(&self) -> LinkResult<()> {
        self.ensure_live()?;
        self.node
            .send(&Command::Filters {
                guild_id: self.guild_id.clone(),
                filters: Filters::default(),
            })
            .await?;

        self.inner.write().filters = None;
        Ok(())
    }

    /// Cambia de canal de voz y se conecta a él
    pub fn set_voice_channel(&self, channel: impl Into<String>) -> LinkResult<()> {
        self.ensure_live()?;
        self.inner.write().voice_channel = Some(channel.into());
        self.connect()
    }

    pub fn set_text_channel(&self, channel: impl Into<String>) -> LinkResult<()> {
        self.ensure_live()?;
        self.inner.write().text_channel = Some(channel.into());
        Ok(())
    }

    /// Destruye el player: sale del canal si se pide, envía `destroy` al nodo y
    /// lo quita del registro. La limpieza local ocurre aunque el nodo falle.
    pub async fn destroy(self: &Arc<Self>, disconnect: bool) -> LinkResult<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.set_state(PlayerState::Destroying);

        if disconnect {
            if let Err(e) = self.disconnect().await {
                warn!("⚠️ Error al desconectar {}: {}", self.guild_id, e);
            }
            self.set_state(PlayerState::Destroying);
        }

        let result = self
            .node
            .send(&Command::Destroy {
                guild_id: self.guild_id.clone(),
            })
            .await;
        if let Err(e) = &result {
            warn!("⚠️ No se pudo enviar destroy para {}: {}", self.guild_id, e);
        }

        if let Some(manager) = self.manager.upgrade() {
            manager.remove_player(self);
            manager.emit(ManagerEvent::PlayerDestroyed(self.node.clone(), self.clone()));
        }

        info!("🗑️ Player de {} destruido", self.guild_id);
        result
    }

    /// Reacción a `TrackEndEvent`: repetir, avanzar o cerrar la sesión.
    ///
    /// Con `REPLACED` no se toca la cola: el track nuevo ya lo eligió quien llamó a `play`.
    pub(crate) async fn handle_track_end(self: &Arc<Self>, reason: TrackEndReason) -> LinkResult<()> {
        let ended = self.queue.lock().current().cloned();
        self.emit(ManagerEvent::TrackEnd(self.clone(), ended, reason));

        if reason == TrackEndReason::Replaced {
            return Ok(());
        }

        if self.is_looping() {
            debug!("🔁 Repitiendo track en {}", self.guild_id);
            return self.seek(0).await;
        }

        let has_next = {
            let mut queue = self.queue.lock();
            if queue.is_empty() {
                false
            } else {
                queue.clear_current();
                true
            }
        };
        if has_next {
            return self.play().await;
        }

        {
            let mut inner = self.inner.write();
            inner.playing = false;
            inner.paused = false;
        }
        {
            let mut queue = self.queue.lock();
            queue.clear_current();
            queue.clear();
        }

        info!("🏁 Cola terminada en {}", self.guild_id);
        self.emit(ManagerEvent::QueueEnd(self.clone()));
        self.destroy(true).await
    }

    pub(crate) fn mark_started(&self) {
        let mut inner = self.inner.write();
        inner.playing = true;
        inner.paused = false;
    }

    pub(crate) fn set_position(&self, position: u64) {
        self.inner.write().position = position;
    }

    pub(crate) fn set_voice_server(&self, server: VoiceServer) {
        self.inner.write().voice_state.event = Some(server);
    }

    pub(crate) fn set_voice_session(&self, session_id: String, channel_id: String) {
        let mut inner = self.inner.write();
        inner.voice_state.session_id = Some(session_id);
        inner.voice_channel = Some(channel_id);
    }

    pub(crate) fn reset_voice(&self) {
        let mut inner = self.inner.write();
        inner.voice_channel = None;
        inner.voice_state.reset();
    }

    /// `voiceUpdate` listo para enviar, si ya tiene sesión y servidor
    pub(crate) fn pending_voice_update(&self) -> Option<VoiceUpdate> {
        let inner = self.inner.read();
        inner.voice_state.is_complete().then(|| inner.voice_state.clone())
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("node", &self.node.identifier())
            .field("state", &self.state())
            .field("queue", &self.queue.lock().len())
            .finish()
    }
}
