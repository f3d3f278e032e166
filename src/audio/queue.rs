use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::audio::track::Track;
use crate::error::{LinkError, LinkResult};

/// Cola de reproducción de una sesión.
///
/// `current` nunca forma parte de la secuencia: un track pasa a ser `current`
/// en el momento en que sale de la cola.
#[derive(Debug, Default, Clone)]
pub struct Queue {
    items: VecDeque<Track>,
    current: Option<Track>,
    previous: Option<Track>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track. Si no hay track actual, pasa a serlo directamente.
    pub fn add(&mut self, track: Track) -> &mut Self {
        if self.current.is_none() {
            debug!("🎯 Track actual: {}", track.title);
            self.current = Some(track);
        } else {
            info!("➕ Agregado a la cola: {}", track.title);
            self.items.push_back(track);
        }

        self
    }

    /// Agrega múltiples tracks (playlist). El primero ocupa `current` si está libre.
    pub fn add_all(&mut self, tracks: impl IntoIterator<Item = Track>) -> &mut Self {
        let mut tracks = tracks.into_iter();

        if self.current.is_none() {
            if let Some(first) = tracks.next() {
                self.current = Some(first);
            }
        }

        let before = self.items.len();
        self.items.extend(tracks);
        info!("➕ Agregadas {} canciones a la cola", self.items.len() - before);

        self
    }

    /// Agrega al final sin tocar `current`
    pub fn enqueue(&mut self, track: Track) -> &mut Self {
        self.items.push_back(track);
        self
    }

    /// Elimina el track en `position`
    pub fn remove(&mut self, position: usize) -> LinkResult<Track> {
        if position >= self.items.len() {
            return Err(LinkError::out_of_range(format!(
                "position {} must be between 0 and {}",
                position,
                self.items.len()
            )));
        }

        let track = self
            .items
            .remove(position)
            .ok_or_else(|| LinkError::out_of_range(format!("position {}", position)))?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(track)
    }

    /// Elimina el rango `[start, end)`
    pub fn remove_range(&mut self, start: usize, end: usize) -> LinkResult<Vec<Track>> {
        let len = self.items.len();

        if start >= len {
            return Err(LinkError::out_of_range(format!(
                "start {} must be between 0 and {}",
                start, len
            )));
        }

        if end > len || end < start {
            return Err(LinkError::out_of_range(format!(
                "end {} must be between {} and {}",
                end, start, len
            )));
        }

        let removed: Vec<Track> = self.items.drain(start..end).collect();
        debug!("❌ Eliminados {} tracks ({}..{})", removed.len(), start, end);
        Ok(removed)
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada");
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Duración total en milisegundos, incluyendo el track actual
    pub fn duration(&self) -> u64 {
        let current = self.current.as_ref().map_or(0, |t| t.duration);
        self.items.iter().fold(current, |acc, t| acc + t.duration)
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Track> {
        self.previous.as_ref()
    }

    pub fn front(&self) -> Option<&Track> {
        self.items.front()
    }

    pub fn get(&self, position: usize) -> Option<&Track> {
        self.items.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Saca la cabeza de la cola y la convierte en el track actual
    pub(crate) fn advance(&mut self) -> Option<Track> {
        let next = self.items.pop_front()?;
        if let Some(old) = self.current.replace(next.clone()) {
            self.previous = Some(old);
        }
        Some(next)
    }

    /// Libera el track actual, que pasa a `previous`
    pub(crate) fn clear_current(&mut self) {
        if let Some(old) = self.current.take() {
            self.previous = Some(old);
        }
    }

    /// Descarta `count` tracks del frente de la cola
    pub(crate) fn skip(&mut self, count: usize) -> usize {
        let skipped = count.min(self.items.len());
        self.items.drain(..skipped);
        skipped
    }
}
