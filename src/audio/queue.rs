use std::{collections::VecDeque, time::Duration};
use thiserror::Error;
use tracing::{debug, info};

use super::track::TrackDescriptor;

/// The track currently handed to the transport, tagged with the playback
/// generation it was started under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub track: TrackDescriptor,
    pub generation: u64,
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is full (max {0} tracks)")]
pub struct QueueFull(pub usize);

/// Per-guild ordered list of pending tracks plus the "now playing" slot.
///
/// Pure data, no I/O. Only the owning scheduler mutates it, always from its
/// own control loop.
#[derive(Debug)]
pub struct GuildQueue {
    pending: VecDeque<TrackDescriptor>,
    current: Option<NowPlaying>,
    generation: u64,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            generation: 0,
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn append(&mut self, track: TrackDescriptor) -> Result<(), QueueFull> {
        if self.pending.len() >= self.max_size {
            return Err(QueueFull(self.max_size));
        }

        debug!("➕ Agregado a la cola: {}", track.title());
        self.pending.push_back(track);
        Ok(())
    }

    /// Agrega varios tracks en orden. Devuelve cuántos cupieron; el resto se
    /// descarta.
    pub fn append_all(&mut self, tracks: Vec<TrackDescriptor>) -> usize {
        let offered = tracks.len();
        let mut added = 0;

        for track in tracks {
            if let Err(full) = self.append(track) {
                debug!("🚫 {}: {} tracks descartados", full, offered - added);
                break;
            }
            added += 1;
        }

        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    pub fn pop_front(&mut self) -> Option<TrackDescriptor> {
        self.pending.pop_front()
    }

    /// Vacía los tracks pendientes (no toca `current`)
    pub fn clear(&mut self) {
        self.pending.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Bumps the playback generation, making any completion issued for an
    /// older generation stale. Returns the new generation.
    pub fn invalidate(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Moves the front pending track into the "now playing" slot under a
    /// fresh generation. Leaves the slot empty if nothing is pending.
    pub fn advance(&mut self) -> Option<&NowPlaying> {
        self.current = None;
        let track = self.pop_front()?;
        let generation = self.invalidate();
        self.current = Some(NowPlaying {
            track,
            generation,
            paused: false,
        });
        self.current.as_ref()
    }

    pub fn take_current(&mut self) -> Option<NowPlaying> {
        self.current.take()
    }

    /// Marks the current track paused or playing. No-op when nothing plays.
    pub fn set_paused(&mut self, paused: bool) {
        if let Some(now) = self.current.as_mut() {
            now.paused = paused;
        }
    }

    pub fn current(&self) -> Option<&NowPlaying> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when `generation` belongs to the track still in the slot.
    pub fn is_live(&self, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|now| now.generation == generation)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True when nothing is playing and nothing is waiting.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.current.is_none()
    }

    /// Copy of the current track and the first `limit` pending tracks.
    pub fn snapshot(&self, limit: usize) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            pending: self.pending.iter().take(limit).cloned().collect(),
            total_pending: self.pending.len(),
            total_duration: self.total_duration(),
        }
    }

    fn total_duration(&self) -> Duration {
        let queue_duration: Duration = self.pending.iter().filter_map(|t| t.duration()).sum();

        let current_duration = self
            .current
            .as_ref()
            .and_then(|now| now.track.duration())
            .unwrap_or_default();

        queue_duration + current_duration
    }
}

/// Read-only view of a guild queue for status display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current: Option<NowPlaying>,
    /// First N pending tracks, in play order.
    pub pending: Vec<TrackDescriptor>,
    pub total_pending: usize,
    /// Sum of the known durations of current + all pending tracks.
    pub total_duration: Duration,
}

impl QueueSnapshot {
    /// Obtiene una página específica de los tracks pendientes (1-based)
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        let per_page = per_page.max(1);
        let safe_page = page.max(1);
        let start = (safe_page - 1) * per_page;
        let end = (start + per_page).min(self.pending.len());
        let total_pages = if self.pending.is_empty() {
            1
        } else {
            self.pending.len().div_ceil(per_page)
        };

        QueuePage {
            items: if start < self.pending.len() {
                self.pending[start..end].to_vec()
            } else {
                Vec::new()
            },
            first_position: start + 1,
            current_page: safe_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    pub items: Vec<TrackDescriptor>,
    /// 1-based queue position of `items[0]`.
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}
