use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serenity::model::id::UserId;
use std::{pin::pin, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    query::{cache_key, entry_url, QueryKind},
    Resolution, Resolver,
};
use crate::{
    audio::{error::ResolutionError, track::TrackDescriptor},
    cache::ResolutionCache,
};

/// Playlist entries resolved at the same time by default.
pub const DEFAULT_ENTRY_CONCURRENCY: usize = 3;

/// Default limit for a single extractor lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);

/// A playlist returns what it has this long before the caller's deadline.
const DEADLINE_MARGIN: Duration = Duration::from_millis(500);

/// Metadata for one playable item as reported by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
    pub webpage_url: String,
    pub stream_url: String,
}

impl TrackMetadata {
    pub fn into_descriptor(self, requested_by: UserId) -> TrackDescriptor {
        let mut track =
            TrackDescriptor::new(self.title, self.webpage_url, self.stream_url, requested_by);

        if let Some(artist) = self.artist {
            track = track.with_artist(artist);
        }

        if let Some(duration) = self.duration {
            track = track.with_duration(duration);
        }

        track
    }
}

/// One row of a flat playlist listing. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub id: Option<String>,
    pub url: Option<String>,
}

impl PlaylistEntry {
    /// Watch URL for this entry, preferring the id.
    pub fn watch_url(&self) -> Option<String> {
        [self.id.as_deref(), self.url.as_deref()]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
            .and_then(entry_url)
    }
}

/// Failure reported by a [`MetadataBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The item exists but cannot be played (private, removed, region locked).
    #[error("content unavailable: {0}")]
    Unavailable(String),
    /// The extractor itself could not run or could not reach the provider.
    #[error("extractor unreachable: {0}")]
    Unreachable(String),
    /// The extractor answered with something we could not understand.
    #[error("unexpected extractor output: {0}")]
    Malformed(String),
}

impl From<BackendError> for ResolutionError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Unavailable(_) => ResolutionError::NoResults,
            BackendError::Unreachable(reason) | BackendError::Malformed(reason) => {
                ResolutionError::Unreachable(reason)
            }
        }
    }
}

/// Raw access to a metadata extractor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    /// Looks up a single item. `target` is a link or a `ytsearch1:` query;
    /// `Ok(None)` means the lookup worked but matched nothing.
    async fn lookup(&self, target: &str) -> Result<Option<TrackMetadata>, BackendError>;

    /// Lists up to `limit` playlist entries without resolving them.
    async fn list_playlist(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistEntry>, BackendError>;
}

/// [`Resolver`] built on a [`MetadataBackend`].
///
/// Searches take the top result. Direct links go through the resolution
/// cache. Playlists are listed once, capped, and every entry is resolved on
/// its own; entries that fail are skipped and counted while the order of the
/// survivors is preserved.
///
/// Every backend lookup is bounded by `lookup_timeout`. A playlist entry that
/// hits it counts as failed. When the caller's deadline gets close, a
/// playlist stops early and returns the entries resolved so far; the rest
/// count as failed.
pub struct ExtractorResolver<B> {
    backend: B,
    cache: ResolutionCache,
    max_playlist_size: usize,
    entry_concurrency: usize,
    lookup_timeout: Duration,
}

impl<B: MetadataBackend> ExtractorResolver<B> {
    pub fn new(backend: B, cache: ResolutionCache, max_playlist_size: usize) -> Self {
        Self {
            backend,
            cache,
            max_playlist_size: max_playlist_size.max(1),
            entry_concurrency: DEFAULT_ENTRY_CONCURRENCY,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_entry_concurrency(mut self, entry_concurrency: usize) -> Self {
        self.entry_concurrency = entry_concurrency.max(1);
        self
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    async fn search(
        &self,
        kind: &QueryKind,
        requested_by: UserId,
    ) -> Result<TrackDescriptor, ResolutionError> {
        debug!("🔍 Buscando: {}", kind.target());
        self.lookup(&kind.target())
            .await?
            .map(|metadata| metadata.into_descriptor(requested_by))
            .ok_or(ResolutionError::NoResults)
    }

    async fn lookup(&self, target: &str) -> Result<Option<TrackMetadata>, ResolutionError> {
        match tokio::time::timeout(self.lookup_timeout, self.backend.lookup(target)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    "⏱️ yt-dlp no respondió en {}: {}",
                    humantime::format_duration(self.lookup_timeout),
                    target
                );
                Err(ResolutionError::Timeout(self.lookup_timeout))
            }
        }
    }

    async fn resolve_link(
        &self,
        link: &str,
        requested_by: UserId,
    ) -> Result<TrackDescriptor, ResolutionError> {
        let key = cache_key(link);
        if let Some(cached) = self.cache.get(&key) {
            debug!("📦 Cache hit para {}", link);
            return Ok(cached.for_requester(requested_by));
        }

        let track = self
            .lookup(link)
            .await?
            .map(|metadata| metadata.into_descriptor(requested_by))
            .ok_or(ResolutionError::NoResults)?;

        self.cache.insert(key, track.clone());
        Ok(track)
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        requested_by: UserId,
        deadline: Instant,
    ) -> Result<Resolution, ResolutionError> {
        info!("📋 Obteniendo playlist: {}", url);
        let started = Instant::now();

        let entries = self.backend.list_playlist(url, self.max_playlist_size).await?;
        if entries.len() > self.max_playlist_size {
            debug!(
                "✂️ Playlist recortada de {} a {} entradas",
                entries.len(),
                self.max_playlist_size
            );
        }

        let total = entries.len().min(self.max_playlist_size);
        let mut pending = pin!(stream::iter(
            entries.into_iter().take(self.max_playlist_size).enumerate(),
        )
        .map(|(index, entry)| async move {
            let Some(watch_url) = entry.watch_url() else {
                debug!("⚠️ Entrada {} de la playlist sin id válido", index + 1);
                return None;
            };

            match self.resolve_link(&watch_url, requested_by).await {
                Ok(track) => Some(track),
                Err(e) => {
                    warn!("⚠️ Entrada {} de la playlist falló: {}", index + 1, e);
                    None
                }
            }
        })
        .buffered(self.entry_concurrency));

        let cutoff = deadline.checked_sub(DEADLINE_MARGIN).unwrap_or(deadline);
        let mut tracks = Vec::with_capacity(total);
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(cutoff, pending.next()).await {
                Ok(Some(Some(track))) => tracks.push(track),
                Ok(Some(None)) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "⏱️ Sin tiempo para la playlist, se quedan {} de {} entradas",
                        tracks.len(),
                        total
                    );
                    timed_out = true;
                    break;
                }
            }
        }

        let failed = total - tracks.len();

        if tracks.is_empty() {
            warn!("❌ Ninguna entrada de la playlist se pudo resolver: {}", url);
            return Err(if timed_out {
                ResolutionError::Timeout(started.elapsed())
            } else {
                ResolutionError::NoResults
            });
        }

        info!(
            "✅ Playlist resuelta: {} tracks, {} fallidos",
            tracks.len(),
            failed
        );
        Ok(Resolution { tracks, failed })
    }
}

#[async_trait]
impl<B: MetadataBackend> Resolver for ExtractorResolver<B> {
    async fn resolve(
        &self,
        query: &str,
        requested_by: UserId,
        deadline: Instant,
    ) -> Result<Resolution, ResolutionError> {
        if query.trim().is_empty() {
            return Err(ResolutionError::NoResults);
        }

        let kind = QueryKind::classify(query);
        let track = match &kind {
            QueryKind::Playlist(url) => {
                return self.resolve_playlist(url, requested_by, deadline).await
            }
            QueryKind::Direct(link) => self.resolve_link(link, requested_by).await?,
            QueryKind::Search(_) => self.search(&kind, requested_by).await?,
        };

        Ok(Resolution {
            tracks: vec![track],
            failed: 0,
        })
    }
}
