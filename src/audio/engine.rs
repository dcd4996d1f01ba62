use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use super::{
    error::{EngineResult, StateError},
    scheduler::{EnqueueOutcome, GuildStatus, PlaybackScheduler, SchedulerHandle},
    track::TrackDescriptor,
    transport::{Notifier, Transport},
};
use crate::{config::Config, sources::pool::ResolverPool};

/// Knobs shared by every guild scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Volume (0..=100) a guild starts with.
    pub default_volume: u8,
    pub max_queue_size: usize,
    /// How long a guild may sit connected with nothing to play. `None`
    /// disables the idle disconnect.
    pub idle_timeout: Option<Duration>,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            max_queue_size: config.max_queue_size,
            idle_timeout: (config.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(config.idle_timeout_secs)),
        }
    }
}

/// Public entry point of the playback engine.
///
/// Routes every request to the guild's [`PlaybackScheduler`], creating the
/// scheduler on first use. Schedulers are never removed while the engine
/// lives, so a guild keeps its volume between sessions. Resolution happens
/// here, on the caller's task and bounded by the [`ResolverPool`], before
/// anything is sent to the scheduler.
pub struct MusicEngine {
    schedulers: DashMap<GuildId, SchedulerHandle>,
    resolver: ResolverPool,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    settings: EngineSettings,
}

impl MusicEngine {
    pub fn new(
        settings: EngineSettings,
        resolver: ResolverPool,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        info!(
            "🎵 Motor de música listo (volumen {}%, cola máx {})",
            settings.default_volume, settings.max_queue_size
        );

        Self {
            schedulers: DashMap::new(),
            resolver,
            transport,
            notifier,
            settings,
        }
    }

    /// Resolves `query` and queues the result for `guild`, connecting to
    /// `destination` first if needed.
    ///
    /// Playlist entries that fail to resolve are counted in
    /// [`EnqueueOutcome::failed`]; only a query with zero playable results is
    /// an error. A failed resolution leaves the guild untouched.
    pub async fn enqueue(
        &self,
        guild: GuildId,
        query: &str,
        requested_by: UserId,
        destination: ChannelId,
        text_channel: Option<ChannelId>,
    ) -> EngineResult<EnqueueOutcome> {
        let resolution = self
            .resolver
            .resolve(query, requested_by)
            .await
            .inspect_err(|e| warn!("🔍 Resolución fallida en guild {} ({}): {}", guild, query, e))?;

        let failed = resolution.failed;
        let mut outcome = self
            .scheduler(guild)
            .enqueue(resolution.tracks, destination, text_channel)
            .await?;
        outcome.failed = failed;

        info!(
            "➕ Guild {}: {} en cola, {} fallidas, {} descartadas",
            guild, outcome.queued, outcome.failed, outcome.dropped
        );
        Ok(outcome)
    }

    /// Skips the current track; returns the track that was skipped.
    pub async fn skip(&self, guild: GuildId) -> EngineResult<TrackDescriptor> {
        match self.existing(guild) {
            Some(scheduler) => scheduler.skip().await,
            None => Err(StateError::NothingPlaying.into()),
        }
    }

    /// Stops playback, clears the queue and disconnects. Idempotent.
    pub async fn stop(&self, guild: GuildId) -> EngineResult<()> {
        match self.existing(guild) {
            Some(scheduler) => scheduler.stop().await,
            None => Ok(()),
        }
    }

    /// Pauses the current track; returns it.
    pub async fn pause(&self, guild: GuildId) -> EngineResult<TrackDescriptor> {
        match self.existing(guild) {
            Some(scheduler) => scheduler.pause().await,
            None => Err(StateError::NothingPlaying.into()),
        }
    }

    /// Resumes a paused track; returns it.
    pub async fn resume(&self, guild: GuildId) -> EngineResult<TrackDescriptor> {
        match self.existing(guild) {
            Some(scheduler) => scheduler.resume().await,
            None => Err(StateError::NothingPlaying.into()),
        }
    }

    pub async fn set_volume(&self, guild: GuildId, percent: i64) -> EngineResult<u8> {
        self.scheduler(guild).set_volume(percent).await
    }

    pub async fn volume(&self, guild: GuildId) -> EngineResult<u8> {
        match self.existing(guild) {
            Some(scheduler) => Ok(scheduler.snapshot(0).await?.volume),
            None => Ok(self.settings.default_volume),
        }
    }

    pub async fn join(&self, guild: GuildId, destination: ChannelId) -> EngineResult<()> {
        self.scheduler(guild).join(destination).await
    }

    pub async fn leave(&self, guild: GuildId) -> EngineResult<()> {
        match self.existing(guild) {
            Some(scheduler) => scheduler.leave().await,
            None => Err(StateError::NotConnected.into()),
        }
    }

    /// Current track plus the first `limit` pending ones.
    pub async fn snapshot(&self, guild: GuildId, limit: usize) -> EngineResult<GuildStatus> {
        match self.existing(guild) {
            Some(scheduler) => scheduler.snapshot(limit).await,
            None => Ok(GuildStatus::idle(guild, self.settings.default_volume)),
        }
    }

    /// Signals that `guild`'s voice connection was dropped from outside.
    ///
    /// `channel` is the voice channel that was left, when known; a report for
    /// a channel the guild no longer uses is ignored.
    pub fn transport_lost(&self, guild: GuildId, channel: Option<ChannelId>, reason: &str) {
        if let Some(scheduler) = self.existing(guild) {
            scheduler.transport_lost(channel, reason);
        }
    }

    /// Stops every guild. Used on process shutdown.
    pub async fn shutdown(&self) {
        let handles: Vec<SchedulerHandle> =
            self.schedulers.iter().map(|entry| entry.value().clone()).collect();

        info!("⚠️ Deteniendo {} guilds", handles.len());
        let results = join_all(handles.iter().map(|handle| handle.stop())).await;

        for (handle, result) in handles.iter().zip(results) {
            if let Err(e) = result {
                warn!("Error al detener guild {}: {}", handle.guild(), e);
            }
        }
    }

    fn existing(&self, guild: GuildId) -> Option<SchedulerHandle> {
        self.schedulers.get(&guild).map(|entry| entry.value().clone())
    }

    fn scheduler(&self, guild: GuildId) -> SchedulerHandle {
        let mut entry = self
            .schedulers
            .entry(guild)
            .or_insert_with(|| self.spawn_scheduler(guild));

        // Un scheduler que terminó no vuelve a leer su buzón
        if !entry.is_alive() {
            warn!("♻️ Scheduler de guild {} caído, creando uno nuevo", guild);
            *entry = self.spawn_scheduler(guild);
        }

        entry.value().clone()
    }

    fn spawn_scheduler(&self, guild: GuildId) -> SchedulerHandle {
        PlaybackScheduler::spawn(
            guild,
            &self.settings,
            self.transport.clone(),
            self.notifier.clone(),
        )
    }
}
