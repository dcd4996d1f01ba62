//! Per-guild playback control loop.
//!
//! Each guild gets one [`PlaybackScheduler`] running as its own tokio task.
//! Everything that touches the guild's queue, voice session or playback
//! generation arrives as a [`Command`] on the scheduler's mailbox and is
//! handled strictly one at a time:
//!
//! - caller requests (enqueue, skip, stop, ...) come in through a
//!   [`SchedulerHandle`] and get their answer back on a oneshot channel;
//! - transport completions are turned into [`Command::Completed`] by the
//!   callback handed to the transport, carrying the generation the track was
//!   started under. A completion whose generation is no longer live was
//!   superseded by a skip/stop/advance and is dropped;
//! - the idle-disconnect timer posts [`Command::IdleExpired`] tagged with the
//!   epoch it was armed under.
//!
//! Resolution never runs here; the engine resolves first and only sends the
//! finished track list.

use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::{
    engine::EngineSettings,
    error::{EngineError, EngineResult, PlaybackError, StateError},
    queue::{GuildQueue, QueueSnapshot},
    session::{validate_volume, ConnectionState, VoiceSession},
    track::TrackDescriptor,
    transport::{CompletionCallback, Notifier, Transport},
};
use crate::ui::messages;

/// Result of admitting tracks into a guild's queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOutcome {
    /// Tracks appended to the queue.
    pub queued: usize,
    /// Playlist entries the resolver could not turn into tracks.
    pub failed: usize,
    /// Resolved tracks that did not fit in the queue.
    pub dropped: usize,
    /// First track of the request, for confirmation messages.
    pub first: Option<TrackDescriptor>,
}

/// Status of one guild, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildStatus {
    pub guild: GuildId,
    pub state: ConnectionState,
    pub destination: Option<ChannelId>,
    pub volume: u8,
    /// True when the current track is paused.
    pub paused: bool,
    pub queue: QueueSnapshot,
}

impl GuildStatus {
    /// Status of a guild the engine has never seen.
    pub fn idle(guild: GuildId, volume: u8) -> Self {
        Self {
            guild,
            state: ConnectionState::Disconnected,
            destination: None,
            volume,
            paused: false,
            queue: QueueSnapshot::default(),
        }
    }
}

pub(crate) enum Command {
    Enqueue {
        tracks: Vec<TrackDescriptor>,
        destination: ChannelId,
        text_channel: Option<ChannelId>,
        reply: oneshot::Sender<EngineResult<EnqueueOutcome>>,
    },
    Skip {
        reply: oneshot::Sender<EngineResult<TrackDescriptor>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Pause {
        reply: oneshot::Sender<EngineResult<TrackDescriptor>>,
    },
    Resume {
        reply: oneshot::Sender<EngineResult<TrackDescriptor>>,
    },
    SetVolume {
        percent: i64,
        reply: oneshot::Sender<EngineResult<u8>>,
    },
    Join {
        destination: ChannelId,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    Leave {
        reply: oneshot::Sender<EngineResult<()>>,
    },
    Snapshot {
        limit: usize,
        reply: oneshot::Sender<GuildStatus>,
    },
    /// `channel` is the voice channel the loss was reported for; `None`
    /// applies to whatever the guild is connected to.
    TransportLost {
        channel: Option<ChannelId>,
        reason: String,
    },
    Completed {
        generation: u64,
        error: Option<PlaybackError>,
    },
    IdleExpired {
        epoch: u64,
    },
}

impl Command {
    fn is_user_action(&self) -> bool {
        matches!(
            self,
            Command::Enqueue { .. }
                | Command::Skip { .. }
                | Command::Stop { .. }
                | Command::Pause { .. }
                | Command::Resume { .. }
                | Command::Join { .. }
                | Command::Leave { .. }
        )
    }
}

/// Cloneable sender side of a guild's scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    guild: GuildId,
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    pub fn guild(&self) -> GuildId {
        self.guild
    }

    /// Whether the control loop is still receiving commands.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> EngineResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| EngineError::SchedulerGone(self.guild))?;
        response
            .await
            .map_err(|_| EngineError::SchedulerGone(self.guild))
    }

    pub async fn enqueue(
        &self,
        tracks: Vec<TrackDescriptor>,
        destination: ChannelId,
        text_channel: Option<ChannelId>,
    ) -> EngineResult<EnqueueOutcome> {
        self.request(|reply| Command::Enqueue {
            tracks,
            destination,
            text_channel,
            reply,
        })
        .await?
    }

    pub async fn skip(&self) -> EngineResult<TrackDescriptor> {
        self.request(|reply| Command::Skip { reply }).await?
    }

    pub async fn stop(&self) -> EngineResult<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn pause(&self) -> EngineResult<TrackDescriptor> {
        self.request(|reply| Command::Pause { reply }).await?
    }

    pub async fn resume(&self) -> EngineResult<TrackDescriptor> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    pub async fn set_volume(&self, percent: i64) -> EngineResult<u8> {
        self.request(|reply| Command::SetVolume { percent, reply })
            .await?
    }

    pub async fn join(&self, destination: ChannelId) -> EngineResult<()> {
        self.request(|reply| Command::Join { destination, reply })
            .await?
    }

    pub async fn leave(&self) -> EngineResult<()> {
        self.request(|reply| Command::Leave { reply }).await?
    }

    pub async fn snapshot(&self, limit: usize) -> EngineResult<GuildStatus> {
        self.request(|reply| Command::Snapshot { limit, reply }).await
    }

    /// Reports that the voice connection died underneath the scheduler.
    ///
    /// With `Some(channel)` the report is dropped unless the guild is still
    /// connected to that channel.
    pub fn transport_lost(&self, channel: Option<ChannelId>, reason: impl Into<String>) {
        let reason = reason.into();
        if self.tx.send(Command::TransportLost { channel, reason }).is_err() {
            debug!("Scheduler de guild {} ya no existe", self.guild);
        }
    }
}

/// Cancellable idle-disconnect timer owned by the scheduler.
///
/// Dropping the guard cancels the sleeping task; the epoch makes an expiry
/// that was already posted before cancellation harmless.
struct IdleTimer {
    epoch: u64,
    guard: Option<DropGuard>,
}

impl IdleTimer {
    fn new() -> Self {
        Self { epoch: 0, guard: None }
    }

    fn is_armed(&self) -> bool {
        self.guard.is_some()
    }

    fn arm(&mut self, after: Duration, mailbox: mpsc::WeakUnboundedSender<Command>) {
        self.epoch += 1;
        let epoch = self.epoch;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if let Some(tx) = mailbox.upgrade() {
                        let _ = tx.send(Command::IdleExpired { epoch });
                    }
                }
            }
        });

        self.guard = Some(token.drop_guard());
    }

    fn cancel(&mut self) {
        self.guard = None;
    }

    fn accepts(&self, epoch: u64) -> bool {
        self.is_armed() && epoch == self.epoch
    }
}

/// Ordered, best-effort delivery of announcements.
///
/// A dedicated task does the network I/O so the control loop never waits on
/// the chat API; failures are logged and dropped.
struct Announcer {
    guild: GuildId,
    tx: mpsc::UnboundedSender<(ChannelId, String)>,
}

impl Announcer {
    fn spawn(guild: GuildId, notifier: Arc<dyn Notifier>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(ChannelId, String)>();

        tokio::spawn(async move {
            while let Some((channel, text)) = rx.recv().await {
                if let Err(e) = notifier.send(channel, &text).await {
                    warn!("⚠️ No se pudo enviar aviso en guild {}: {:?}", guild, e);
                }
            }
        });

        Self { guild, tx }
    }

    fn send(&self, channel: Option<ChannelId>, text: String) {
        let Some(channel) = channel else {
            debug!("Guild {} sin canal de texto, aviso omitido", self.guild);
            return;
        };
        let _ = self.tx.send((channel, text));
    }
}

/// Owner of one guild's queue, voice session and playback generation.
pub struct PlaybackScheduler {
    guild: GuildId,
    queue: GuildQueue,
    voice: VoiceSession,
    transport: Arc<dyn Transport>,
    announcer: Announcer,
    text_channel: Option<ChannelId>,
    idle: IdleTimer,
    idle_timeout: Option<Duration>,
    mailbox: mpsc::WeakUnboundedSender<Command>,
}

impl PlaybackScheduler {
    /// Starts the control loop for `guild` and returns its handle.
    ///
    /// The loop ends once every handle is dropped, disconnecting first.
    pub fn spawn(
        guild: GuildId,
        settings: &EngineSettings,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let scheduler = Self {
            guild,
            queue: GuildQueue::new(settings.max_queue_size),
            voice: VoiceSession::new(guild, settings.default_volume),
            transport,
            announcer: Announcer::spawn(guild, notifier),
            text_channel: None,
            idle: IdleTimer::new(),
            idle_timeout: settings.idle_timeout,
            mailbox: tx.downgrade(),
        };

        tokio::spawn(scheduler.run(rx));
        SchedulerHandle { guild, tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        debug!("🎛️ Scheduler iniciado para guild {}", self.guild);

        while let Some(command) = rx.recv().await {
            if command.is_user_action() {
                // Cualquier orden del usuario reinicia la cuenta de inactividad
                self.idle.cancel();
            }
            self.handle(command).await;
            self.refresh_idle_timer();
        }

        self.idle.cancel();
        self.queue.invalidate();
        self.voice.disconnect().await;
        debug!("🎛️ Scheduler finalizado para guild {}", self.guild);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue {
                tracks,
                destination,
                text_channel,
                reply,
            } => {
                let result = self.enqueue(tracks, destination, text_channel).await;
                let _ = reply.send(result);
            }
            Command::Skip { reply } => {
                let result = self.skip().await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::Pause { reply } => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            Command::SetVolume { percent, reply } => {
                let result = self.set_volume(percent).await;
                let _ = reply.send(result);
            }
            Command::Join { destination, reply } => {
                let result = self.voice.join(self.transport.as_ref(), destination).await;
                let _ = reply.send(result.map_err(Into::into));
            }
            Command::Leave { reply } => {
                let result = self.leave().await;
                let _ = reply.send(result);
            }
            Command::Snapshot { limit, reply } => {
                let _ = reply.send(self.status(limit));
            }
            Command::TransportLost { channel, reason } => {
                if channel.is_some() && channel != self.voice.destination() {
                    debug!(
                        "Pérdida de transporte en guild {} para el canal {:?} ignorada, conectada a {:?}",
                        self.guild,
                        channel,
                        self.voice.destination()
                    );
                } else {
                    self.lose_transport(&reason).await;
                }
            }
            Command::Completed { generation, error } => {
                self.on_complete(generation, error).await
            }
            Command::IdleExpired { epoch } => self.on_idle_expired(epoch).await,
        }
    }

    async fn enqueue(
        &mut self,
        tracks: Vec<TrackDescriptor>,
        destination: ChannelId,
        text_channel: Option<ChannelId>,
    ) -> EngineResult<EnqueueOutcome> {
        if text_channel.is_some() {
            self.text_channel = text_channel;
        }

        // Mientras suena algo se mantiene el canal actual
        if !self.voice.is_connected() || self.queue.current().is_none() {
            self.voice
                .join(self.transport.as_ref(), destination)
                .await?;
        }

        let total = tracks.len();
        let first = tracks.first().cloned();
        let queued = self.queue.append_all(tracks);

        if queued < total {
            warn!(
                "📦 Cola llena en guild {}: {} canciones descartadas",
                self.guild,
                total - queued
            );
        }

        if self.queue.current().is_none() && !self.queue.is_empty() {
            self.start_next().await;
        }

        Ok(EnqueueOutcome {
            queued,
            failed: 0,
            dropped: total - queued,
            first,
        })
    }

    /// Plays the front pending track, or tears the session down when there
    /// is nothing left. A track whose `play` fails immediately is reported
    /// and the next one is tried without dropping the connection.
    async fn start_next(&mut self) {
        loop {
            let Some(now) = self.queue.advance().cloned() else {
                info!("📭 Cola vacía en guild {}, desconectando", self.guild);
                self.voice.disconnect().await;
                self.announce(messages::queue_finished());
                return;
            };

            let callback = self.completion_callback(now.generation);
            let Some(link) = self.voice.link_mut() else {
                error!(
                    "Guild {} sin conexión de voz al iniciar reproducción, limpiando cola",
                    self.guild
                );
                self.queue.take_current();
                self.queue.clear();
                return;
            };

            let result = link.play(now.track.stream_uri(), callback).await;
            match result {
                Ok(()) => {
                    info!(
                        "🎵 Reproduciendo en guild {}: {} (gen {})",
                        self.guild,
                        now.track.title(),
                        now.generation
                    );
                    self.announce(messages::now_playing(&now.track));
                    return;
                }
                Err(PlaybackError::TransportLost(reason)) => {
                    self.lose_transport(&reason).await;
                    return;
                }
                Err(e) => {
                    error!(
                        "❌ No se pudo iniciar {} en guild {}: {}",
                        now.track.title(),
                        self.guild,
                        e
                    );
                    self.queue.take_current();
                    self.announce(messages::playback_failed(&now.track, &e));
                }
            }
        }
    }

    fn completion_callback(&self, generation: u64) -> CompletionCallback {
        let mailbox = self.mailbox.clone();
        let guild = self.guild;

        Box::new(move |error| match mailbox.upgrade() {
            Some(tx) => {
                let _ = tx.send(Command::Completed { generation, error });
            }
            None => debug!("Completion para guild {} sin scheduler, ignorada", guild),
        })
    }

    async fn on_complete(&mut self, generation: u64, error: Option<PlaybackError>) {
        if !self.queue.is_live(generation) {
            debug!(
                "Completion obsoleta en guild {} (gen {}, actual {})",
                self.guild,
                generation,
                self.queue.generation()
            );
            return;
        }

        match error {
            None => debug!("✅ Track terminado en guild {}", self.guild),
            Some(PlaybackError::TransportLost(reason)) => {
                self.lose_transport(&reason).await;
                return;
            }
            Some(e) => warn!("⚠️ Error de reproducción en guild {}: {}", self.guild, e),
        }

        self.start_next().await;
    }

    async fn skip(&mut self) -> EngineResult<TrackDescriptor> {
        let Some(now) = self.queue.take_current() else {
            return Err(StateError::NothingPlaying.into());
        };

        self.queue.invalidate();
        if let Some(link) = self.voice.link_mut() {
            link.stop().await;
        }
        info!("⏭️ Saltado en guild {}: {}", self.guild, now.track.title());

        self.start_next().await;
        Ok(now.track)
    }

    async fn stop(&mut self) {
        if !self.voice.is_connected() && self.queue.is_idle() {
            debug!("⏹️ Guild {} ya estaba detenida", self.guild);
            return;
        }

        self.queue.invalidate();
        if self.queue.take_current().is_some() {
            if let Some(link) = self.voice.link_mut() {
                link.stop().await;
            }
        }
        self.queue.clear();
        self.voice.disconnect().await;
        info!("⏹️ Reproducción detenida en guild {}", self.guild);
    }

    async fn pause(&mut self) -> EngineResult<TrackDescriptor> {
        let Some(now) = self.queue.current().cloned() else {
            return Err(StateError::NothingPlaying.into());
        };

        if !now.paused {
            if let Some(link) = self.voice.link_mut() {
                link.pause().await;
            }
            self.queue.set_paused(true);
            info!("⏸️ Pausado en guild {}: {}", self.guild, now.track.title());
        }
        Ok(now.track)
    }

    async fn resume(&mut self) -> EngineResult<TrackDescriptor> {
        let Some(now) = self.queue.current().cloned() else {
            return Err(StateError::NothingPlaying.into());
        };

        if now.paused {
            if let Some(link) = self.voice.link_mut() {
                link.resume().await;
            }
            self.queue.set_paused(false);
            info!("▶️ Reanudado en guild {}: {}", self.guild, now.track.title());
        }
        Ok(now.track)
    }

    async fn leave(&mut self) -> EngineResult<()> {
        if !self.voice.is_connected() {
            return Err(StateError::NotConnected.into());
        }
        self.stop().await;
        Ok(())
    }

    async fn set_volume(&mut self, percent: i64) -> EngineResult<u8> {
        let volume = validate_volume(percent)?;
        self.voice.set_volume(volume).await;
        Ok(volume)
    }

    async fn lose_transport(&mut self, reason: &str) {
        if self.voice.state() == ConnectionState::Disconnected {
            debug!("Pérdida de transporte ignorada en guild {}: ya desconectada", self.guild);
            return;
        }

        warn!("🔌 Conexión de voz perdida en guild {}: {}", self.guild, reason);
        self.queue.invalidate();
        self.queue.take_current();
        self.queue.clear();
        self.voice.disconnect().await;
        self.announce(messages::transport_lost());
    }

    async fn on_idle_expired(&mut self, epoch: u64) {
        if !self.idle.accepts(epoch) {
            debug!("Timer de inactividad obsoleto en guild {}", self.guild);
            return;
        }
        self.idle.cancel();

        if self.voice.is_connected() && self.queue.is_idle() {
            info!("🚪 Desconexión por inactividad en guild {}", self.guild);
            self.voice.disconnect().await;
            self.announce(messages::idle_disconnect());
        }
    }

    /// Keeps the idle timer armed exactly while the guild sits connected
    /// with nothing to play.
    fn refresh_idle_timer(&mut self) {
        let idle = self.voice.is_connected() && self.queue.is_idle();

        match (idle, self.idle_timeout) {
            (true, Some(timeout)) if !self.idle.is_armed() => {
                debug!("⏲️ Timer de inactividad armado en guild {}", self.guild);
                self.idle.arm(timeout, self.mailbox.clone());
            }
            (true, _) => {}
            (false, _) => self.idle.cancel(),
        }
    }

    fn status(&self, limit: usize) -> GuildStatus {
        GuildStatus {
            guild: self.guild,
            state: self.voice.state(),
            destination: self.voice.destination(),
            volume: self.voice.volume(),
            paused: self.queue.current().is_some_and(|now| now.paused),
            queue: self.queue.snapshot(limit),
        }
    }

    fn announce(&self, text: String) {
        self.announcer.send(self.text_channel, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        error::{TransportError, ValidationError},
        testing::{eventually, FakeTransport, RecordingNotifier},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    const GUILD: GuildId = GuildId::new(1);
    const LOBBY: ChannelId = ChannelId::new(10);
    const STAGE: ChannelId = ChannelId::new(11);
    const TEXT: ChannelId = ChannelId::new(20);

    struct Harness {
        transport: FakeTransport,
        notifier: Arc<RecordingNotifier>,
        handle: SchedulerHandle,
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            default_volume: 100,
            max_queue_size: 100,
            idle_timeout: None,
        }
    }

    fn harness_with(settings: EngineSettings) -> Harness {
        let transport = FakeTransport::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let handle = PlaybackScheduler::spawn(
            GUILD,
            &settings,
            Arc::new(transport.clone()),
            notifier.clone(),
        );
        Harness {
            transport,
            notifier,
            handle,
        }
    }

    fn harness() -> Harness {
        harness_with(settings())
    }

    fn track(title: &str) -> TrackDescriptor {
        TrackDescriptor::new(
            title,
            format!("https://www.youtube.com/watch?v={title}"),
            uri(title),
            UserId::new(5),
        )
    }

    fn uri(title: &str) -> String {
        format!("https://cdn.example.com/{title}.m4a")
    }

    impl Harness {
        async fn enqueue(&self, titles: &[&str]) -> EnqueueOutcome {
            let tracks = titles.iter().map(|t| track(t)).collect();
            self.handle.enqueue(tracks, LOBBY, Some(TEXT)).await.unwrap()
        }

        async fn status(&self) -> GuildStatus {
            self.handle.snapshot(50).await.unwrap()
        }

        async fn current_title(&self) -> Option<String> {
            self.status()
                .await
                .queue
                .current
                .map(|now| now.track.title().to_owned())
        }

        async fn pending_titles(&self) -> Vec<String> {
            self.status()
                .await
                .queue
                .pending
                .iter()
                .map(|t| t.title().to_owned())
                .collect()
        }
    }

    #[tokio::test]
    async fn test_enqueue_on_idle_guild_starts_playing() {
        let h = harness();

        let outcome = h.enqueue(&["a"]).await;
        let status = h.status().await;

        assert_eq!(outcome.queued, 1);
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.destination, Some(LOBBY));
        assert_eq!(h.current_title().await.as_deref(), Some("a"));
        assert_eq!(h.transport.played(), vec![uri("a")]);
    }

    #[tokio::test]
    async fn test_tracks_play_in_fifo_order_and_disconnect_when_done() {
        let h = harness();
        h.enqueue(&["a"]).await;
        h.enqueue(&["b"]).await;
        h.enqueue(&["c"]).await;
        assert_eq!(h.pending_titles().await, vec!["b", "c"]);

        for title in ["a", "b", "c"] {
            assert_eq!(h.current_title().await.as_deref(), Some(title));
            h.transport.complete(&uri(title), None);
        }

        let status = h.status().await;
        assert_eq!(h.transport.played(), vec![uri("a"), uri("b"), uri("c")]);
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.queue.current.is_none());
        assert_eq!(h.transport.state().disconnects, 1);
        assert!(
            eventually(|| h
                .notifier
                .messages()
                .iter()
                .any(|m| m.contains("Queue is empty")))
            .await
        );
    }

    #[tokio::test]
    async fn test_skip_discards_stale_completion() {
        let h = harness();
        h.enqueue(&["a", "b", "c"]).await;

        let skipped = h.handle.skip().await.unwrap();

        // the fake fires a's completion on stop; it must not advance past b
        assert_eq!(skipped.title(), "a");
        assert_eq!(h.current_title().await.as_deref(), Some("b"));
        assert_eq!(h.pending_titles().await, vec!["c"]);
        assert_eq!(h.transport.played(), vec![uri("a"), uri("b")]);
    }

    #[tokio::test]
    async fn test_late_completion_after_skip_is_ignored() {
        let h = harness();
        h.transport.state().complete_on_stop = false;
        h.enqueue(&["a", "b", "c"]).await;

        h.handle.skip().await.unwrap();
        h.transport.complete(&uri("a"), None);

        assert_eq!(h.current_title().await.as_deref(), Some("b"));
        assert_eq!(h.pending_titles().await, vec!["c"]);
    }

    #[tokio::test]
    async fn test_stop_clears_everything_and_is_idempotent() {
        let h = harness();
        h.transport.state().complete_on_stop = false;
        h.enqueue(&["a", "b", "c"]).await;

        h.handle.stop().await.unwrap();
        let after_first = h.status().await;
        h.handle.stop().await.unwrap();
        h.transport.complete(&uri("a"), None);
        let after_second = h.status().await;

        assert_eq!(after_first, after_second);
        assert_eq!(after_second.state, ConnectionState::Disconnected);
        assert!(after_second.queue.current.is_none());
        assert_eq!(after_second.queue.total_pending, 0);
        assert_eq!(h.transport.played(), vec![uri("a")]);
        assert_eq!(h.transport.state().disconnects, 1);
    }

    #[tokio::test]
    async fn test_skip_with_nothing_playing_is_rejected() {
        let h = harness();

        let result = h.handle.skip().await;

        assert_eq!(result, Err(EngineError::State(StateError::NothingPlaying)));
        assert_eq!(h.status().await.state, ConnectionState::Disconnected);
        assert!(h.transport.state().connects.is_empty());
    }

    #[tokio::test]
    async fn test_play_failure_moves_on_without_disconnecting() {
        let h = harness();
        h.transport.state().fail_play.insert(uri("b"));
        h.enqueue(&["a", "b", "c"]).await;

        h.transport.complete(&uri("a"), None);

        let status = h.status().await;
        assert_eq!(h.current_title().await.as_deref(), Some("c"));
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(h.transport.state().disconnects, 0);
        assert!(
            eventually(|| h
                .notifier
                .messages()
                .iter()
                .any(|m| m.contains("Failed to start playback of b")))
            .await
        );
    }

    #[tokio::test]
    async fn test_track_error_advances_to_next() {
        let h = harness();
        h.enqueue(&["a", "b"]).await;

        h.transport
            .complete(&uri("a"), Some(PlaybackError::Track("403".into())));

        assert_eq!(h.current_title().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_transport_loss_clears_queue() {
        let h = harness();
        h.enqueue(&["a", "b", "c"]).await;

        h.transport.complete(
            &uri("a"),
            Some(PlaybackError::TransportLost("udp closed".into())),
        );

        let status = h.status().await;
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.queue.current.is_none());
        assert_eq!(status.queue.total_pending, 0);
        assert_eq!(h.transport.played(), vec![uri("a")]);
    }

    #[tokio::test]
    async fn test_external_disconnect_signal() {
        let h = harness();
        h.enqueue(&["a", "b"]).await;

        h.handle.transport_lost(Some(LOBBY), "kicked from channel");

        let status = h.status().await;
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.queue.total_pending, 0);
    }

    #[tokio::test]
    async fn test_disconnect_signal_for_previous_channel_is_ignored() {
        let h = harness();
        h.handle.join(STAGE).await.unwrap();
        h.enqueue(&["a", "b"]).await;

        // llega tarde el aviso de salida de STAGE; ya suena en LOBBY
        h.handle.transport_lost(Some(STAGE), "left stage");

        let status = h.status().await;
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.destination, Some(LOBBY));
        assert_eq!(h.current_title().await.as_deref(), Some("a"));
        assert_eq!(h.transport.state().disconnects, 0);
    }

    #[tokio::test]
    async fn test_pause_and_resume_current_track() {
        let h = harness();
        h.enqueue(&["a", "b"]).await;

        assert_eq!(h.handle.pause().await.unwrap().title(), "a");
        assert!(h.status().await.paused);
        assert!(h.transport.state().paused);

        // pausar dos veces no cambia nada
        h.handle.pause().await.unwrap();
        assert!(h.status().await.paused);

        assert_eq!(h.handle.resume().await.unwrap().title(), "a");
        assert!(!h.status().await.paused);
        assert!(!h.transport.state().paused);
    }

    #[tokio::test]
    async fn test_pause_with_nothing_playing_is_rejected() {
        let h = harness();
        h.handle.join(LOBBY).await.unwrap();

        assert_eq!(
            h.handle.pause().await,
            Err(EngineError::State(StateError::NothingPlaying))
        );
        assert_eq!(
            h.handle.resume().await,
            Err(EngineError::State(StateError::NothingPlaying))
        );
        assert!(!h.status().await.paused);
    }

    #[tokio::test]
    async fn test_completion_while_paused_advances() {
        let h = harness();
        h.enqueue(&["a", "b"]).await;
        h.handle.pause().await.unwrap();

        h.transport.complete(&uri("a"), None);

        let status = h.status().await;
        assert_eq!(h.current_title().await.as_deref(), Some("b"));
        assert!(!status.paused);
        assert_eq!(h.transport.played(), vec![uri("a"), uri("b")]);
    }

    #[tokio::test]
    async fn test_skip_while_paused_plays_next_unpaused() {
        let h = harness();
        h.enqueue(&["a", "b"]).await;
        h.handle.pause().await.unwrap();

        h.handle.skip().await.unwrap();

        assert_eq!(h.current_title().await.as_deref(), Some("b"));
        assert!(!h.status().await.paused);
    }

    #[tokio::test]
    async fn test_connect_failure_queues_nothing() {
        let h = harness();
        h.transport.state().fail_connect = Some(TransportError::Unreachable("timeout".into()));

        let result = h
            .handle
            .enqueue(vec![track("a")], LOBBY, Some(TEXT))
            .await;

        assert_eq!(
            result,
            Err(EngineError::Transport(TransportError::Unreachable(
                "timeout".into()
            )))
        );
        let status = h.status().await;
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.queue.current.is_none());
        assert_eq!(status.queue.total_pending, 0);
    }

    #[tokio::test]
    async fn test_connect_already_in_progress_is_reported() {
        let h = harness();
        h.transport.state().fail_connect = Some(TransportError::AlreadyConnected);

        let result = h.handle.join(LOBBY).await;

        assert_eq!(
            result,
            Err(EngineError::Transport(TransportError::AlreadyConnected))
        );
        assert_eq!(h.status().await.state, ConnectionState::Disconnected);

        h.transport.state().fail_connect = None;
        h.handle.join(LOBBY).await.unwrap();
        assert_eq!(h.status().await.state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_volume_validation_and_live_apply() {
        let h = harness();
        h.enqueue(&["a"]).await;

        assert!(matches!(
            h.handle.set_volume(-1).await,
            Err(EngineError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert!(h.handle.set_volume(101).await.is_err());
        assert_eq!(h.status().await.volume, 100);

        assert_eq!(h.handle.set_volume(0).await, Ok(0));
        assert_eq!(h.transport.state().volume, Some(0));
        assert_eq!(h.handle.set_volume(100).await, Ok(100));
        assert_eq!(h.status().await.volume, 100);
    }

    #[tokio::test]
    async fn test_leave_requires_connection() {
        let h = harness();

        assert_eq!(
            h.handle.leave().await,
            Err(EngineError::State(StateError::NotConnected))
        );

        h.handle.join(LOBBY).await.unwrap();
        h.handle.leave().await.unwrap();
        assert_eq!(h.status().await.state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_enqueue_moves_idle_session_to_caller_channel() {
        let h = harness();
        h.handle.join(STAGE).await.unwrap();

        h.enqueue(&["a"]).await;
        h.handle
            .enqueue(vec![track("b")], STAGE, None)
            .await
            .unwrap();

        let status = h.status().await;
        assert_eq!(status.destination, Some(LOBBY));
        assert_eq!(h.transport.state().moves, vec![LOBBY]);
        assert_eq!(h.transport.state().connects.len(), 1);
    }

    #[tokio::test]
    async fn test_queue_capacity_reports_dropped() {
        let h = harness_with(EngineSettings {
            max_queue_size: 2,
            ..settings()
        });

        let outcome = h.enqueue(&["a", "b", "c", "d"]).await;

        // a starts playing right away, freeing a pending slot only afterwards
        assert_eq!(outcome.queued, 2);
        assert_eq!(outcome.dropped, 2);
        assert_eq!(outcome.first.map(|t| t.title().to_owned()).as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_disconnects_after_join() {
        let h = harness_with(EngineSettings {
            idle_timeout: Some(Duration::from_secs(300)),
            ..settings()
        });
        h.handle.join(LOBBY).await.unwrap();

        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(h.status().await.state, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_cancelled_by_enqueue() {
        let h = harness_with(EngineSettings {
            idle_timeout: Some(Duration::from_secs(300)),
            ..settings()
        });
        h.handle.join(LOBBY).await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;
        h.enqueue(&["a"]).await;

        tokio::time::sleep(Duration::from_secs(200)).await;

        let status = h.status().await;
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(h.current_title().await.as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_restarted_by_skip() {
        let h = harness_with(EngineSettings {
            idle_timeout: Some(Duration::from_secs(300)),
            ..settings()
        });
        h.handle.join(LOBBY).await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;

        assert!(h.handle.skip().await.is_err());
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(h.status().await.state, ConnectionState::Connected);

        tokio::time::sleep(Duration::from_secs(101)).await;
        assert_eq!(h.status().await.state, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_cancelled_by_stop() {
        let h = harness_with(EngineSettings {
            idle_timeout: Some(Duration::from_secs(300)),
            ..settings()
        });
        h.handle.join(LOBBY).await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;

        h.handle.stop().await.unwrap();
        h.handle.join(STAGE).await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;

        // el timer armado antes de stop no debe desconectar la nueva sesión
        let status = h.status().await;
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.destination, Some(STAGE));
        assert_eq!(h.transport.state().disconnects, 1);
        assert!(!h
            .notifier
            .messages()
            .iter()
            .any(|m| m.contains("Nothing to play")));
    }
}
