//! [`Transport`] backed by songbird.
//!
//! Audio is streamed straight from the extractor's media URL with
//! [`HttpRequest`]; songbird handles decoding, Opus encoding and the voice
//! gateway.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::HttpRequest,
    tracks::{PlayMode, Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    error::{PlaybackError, TransportError},
    transport::{CompletionCallback, CompletionOnce, Transport, TransportSession},
};

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: HttpClient,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: HttpClient) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn connect(
        &self,
        guild: GuildId,
        destination: ChannelId,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        if let Some(call) = self.manager.get(guild) {
            if call.lock().await.current_channel().is_some() {
                return Err(TransportError::AlreadyConnected);
            }
        }

        let call = join(&self.manager, guild, destination).await?;

        Ok(Box::new(SongbirdSession {
            guild,
            manager: self.manager.clone(),
            http: self.http.clone(),
            call,
            current: None,
            volume: 1.0,
        }))
    }
}

async fn join(
    manager: &Songbird,
    guild: GuildId,
    destination: ChannelId,
) -> Result<Arc<Mutex<Call>>, TransportError> {
    match manager.join(guild, destination).await {
        Ok(call) => Ok(call),
        Err(e) => {
            error!("❌ Songbird no pudo unirse en guild {}: {:?}", guild, e);
            // Songbird deja la llamada a medio crear tras un fallo
            if let Err(cleanup) = manager.remove(guild).await {
                debug!("Limpieza tras fallo de join: {:?}", cleanup);
            }
            Err(join_error(e))
        }
    }
}

fn join_error(error: JoinError) -> TransportError {
    match error {
        JoinError::TimedOut => TransportError::Unreachable(
            "voice server did not answer in time (missing CONNECT permission?)".into(),
        ),
        other => TransportError::Unreachable(other.to_string()),
    }
}

/// One songbird call plus the handle of the track it is playing.
pub struct SongbirdSession {
    guild: GuildId,
    manager: Arc<Songbird>,
    http: HttpClient,
    call: Arc<Mutex<Call>>,
    current: Option<TrackHandle>,
    volume: f32,
}

#[async_trait]
impl TransportSession for SongbirdSession {
    async fn play(
        &mut self,
        stream_uri: &str,
        on_complete: CompletionCallback,
    ) -> Result<(), PlaybackError> {
        let mut call = self.call.lock().await;
        if call.current_connection().is_none() {
            return Err(PlaybackError::TransportLost(
                "voice connection is gone".into(),
            ));
        }

        let input = HttpRequest::new(self.http.clone(), stream_uri.to_string());
        // Pausado hasta registrar los eventos para no perder un fallo inmediato
        let track = Track::from(input).volume(self.volume).pause();
        let handle = call.play_only(track);
        drop(call);

        let completion = Arc::new(CompletionOnce::new(on_complete));
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    CompletionHook {
                        guild: self.guild,
                        completion: completion.clone(),
                    },
                )
                .map_err(|e| PlaybackError::Track(format!("cannot watch track: {e}")))?;
        }

        handle
            .play()
            .map_err(|e| PlaybackError::Track(format!("cannot start track: {e}")))?;

        debug!("▶️ Stream iniciado en guild {}", self.guild);
        self.current = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            if let Err(e) = handle.stop() {
                debug!("El track ya había terminado en guild {}: {}", self.guild, e);
            }
        }
    }

    async fn pause(&mut self) {
        if let Some(handle) = &self.current {
            if let Err(e) = handle.pause() {
                debug!("No se pudo pausar en guild {}: {}", self.guild, e);
            }
        }
    }

    async fn resume(&mut self) {
        if let Some(handle) = &self.current {
            if let Err(e) = handle.play() {
                debug!("No se pudo reanudar en guild {}: {}", self.guild, e);
            }
        }
    }

    async fn move_to(&mut self, destination: ChannelId) -> Result<(), TransportError> {
        // Sin limpieza: la llamada anterior debe seguir viva si falla
        self.call = self
            .manager
            .join(self.guild, destination)
            .await
            .map_err(|e| {
                warn!("❌ Songbird no pudo moverse en guild {}: {:?}", self.guild, e);
                join_error(e)
            })?;
        Ok(())
    }

    async fn set_volume(&mut self, percent: u8) {
        self.volume = f32::from(percent) / 100.0;
        if let Some(handle) = &self.current {
            if let Err(e) = handle.set_volume(self.volume) {
                debug!("No se pudo ajustar volumen en guild {}: {}", self.guild, e);
            }
        }
    }

    async fn disconnect(&mut self) {
        self.stop().await;
        match self.manager.remove(self.guild).await {
            Ok(()) => info!("👋 Llamada de songbird cerrada en guild {}", self.guild),
            Err(e) => warn!("Error al salir del canal en guild {}: {:?}", self.guild, e),
        }
    }
}

/// Reports the end of one track, registered for both End and Error events.
struct CompletionHook {
    guild: GuildId,
    completion: Arc<CompletionOnce>,
}

#[async_trait]
impl VoiceEventHandler for CompletionHook {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut failure = None;
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    error!("❌ Error en track para guild {}: {:?}", self.guild, e);
                    failure = Some(PlaybackError::Track(format!("{e:?}")));
                }
            }
        }

        if self.completion.fire(failure) {
            debug!("🎵 Track terminó en guild {}", self.guild);
        }

        Some(Event::Cancel)
    }
}
