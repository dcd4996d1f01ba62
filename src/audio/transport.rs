//! Narrow interfaces the engine needs from its collaborators.
//!
//! The scheduler only ever talks to a voice backend through [`Transport`] and
//! [`TransportSession`], and to the chat through [`Notifier`]. Songbird is one
//! implementation (see [`songbird_transport`](super::songbird_transport));
//! tests plug in in-memory fakes.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};

use super::error::{PlaybackError, TransportError};

/// Invoked exactly once when a track started by [`TransportSession::play`]
/// ends, with `None` on natural completion or forced stop.
///
/// May run on any thread. Implementations on the engine side must only turn
/// it into a message for the owning control loop.
pub type CompletionCallback = Box<dyn FnOnce(Option<PlaybackError>) + Send + 'static>;

/// Factory for voice connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection for `guild` to the `destination` voice channel.
    async fn connect(
        &self,
        guild: GuildId,
        destination: ChannelId,
    ) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// One live voice connection.
#[async_trait]
pub trait TransportSession: Send {
    /// Starts streaming `stream_uri`. An `Err` means nothing was started and
    /// `on_complete` will never fire.
    async fn play(
        &mut self,
        stream_uri: &str,
        on_complete: CompletionCallback,
    ) -> Result<(), PlaybackError>;

    /// Force-stops the current track, if any. Its completion still fires.
    async fn stop(&mut self);

    /// Pauses the current track without ending it.
    async fn pause(&mut self);

    /// Continues a paused track.
    async fn resume(&mut self);

    /// Moves the connection to another channel. On failure the previous
    /// channel stays in use.
    async fn move_to(&mut self, destination: ChannelId) -> Result<(), TransportError>;

    /// Sets the volume (0..=100) for the live track and every later one.
    async fn set_volume(&mut self, percent: u8);

    /// Tears the connection down. The session is not used afterwards.
    async fn disconnect(&mut self);
}

/// Best-effort text announcements to a chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: ChannelId, text: &str) -> anyhow::Result<()>;
}

/// Guard that lets several transport-side event hooks share one
/// [`CompletionCallback`] while firing it at most once.
pub struct CompletionOnce {
    callback: Mutex<Option<CompletionCallback>>,
}

impl CompletionOnce {
    pub fn new(callback: CompletionCallback) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Fires the callback if nobody did yet. Returns whether this call fired it.
    pub fn fire(&self, error: Option<PlaybackError>) -> bool {
        let callback = self.callback.lock().take();
        match callback {
            Some(callback) => {
                callback(error);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn test_completion_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let once = CompletionOnce::new(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(once.fire(Some(PlaybackError::Track("decode".into()))));
        assert!(!once.fire(None));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
