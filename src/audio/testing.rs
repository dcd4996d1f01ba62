//! In-memory transport and notifier used by the engine tests.

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashSet, sync::Arc, time::Duration};

use super::{
    error::{PlaybackError, TransportError},
    transport::{CompletionCallback, Notifier, Transport, TransportSession},
};

pub struct FakeState {
    pub connects: Vec<(GuildId, ChannelId)>,
    pub moves: Vec<ChannelId>,
    pub played: Vec<String>,
    pub stops: usize,
    pub disconnects: usize,
    pub volume: Option<u8>,
    pub paused: bool,
    pub fail_connect: Option<TransportError>,
    pub fail_move: Option<TransportError>,
    /// `connect` never returns.
    pub hang_connect: bool,
    /// Stream URIs whose `play` call fails right away.
    pub fail_play: HashSet<String>,
    /// Mirrors songbird: a forced stop fires the track's completion.
    pub complete_on_stop: bool,
    /// Completions not fired yet, oldest first.
    pub pending: Vec<(String, CompletionCallback)>,
}

#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                connects: Vec::new(),
                moves: Vec::new(),
                played: Vec::new(),
                stops: 0,
                disconnects: 0,
                volume: None,
                paused: false,
                fail_connect: None,
                fail_move: None,
                hang_connect: false,
                fail_play: HashSet::new(),
                complete_on_stop: true,
                pending: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock()
    }

    pub fn played(&self) -> Vec<String> {
        self.state().played.clone()
    }

    /// Fires the oldest outstanding completion for `uri`.
    pub fn complete(&self, uri: &str, error: Option<PlaybackError>) {
        let callback = {
            let mut state = self.state();
            let index = state
                .pending
                .iter()
                .position(|(pending_uri, _)| pending_uri == uri)
                .unwrap_or_else(|| panic!("no pending completion for {uri}"));
            state.pending.remove(index).1
        };
        callback(error);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        guild: GuildId,
        destination: ChannelId,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        let hang = self.state().hang_connect;
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        if let Some(error) = state.fail_connect.clone() {
            return Err(error);
        }
        state.connects.push((guild, destination));
        Ok(Box::new(FakeSession {
            inner: self.inner.clone(),
            playing: None,
        }))
    }
}

struct FakeSession {
    inner: Arc<Mutex<FakeState>>,
    playing: Option<String>,
}

#[async_trait]
impl TransportSession for FakeSession {
    async fn play(
        &mut self,
        stream_uri: &str,
        on_complete: CompletionCallback,
    ) -> Result<(), PlaybackError> {
        let mut state = self.inner.lock();
        if state.fail_play.contains(stream_uri) {
            return Err(PlaybackError::Track(format!("cannot open {stream_uri}")));
        }
        state.played.push(stream_uri.to_owned());
        state.paused = false;
        state.pending.push((stream_uri.to_owned(), on_complete));
        self.playing = Some(stream_uri.to_owned());
        Ok(())
    }

    async fn stop(&mut self) {
        let callback = {
            let mut state = self.inner.lock();
            state.stops += 1;
            let uri = self.playing.take();
            match uri {
                Some(uri) if state.complete_on_stop => state
                    .pending
                    .iter()
                    .position(|(pending_uri, _)| *pending_uri == uri)
                    .map(|index| state.pending.remove(index).1),
                _ => None,
            }
        };
        if let Some(callback) = callback {
            callback(None);
        }
    }

    async fn pause(&mut self) {
        self.inner.lock().paused = true;
    }

    async fn resume(&mut self) {
        self.inner.lock().paused = false;
    }

    async fn move_to(&mut self, destination: ChannelId) -> Result<(), TransportError> {
        let mut state = self.inner.lock();
        if let Some(error) = state.fail_move.clone() {
            return Err(error);
        }
        state.moves.push(destination);
        Ok(())
    }

    async fn set_volume(&mut self, percent: u8) {
        self.inner.lock().volume = Some(percent);
    }

    async fn disconnect(&mut self) {
        self.inner.lock().disconnects += 1;
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(_, text)| text.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, channel: ChannelId, text: &str) -> anyhow::Result<()> {
        self.messages.lock().push((channel, text.to_owned()));
        Ok(())
    }
}

/// Polls `condition`, yielding to other tasks in between.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}
