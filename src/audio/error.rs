//! Error taxonomy for the playback engine.
//!
//! Every failure here is scoped to a single guild. None of them should ever
//! take the process down: callers receive them as values and report them to
//! the user that issued the command.

use serenity::model::id::GuildId;
use std::time::Duration;
use thiserror::Error;

/// Failure turning a query into playable tracks.
///
/// Non-fatal to the guild's session: the queue and the current playback are
/// left untouched when a resolution fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Nothing playable came out of the query (empty search, empty playlist,
    /// or every playlist entry failed).
    #[error("no playable results")]
    NoResults,
    /// The lookup did not finish before its deadline.
    #[error("resolution timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// The metadata source could not be reached or crashed.
    #[error("source unreachable: {0}")]
    Unreachable(String),
}

/// Failure establishing or moving the voice connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("missing permission to join: {0}")]
    Permission(String),
    #[error("voice endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("a voice connection for this guild already exists")]
    AlreadyConnected,
}

/// Input rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("value {value} is out of range ({min}..={max})")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

/// Operation invoked while it does not apply to the guild's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("not connected to a voice channel")]
    NotConnected,
}

/// Failure reported by a transport through a completion event.
///
/// `Track` means the track itself could not be played to the end and the
/// scheduler moves on; `TransportLost` means the connection is dead and the
/// guild is torn down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("track failed: {0}")]
    Track(String),
    #[error("transport lost: {0}")]
    TransportLost(String),
}

/// Top-level error returned by [`MusicEngine`](super::engine::MusicEngine).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
    /// The guild's scheduler task exited and can no longer accept commands.
    #[error("scheduler for guild {0} is gone")]
    SchedulerGone(GuildId),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
