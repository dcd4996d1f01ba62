//! # Audio Module
//!
//! Per-guild playback engine for Tsuki.
//!
//! Every guild gets its own control loop that owns the guild's queue and
//! voice connection outright. Commands, track completions and timers all
//! arrive as messages on that loop's mailbox, so nothing outside the loop
//! ever touches queue or connection state.
//!
//! ## Architecture
//!
//! ### [`engine`] - MusicEngine
//! - Entry point used by the command layer
//! - Resolves queries on a bounded pool before anything reaches a guild
//! - Creates guild schedulers lazily
//!
//! ### [`scheduler`] - PlaybackScheduler
//! - One task per guild, fed through a [`SchedulerHandle`](scheduler::SchedulerHandle)
//! - Starts the next track whenever the current one ends or fails
//! - Tags every started track with a generation so stale completions are
//!   dropped instead of advancing the queue twice
//!
//! ### [`session`] - VoiceSession
//! - Disconnected / Connecting / Connected state machine
//! - Guild volume, kept across connections
//!
//! ### [`queue`] - GuildQueue
//! - FIFO of pending [`TrackDescriptor`](track::TrackDescriptor)s plus the
//!   current track
//!
//! ### [`transport`] - Collaborator interfaces
//! - [`Transport`](transport::Transport), [`TransportSession`](transport::TransportSession)
//!   and [`Notifier`](transport::Notifier); [`songbird_transport`] is the
//!   production voice backend

pub mod engine;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod songbird_transport;
pub mod track;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineSettings, MusicEngine};
pub use error::{EngineError, EngineResult};
pub use scheduler::{EnqueueOutcome, GuildStatus};
pub use track::TrackDescriptor;
