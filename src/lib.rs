//! # Tsuki Music
//!
//! Per-guild music playback for the Tsuki Discord bot.
//!
//! - [`audio`]: the playback engine (queue, voice state machine, scheduler)
//! - [`sources`]: turning queries into playable tracks through `yt-dlp`
//! - [`cache`]: TTL cache for resolved links
//! - [`bot`]: Serenity event handler and slash commands
//! - [`ui`]: chat message rendering
//! - [`config`]: environment-based configuration

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod sources;
pub mod ui;
