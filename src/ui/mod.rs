//! # UI Module
//!
//! Rendering for everything the bot says in chat. [`messages`] holds the
//! plain-text announcements and command replies; [`embeds`] builds the
//! `/queue` embed.

pub mod embeds;
pub mod messages;
