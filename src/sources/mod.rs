//! # Sources
//!
//! Turns what a user typed into playable [`TrackDescriptor`]s.
//!
//! - [`query`] decides whether a query is a direct link, a playlist link or
//!   free text to search for.
//! - [`extractor`] implements [`Resolver`] on top of any
//!   [`MetadataBackend`](extractor::MetadataBackend), including the playlist
//!   partial-failure accounting and the error classification.
//! - [`ytdlp`] is the backend that shells out to `yt-dlp`.
//! - [`pool`] bounds how many resolutions run at once and enforces the
//!   deadline, so a lookup that never returns cannot wedge a guild.

pub mod extractor;
pub mod pool;
pub mod query;
pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;
use tokio::time::Instant;

use crate::audio::{error::ResolutionError, track::TrackDescriptor};

pub use extractor::ExtractorResolver;
pub use pool::ResolverPool;
pub use query::QueryKind;
pub use ytdlp::YtDlpBackend;

/// Tracks produced for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved tracks, in source order. Never empty.
    pub tracks: Vec<TrackDescriptor>,
    /// Playlist entries that were skipped because they failed to resolve.
    pub failed: usize,
}

/// Something that can turn a query into tracks.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `query` on behalf of `requested_by`.
    ///
    /// Direct links yield exactly one track and searches at most one.
    /// Playlists yield every entry that resolved; the call only fails with
    /// [`ResolutionError::NoResults`] when none did.
    ///
    /// The caller gives up at `deadline`. Resolvers that can return a
    /// partial result should do so before it.
    async fn resolve(
        &self,
        query: &str,
        requested_by: UserId,
        deadline: Instant,
    ) -> Result<Resolution, ResolutionError>;
}
