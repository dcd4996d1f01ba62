//! # Cache Module
//!
//! Time-bounded caching for resolver output.
//!
//! Resolving a link means spawning `yt-dlp` and waiting on the network, so
//! repeated requests for the same link within a short window reuse the
//! previous answer. Stream URLs handed out by the extractor expire on the
//! provider side, which is why every entry carries a TTL.
//!
//! ```env
//! RESOLUTION_CACHE_TTL_SECS=600   # 0 disables the cache
//! ```

pub mod ttl_cache;

use tracing::info;

use crate::audio::track::TrackDescriptor;
pub use ttl_cache::{CacheMetrics, TtlCache};

/// Resolved single-link tracks keyed by normalized link.
///
/// The stored requester is meaningless: callers re-stamp it with
/// [`TrackDescriptor::for_requester`] on every hit.
pub type ResolutionCache = TtlCache<String, TrackDescriptor>;

impl ResolutionCache {
    /// Drops expired entries and logs how many went away.
    pub fn cleanup_old_entries(&self) -> usize {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache de resoluciones: {} entradas expiradas eliminadas", removed);
        }
        removed
    }
}
