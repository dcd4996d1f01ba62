use serenity::model::id::UserId;
use std::time::Duration;

/// A resolved, playable track.
///
/// Built once by a resolver and never mutated afterwards; the queue entry
/// holding it owns it until it is played or discarded. The only way to
/// "change" a descriptor is to build a new one, which is what
/// [`TrackDescriptor::for_requester`] does for cached resolutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    title: String,
    artist: Option<String>,
    source_uri: String,
    stream_uri: String,
    requested_by: UserId,
    duration: Option<Duration>,
}

impl TrackDescriptor {
    pub fn new(
        title: impl Into<String>,
        source_uri: impl Into<String>,
        stream_uri: impl Into<String>,
        requested_by: UserId,
    ) -> Self {
        Self {
            title: title.into(),
            artist: None,
            source_uri: source_uri.into(),
            stream_uri: stream_uri.into(),
            requested_by,
            duration: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Copy of this descriptor attributed to another requester.
    pub fn for_requester(&self, requested_by: UserId) -> Self {
        Self {
            requested_by,
            ..self.clone()
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    /// Page the track was resolved from (what a user would share).
    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    /// Direct media URL handed to the transport.
    pub fn stream_uri(&self) -> &str {
        &self.stream_uri
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}
