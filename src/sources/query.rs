use url::Url;

/// What kind of lookup a user query needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// A single playable link.
    Direct(String),
    /// A playlist link; every entry is resolved on its own.
    Playlist(String),
    /// Free text; the top search result is used.
    Search(String),
}

impl QueryKind {
    /// Clasifica la consulta del usuario
    pub fn classify(query: &str) -> Self {
        let query = query.trim();

        if !(query.starts_with("http://") || query.starts_with("https://")) {
            QueryKind::Search(query.to_string())
        } else if is_playlist_url(query) {
            QueryKind::Playlist(query.to_string())
        } else {
            QueryKind::Direct(query.to_string())
        }
    }

    /// Target string handed to the metadata backend.
    pub fn target(&self) -> String {
        match self {
            QueryKind::Direct(url) | QueryKind::Playlist(url) => url.clone(),
            QueryKind::Search(text) => format!("ytsearch1:{}", text),
        }
    }
}

/// Rough check for YouTube playlist links: `/playlist` pages, and watch or
/// short links that carry a `list=` parameter.
pub fn is_playlist_url(url: &str) -> bool {
    let url = url.to_lowercase();

    url.contains("youtube.com/playlist")
        || ((url.contains("youtube.com/watch") || url.contains("youtu.be/"))
            && url.contains("list="))
}

/// Key under which a direct link's resolution is cached. Links that parse
/// are normalized (lowercase host, no fragment) so trivial variants share
/// an entry.
pub fn cache_key(link: &str) -> String {
    match Url::parse(link) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => link.to_string(),
    }
}

/// Canonical watch URL for a playlist entry given either its id or its URL.
pub fn entry_url(id_or_url: &str) -> Option<String> {
    let value = id_or_url.trim();
    if value.is_empty() {
        return None;
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        Some(value.to_string())
    } else if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Some(format!("https://www.youtube.com/watch?v={}", value))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_queries() {
        assert_eq!(
            QueryKind::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            QueryKind::Direct("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into())
        );
        assert_eq!(
            QueryKind::classify("  never gonna give you up "),
            QueryKind::Search("never gonna give you up".into())
        );
        assert_eq!(
            QueryKind::classify("ftp://example.com/song.mp3"),
            QueryKind::Search("ftp://example.com/song.mp3".into())
        );
    }

    #[test]
    fn test_playlist_detection() {
        assert!(is_playlist_url("https://www.youtube.com/playlist?list=PL123"));
        assert!(is_playlist_url("https://www.YouTube.com/watch?v=abc&list=PL123"));
        assert!(is_playlist_url("https://youtu.be/abc?list=PL123"));
        assert!(!is_playlist_url("https://www.youtube.com/watch?v=abc"));
        assert!(!is_playlist_url("https://example.com/list=1"));
    }

    #[test]
    fn test_search_target_uses_top_result() {
        assert_eq!(QueryKind::classify("lofi beats").target(), "ytsearch1:lofi beats");
    }

    #[test]
    fn test_cache_key_normalizes_links() {
        assert_eq!(
            cache_key("https://WWW.YouTube.com/watch?v=abc#t=10"),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(cache_key("https://"), "https://");
    }

    #[test]
    fn test_entry_url() {
        assert_eq!(
            entry_url("dQw4w9WgXcQ").as_deref(),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
        assert_eq!(
            entry_url("https://youtu.be/x").as_deref(),
            Some("https://youtu.be/x")
        );
        assert_eq!(entry_url(""), None);
        assert_eq!(entry_url("not an id"), None);
    }
}
