use async_process::{Command, Output};
use async_trait::async_trait;
use serde::Deserialize;
use std::{io, time::Duration};
use tracing::{debug, info, warn};

use super::extractor::{BackendError, MetadataBackend, PlaylistEntry, TrackMetadata};

/// Segundos que yt-dlp espera a un socket antes de rendirse
const SOCKET_TIMEOUT: &str = "15";

/// Información extraída de yt-dlp con `--dump-json`
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    /// URL del formato elegido con `-f`
    url: Option<String>,
}

/// Fila de `--flat-playlist`
#[derive(Debug, Default, Deserialize)]
struct YtDlpFlatEntry {
    id: Option<String>,
    url: Option<String>,
}

/// [`MetadataBackend`] that runs the `yt-dlp` executable.
///
/// Child processes are killed if the lookup future is dropped, so a resolver
/// timeout does not leave orphaned extractors behind.
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    binary: String,
}

impl YtDlpBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs `yt-dlp --version`; used as a startup dependency check.
    pub async fn version(&self) -> Result<String, BackendError> {
        let output = self.run(&["--version"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<Output, BackendError> {
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_failure(&self.binary, e))?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp terminó con {}: {}", output.status, stderr.trim());
            Err(classify_failure(&stderr))
        }
    }
}

#[async_trait]
impl MetadataBackend for YtDlpBackend {
    async fn lookup(&self, target: &str) -> Result<Option<TrackMetadata>, BackendError> {
        debug!("📊 Obteniendo info de: {}", target);

        let output = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--no-warnings",
                "--socket-timeout",
                SOCKET_TIMEOUT,
                "-f",
                "bestaudio/best",
                target,
            ])
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(line) = stdout.lines().find(|line| !line.trim().is_empty()) else {
            // Una búsqueda sin resultados termina bien pero sin salida
            return Ok(None);
        };

        let info: YtDlpInfo = serde_json::from_str(line)
            .map_err(|e| BackendError::Malformed(format!("invalid JSON: {e}")))?;

        info_to_metadata(info, target).map(Some)
    }

    async fn list_playlist(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistEntry>, BackendError> {
        info!("📋 Listando playlist: {}", url);

        let limit = limit.to_string();
        let output = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &limit,
                "--no-warnings",
                "--socket-timeout",
                SOCKET_TIMEOUT,
                url,
            ])
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_flat_entry)
            .collect())
    }
}

fn info_to_metadata(info: YtDlpInfo, target: &str) -> Result<TrackMetadata, BackendError> {
    let stream_url = info
        .url
        .ok_or_else(|| BackendError::Malformed("no playable format in output".into()))?;

    let webpage_url = match info.webpage_url {
        Some(page) => page,
        None if target.starts_with("http") => target.to_string(),
        None => stream_url.clone(),
    };

    Ok(TrackMetadata {
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
        artist: info.uploader,
        duration: info
            .duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64),
        webpage_url,
        stream_url,
    })
}

/// Una línea ilegible cuenta como entrada vacía
fn parse_flat_entry(line: &str) -> PlaylistEntry {
    let entry: YtDlpFlatEntry = serde_json::from_str(line).unwrap_or_default();
    PlaylistEntry {
        id: entry.id,
        url: entry.url,
    }
}

fn spawn_failure(binary: &str, error: io::Error) -> BackendError {
    match error.kind() {
        io::ErrorKind::NotFound => {
            BackendError::Unreachable(format!("{binary} not found, install it with `pip install yt-dlp`"))
        }
        _ => BackendError::Unreachable(format!("failed to run {binary}: {error}")),
    }
}

const UNAVAILABLE_MARKERS: &[&str] = &[
    "private video",
    "video unavailable",
    "is not available",
    "has been removed",
    "sign in to confirm your age",
    "members-only",
    "unsupported url",
    "does not exist",
];

const UNREACHABLE_MARKERS: &[&str] = &[
    "unable to download",
    "http error 5",
    "http error 429",
    "timed out",
    "temporary failure in name resolution",
    "connection refused",
    "connection reset",
    "network is unreachable",
];

/// Clasifica el stderr de yt-dlp
fn classify_failure(stderr: &str) -> BackendError {
    let lower = stderr.to_lowercase();
    let reason = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("yt-dlp failed")
        .trim()
        .to_string();

    if UNAVAILABLE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        BackendError::Unavailable(reason)
    } else if UNREACHABLE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        BackendError::Unreachable(reason)
    } else {
        BackendError::Unavailable(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_info_to_metadata() {
        let info: YtDlpInfo = serde_json::from_str(
            r#"{"id":"abc","title":"Song","uploader":"Band","duration":212.5,
                "webpage_url":"https://www.youtube.com/watch?v=abc",
                "url":"https://rr1.googlevideo.com/videoplayback?id=abc"}"#,
        )
        .unwrap();

        let metadata = info_to_metadata(info, "ytsearch1:song").unwrap();

        assert_eq!(metadata.title, "Song");
        assert_eq!(metadata.artist.as_deref(), Some("Band"));
        assert_eq!(metadata.duration, Some(Duration::from_secs_f64(212.5)));
        assert_eq!(metadata.webpage_url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(
            metadata.stream_url,
            "https://rr1.googlevideo.com/videoplayback?id=abc"
        );
    }

    #[test]
    fn test_info_without_stream_is_malformed() {
        let info: YtDlpInfo = serde_json::from_str(r#"{"title":"Song"}"#).unwrap();
        assert!(matches!(
            info_to_metadata(info, "https://example.com/a"),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn test_direct_file_uses_link_as_page() {
        let info: YtDlpInfo =
            serde_json::from_str(r#"{"url":"https://cdn.example.com/a.mp3","duration":null}"#)
                .unwrap();

        let metadata = info_to_metadata(info, "https://example.com/a").unwrap();

        assert_eq!(metadata.title, "Unknown");
        assert_eq!(metadata.webpage_url, "https://example.com/a");
        assert_eq!(metadata.duration, None);
    }

    #[test]
    fn test_parse_flat_entries() {
        assert_eq!(
            parse_flat_entry(r#"{"_type":"url","id":"abc","url":"https://www.youtube.com/watch?v=abc"}"#),
            PlaylistEntry {
                id: Some("abc".into()),
                url: Some("https://www.youtube.com/watch?v=abc".into()),
            }
        );
        assert_eq!(parse_flat_entry("not json"), PlaylistEntry::default());
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("ERROR: [youtube] abc: Private video. Sign in if you've been granted access\n"),
            BackendError::Unavailable(
                "ERROR: [youtube] abc: Private video. Sign in if you've been granted access".into()
            )
        );
        assert!(matches!(
            classify_failure("ERROR: Unable to download webpage: <urlopen error timed out>"),
            BackendError::Unreachable(_)
        ));
        assert!(matches!(
            classify_failure(""),
            BackendError::Unavailable(reason) if reason == "yt-dlp failed"
        ));
    }

    #[test]
    fn test_missing_binary_is_unreachable() {
        let error = spawn_failure("yt-dlp", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(error, BackendError::Unreachable(reason) if reason.contains("not found")));
    }
}
