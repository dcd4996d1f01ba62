use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::audio::session::MAX_VOLUME;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub idle_timeout_secs: u64, // 0 desactiva la desconexión por inactividad

    // Resolución
    pub resolve_timeout_secs: u64,
    pub lookup_timeout_secs: u64, // Por cada llamada a yt-dlp
    pub resolver_workers: usize,
    pub playlist_concurrency: usize,
    pub resolution_cache_ttl_secs: u64, // 0 desactiva el cache
    pub resolution_cache_size: usize,
    pub ytdlp_path: String,

    // Presentación
    pub status_page_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Builds a configuration from any key/value source, applying defaults
    /// for every optional key. Does not validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            // Discord
            discord_token: value("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: parse(
                "APPLICATION_ID",
                value("APPLICATION_ID").context("APPLICATION_ID no está definido")?,
            )?,
            guild_id: value("GUILD_ID").map(|v| parse("GUILD_ID", v)).transpose()?,

            // Audio
            default_volume: parse_or(&value, "DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: parse_or(&value, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_playlist_size: parse_or(&value, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            idle_timeout_secs: parse_or(&value, "IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,

            // Resolución
            resolve_timeout_secs: parse_or(
                &value,
                "RESOLVE_TIMEOUT_SECS",
                defaults.resolve_timeout_secs,
            )?,
            lookup_timeout_secs: parse_or(
                &value,
                "LOOKUP_TIMEOUT_SECS",
                defaults.lookup_timeout_secs,
            )?,
            resolver_workers: parse_or(&value, "RESOLVER_WORKERS", defaults.resolver_workers)?,
            playlist_concurrency: parse_or(
                &value,
                "PLAYLIST_CONCURRENCY",
                defaults.playlist_concurrency,
            )?,
            resolution_cache_ttl_secs: parse_or(
                &value,
                "RESOLUTION_CACHE_TTL_SECS",
                defaults.resolution_cache_ttl_secs,
            )?,
            resolution_cache_size: parse_or(
                &value,
                "RESOLUTION_CACHE_SIZE",
                defaults.resolution_cache_size,
            )?,
            ytdlp_path: value("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),

            // Presentación
            status_page_size: parse_or(&value, "STATUS_PAGE_SIZE", defaults.status_page_size)?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - Queue, playlist, page and worker counts must be greater than 0
    /// - The resolve timeout must be greater than 0
    /// - A single lookup must time out before the whole resolution does
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > MAX_VOLUME {
            anyhow::bail!(
                "Default volume must be between 0 and {}, got: {}",
                MAX_VOLUME,
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.lookup_timeout_secs == 0 || self.lookup_timeout_secs >= self.resolve_timeout_secs {
            anyhow::bail!(
                "Lookup timeout must be between 1 and {}s, got: {}",
                self.resolve_timeout_secs.saturating_sub(1),
                self.lookup_timeout_secs
            );
        }

        if self.playlist_concurrency == 0 {
            anyhow::bail!("Playlist concurrency must be greater than 0");
        }

        if self.resolver_workers == 0 {
            anyhow::bail!("Resolver workers must be greater than 0");
        }

        if self.resolution_cache_size == 0 {
            anyhow::bail!("Resolution cache size must be greater than 0");
        }

        if self.status_page_size == 0 {
            anyhow::bail!("Status page size must be greater than 0");
        }

        Ok(())
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn resolution_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.resolution_cache_ttl_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        let idle = if self.idle_timeout_secs == 0 {
            "disabled".to_string()
        } else {
            humantime::format_duration(Duration::from_secs(self.idle_timeout_secs)).to_string()
        };

        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} queue, {} playlist entries, idle {}\n  \
            Resolver: {} workers, {} timeout ({} per lookup, {} playlist entries at once), cache {} x {}, {}\n  \
            Display: {} tracks per page",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_queue_size,
            self.max_playlist_size,
            idle,
            self.resolver_workers,
            humantime::format_duration(self.resolve_timeout()),
            humantime::format_duration(self.lookup_timeout()),
            self.playlist_concurrency,
            self.resolution_cache_size,
            humantime::format_duration(self.resolution_cache_ttl()),
            self.ytdlp_path,
            self.status_page_size,
        )
    }
}

fn parse<T>(key: &str, raw: String) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{} tiene un valor inválido: {:?}", key, raw))
}

fn parse_or<T>(value: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value(key).map_or(Ok(default), |raw| parse(key, raw))
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: MAX_VOLUME,
            max_queue_size: 1000,
            max_playlist_size: 50,
            idle_timeout_secs: 300, // 5 minutos

            // Resolver defaults
            resolve_timeout_secs: 90, // Alcanza para una playlist completa
            lookup_timeout_secs: 20,
            resolver_workers: num_cpus::get().max(1),
            playlist_concurrency: 3,
            resolution_cache_ttl_secs: 600, // Las URLs de stream caducan
            resolution_cache_size: 500,
            ytdlp_path: "yt-dlp".to_string(),

            // Display defaults
            status_page_size: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [("DISCORD_TOKEN", "token"), ("APPLICATION_ID", "42")];

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.application_id, 42);
        assert_eq!(config.guild_id, None);
        assert_eq!(config.default_volume, 100);
        assert_eq!(config.max_playlist_size, 50);
        assert_eq!(config.status_page_size, 15);
        assert_eq!(config.resolve_timeout(), Duration::from_secs(90));
        assert_eq!(config.lookup_timeout(), Duration::from_secs(20));
        assert_eq!(config.playlist_concurrency, 3);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("GUILD_ID", "123"),
            ("DEFAULT_VOLUME", " 40 "),
            ("IDLE_TIMEOUT_SECS", "0"),
            ("RESOLVER_WORKERS", ""),
        ]);

        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.guild_id, Some(123));
        assert_eq!(config.default_volume, 40);
        assert_eq!(config.idle_timeout_secs, 0);
        assert_eq!(config.resolver_workers, num_cpus::get().max(1));
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let error = Config::from_lookup(lookup(&[("APPLICATION_ID", "1")])).unwrap_err();
        assert!(error.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn test_invalid_number_names_the_key() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_QUEUE_SIZE", "lots"));

        let error = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(error.to_string().contains("MAX_QUEUE_SIZE"));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = Config {
            default_volume: 150,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            resolve_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            resolve_timeout_secs: 20,
            lookup_timeout_secs: 20,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("100% vol"));
    }
}
