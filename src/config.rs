use anyhow::{Context, Result};
use std::time::Duration;

use crate::sources::pack::{DEFAULT_BLOCKED_KEYWORDS, DEFAULT_MAX_DURATION};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub inactivity_timeout: Duration,
    pub max_queue_size: usize,
    pub playlist_limit: usize,

    // Packs por género
    pub pack_size: usize,
    pub pack_max_duration: u64, // En segundos
    pub pack_blocked_keywords: Vec<String>,

    // Herramientas externas
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("Falta APPLICATION_ID")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Reproducción
            inactivity_timeout: humantime::parse_duration(
                &std::env::var("INACTIVITY_TIMEOUT").unwrap_or_else(|_| "5m".to_string()),
            )
            .context("INACTIVITY_TIMEOUT inválido (ej: 5m, 90s)")?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            playlist_limit: std::env::var("PLAYLIST_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Packs
            pack_size: std::env::var("PACK_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            pack_max_duration: std::env::var("PACK_MAX_DURATION")
                .unwrap_or_else(|_| DEFAULT_MAX_DURATION.to_string())
                .parse()?,
            pack_blocked_keywords: std::env::var("PACK_BLOCKED_KEYWORDS")
                .map(|raw| parse_keywords(&raw))
                .unwrap_or_else(|_| {
                    DEFAULT_BLOCKED_KEYWORDS.iter().map(|k| k.to_string()).collect()
                }),

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Rechaza valores que dejarían al bot sin poder reproducir nada
    pub fn validate(&self) -> Result<()> {
        if self.inactivity_timeout.is_zero() {
            anyhow::bail!("Inactivity timeout must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.playlist_limit == 0 {
            anyhow::bail!("Playlist limit must be greater than 0");
        }

        if self.pack_size == 0 {
            anyhow::bail!("Pack size must be greater than 0");
        }

        if self.pack_max_duration == 0 {
            anyhow::bail!("Pack max duration must be greater than 0");
        }

        if self.ytdlp_path.trim().is_empty() {
            anyhow::bail!("YTDLP_PATH cannot be empty");
        }

        Ok(())
    }

    /// Resumen para logs, sin el token
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {} idle timeout, {} queue, {} playlist tracks\n  \
            Packs: {} tracks, {}s max, {} blocked keywords\n  \
            yt-dlp: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            humantime::format_duration(self.inactivity_timeout),
            self.max_queue_size,
            self.playlist_limit,
            self.pack_size,
            self.pack_max_duration,
            self.pack_blocked_keywords.len(),
            self.ytdlp_path,
        )
    }
}

fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            inactivity_timeout: Duration::from_secs(300),
            max_queue_size: 1000,
            playlist_limit: 10,

            pack_size: 10,
            pack_max_duration: DEFAULT_MAX_DURATION,
            pack_blocked_keywords: DEFAULT_BLOCKED_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),

            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = Config {
            max_queue_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            inactivity_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(
            parse_keywords(" Mix, ,Full Album ,hour"),
            vec!["mix", "full album", "hour"]
        );
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("5m"));
    }
}
