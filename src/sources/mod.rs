//! # Sources
//!
//! Track metadata and the resolver seam used to turn a user query into
//! playable [`Track`]s. The production resolver shells out to yt-dlp
//! ([`ytdlp::YtDlpResolver`]); [`pack`] builds genre playlists on top of it.

pub mod pack;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;

pub use pack::PackFilter;
pub use ytdlp::YtDlpResolver;

/// Trait común para los backends de búsqueda/extracción
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resuelve una búsqueda libre o una URL directa a un único track
    async fn resolve(&self, query: &str) -> Result<Track>;

    /// Expande una playlist, como máximo `limit` tracks en orden
    async fn playlist(&self, url: &str, limit: usize) -> Result<Vec<Track>>;

    /// Devuelve hasta `limit` resultados de búsqueda con metadata completa
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>>;
}

/// Un elemento reproducible. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    source_url: String,
    thumbnail_url: Option<String>,
    duration_seconds: Option<u64>,
    uploader_name: Option<String>,
    page_url: Option<String>,
}

impl Track {
    /// Crea un track; `title` y `source_url` no pueden estar vacíos.
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Result<Self> {
        let title = title.into();
        let source_url = source_url.into();

        if title.trim().is_empty() {
            anyhow::bail!("El track no tiene título");
        }
        if source_url.trim().is_empty() {
            anyhow::bail!("El track '{}' no tiene URL reproducible", title);
        }

        Ok(Self {
            title,
            source_url,
            thumbnail_url: None,
            duration_seconds: None,
            uploader_name: None,
            page_url: None,
        })
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn source_url(&self) -> &str {
        &self.source_url
    }
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
    pub fn duration_seconds(&self) -> Option<u64> {
        self.duration_seconds
    }
    pub fn uploader_name(&self) -> Option<&str> {
        self.uploader_name.as_deref()
    }
    /// Página pública del video (para enlazar en los embeds)
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    // Builders
    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader_name = Some(uploader.into());
        self
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }
}

/// Detecta si la consulta apunta a una playlist
pub fn is_playlist_query(query: &str) -> bool {
    query.to_lowercase().contains("playlist") || query.contains("list=")
}

/// Detecta si la consulta es una URL directa (y no un término de búsqueda)
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_requires_title_and_source() {
        assert!(Track::new("", "https://cdn.example.com/a.webm").is_err());
        assert!(Track::new("Song", "  ").is_err());

        let track = Track::new("Song", "https://cdn.example.com/a.webm")
            .unwrap()
            .with_duration(215)
            .with_uploader("Artist");
        assert_eq!(track.title(), "Song");
        assert_eq!(track.duration_seconds(), Some(215));
        assert_eq!(track.uploader_name(), Some("Artist"));
        assert_eq!(track.thumbnail_url(), None);
    }

    #[test]
    fn test_playlist_detection() {
        assert!(is_playlist_query(
            "https://www.youtube.com/watch?v=abc&list=PL123"
        ));
        assert!(is_playlist_query("https://www.youtube.com/playlist?list=PL123"));
        assert!(!is_playlist_query("https://youtu.be/dQw4w9WgXcQ"));
        assert!(!is_playlist_query("never gonna give you up"));
    }

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(!is_url("lofi hip hop"));
        assert!(!is_url("ftp://example.com/song.mp3"));
    }
}
