use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{is_url, Track, TrackResolver};

/// Resolver que usa yt-dlp como backend de búsqueda y extracción
pub struct YtDlpResolver {
    binary: String,
}

/// Entrada completa devuelta por `yt-dlp -j`
#[derive(Debug, Deserialize)]
struct VideoEntry {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
}

/// Playlist devuelta por `yt-dlp -J --flat-playlist`
#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    title: Option<String>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify(&self) -> Result<String> {
        let output = async_process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            anyhow::bail!("{} --version terminó con {}", self.binary, output.status);
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("🔧 {} {}", self.binary, args.join(" "));

        let output = async_process::Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp falló: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Ejecuta yt-dlp en modo `-j` y parsea una entrada por línea
    async fn extract_entries(&self, target: &str) -> Result<Vec<Track>> {
        let stdout = self
            .run(&[
                "-j",
                "-f",
                "bestaudio",
                "--no-playlist",
                "--no-warnings",
                "--socket-timeout",
                "30",
                target,
            ])
            .await?;

        Ok(parse_entries(&stdout))
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track> {
        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };

        self.extract_entries(&target)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No se encontraron resultados para '{}'", query))
    }

    async fn playlist(&self, url: &str, limit: usize) -> Result<Vec<Track>> {
        let limit_arg = limit.to_string();
        let stdout = self
            .run(&[
                "-J",
                "--flat-playlist",
                "--playlist-end",
                &limit_arg,
                "--no-warnings",
                url,
            ])
            .await?;

        let playlist: FlatPlaylist =
            serde_json::from_str(&stdout).context("Respuesta de playlist inválida")?;

        let mut tracks = Vec::new();
        for entry in playlist.entries.into_iter().flatten().take(limit) {
            let video_url = format!("https://www.youtube.com/watch?v={}", entry.id);
            match self.extract_entries(&video_url).await {
                Ok(resolved) => {
                    if let Some(track) = resolved.into_iter().next() {
                        // El título de la playlist es más fiable que el del stream
                        let track = match entry.title {
                            Some(title) if !title.is_empty() => retitle(track, title),
                            _ => track,
                        };
                        tracks.push(track);
                    }
                }
                Err(e) => warn!("⏭️ Saltando entrada {} de la playlist: {}", entry.id, e),
            }
        }

        info!("📋 Playlist expandida: {} tracks", tracks.len());
        Ok(tracks)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let target = format!("ytsearch{}:{}", limit, query);
        self.extract_entries(&target).await
    }
}

fn parse_entries(stdout: &str) -> Vec<Track> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<VideoEntry>(line) {
            Ok(entry) => entry.into_track(),
            Err(e) => {
                warn!("JSON de yt-dlp ignorado: {}", e);
                None
            }
        })
        .collect()
}

fn retitle(track: Track, title: String) -> Track {
    match Track::new(title, track.source_url()) {
        Ok(mut renamed) => {
            if let Some(thumbnail) = track.thumbnail_url() {
                renamed = renamed.with_thumbnail(thumbnail);
            }
            if let Some(duration) = track.duration_seconds() {
                renamed = renamed.with_duration(duration);
            }
            if let Some(uploader) = track.uploader_name() {
                renamed = renamed.with_uploader(uploader);
            }
            if let Some(page) = track.page_url() {
                renamed = renamed.with_page_url(page);
            }
            renamed
        }
        Err(_) => track,
    }
}

impl VideoEntry {
    fn into_track(self) -> Option<Track> {
        let mut track = Track::new(self.title?, self.url?).ok()?;

        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        if let Some(duration) = self.duration.filter(|d| *d >= 0.0) {
            track = track.with_duration(duration.round() as u64);
        }
        if let Some(uploader) = self.uploader {
            track = track.with_uploader(uploader);
        }
        if let Some(page) = self.webpage_url {
            track = track.with_page_url(page);
        }

        Some(track)
    }
}
