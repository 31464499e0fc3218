use anyhow::Result;
use std::collections::HashSet;
use tracing::{debug, info};

use super::{Track, TrackResolver};

/// Duración máxima (segundos) de un track aceptado en un pack
pub const DEFAULT_MAX_DURATION: u64 = 600;

/// Palabras que delatan compilaciones o videos de varias horas
pub const DEFAULT_BLOCKED_KEYWORDS: &[&str] =
    &["mix", "compilation", "playlist", "hour", "hours", "full album"];

/// Cuántos candidatos se piden por cada track deseado
const CANDIDATE_FACTOR: usize = 3;

/// Filtro de candidatos para playlists generadas por género/tema
#[derive(Debug, Clone)]
pub struct PackFilter {
    max_duration: u64,
    blocked_keywords: Vec<String>,
}

impl Default for PackFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_DURATION,
            DEFAULT_BLOCKED_KEYWORDS.iter().map(|k| k.to_string()),
        )
    }
}

impl PackFilter {
    pub fn new(max_duration: u64, blocked_keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            max_duration,
            blocked_keywords: blocked_keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Selecciona como máximo `count` candidatos, en orden.
    ///
    /// Descarta duplicados (título exacto), tracks más largos que el máximo
    /// (la duración desconocida se acepta) y títulos con palabras bloqueadas.
    /// Devolver menos de `count` no es un error.
    pub fn select(&self, candidates: impl IntoIterator<Item = Track>, count: usize) -> Vec<Track> {
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();

        for track in candidates {
            if accepted.len() >= count {
                break;
            }

            if seen.contains(track.title()) {
                debug!("Duplicado descartado: {}", track.title());
                continue;
            }

            if let Some(duration) = track.duration_seconds() {
                if duration > self.max_duration {
                    debug!("Video largo descartado: {} ({}s)", track.title(), duration);
                    continue;
                }
            }

            if self.is_blocked(track.title()) {
                debug!("Compilación descartada: {}", track.title());
                continue;
            }

            seen.insert(track.title().to_string());
            accepted.push(track);
        }

        accepted
    }

    fn is_blocked(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.blocked_keywords
            .iter()
            .any(|keyword| title.contains(keyword.as_str()))
    }
}

/// Consulta de búsqueda usada para un género
pub fn pack_query(genre: &str) -> String {
    format!("{} song -mix -compilation -hour -hours -playlist", genre.trim())
}

/// Genera un pack de hasta `count` canciones para un género o tema
pub async fn generate_pack(
    resolver: &dyn TrackResolver,
    filter: &PackFilter,
    genre: &str,
    count: usize,
) -> Result<Vec<Track>> {
    info!("🎲 Buscando {} canciones de {}", count, genre);

    let candidates = resolver
        .search(&pack_query(genre), count.saturating_mul(CANDIDATE_FACTOR))
        .await?;
    let pack = filter.select(candidates, count);

    info!("✅ Pack de {} generado con {} canciones", genre, pack.len());
    Ok(pack)
}
