use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{player::PlaybackNotice, queue::QueueItem};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox Bot";

/// Canciones listadas en `/queue`
const QUEUE_PREVIEW: usize = 10;

/// Discord rechaza campos de más de 1024 caracteres; se deja sitio para
/// el "...y N más" final
const LISTING_BUDGET: usize = 1000;

/// Largo máximo de un título dentro del listado
const LISTING_TITLE_WIDTH: usize = 60;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(item: &QueueItem) -> CreateEmbed {
    let track = &item.track;
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", track.uploader_name().unwrap_or("Desconocido"), true);

    embed = embed
        .field("⏱️ Duración", duration_label(track.duration_seconds()), true)
        .field("👤 Solicitado por", &item.requested_by, true);

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(page_url) = track.page_url() {
        embed = embed.url(page_url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(item: &QueueItem, position: usize, started: bool) -> CreateEmbed {
    let track = &item.track;
    let (title, footer) = if started {
        ("▶️ Reproduciendo", STANDARD_FOOTER.to_string())
    } else {
        (
            "✅ Canción Agregada",
            format!("📍 Posición {} en la cola", position),
        )
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_label(track.duration_seconds()), true)
        .field("👤 Solicitado por", &item.requested_by, true);

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(page_url) = track.page_url() {
        embed = embed.url(page_url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Crea un embed para un lote agregado (playlist o pack)
pub fn create_batch_added_embed(title: &str, count: usize, started: bool) -> CreateEmbed {
    let description = if count == 1 {
        "Se agregó **1 canción** a la cola de reproducción".to_string()
    } else {
        format!("Se agregaron **{} canciones** a la cola de reproducción", count)
    };

    let footer = if started {
        "▶️ La reproducción comenzó".to_string()
    } else {
        "🎵 Se reproducirán cuando termine la canción actual".to_string()
    };

    CreateEmbed::default()
        .title(format!("📋 {}", title))
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(current: Option<&QueueItem>, queued: &[QueueItem]) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if current.is_none() && queued.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = current {
        embed = embed.field(
            "▶️ Reproduciendo",
            format!("**{}** ({})", current.track.title(), current.requested_by),
            false,
        );
    }

    if !queued.is_empty() {
        embed = embed.field("Próximas canciones", queue_listing(queued), false);
    }

    let total: u64 = queued
        .iter()
        .filter_map(|item| item.track.duration_seconds())
        .sum();
    let mut info = format!("**Total:** {} canciones", queued.len());
    if total > 0 {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(Duration::from_secs(total))
        ));
    }

    embed
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Lista numerada de las primeras canciones, con el resto resumido.
/// Nunca pasa del límite de un campo de embed.
pub fn queue_listing(queued: &[QueueItem]) -> String {
    let mut listing = String::new();
    let mut used = 0;
    let mut shown = 0;

    for (i, item) in queued.iter().take(QUEUE_PREVIEW).enumerate() {
        let duration = item
            .track
            .duration_seconds()
            .map(|secs| format!(" `[{}]`", format_duration(Duration::from_secs(secs))))
            .unwrap_or_default();

        let line = format!(
            "**{}**. {}{} • {}\n",
            i + 1,
            shorten(item.track.title(), LISTING_TITLE_WIDTH),
            duration,
            item.requested_by
        );

        let width = line.chars().count();
        if used + width > LISTING_BUDGET {
            break;
        }
        used += width;
        shown += 1;
        listing.push_str(&line);
    }

    if queued.len() > shown {
        listing.push_str(&format!("...y {} más", queued.len() - shown));
    }

    listing
}

fn shorten(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width - 1).collect();
    short.push('…');
    short
}

/// Traduce un aviso del orquestador a un embed para el canal
pub fn create_notice_embed(notice: &PlaybackNotice) -> CreateEmbed {
    match notice {
        PlaybackNotice::NowPlaying { item, .. } => create_now_playing_embed(item),
        PlaybackNotice::QueueDrained { .. } => create_info_embed(
            "Cola terminada",
            "No quedan canciones. Me desconectaré si nadie agrega música.",
        ),
        PlaybackNotice::IdleDisconnect { .. } => CreateEmbed::default()
            .title("💤 Desconectado por inactividad")
            .description("Usa `/play` para volver a escuchar música")
            .color(colors::WARNING_ORANGE)
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
        PlaybackNotice::TrackFailed { title, reason, .. } => create_error_embed(
            "No se pudo reproducir",
            &format!("**{}**\n{}", title, reason),
        ),
    }
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn duration_label(seconds: Option<u64>) -> String {
    match seconds {
        Some(secs) => format_duration(Duration::from_secs(secs)),
        None => "🔴 En vivo".to_string(),
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
