use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tracing::debug;

use crate::sources::Track;

/// Notificaciones asíncronas que llegan al bucle del orquestador
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuildEvent {
    /// Terminó (naturalmente, por skip o por error) la reproducción `play_id`
    TrackEnded { guild_id: GuildId, play_id: u64 },
    /// Venció el temporizador de inactividad armado con `generation`
    InactivityExpired { guild_id: GuildId, generation: u64 },
}

impl GuildEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::TrackEnded { guild_id, .. } | Self::InactivityExpired { guild_id, .. } => {
                *guild_id
            }
        }
    }
}

/// Aviso de fin de track. Se consume al notificar, así que se entrega como
/// mucho una vez por cada llamada a `play`.
#[derive(Debug)]
pub struct TrackEndNotifier {
    guild_id: GuildId,
    play_id: u64,
    events: flume::Sender<GuildEvent>,
}

impl TrackEndNotifier {
    pub(crate) fn new(guild_id: GuildId, play_id: u64, events: flume::Sender<GuildEvent>) -> Self {
        Self {
            guild_id,
            play_id,
            events,
        }
    }

    pub fn play_id(&self) -> u64 {
        self.play_id
    }

    pub fn notify(self) {
        let event = GuildEvent::TrackEnded {
            guild_id: self.guild_id,
            play_id: self.play_id,
        };
        if self.events.send(event).is_err() {
            debug!("Bucle de eventos cerrado, fin de track {} descartado", self.play_id);
        }
    }
}

/// Transporte de audio externo (conexión de voz + streaming).
///
/// `play` debe invocar `on_end` exactamente una vez cuando el track termina,
/// salvo que devuelva `Err`, en cuyo caso no lo invoca nunca.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()>;

    async fn play(&self, guild_id: GuildId, track: &Track, on_end: TrackEndNotifier) -> Result<()>;

    async fn pause(&self, guild_id: GuildId) -> Result<()>;

    async fn resume(&self, guild_id: GuildId) -> Result<()>;

    /// Detiene el track actual; su `on_end` se dispara igual que al terminar
    async fn stop(&self, guild_id: GuildId) -> Result<()>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<()>;
}
