use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audio::transport::GuildEvent;

/// Tiempo de inactividad antes de desconectar (5 minutos)
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

struct ArmedTimer {
    generation: u64,
    token: CancellationToken,
}

/// Temporizadores de inactividad por guild.
///
/// Armar uno reemplaza (y cancela) el anterior de la misma guild, así que
/// nunca hay más de uno pendiente. Al vencer no desconecta por sí mismo:
/// envía [`GuildEvent::InactivityExpired`] para que el orquestador decida
/// bajo el lock de la guild.
pub struct InactivityTimer {
    timeout: Duration,
    armed: DashMap<GuildId, ArmedTimer>,
    generations: AtomicU64,
    events: flume::Sender<GuildEvent>,
}

impl InactivityTimer {
    pub fn new(timeout: Duration, events: flume::Sender<GuildEvent>) -> Self {
        Self {
            timeout,
            armed: DashMap::new(),
            generations: AtomicU64::new(0),
            events,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Cancela el temporizador pendiente (si hay) y arma uno nuevo.
    /// Devuelve la generación del nuevo.
    pub fn reset(&self, guild_id: GuildId) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        let previous = self.armed.insert(
            guild_id,
            ArmedTimer {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            debug!("⏲️ Temporizador de inactividad reiniciado en guild {}", guild_id);
        }

        let timeout = self.timeout;
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = events.send(GuildEvent::InactivityExpired { guild_id, generation });
                }
            }
        });

        generation
    }

    /// Cancela el temporizador pendiente. `false` si no había ninguno.
    pub fn cancel(&self, guild_id: GuildId) -> bool {
        match self.armed.remove(&guild_id) {
            Some((_, timer)) => {
                timer.token.cancel();
                debug!("⏲️ Temporizador de inactividad cancelado en guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    /// Reclama el vencimiento `generation`. Solo tiene éxito si sigue siendo
    /// el temporizador vigente de la guild; en ese caso lo desarma.
    pub fn claim(&self, guild_id: GuildId, generation: u64) -> bool {
        self.armed
            .remove_if(&guild_id, |_, timer| timer.generation == generation)
            .is_some()
    }

    #[cfg(test)]
    pub fn is_armed(&self, guild_id: GuildId) -> bool {
        self.armed.contains_key(&guild_id)
    }

    /// Temporizadores pendientes en todas las guilds
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Veces que se armó un temporizador desde el arranque
    #[cfg(test)]
    pub fn arm_count(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }
}
