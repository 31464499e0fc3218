use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest, tracks::TrackHandle, Event, EventContext,
    EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    audio::transport::{AudioTransport, TrackEndNotifier},
    sources::Track,
};

/// Transporte de producción sobre songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            manager,
            http,
            tracks: DashMap::new(),
        })
    }

    fn track(&self, guild_id: GuildId) -> Result<TrackHandle> {
        self.tracks
            .get(&guild_id)
            .map(|handle| handle.clone())
            .with_context(|| format!("No hay track activo en guild {}", guild_id))
    }
}

#[async_trait]
impl AudioTransport for SongbirdTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| anyhow::anyhow!("Error al unirse al canal de voz: {}", e))?;
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, track: &Track, on_end: TrackEndNotifier) -> Result<()> {
        let call = self
            .manager
            .get(guild_id)
            .with_context(|| format!("Sin llamada de voz en guild {}", guild_id))?;

        let input = HttpRequest::new(self.http.clone(), track.source_url().to_string());
        let handle = call.lock().await.play_only_input(input.into());

        // Fin natural, stop y error comparten el mismo aviso de un solo uso
        let signal = EndSignal {
            notifier: Arc::new(Mutex::new(Some(on_end))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), signal.clone()) {
                signal.notifier.lock().take();
                let _ = handle.stop();
                anyhow::bail!("Error al agregar event handler: {}", e);
            }
        }

        debug!("Stream iniciado en guild {}: {}", guild_id, track.source_url());
        self.tracks.insert(guild_id, handle);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<()> {
        self.track(guild_id)?
            .pause()
            .map_err(|e| anyhow::anyhow!("Error al pausar: {}", e))
    }

    async fn resume(&self, guild_id: GuildId) -> Result<()> {
        self.track(guild_id)?
            .play()
            .map_err(|e| anyhow::anyhow!("Error al reanudar: {}", e))
    }

    async fn stop(&self, guild_id: GuildId) -> Result<()> {
        let Some((_, handle)) = self.tracks.remove(&guild_id) else {
            anyhow::bail!("No hay track activo en guild {}", guild_id);
        };
        handle
            .stop()
            .map_err(|e| anyhow::anyhow!("Error al detener: {}", e))
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<()> {
        if let Some((_, handle)) = self.tracks.remove(&guild_id) {
            let _ = handle.stop();
        }

        if self.manager.get(guild_id).is_none() {
            debug!("Guild {} ya no tenía llamada de voz", guild_id);
            return Ok(());
        }

        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| anyhow::anyhow!("Error al salir del canal de voz: {}", e))?;
        info!("👋 Llamada de voz cerrada en guild {}", guild_id);
        Ok(())
    }
}

#[derive(Clone)]
struct EndSignal {
    notifier: Arc<Mutex<Option<TrackEndNotifier>>>,
}

#[async_trait]
impl VoiceEventHandler for EndSignal {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(states) = ctx {
            for (state, _) in states.iter() {
                if let songbird::tracks::PlayMode::Errored(e) = &state.playing {
                    warn!("⚠️ Track terminado con error: {:?}", e);
                }
            }
        }

        if let Some(notifier) = self.notifier.lock().take() {
            debug!("Track terminado (play {})", notifier.play_id());
            notifier.notify();
        }

        None
    }
}
