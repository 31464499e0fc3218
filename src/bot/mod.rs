//! # Bot Module
//!
//! Discord front end for Jukebox Bot.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands, dispatches interactions to [`handlers`], reports external
//! voice disconnects to the orchestrator and forwards
//! [`PlaybackNotice`]s to the channel where each guild last used a command.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
    http::Http,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::player::{PlaybackNotice, PlaybackOrchestrator},
    config::Config,
    ui::{buttons, embeds},
};

pub struct JukeboxBot {
    config: Arc<Config>,
    pub player: Arc<PlaybackOrchestrator>,
    /// Último canal de texto donde se usó un comando, por guild
    announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    notices: parking_lot::Mutex<Option<flume::Receiver<PlaybackNotice>>>,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        player: Arc<PlaybackOrchestrator>,
        notices: flume::Receiver<PlaybackNotice>,
    ) -> Self {
        Self {
            config,
            player,
            announce_channels: Arc::new(DashMap::new()),
            notices: parking_lot::Mutex::new(Some(notices)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Recuerda dónde anunciar los avisos de reproducción de la guild
    pub fn remember_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.announce_channels.insert(guild_id, channel_id);
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Arranca el reenvío de avisos. Solo la primera vez que se llama.
    fn spawn_notice_forwarder(&self, http: Arc<Http>) {
        let Some(notices) = self.notices.lock().take() else {
            return;
        };
        let channels = Arc::clone(&self.announce_channels);
        let player = Arc::clone(&self.player);

        tokio::spawn(async move {
            while let Ok(notice) = notices.recv_async().await {
                let guild_id = notice_guild(&notice);
                let Some(channel_id) = channels.get(&guild_id).map(|c| *c) else {
                    debug!("Sin canal de anuncios para guild {}", guild_id);
                    continue;
                };

                let mut message = CreateMessage::new().embed(embeds::create_notice_embed(&notice));
                if matches!(notice, PlaybackNotice::NowPlaying { .. }) {
                    let paused = player.is_paused(guild_id).await;
                    message = message.components(buttons::create_player_controls(paused));
                }

                if let Err(e) = channel_id.send_message(&*http, message).await {
                    warn!("No se pudo anunciar en el canal {}: {:?}", channel_id, e);
                }
            }
            debug!("Reenvío de avisos terminado");
        });
    }
}

fn notice_guild(notice: &PlaybackNotice) -> GuildId {
    match notice {
        PlaybackNotice::NowPlaying { guild_id, .. }
        | PlaybackNotice::QueueDrained { guild_id }
        | PlaybackNotice::IdleDisconnect { guild_id }
        | PlaybackNotice::TrackFailed { guild_id, .. } => *guild_id,
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.spawn_notice_forwarder(Arc::clone(&ctx.http));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Detecta cuando sacan al bot del canal de voz desde fuera
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            self.player.handle_forced_disconnect(guild_id).await;
        }
    }
}
