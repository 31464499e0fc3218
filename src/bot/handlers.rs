use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{error::PlaybackError, player::PlayOutcome},
    bot::{commands::MAX_PACK_SIZE, JukeboxBot},
    ui::{
        buttons::{self, ControlAction},
        embeds,
    },
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );
    bot.remember_channel(guild_id, command.channel_id);

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "genre" => handle_genre(ctx, &command, bot, guild_id).await?,
        "pause" => {
            let result = bot.player.pause(guild_id).await;
            reply_outcome(ctx, &command, guild_id, result.map(|_| "⏸️ Reproducción pausada".to_string())).await?
        }
        "resume" => {
            let result = bot.player.resume(guild_id).await;
            reply_outcome(ctx, &command, guild_id, result.map(|_| "▶️ Reproducción reanudada".to_string())).await?
        }
        "skip" => {
            let result = bot.player.skip(guild_id).await;
            reply_outcome(ctx, &command, guild_id, result.map(|_| "⏭️ Canción saltada".to_string())).await?
        }
        "stop" => {
            let result = bot.player.stop(guild_id).await;
            reply_outcome(
                ctx,
                &command,
                guild_id,
                result.map(|_| "⏹️ Reproducción detenida y cola limpiada".to_string()),
            )
            .await?
        }
        "shuffle" => {
            let result = bot.player.shuffle(guild_id);
            reply_outcome(
                ctx,
                &command,
                guild_id,
                result.map(|count| format!("🔀 Cola mezclada ({} canciones)", count)),
            )
            .await?
        }
        "queue" => {
            let embed = queue_embed(bot, guild_id).await;
            reply_embed(ctx, &command, embed, false).await?
        }
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        _ => {
            reply(ctx, &command, "❌ Comando no reconocido", true).await?;
        }
    }

    Ok(())
}

/// Maneja los botones del reproductor
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = ControlAction::from_custom_id(&component.data.custom_id) else {
        return respond_component(
            ctx,
            &component,
            CreateInteractionResponseMessage::new().content("❌ Acción no reconocida"),
        )
        .await;
    };

    let result = match action {
        ControlAction::PlayPause => {
            if bot.player.is_playing(guild_id).await {
                bot.player
                    .pause(guild_id)
                    .await
                    .map(|_| "⏸️ Pausado".to_string())
            } else {
                bot.player
                    .resume(guild_id)
                    .await
                    .map(|_| "▶️ Reanudado".to_string())
            }
        }
        ControlAction::Skip => bot.player.skip(guild_id).await.map(|_| "⏭️ Saltado".to_string()),
        ControlAction::Stop => bot.player.stop(guild_id).await.map(|_| "⏹️ Detenido".to_string()),
        ControlAction::Shuffle => bot
            .player
            .shuffle(guild_id)
            .map(|count| format!("🔀 Cola mezclada ({} canciones)", count)),
        ControlAction::Queue => {
            let embed = queue_embed(bot, guild_id).await;
            return respond_component(
                ctx,
                &component,
                CreateInteractionResponseMessage::new().embed(embed),
            )
            .await;
        }
    };

    let content = match result {
        Ok(content) => content,
        Err(e) => failure_text(&e, guild_id),
    };
    respond_component(
        ctx,
        &component,
        CreateInteractionResponseMessage::new().content(content),
    )
    .await
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Resolver puede tardar varios segundos
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id);
    let requester = format!("<@{}>", command.user.id);

    let embed = match bot
        .player
        .request(guild_id, voice_channel_id, query, &requester)
        .await
    {
        Ok(PlayOutcome::Track {
            item,
            position,
            started,
        }) => embeds::create_track_added_embed(&item, position, started),
        Ok(PlayOutcome::Batch { count, started }) => {
            embeds::create_batch_added_embed("Playlist Agregada", count, started)
        }
        Err(e) => embeds::create_error_embed("Error", &failure_text(&e, guild_id)),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_genre(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let genre = string_option(command, "genre")
        .ok_or_else(|| anyhow::anyhow!("Género no proporcionado"))?;
    let count = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "count")
        .and_then(|opt| opt.value.as_i64())
        .and_then(|n| usize::try_from(n.clamp(1, MAX_PACK_SIZE as i64)).ok())
        .unwrap_or(bot.config().pack_size);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id);
    let requester = format!("<@{}>", command.user.id);

    let embed = match bot
        .player
        .request_pack(guild_id, voice_channel_id, genre, count, &requester)
        .await
    {
        Ok(PlayOutcome::Batch { count, started }) => {
            embeds::create_batch_added_embed(&format!("Pack de {}", genre), count, started)
        }
        Ok(PlayOutcome::Track {
            item,
            position,
            started,
        }) => embeds::create_track_added_embed(&item, position, started),
        Err(e) => embeds::create_error_embed("Error", &failure_text(&e, guild_id)),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(item) = bot.player.now_playing(guild_id).await else {
        let content = if bot.player.is_connected(guild_id).await {
            "💤 Estoy en el canal pero no suena nada"
        } else {
            "❌ No hay música reproduciéndose"
        };
        return reply(ctx, command, content, true).await;
    };

    let paused = bot.player.is_paused(guild_id).await;
    let mut message = CreateInteractionResponseMessage::new()
        .embed(embeds::create_now_playing_embed(&item))
        .components(buttons::create_player_controls(paused));

    let queued = bot.player.queue_size(guild_id);
    if queued > 0 {
        message = message.content(format!("📋 {} canciones en cola", queued));
    }

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

// Funciones auxiliares

async fn queue_embed(bot: &JukeboxBot, guild_id: GuildId) -> CreateEmbed {
    let current = bot.player.now_playing(guild_id).await;
    let queued = bot.player.queue_snapshot(guild_id);
    embeds::create_queue_embed(current.as_ref(), &queued)
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

/// Texto para el usuario; los fallos esperables no ensucian el log de errores
fn failure_text(error: &PlaybackError, guild_id: GuildId) -> String {
    if error.is_benign() {
        debug!("Comando rechazado en guild {}: {}", guild_id, error);
    } else {
        warn!("⚠️ Comando fallido en guild {}: {}", guild_id, error);
    }
    error.user_message()
}

async fn reply_outcome(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    outcome: Result<String, PlaybackError>,
) -> Result<()> {
    match outcome {
        Ok(content) => reply(ctx, command, &content, false).await,
        Err(e) => reply(ctx, command, &failure_text(&e, guild_id), true).await,
    }
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_component(
    ctx: &Context,
    component: &ComponentInteraction,
    message: CreateInteractionResponseMessage,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(message.ephemeral(true)),
        )
        .await?;
    Ok(())
}

/// Canal de voz del usuario según la caché; `None` si no está en ninguno
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
