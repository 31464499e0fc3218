use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Tamaño máximo que se acepta en `/genre count`
pub const MAX_PACK_SIZE: u64 = 25;

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        genre_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        shuffle_command(),
        queue_command(),
        nowplaying_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn genre_command() -> CreateCommand {
    CreateCommand::new("genre")
        .description("Genera una lista de canciones de un género")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "genre", "Género o temática")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "count", "Cantidad de canciones")
                .min_int_value(1)
                .max_int_value(MAX_PACK_SIZE),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, limpia la cola y desconecta")
}

// Comandos de cola

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones de la cola")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}
