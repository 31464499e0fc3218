use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{
    player::{PlaybackOrchestrator, PlayerSettings},
    songbird_transport::SongbirdTransport,
};
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());
    let config = Arc::new(config);

    let resolver = YtDlpResolver::new(config.ytdlp_path.clone());
    if let Err(e) = resolver.verify().await {
        warn!("⚠️ yt-dlp no disponible, las búsquedas fallarán: {:?}", e);
    }

    // Orquestador sobre songbird
    let songbird = Songbird::serenity();
    let transport = SongbirdTransport::new(Arc::clone(&songbird))?;
    let (player, channels) = PlaybackOrchestrator::new(
        Arc::new(transport),
        Arc::new(resolver),
        PlayerSettings::from(config.as_ref()),
    );
    player.spawn_event_loop(channels.events);

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(Arc::clone(&config), Arc::clone(&player), channels.notices);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    let shutdown_player = Arc::clone(&player);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown_player.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let version = YtDlpResolver::new(config.ytdlp_path.clone()).verify().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
