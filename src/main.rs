use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use soundboard_bot::{
    audio::{
        catalog::{CatalogManifest, ClipCatalog},
        engine::PlaybackEngine,
    },
    bot::SoundboardBot,
    config::Config,
    voice::SongbirdConnector,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("soundboard_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Soundboard Bot v{}", env!("CARGO_PKG_VERSION"));

    // Without a token nothing else starts
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let manifest = match &config.clip_manifest {
        Some(path) => CatalogManifest::from_file(path).await?,
        None => CatalogManifest::builtin(),
    };

    info!("📦 Preloading clips from {}", config.sound_dir.display());
    let catalog = Arc::new(ClipCatalog::load(&manifest, &config.sound_dir).await?);

    let manager = Songbird::serenity();
    let connector = Arc::new(SongbirdConnector::new(
        manager.clone(),
        config.stream_buffer_frames,
        config.opus_format(),
    ));
    let engine = PlaybackEngine::new(connector, config.max_queue_size, config.timings());

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = SoundboardBot::new(config.clone(), catalog, engine.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        engine.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot running, press Ctrl+C to exit");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    info!("👋 Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("⚠️ Ctrl+C received, shutting down"),
        _ = terminate => info!("⚠️ Terminate signal received, shutting down"),
    }
}
