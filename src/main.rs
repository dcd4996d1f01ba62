use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

use tsuki_music::{
    audio::{songbird_transport::SongbirdTransport, EngineSettings, MusicEngine},
    bot::{SerenityNotifier, TsukiBot},
    cache::ResolutionCache,
    config::Config,
    sources::{ExtractorResolver, ResolverPool, YtDlpBackend},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tsuki_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Tsuki Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let backend = YtDlpBackend::new(config.ytdlp_path.clone());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&backend).await;
    }

    match backend.version().await {
        Ok(version) => info!("✅ yt-dlp versión: {}", version),
        Err(e) => warn!("❌ yt-dlp no disponible, las búsquedas fallarán: {}", e),
    }

    // Resolución: yt-dlp detrás de un pool acotado y un cache con TTL
    let cache = ResolutionCache::new(config.resolution_cache_size, config.resolution_cache_ttl());
    let resolver = ExtractorResolver::new(backend, cache.clone(), config.max_playlist_size)
        .with_entry_concurrency(config.playlist_concurrency)
        .with_lookup_timeout(config.lookup_timeout());
    let pool = ResolverPool::new(
        Arc::new(resolver),
        config.resolver_workers,
        config.resolve_timeout(),
    );

    let songbird = Songbird::serenity();
    let transport = SongbirdTransport::new(songbird.clone(), reqwest::Client::new());
    let notifier = SerenityNotifier::new(Arc::new(Http::new(&config.discord_token)));

    let engine = Arc::new(MusicEngine::new(
        EngineSettings::from(&*config),
        pool,
        Arc::new(transport),
        Arc::new(notifier),
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = TsukiBot::new(config.clone(), engine.clone());
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    if cache.is_enabled() {
        tokio::spawn(maintenance_tasks(cache, config.resolution_cache_ttl()));
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        engine.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Purga periódicamente las resoluciones expiradas
async fn maintenance_tasks(cache: ResolutionCache, ttl: Duration) {
    let mut interval = tokio::time::interval(ttl.max(Duration::from_secs(60)));

    loop {
        interval.tick().await;
        cache.cleanup_old_entries();
    }
}

async fn health_check(backend: &YtDlpBackend) -> Result<()> {
    // Verificar dependencias críticas
    let version = backend.version().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
