use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use offline_audio_cache::clock::SystemClock;
use offline_audio_cache::config::{Config, StoreBackend};
use offline_audio_cache::control::{ControlMessage, ControlResponse};
use offline_audio_cache::network::HttpNetwork;
use offline_audio_cache::store::{CacheStore, DiskStore, MemoryStore};
use offline_audio_cache::CacheEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("offline_audio_cache=debug".parse()?)
                .add_directive("reqwest=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Offline Audio Cache v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let engine = build_engine(&config).await?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&engine).await;
    }

    // Instalar la versión actual; con un build anterior presente se espera a
    // SKIP_WAITING / ACTIVATE_NOW o CLIENTS_RELEASED por el canal de control
    match engine.lifecycle().install().await {
        Ok(count) => info!("📦 {} recursos precacheados", count),
        Err(e) => warn!("⚠️ Instalación incompleta: {}", e),
    }
    if !engine.lifecycle().activate_if_unclaimed().await? {
        info!("⏳ Activación pendiente (estado {:?})", engine.lifecycle().state());
    }

    // Manejar shutdown graceful
    let tasks = engine.tasks().clone();
    tokio::select! {
        result = control_loop(&engine) => {
            if let Err(e) = result {
                error!("❌ Error en el canal de control: {:?}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("⚠️ Señal de shutdown recibida, cerrando...");
        }
    }

    tasks.settle().await;
    info!("👋 Offline Audio Cache detenido");
    Ok(())
}

async fn build_engine(config: &Config) -> Result<CacheEngine> {
    // Inicializar almacenamiento
    let store: Arc<dyn CacheStore> = match config.store_backend {
        StoreBackend::Disk => Arc::new(DiskStore::new(config.cache_dir.clone()).await?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let network = Arc::new(HttpNetwork::new(config.connect_timeout, &config.user_agent)?);

    CacheEngine::new(config, store, network, Arc::new(SystemClock))
}

/// Un mensaje JSON por línea en stdin, una respuesta JSON por línea en stdout.
async fn control_loop(engine: &CacheEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("📡 Esperando mensajes de control en stdin");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match ControlMessage::parse(line) {
            Ok(message) => engine.handle_message(message).await,
            Err(e) => {
                warn!("⚠️ Mensaje de control inválido: {}", e);
                Some(ControlResponse::malformed(e))
            }
        };

        if let Some(response) = response {
            stdout.write_all(response.to_json().as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    info!("📭 stdin cerrado");
    Ok(())
}

async fn health_check(engine: &CacheEngine) -> Result<()> {
    // Verificar que el store responde
    let status = engine.audio().cache().status().await?;
    println!("OK");
    info!(
        "✅ Health check: {} entradas de audio, {} bytes",
        status.count, status.total_size
    );
    Ok(())
}
