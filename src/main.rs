use anyhow::{Context, Result};
use std::sync::{atomic::AtomicU64, Arc};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use lavabridge::config::Config;
use lavabridge::node::RestClient;
use lavabridge::{Manager, ManagerEvent, VoicePayload};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lavabridge=debug".parse()?),
        )
        .init();

    info!("🎵 Iniciando lavabridge v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Sin shard real: los payloads de voz solo se registran
    let manager = Manager::new(config.manager_options(), |guild_id: &str, payload: VoicePayload| {
        info!("🎙️ Payload de voz para {}: {:?}", guild_id, payload.d.channel_id);
    });

    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("⚠️ {} eventos perdidos", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    manager
        .init(config.client_id.as_deref())
        .await
        .context("Failed to connect to Lavalink")?;
    info!("🚀 {} nodo(s) conectados", manager.nodes().len());

    tokio::signal::ctrl_c()
        .await
        .context("Error al registrar Ctrl+C")?;
    info!("⚠️ Señal de shutdown recibida, cerrando...");

    for player in manager.players() {
        if let Err(e) = player.destroy(true).await {
            warn!("⚠️ Error al destruir player de {}: {}", player.guild_id(), e);
        }
    }
    for node in manager.nodes() {
        node.destroy();
    }

    Ok(())
}

fn log_event(event: &ManagerEvent) {
    match event {
        ManagerEvent::Debug(_) | ManagerEvent::Payload(_) => {}
        ManagerEvent::NodeConnected(node) => info!("✅ Nodo conectado: {}", node.identifier()),
        ManagerEvent::NodeDestroyed(node) => info!("🗑️ Nodo destruido: {}", node.identifier()),
        ManagerEvent::NodeError(node, reason) => {
            error!("❌ Error en nodo {}: {}", node.identifier(), reason)
        }
        ManagerEvent::NodeStats(node, stats) => info!(
            "📊 {}: {} players ({} reproduciendo), cpu {:.2}",
            node.identifier(),
            stats.players,
            stats.playing_players,
            stats.cpu.lavalink_load
        ),
        ManagerEvent::TrackStart(player, Some(track)) => {
            info!("▶️ {} en {}", track.title, player.guild_id())
        }
        ManagerEvent::TrackError(player, cause) => {
            error!("❌ Error de reproducción en {}: {}", player.guild_id(), cause)
        }
        other => info!("📨 {}", other.name()),
    }
}

/// Comprueba que cada nodo configurado responde a `/version`
async fn health_check(config: &Config) -> Result<()> {
    for node in &config.nodes {
        let scheme = if node.secure { "https" } else { "http" };
        let rest = RestClient::new(
            format!("{}://{}:{}", scheme, node.host, node.port),
            node.password.as_str(),
            node.request_timeout,
            Arc::new(AtomicU64::new(0)),
        )?;

        let version = rest
            .version()
            .await
            .with_context(|| format!("Node {} is not reachable", node.identifier))?;
        println!("{}: {}", node.identifier, version);
    }

    println!("OK");
    Ok(())
}
