// world_server/server/src/main.rs
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use world_server_core::core::config::ServerConfig;
use world_server_core::network::listener;
use world_server_core::network::session::SessionRegistry;
use world_server_core::operational::logging::init_logging;
use world_server_core::operational::monitoring::metrics::MetricsSystem;
use world_server_core::persistence::{MemoryStore, WorldStore};
use world_server_core::server::{ZoneManager, ZoneServices};
use world_server_core::systems::quest::QuestRegistry;
use world_server_core::systems::world_handlers::{LocalTokenValidator, PassthroughTokenValidator, TokenValidator};
use world_server_core::systems::zone_handlers::ZoneHandlerRegistry;
use world_server_core::WorldHandler;

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {}", panic_info);
        if let Some(location) = panic_info.location() {
            eprintln!("Location: {}:{}:{}", location.file(), location.line(), location.column());
        }
        eprintln!("Backtrace:\n{:?}", std::backtrace::Backtrace::capture());
    }));

    let config = Arc::new(ServerConfig::from_env().context("Failed to load server configuration")?);
    init_logging(config.json_logs)?;
    info!("World server starting up...");

    let metrics = match config.metrics_addr {
        Some(addr) => Some(MetricsSystem::new(addr)?),
        None => None,
    };

    let store: Arc<dyn WorldStore> = Arc::new(
        MemoryStore::load(&config.world_data_path)
            .with_context(|| format!("Failed to load world data from {}", config.world_data_path.display()))?,
    );
    let validator: Arc<dyn TokenValidator> = if config.local_auth {
        info!("Local authentication enabled; all logins share one account");
        Arc::new(LocalTokenValidator)
    } else {
        Arc::new(PassthroughTokenValidator)
    };

    let zones = Arc::new(ZoneManager::new(ZoneServices {
        config: config.clone(),
        store: store.clone(),
        handlers: Arc::new(ZoneHandlerRegistry::with_defaults()),
        quests: Arc::new(QuestRegistry::builtin()),
    }));
    let sessions = Arc::new(SessionRegistry::new(config.initial_frame_buffer));
    let world = Arc::new(WorldHandler::new(config.clone(), sessions, zones.clone(), store, validator));

    let tcp = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    let server = tokio::spawn(listener::serve(tcp, world));

    tokio::select! {
        result = server => match result {
            Ok(Ok(())) => info!("Listener stopped."),
            Ok(Err(e)) => error!("Listener failed: {}", e),
            Err(e) => error!("Listener task panicked: {}", e),
        },
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested."),
    }

    zones.shutdown().await;
    match metrics {
        Some(metrics) => info!("World server shut down after {:?}.", metrics.uptime()),
        None => info!("World server shut down."),
    }
    Ok(())
}
