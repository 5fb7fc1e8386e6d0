// world_server/server/src/operational/logging.rs
use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "world_server_core=info,warn";

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
    } else {
        registry
            .with(fmt::layer())
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
    }
    Ok(())
}
