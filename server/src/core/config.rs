// world_server/server/src/core/config.rs
use super::constants::*;
use super::error::{ServerError, ServerResult};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_PATH_ENV: &str = "WORLD_SERVER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub metrics_addr: Option<SocketAddr>,
    pub sim_tick_ms: u64,
    pub world_tick_ms: u64,
    pub grace_period_secs: u64,
    pub respawn_interval_secs: u64,
    pub max_backlog: usize,
    pub storage_timeout_ms: u64,
    pub initial_frame_buffer: usize,
    /// Fixed seed for every zone's spawn RNG. `None` seeds from entropy.
    pub spawn_rng_seed: Option<u64>,
    /// Accept the login token itself as the account identity.
    pub local_auth: bool,
    pub json_logs: bool,
    pub world_data_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 7100)),
            metrics_addr: None,
            sim_tick_ms: SIM_TICK_MS,
            world_tick_ms: WORLD_TICK_MS,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            respawn_interval_secs: DEFAULT_RESPAWN_INTERVAL_SECS,
            max_backlog: DEFAULT_MAX_BACKLOG,
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
            initial_frame_buffer: INITIAL_FRAME_BUFFER_BYTES,
            spawn_rng_seed: None,
            local_auth: true,
            json_logs: false,
            world_data_path: PathBuf::from("data/world.yaml"),
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&raw)
            .map_err(|e| ServerError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Loaded server configuration from {}", path.display());
        Ok(config)
    }

    /// Reads the file named by `WORLD_SERVER_CONFIG`, or defaults when unset.
    pub fn from_env() -> ServerResult<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path),
            Err(_) => {
                warn!("{} not set, using default configuration", CONFIG_PATH_ENV);
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> ServerResult<()> {
        if self.sim_tick_ms == 0 || self.world_tick_ms == 0 {
            return Err(ServerError::ConfigError("tick intervals must be non-zero".into()));
        }
        if self.max_backlog == 0 {
            return Err(ServerError::ConfigError("max_backlog must be non-zero".into()));
        }
        if self.initial_frame_buffer < STREAM_HEADER_LEN {
            return Err(ServerError::ConfigError(format!(
                "initial_frame_buffer must hold at least a frame header ({} bytes)",
                STREAM_HEADER_LEN
            )));
        }
        Ok(())
    }

    pub fn sim_tick(&self) -> Duration {
        Duration::from_millis(self.sim_tick_ms)
    }

    pub fn world_tick(&self) -> Duration {
        Duration::from_millis(self.world_tick_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn respawn_interval(&self) -> Duration {
        Duration::from_secs(self.respawn_interval_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}
