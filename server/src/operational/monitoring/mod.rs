// world_server/server/src/operational/monitoring/mod.rs
pub mod metrics;
