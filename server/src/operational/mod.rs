// world_server/server/src/operational/mod.rs
pub mod logging;
pub mod monitoring;
