// world_server/server/src/server/mod.rs
pub mod game_loop;
pub mod instance;
pub mod zone_manager;

pub use instance::{ZoneInbound, ZoneInstance, ZoneServices};
pub use zone_manager::ZoneManager;
