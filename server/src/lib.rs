// world_server/server/src/lib.rs
pub mod concurrent;
pub mod core;
pub mod entities;
pub mod network;
pub mod operational;
pub mod persistence;
pub mod server;
pub mod systems;
pub mod world;

pub use crate::network::world_handler::WorldHandler;
pub use crate::server::zone_manager::ZoneManager;
