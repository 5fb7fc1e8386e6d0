// world_server/server/src/systems/mod.rs
pub mod quest;
pub mod quest_zones;
pub mod world_handlers;
pub mod zone_handlers;
