// world_server/server/src/world/mod.rs
pub mod spatial_grid;
pub mod spawn_pool;
