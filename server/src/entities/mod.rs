// world_server/server/src/entities/mod.rs
pub mod entity;
pub mod npc;
pub mod player;

pub use entity::{Broadcastable, Entity, Locatable, Nameable};
