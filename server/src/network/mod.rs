// world_server/server/src/network/mod.rs
pub mod framing;
pub mod listener;
pub mod messages;
pub mod opcodes;
pub mod session;
pub mod transport;
pub mod world_handler;

pub use world_handler::WorldHandler;
