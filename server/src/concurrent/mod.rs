// world_server/server/src/concurrent/mod.rs
pub mod ingress_queue;
