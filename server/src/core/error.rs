// world_server/server/src/core/error.rs
use crate::core::types::{SessionId, SpawnId, ZoneKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0} is unavailable")]
    ZoneUnavailable(ZoneKey),

    #[error("{zone} backlog full ({limit} queued), packet dropped")]
    BacklogFull { zone: ZoneKey, limit: usize },

    #[error("{0} is shutting down")]
    ZoneStopping(ZoneKey),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FramingError {
    #[error("frame of {0} bytes is shorter than its header")]
    Undersized(usize),

    #[error("stream frame declares {declared} bytes but {available} are present")]
    LengthMismatch { declared: usize, available: usize },

    #[error("stream frame length {0} exceeds the maximum")]
    Oversized(usize),

    #[error("payload encode failed after regrow: {0}")]
    Encode(String),

    #[error("payload decode failed: {0}")]
    Decode(String),

    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("session {0} presented from a different address")]
    IpMismatch(SessionId),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SpawnError {
    #[error("no candidates for spawn point {0}")]
    NoCandidates(SpawnId),

    #[error("invalid total chance ({total}) for spawn point {spawn_id}")]
    InvalidTotalChance { spawn_id: SpawnId, total: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("zone {0} not found")]
    ZoneNotFound(i32),

    #[error("character {0} not found")]
    CharacterNotFound(String),

    #[error("character name {0} is taken")]
    NameTaken(String),

    #[error("storage call timed out after {0}ms")]
    Timeout(u64),

    #[error("storage backend: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport for session {0} is closed")]
    Closed(SessionId),

    #[error("transport io: {0}")]
    Io(#[from] std::io::Error),
}
