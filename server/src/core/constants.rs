// world_server/server/src/core/constants.rs
use std::time::Duration;

// Zone tick rates
pub const SIM_TICK_MS: u64 = 50;
pub const SIM_TICK_DURATION: Duration = Duration::from_millis(SIM_TICK_MS);
pub const WORLD_TICK_MS: u64 = 1000;
pub const SLOW_TICK_LOG_MS: u64 = 40; // warn if a single sim tick exceeds this

// Interest management
pub const GRID_CELL_SIZE: f32 = 500.0;
pub const CELL_AXIS_BITS: u32 = 21;
pub const CELL_AXIS_MASK: i64 = (1 << CELL_AXIS_BITS) - 1;
// Cell coordinates are clamped to what one signed 21-bit axis can hold.
pub const CELL_COORD_MIN: i32 = -(1 << (CELL_AXIS_BITS - 1));
pub const CELL_COORD_MAX: i32 = (1 << (CELL_AXIS_BITS - 1)) - 1;
// Client-reported coordinates beyond this are rejected.
pub const MAX_WORLD_COORDINATE: f32 = 1_000_000.0;

// Sessions
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;
pub const INITIAL_FRAME_BUFFER_BYTES: usize = 8 * 1024;

// Framing
pub const DATAGRAM_HEADER_LEN: usize = 2;
pub const STREAM_LENGTH_PREFIX_LEN: usize = 4;
pub const STREAM_HEADER_LEN: usize = STREAM_LENGTH_PREFIX_LEN + DATAGRAM_HEADER_LEN;
pub const MAX_STREAM_FRAME_LEN: usize = 1 << 20;

// Zone actor hardening
pub const DEFAULT_MAX_BACKLOG: usize = 65_536;
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 2_000;

// Spawns and NPC movement
pub const DEFAULT_RESPAWN_INTERVAL_SECS: u64 = 60;
pub const NPC_DEFAULT_WALK_SPEED: f32 = 46.0; // units per second
pub const WAYPOINT_ARRIVAL_EPSILON: f32 = 1.0;

// Character rules enforced at the world boundary
pub const CHARACTER_NAME_MIN_LEN: usize = 4;
pub const CHARACTER_NAME_MAX_LEN: usize = 15;
