// world_server/server/src/core/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SessionId = u32;
pub type EntityId = u32;
pub type AccountId = i64;
pub type SpawnId = u32;
pub type ZoneId = i32;
pub type InstanceId = i32;

/// Identifies one running zone copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneKey {
    pub zone_id: ZoneId,
    pub instance_id: InstanceId,
}

impl ZoneKey {
    pub fn new(zone_id: ZoneId, instance_id: InstanceId) -> Self {
        ZoneKey { zone_id, instance_id }
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zone {}·Inst {}", self.zone_id, self.instance_id)
    }
}

#[derive(Clone, Debug, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub heading: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32, heading: f32) -> Self {
        Position { x, y, z, heading }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Displacement from `previous` to `self`.
    pub fn delta_from(&self, previous: &Position) -> Velocity {
        Velocity {
            x: self.x - previous.x,
            y: self.y - previous.y,
            z: self.z - previous.z,
        }
    }
}

#[derive(Clone, Debug, Copy, Default, PartialEq)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Velocity {
    pub fn zero() -> Self {
        Velocity::default()
    }
}

/// Lifecycle of a zone instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ZoneLifecycle {
    Created = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl ZoneLifecycle {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ZoneLifecycle::Created,
            1 => ZoneLifecycle::Running,
            2 => ZoneLifecycle::ShuttingDown,
            _ => ZoneLifecycle::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_is_displacement_between_positions() {
        let old = Position::new(1.0, 2.0, 3.0, 0.0);
        let new = Position::new(4.0, 0.0, 3.5, 90.0);
        let v = new.delta_from(&old);
        assert_eq!(v, Velocity { x: 3.0, y: -2.0, z: 0.5 });
    }

    #[test]
    fn lifecycle_round_trips_through_u8() {
        for state in [
            ZoneLifecycle::Created,
            ZoneLifecycle::Running,
            ZoneLifecycle::ShuttingDown,
            ZoneLifecycle::Stopped,
        ] {
            assert_eq!(ZoneLifecycle::from_u8(state as u8), state);
        }
    }
}
