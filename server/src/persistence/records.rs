// world_server/server/src/persistence/records.rs
use crate::core::types::{AccountId, InstanceId, Position, SpawnId, ZoneId};
use crate::network::messages;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: i64,
    pub account_id: AccountId,
    pub name: String,
    #[serde(default = "default_level")]
    pub level: u32,
    pub race: u32,
    pub char_class: u32,
    #[serde(default)]
    pub gender: u32,
    pub zone_id: ZoneId,
    #[serde(default)]
    pub instance_id: InstanceId,
    #[serde(default)]
    pub position: Position,
}

fn default_level() -> u32 {
    1
}

impl CharacterRecord {
    pub fn summary(&self) -> messages::CharacterSummary {
        messages::CharacterSummary {
            name: self.name.clone(),
            level: self.level,
            race: self.race,
            char_class: self.char_class,
            zone_id: self.zone_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZonePointRecord {
    pub number: i32,
    pub position: Position,
    pub target_zone_id: ZoneId,
    #[serde(default)]
    pub target_instance: InstanceId,
}

impl From<&ZonePointRecord> for messages::ZonePoint {
    fn from(zp: &ZonePointRecord) -> Self {
        messages::ZonePoint {
            number: zp.number,
            x: zp.position.x,
            y: zp.position.y,
            z: zp.position.z,
            heading: zp.position.heading,
            target_zone_id: zp.target_zone_id,
            target_instance: zp.target_instance,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Position,
    #[serde(default)]
    pub pause_secs: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneStaticData {
    pub zone_id: ZoneId,
    pub short_name: String,
    pub long_name: String,
    #[serde(default)]
    pub safe_point: Position,
    #[serde(default)]
    pub zone_points: Vec<ZonePointRecord>,
    /// Waypoint paths keyed by grid id.
    #[serde(default)]
    pub grids: HashMap<u32, Vec<Waypoint>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NpcTemplate {
    pub id: u32,
    pub name: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub race: u32,
    #[serde(default)]
    pub char_class: u32,
    #[serde(default)]
    pub walk_speed: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpawnCandidate {
    pub template: Arc<NpcTemplate>,
    pub chance: u16,
}

/// One spawn point with its weighted creature candidates.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnPoolEntry {
    pub spawn_id: SpawnId,
    pub position: Position,
    pub grid_id: Option<u32>,
    pub candidates: Vec<SpawnCandidate>,
}
