// world_server/server/src/network/messages.rs
//! Payload schema carried after the opcode in every frame.
//!
//! Messages are protobuf encoded via `prost` derives. Field tags are part of the
//! client contract and must never be renumbered.

use prost::Message;

// ----------------------------------------------------------------------------
// Generic scalars
// ----------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct IntValue {
    #[prost(int64, tag = "1")]
    pub value: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct StringValue {
    #[prost(string, tag = "1")]
    pub value: String,
}

// ----------------------------------------------------------------------------
// World (global) messages
// ----------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct JwtLogin {
    #[prost(string, tag = "1")]
    pub token: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct JwtResponse {
    /// Positive on success, zero on rejection.
    #[prost(int32, tag = "1")]
    pub status: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CharacterSummary {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub level: u32,
    #[prost(uint32, tag = "3")]
    pub race: u32,
    #[prost(uint32, tag = "4")]
    pub char_class: u32,
    #[prost(int32, tag = "5")]
    pub zone_id: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CharacterList {
    #[prost(message, repeated, tag = "1")]
    pub characters: Vec<CharacterSummary>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CharacterCreate {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub race: u32,
    #[prost(uint32, tag = "3")]
    pub char_class: u32,
    #[prost(uint32, tag = "4")]
    pub gender: u32,
    #[prost(int32, tag = "5")]
    pub start_zone: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ZoneSession {
    #[prost(int32, tag = "1")]
    pub zone_id: i32,
    #[prost(int32, tag = "2")]
    pub instance_id: i32,
}

// ----------------------------------------------------------------------------
// Zone messages
// ----------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct ZonePoint {
    #[prost(int32, tag = "1")]
    pub number: i32,
    #[prost(float, tag = "2")]
    pub x: f32,
    #[prost(float, tag = "3")]
    pub y: f32,
    #[prost(float, tag = "4")]
    pub z: f32,
    #[prost(float, tag = "5")]
    pub heading: f32,
    #[prost(int32, tag = "6")]
    pub target_zone_id: i32,
    #[prost(int32, tag = "7")]
    pub target_instance: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct NewZone {
    #[prost(string, tag = "1")]
    pub short_name: String,
    #[prost(string, tag = "2")]
    pub long_name: String,
    #[prost(int32, tag = "3")]
    pub zone_id: i32,
    #[prost(int32, tag = "4")]
    pub instance_id: i32,
    #[prost(float, tag = "5")]
    pub safe_x: f32,
    #[prost(float, tag = "6")]
    pub safe_y: f32,
    #[prost(float, tag = "7")]
    pub safe_z: f32,
    #[prost(message, repeated, tag = "8")]
    pub zone_points: Vec<ZonePoint>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlayerProfile {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub level: u32,
    #[prost(uint32, tag = "3")]
    pub race: u32,
    #[prost(uint32, tag = "4")]
    pub char_class: u32,
    #[prost(int32, tag = "5")]
    pub zone_id: i32,
    #[prost(int32, tag = "6")]
    pub instance_id: i32,
    #[prost(float, tag = "7")]
    pub x: f32,
    #[prost(float, tag = "8")]
    pub y: f32,
    #[prost(float, tag = "9")]
    pub z: f32,
    #[prost(float, tag = "10")]
    pub heading: f32,
    #[prost(uint32, tag = "11")]
    pub spawn_id: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Spawn {
    #[prost(uint32, tag = "1")]
    pub spawn_id: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(uint32, tag = "3")]
    pub level: u32,
    #[prost(uint32, tag = "4")]
    pub race: u32,
    #[prost(uint32, tag = "5")]
    pub char_class: u32,
    #[prost(bool, tag = "6")]
    pub is_npc: bool,
    #[prost(float, tag = "7")]
    pub x: f32,
    #[prost(float, tag = "8")]
    pub y: f32,
    #[prost(float, tag = "9")]
    pub z: f32,
    #[prost(float, tag = "10")]
    pub heading: f32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Spawns {
    #[prost(message, repeated, tag = "1")]
    pub spawns: Vec<Spawn>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteSpawn {
    #[prost(uint32, tag = "1")]
    pub spawn_id: u32,
}

/// Client-reported position; the server derives velocity itself.
#[derive(Clone, PartialEq, Message)]
pub struct ClientPositionUpdate {
    #[prost(float, tag = "1")]
    pub x: f32,
    #[prost(float, tag = "2")]
    pub y: f32,
    #[prost(float, tag = "3")]
    pub z: f32,
    #[prost(float, tag = "4")]
    pub heading: f32,
    #[prost(int32, tag = "5")]
    pub animation: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct EntityPositionUpdate {
    #[prost(uint32, tag = "1")]
    pub spawn_id: u32,
    #[prost(float, tag = "2")]
    pub x: f32,
    #[prost(float, tag = "3")]
    pub y: f32,
    #[prost(float, tag = "4")]
    pub z: f32,
    #[prost(float, tag = "5")]
    pub heading: f32,
    #[prost(float, tag = "6")]
    pub velocity_x: f32,
    #[prost(float, tag = "7")]
    pub velocity_y: f32,
    #[prost(float, tag = "8")]
    pub velocity_z: f32,
}

#[derive(Clone, PartialEq, Message)]
pub struct EntityAnimation {
    #[prost(uint32, tag = "1")]
    pub spawn_id: u32,
    #[prost(int32, tag = "2")]
    pub animation: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelMessage {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(string, tag = "2")]
    pub target_name: String,
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(uint32, tag = "4")]
    pub chan_num: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ZoneChange {
    #[prost(int32, tag = "1")]
    pub zone_id: i32,
    #[prost(int32, tag = "2")]
    pub instance_id: i32,
}

/// Chat channel numbers understood by the zone.
pub mod channel {
    pub const SAY: u32 = 8;
    pub const SHOUT: u32 = 3;
    pub const OOC: u32 = 5;
}
