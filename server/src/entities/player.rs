// world_server/server/src/entities/player.rs
use super::entity::{position_update, Broadcastable, Locatable, Nameable};
use crate::core::types::{EntityId, Position, SessionId, Velocity};
use crate::network::messages;
use crate::persistence::records::CharacterRecord;

/// Avatar of a connected client inside one zone.
#[derive(Debug, Clone)]
pub struct PlayerEntity {
    pub id: EntityId,
    pub session_id: SessionId,
    pub character: CharacterRecord,
    pub position: Position,
    pub velocity: Velocity,
    pub animation: i32,
}

impl PlayerEntity {
    pub fn new(id: EntityId, session_id: SessionId, character: CharacterRecord, position: Position) -> Self {
        PlayerEntity { id, session_id, character, position, velocity: Velocity::zero(), animation: 0 }
    }

    /// Applies a client-reported position, deriving velocity from the previous one.
    pub fn apply_client_position(&mut self, position: Position) -> Velocity {
        self.velocity = position.delta_from(&self.position);
        self.position = position;
        self.character.position = position;
        self.velocity
    }

    pub fn profile(&self, instance_id: i32) -> messages::PlayerProfile {
        messages::PlayerProfile {
            name: self.character.name.clone(),
            level: self.character.level,
            race: self.character.race,
            char_class: self.character.char_class,
            zone_id: self.character.zone_id,
            instance_id,
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            heading: self.position.heading,
            spawn_id: self.id,
        }
    }
}

impl Locatable for PlayerEntity {
    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
        self.character.position = position;
    }

    fn velocity(&self) -> Velocity {
        self.velocity
    }
}

impl Nameable for PlayerEntity {
    fn name(&self) -> &str {
        &self.character.name
    }
}

impl Broadcastable for PlayerEntity {
    fn to_spawn(&self) -> messages::Spawn {
        messages::Spawn {
            spawn_id: self.id,
            name: self.character.name.clone(),
            level: self.character.level,
            race: self.character.race,
            char_class: self.character.char_class,
            is_npc: false,
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            heading: self.position.heading,
        }
    }

    fn to_position_update(&self) -> messages::EntityPositionUpdate {
        position_update(self.id, &self.position, &self.velocity)
    }
}
