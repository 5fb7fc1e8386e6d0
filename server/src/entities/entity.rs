// world_server/server/src/entities/entity.rs
use super::npc::NpcEntity;
use super::player::PlayerEntity;
use crate::core::types::{EntityId, Position, Velocity};
use crate::network::messages;

pub trait Locatable {
    fn position(&self) -> Position;
    fn set_position(&mut self, position: Position);
    fn velocity(&self) -> Velocity;
}

pub trait Nameable {
    fn name(&self) -> &str;
}

/// Anything that can describe itself to clients.
pub trait Broadcastable {
    fn to_spawn(&self) -> messages::Spawn;

    fn to_position_update(&self) -> messages::EntityPositionUpdate;
}

#[derive(Debug, Clone)]
pub enum Entity {
    Player(PlayerEntity),
    Npc(NpcEntity),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Player(p) => p.id,
            Entity::Npc(n) => n.id,
        }
    }

    pub fn is_npc(&self) -> bool {
        matches!(self, Entity::Npc(_))
    }

    pub fn as_player(&self) -> Option<&PlayerEntity> {
        match self {
            Entity::Player(p) => Some(p),
            Entity::Npc(_) => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut PlayerEntity> {
        match self {
            Entity::Player(p) => Some(p),
            Entity::Npc(_) => None,
        }
    }

    pub fn as_npc(&self) -> Option<&NpcEntity> {
        match self {
            Entity::Npc(n) => Some(n),
            Entity::Player(_) => None,
        }
    }

    pub fn as_npc_mut(&mut self) -> Option<&mut NpcEntity> {
        match self {
            Entity::Npc(n) => Some(n),
            Entity::Player(_) => None,
        }
    }
}

impl Locatable for Entity {
    fn position(&self) -> Position {
        match self {
            Entity::Player(p) => p.position(),
            Entity::Npc(n) => n.position(),
        }
    }

    fn set_position(&mut self, position: Position) {
        match self {
            Entity::Player(p) => p.set_position(position),
            Entity::Npc(n) => n.set_position(position),
        }
    }

    fn velocity(&self) -> Velocity {
        match self {
            Entity::Player(p) => p.velocity(),
            Entity::Npc(n) => n.velocity(),
        }
    }
}

impl Nameable for Entity {
    fn name(&self) -> &str {
        match self {
            Entity::Player(p) => p.name(),
            Entity::Npc(n) => n.name(),
        }
    }
}

impl Broadcastable for Entity {
    fn to_spawn(&self) -> messages::Spawn {
        match self {
            Entity::Player(p) => p.to_spawn(),
            Entity::Npc(n) => n.to_spawn(),
        }
    }

    fn to_position_update(&self) -> messages::EntityPositionUpdate {
        match self {
            Entity::Player(p) => p.to_position_update(),
            Entity::Npc(n) => n.to_position_update(),
        }
    }
}

pub(crate) fn position_update(id: EntityId, pos: &Position, vel: &Velocity) -> messages::EntityPositionUpdate {
    messages::EntityPositionUpdate {
        spawn_id: id,
        x: pos.x,
        y: pos.y,
        z: pos.z,
        heading: pos.heading,
        velocity_x: vel.x,
        velocity_y: vel.y,
        velocity_z: vel.z,
    }
}
