// world_server/server/src/systems/zone_handlers.rs
//! Handlers run on the zone task with exclusive access to the zone state.

use crate::core::constants::MAX_WORLD_COORDINATE;
use crate::core::error::{ServerError, ServerResult};
use crate::core::types::{EntityId, Position, ZoneKey};
use crate::entities::{Broadcastable, Entity, Locatable, Nameable};
use crate::network::framing::decode_payload;
use crate::network::messages;
use crate::network::opcodes::OpCode;
use crate::network::session::Session;
use crate::server::instance::{Delivery, Zone};
use crate::systems::quest::QuestEventType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type ZoneHandler = fn(&mut Zone, &Arc<Session>, &[u8]) -> ServerResult<()>;

#[derive(Default, Clone)]
pub struct ZoneHandlerRegistry {
    handlers: HashMap<OpCode, ZoneHandler>,
}

impl ZoneHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in zone opcode wired up.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(OpCode::RequestClientZoneChange, handle_request_client_zone_change)
            .register(OpCode::ClientUpdate, handle_client_update)
            .register(OpCode::Animation, handle_animation)
            .register(OpCode::ChannelMessage, handle_channel_message)
            .register(OpCode::ZoneChange, handle_zone_change)
            .register(OpCode::Logout, handle_logout);
        registry
    }

    pub fn register(&mut self, opcode: OpCode, handler: ZoneHandler) -> &mut Self {
        if self.handlers.insert(opcode, handler).is_some() {
            debug!("Zone handler for {:?} replaced", opcode);
        }
        self
    }

    pub fn get(&self, opcode: OpCode) -> Option<ZoneHandler> {
        self.handlers.get(&opcode).copied()
    }

    pub fn handles(&self, opcode: OpCode) -> bool {
        self.handlers.contains_key(&opcode)
    }
}

fn require_entity(zone: &Zone, session: &Session) -> ServerResult<EntityId> {
    zone.client_entity_id(session.id())
        .ok_or_else(|| ServerError::NotFound(format!("entity for session {} in {}", session.id(), zone.key())))
}

/// Zone entry: creates the avatar, then sends zone data, the player profile
/// and everything already in view. Peers in view receive the newcomer.
pub fn handle_request_client_zone_change(zone: &mut Zone, session: &Arc<Session>, _payload: &[u8]) -> ServerResult<()> {
    if let Some(existing) = zone.client_entity_id(session.id()) {
        debug!("[{}] session {} already has entity {}", zone.key(), session.id(), existing);
        return Ok(());
    }
    let (entity_id, outcome) = zone.add_player(session)?;

    session.send_stream(OpCode::NewZone, &zone.new_zone_message())?;
    if let Some(player) = zone.entity_by_id(entity_id).and_then(Entity::as_player) {
        session.send_stream(OpCode::PlayerProfile, &player.profile(zone.key().instance_id))?;
    }
    session.send_stream(OpCode::BatchZoneSpawns, &zone.visible_spawns(entity_id))?;

    if let Some(entity) = zone.entity_by_id(entity_id) {
        let spawn = messages::Spawns { spawns: vec![entity.to_spawn()] };
        for peer in &outcome.gained {
            zone.send_to_entity(*peer, OpCode::ZoneSpawns, &spawn, Delivery::Stream);
        }
    }
    zone.notify_enter_zone(entity_id);
    Ok(())
}

/// Finite and inside the world bounds on every axis.
fn is_plausible_position(position: &Position) -> bool {
    let in_bounds = |v: f32| v.is_finite() && v.abs() <= MAX_WORLD_COORDINATE;
    in_bounds(position.x) && in_bounds(position.y) && in_bounds(position.z) && position.heading.is_finite()
}

pub fn handle_client_update(zone: &mut Zone, session: &Arc<Session>, payload: &[u8]) -> ServerResult<()> {
    let update: messages::ClientPositionUpdate = decode_payload(payload)?;
    let entity_id = require_entity(zone, session)?;
    let position = Position::new(update.x, update.y, update.z, update.heading);
    if !is_plausible_position(&position) {
        return Err(ServerError::Protocol(format!(
            "position ({}, {}, {}) heading {} out of range",
            update.x, update.y, update.z, update.heading
        )));
    }

    let animation_changed = match zone.entity_by_id_mut(entity_id).and_then(Entity::as_player_mut) {
        Some(player) => {
            player.apply_client_position(position);
            let changed = player.animation != update.animation;
            player.animation = update.animation;
            changed
        }
        None => return Err(ServerError::NotFound(format!("player entity {}", entity_id))),
    };
    zone.move_entity(entity_id, position);

    if animation_changed {
        let anim = messages::EntityAnimation { spawn_id: entity_id, animation: update.animation };
        zone.broadcast_to_area(entity_id, OpCode::Animation, &anim, Delivery::Datagram, false);
    }
    Ok(())
}

pub fn handle_animation(zone: &mut Zone, session: &Arc<Session>, payload: &[u8]) -> ServerResult<()> {
    let request: messages::EntityAnimation = decode_payload(payload)?;
    let entity_id = require_entity(zone, session)?;
    if let Some(player) = zone.entity_by_id_mut(entity_id).and_then(Entity::as_player_mut) {
        player.animation = request.animation;
    }
    let anim = messages::EntityAnimation { spawn_id: entity_id, animation: request.animation };
    zone.broadcast_to_area(entity_id, OpCode::Animation, &anim, Delivery::Datagram, false);
    Ok(())
}

/// Relays chat to the speaker's area. A say aimed at an NPC also fires that
/// NPC's quest handler.
pub fn handle_channel_message(zone: &mut Zone, session: &Arc<Session>, payload: &[u8]) -> ServerResult<()> {
    let request: messages::ChannelMessage = decode_payload(payload)?;
    let speaker = require_entity(zone, session)?;
    let Some(entity) = zone.entity_by_id(speaker) else {
        return Ok(());
    };
    let origin = entity.position();
    let relay = messages::ChannelMessage {
        sender: entity.name().to_string(),
        target_name: request.target_name.clone(),
        message: request.message.clone(),
        chan_num: request.chan_num,
    };
    zone.broadcast_to_area(speaker, OpCode::ChannelMessage, &relay, Delivery::Stream, true);

    if request.chan_num == messages::channel::SAY && !request.target_name.is_empty() {
        match zone.npc_by_name(&request.target_name, &origin) {
            Some(npc) => {
                zone.invoke_quest_on(npc, QuestEventType::Say, Some(speaker), Some(&request.message));
            }
            None => debug!("[{}] say target {} not found", zone.key(), request.target_name),
        }
    }
    Ok(())
}

/// Moves the client out of this zone towards a connected one. The client
/// follows up with a zone entry request that lands in the target zone.
pub fn handle_zone_change(zone: &mut Zone, session: &Arc<Session>, payload: &[u8]) -> ServerResult<()> {
    let request: messages::ZoneChange = decode_payload(payload)?;
    let target = ZoneKey::new(request.zone_id, request.instance_id);
    if target == zone.key() {
        debug!("[{}] session {} asked to zone into its current zone", zone.key(), session.id());
        return Ok(());
    }
    let reachable = zone
        .static_data()
        .zone_points
        .iter()
        .any(|zp| zp.target_zone_id == target.zone_id && zp.target_instance == target.instance_id);
    if !reachable {
        warn!("[{}] session {} requested unreachable {}", zone.key(), session.id(), target);
        return Err(ServerError::NotFound(format!("zone point to {}", target)));
    }

    zone.remove_client(session.id());
    session.update_character(|c| {
        c.zone_id = target.zone_id;
        c.instance_id = target.instance_id;
        c.position = Position::default();
    });
    session.set_zone(Some(target));
    session.send_stream(OpCode::ZoneChangeAccepted, &request)?;
    info!("[{}] session {} leaving for {}", zone.key(), session.id(), target);
    Ok(())
}

pub fn handle_logout(zone: &mut Zone, session: &Arc<Session>, _payload: &[u8]) -> ServerResult<()> {
    zone.remove_client(session.id());
    session.set_zone(None);
    info!("[{}] session {} logged out", zone.key(), session.id());
    Ok(())
}
