// world_server/server/src/entities/npc.rs
use super::entity::{position_update, Broadcastable, Locatable, Nameable};
use crate::core::constants::{NPC_DEFAULT_WALK_SPEED, WAYPOINT_ARRIVAL_EPSILON};
use crate::core::types::{EntityId, Position, SpawnId, Velocity};
use crate::network::messages;
use crate::persistence::records::{NpcTemplate, Waypoint};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Waypoint walking state for NPCs bound to a grid.
#[derive(Debug, Clone)]
pub struct PathState {
    pub grid_id: u32,
    pub waypoints: Arc<[Waypoint]>,
    pub next_index: usize,
    pub next_move_at: Instant,
    pub pause_until: Option<Instant>,
    last_step_at: Instant,
}

impl PathState {
    pub fn new(grid_id: u32, waypoints: Arc<[Waypoint]>, now: Instant) -> Self {
        PathState { grid_id, waypoints, next_index: 0, next_move_at: now, pause_until: None, last_step_at: now }
    }
}

#[derive(Debug, Clone)]
pub struct NpcEntity {
    pub id: EntityId,
    pub template: Arc<NpcTemplate>,
    pub spawn_id: Option<SpawnId>,
    pub position: Position,
    pub velocity: Velocity,
    pub path: Option<PathState>,
}

impl NpcEntity {
    pub fn new(id: EntityId, template: Arc<NpcTemplate>, spawn_id: Option<SpawnId>, position: Position) -> Self {
        NpcEntity { id, template, spawn_id, position, velocity: Velocity::zero(), path: None }
    }

    pub fn with_path(mut self, path: PathState) -> Self {
        self.path = Some(path);
        self
    }

    fn walk_speed(&self) -> f32 {
        self.template.walk_speed.unwrap_or(NPC_DEFAULT_WALK_SPEED)
    }

    /// Steps along the waypoint path. Returns true when the position changed.
    pub fn advance(&mut self, now: Instant, step_interval: Duration) -> bool {
        let speed = self.walk_speed();
        let Some(path) = self.path.as_mut() else {
            return false;
        };
        if path.waypoints.is_empty() || now < path.next_move_at {
            return false;
        }
        if let Some(until) = path.pause_until {
            if now < until {
                return false;
            }
            path.pause_until = None;
            path.last_step_at = until;
        }

        let elapsed = now.saturating_duration_since(path.last_step_at).as_secs_f32();
        path.last_step_at = now;
        path.next_move_at = now + step_interval;

        let waypoint = &path.waypoints[path.next_index];
        let target = waypoint.position;
        let distance = self.position.distance_to(&target);
        let step = speed * elapsed;
        let previous = self.position;

        if distance <= step.max(WAYPOINT_ARRIVAL_EPSILON) {
            let heading = heading_towards(&previous, &target).unwrap_or(previous.heading);
            self.position = Position { heading, ..target };
            if waypoint.pause_secs > 0 {
                path.pause_until = Some(now + Duration::from_secs(u64::from(waypoint.pause_secs)));
            }
            path.next_index = (path.next_index + 1) % path.waypoints.len();
        } else {
            let t = step / distance;
            self.position = Position {
                x: previous.x + (target.x - previous.x) * t,
                y: previous.y + (target.y - previous.y) * t,
                z: previous.z + (target.z - previous.z) * t,
                heading: heading_towards(&previous, &target).unwrap_or(previous.heading),
            };
        }
        self.velocity = self.position.delta_from(&previous);
        self.position != previous
    }
}

fn heading_towards(from: &Position, to: &Position) -> Option<f32> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    Some(dy.atan2(dx).to_degrees().rem_euclid(360.0))
}

impl Locatable for NpcEntity {
    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    fn velocity(&self) -> Velocity {
        self.velocity
    }
}

impl Nameable for NpcEntity {
    fn name(&self) -> &str {
        &self.template.name
    }
}

impl Broadcastable for NpcEntity {
    fn to_spawn(&self) -> messages::Spawn {
        messages::Spawn {
            spawn_id: self.id,
            name: self.template.name.clone(),
            level: self.template.level,
            race: self.template.race,
            char_class: self.template.char_class,
            is_npc: true,
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
