// world_server/server/src/world/spawn_pool.rs
use crate::core::error::SpawnError;
use crate::core::types::{EntityId, Position, SpawnId};
use crate::persistence::records::{NpcTemplate, SpawnCandidate, SpawnPoolEntry};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Weighted pick over the entry's candidates. Deterministic for a given RNG
/// state and candidate order.
pub fn select_template<'a, R: Rng + ?Sized>(
    entry: &'a SpawnPoolEntry,
    rng: &mut R,
) -> Result<&'a SpawnCandidate, SpawnError> {
    let last = entry.candidates.last().ok_or(SpawnError::NoCandidates(entry.spawn_id))?;

    let total: u32 = entry.candidates.iter().map(|c| u32::from(c.chance)).sum();
    if total == 0 {
        return Err(SpawnError::InvalidTotalChance { spawn_id: entry.spawn_id, total });
    }

    let roll = rng.gen_range(0..total);
    let mut running = 0u32;
    for candidate in &entry.candidates {
        running += u32::from(candidate.chance);
        if roll < running {
            return Ok(candidate);
        }
    }
    Ok(last)
}

/// A spawn the zone should materialise this tick.
#[derive(Debug, Clone)]
pub struct SpawnDecision {
    pub spawn_id: SpawnId,
    pub template: Arc<NpcTemplate>,
    pub position: Position,
    pub grid_id: Option<u32>,
}

#[derive(Debug)]
struct SpawnSlot {
    entry: SpawnPoolEntry,
    occupant: Option<EntityId>,
    pending: bool,
    next_spawn: Instant,
    failing: bool,
}

impl SpawnSlot {
    fn is_vacant(&self) -> bool {
        self.occupant.is_none() && !self.pending
    }
}

pub struct SpawnScheduler {
    slots: BTreeMap<SpawnId, SpawnSlot>,
    occupants: HashMap<EntityId, SpawnId>,
    respawn_interval: Duration,
}

impl SpawnScheduler {
    /// Every timer starts elapsed so the pool fills on the first tick.
    pub fn new(entries: HashMap<SpawnId, SpawnPoolEntry>, respawn_interval: Duration, now: Instant) -> Self {
        let slots = entries
            .into_iter()
            .map(|(id, entry)| {
                (id, SpawnSlot { entry, occupant: None, pending: false, next_spawn: now, failing: false })
            })
            .collect();
        SpawnScheduler { slots, occupants: HashMap::new(), respawn_interval }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.occupants.len()
    }

    pub fn occupant_of(&self, spawn_id: SpawnId) -> Option<EntityId> {
        self.slots.get(&spawn_id).and_then(|s| s.occupant)
    }

    pub fn next_spawn_at(&self, spawn_id: SpawnId) -> Option<Instant> {
        self.slots.get(&spawn_id).map(|s| s.next_spawn)
    }

    /// Picks templates for every vacant slot whose timer has elapsed. A slot
    /// whose selection fails is skipped and retried on the next poll.
    pub fn poll<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> Vec<SpawnDecision> {
        let mut decisions = Vec::new();
        for (spawn_id, slot) in self.slots.iter_mut() {
            if !slot.is_vacant() || now < slot.next_spawn {
                continue;
            }
            match select_template(&slot.entry, rng) {
                Ok(candidate) => {
                    decisions.push(SpawnDecision {
                        spawn_id: *spawn_id,
                        template: candidate.template.clone(),
                        position: slot.entry.position,
                        grid_id: slot.entry.grid_id,
                    });
                    slot.pending = true;
                    slot.failing = false;
                    slot.next_spawn = now + self.respawn_interval;
                }
                Err(e) if slot.failing => debug!("Spawn point {} still failing: {}", spawn_id, e),
                Err(e) => {
                    warn!("Spawn point {} skipped: {}", spawn_id, e);
                    slot.failing = true;
                }
            }
        }
        decisions
    }

    pub fn bind_occupant(&mut self, spawn_id: SpawnId, entity_id: EntityId) {
        if let Some(slot) = self.slots.get_mut(&spawn_id) {
            slot.pending = false;
            slot.occupant = Some(entity_id);
            self.occupants.insert(entity_id, spawn_id);
        }
    }

    /// Abandons a pending decision the zone could not materialise.
    pub fn cancel_pending(&mut self, spawn_id: SpawnId) {
        if let Some(slot) = self.slots.get_mut(&spawn_id) {
            slot.pending = false;
        }
    }

    /// Frees the slot held by `entity_id` and rearms its timer.
    pub fn release(&mut self, entity_id: EntityId, now: Instant) -> Option<SpawnId> {
        let spawn_id = self.occupants.remove(&entity_id)?;
        if let Some(slot) = self.slots.get_mut(&spawn_id) {
            slot.occupant = None;
            slot.next_spawn = now + self.respawn_interval;
        }
        Some(spawn_id)
    }
}
