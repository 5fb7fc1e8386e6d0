// world_server/server/src/world/spatial_grid.rs
//! Interest management over a uniform 3-D cell grid.
//!
//! Every entity subscribes to the occupants of the 27 cells around its own cell.
//! Subscriber sets are symmetric: when an entity changes cell both its own set
//! and the sets of every entity it gains or loses are patched, so
//! `a ∈ subs(b) ⇔ b ∈ subs(a) ⇔ cells adjacent`. Moves inside a cell only set
//! the dirty flag.

use crate::core::constants::{CELL_AXIS_BITS, CELL_AXIS_MASK, CELL_COORD_MAX, CELL_COORD_MIN, GRID_CELL_SIZE};
use crate::core::types::{EntityId, Position};
use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use tracing::{debug, trace};

pub type CellKey = i64;
pub type EntityList = SmallVec<[EntityId; 8]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

fn axis_cell(value: f32, cell_size: f32) -> i32 {
    // NaN casts to 0; infinities saturate before the clamp.
    ((value / cell_size).floor() as i32).clamp(CELL_COORD_MIN, CELL_COORD_MAX)
}

fn in_range(axis: i32) -> bool {
    (CELL_COORD_MIN..=CELL_COORD_MAX).contains(&axis)
}

impl CellCoord {
    /// Cell holding `pos`. Positions past the packable range land in the
    /// outermost cell on that axis.
    pub fn from_position(pos: &Position, cell_size: f32) -> Self {
        CellCoord {
            x: axis_cell(pos.x, cell_size),
            y: axis_cell(pos.y, cell_size),
            z: axis_cell(pos.z, cell_size),
        }
    }

    /// Packs the three axes into 21 bits each.
    pub fn key(&self) -> CellKey {
        ((self.x as i64 & CELL_AXIS_MASK) << (2 * CELL_AXIS_BITS))
            | ((self.y as i64 & CELL_AXIS_MASK) << CELL_AXIS_BITS)
            | (self.z as i64 & CELL_AXIS_MASK)
    }

    /// The up to 27 cells around and including this one. Cells outside the
    /// packable range are skipped so no two yielded cells share a key.
    pub fn neighborhood(self) -> impl Iterator<Item = CellCoord> {
        let axis = move |c: i32| (-1..=1).filter_map(move |d: i32| c.checked_add(d).filter(|v| in_range(*v)));
        axis(self.x).flat_map(move |x| axis(self.y).flat_map(move |y| axis(self.z).map(move |z| CellCoord { x, y, z })))
    }

    pub fn is_adjacent(&self, other: &CellCoord) -> bool {
        let near = |a: i32, b: i32| (i64::from(a) - i64::from(b)).abs() <= 1;
        near(self.x, other.x) && near(self.y, other.y) && near(self.z, other.z)
    }
}

/// Visibility changes caused by one grid mutation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub cell_changed: bool,
    pub gained: EntityList,
    pub lost: EntityList,
}

pub struct InterestGrid {
    cell_size: f32,
    buckets: AHashMap<CellKey, AHashSet<EntityId>>,
    entity_cells: AHashMap<EntityId, CellCoord>,
    subscribers: AHashMap<EntityId, AHashSet<EntityId>>,
    dirty: Vec<EntityId>,
    dirty_set: AHashSet<EntityId>,
}

impl Default for InterestGrid {
    fn default() -> Self {
        Self::new(GRID_CELL_SIZE)
    }
}

impl InterestGrid {
    pub fn new(cell_size: f32) -> Self {
        debug!("Interest grid initialized, cell size {}", cell_size);
        InterestGrid {
            cell_size,
            buckets: AHashMap::new(),
            entity_cells: AHashMap::new(),
            subscribers: AHashMap::new(),
            dirty: Vec::new(),
            dirty_set: AHashSet::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.entity_cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_cells.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entity_cells.contains_key(&id)
    }

    pub fn cell_of(&self, id: EntityId) -> Option<CellCoord> {
        self.entity_cells.get(&id).copied()
    }

    pub fn subscribers_of(&self, id: EntityId) -> Option<&AHashSet<EntityId>> {
        self.subscribers.get(&id)
    }

    pub fn bucket_len(&self, cell: &CellCoord) -> usize {
        self.buckets.get(&cell.key()).map_or(0, |b| b.len())
    }

    pub fn is_dirty(&self, id: EntityId) -> bool {
        self.dirty_set.contains(&id)
    }

    pub fn mark_dirty(&mut self, id: EntityId) {
        if self.dirty_set.insert(id) {
            self.dirty.push(id);
        }
    }

    pub fn mark_moved(&mut self, id: EntityId, position: &Position) -> MoveOutcome {
        self.mark_dirty(id);
        let new_cell = CellCoord::from_position(position, self.cell_size);
        match self.entity_cells.get(&id).copied() {
            Some(old) if old == new_cell => MoveOutcome::default(),
            old => self.rebucket(id, old, new_cell),
        }
    }

    pub fn rebucket(&mut self, id: EntityId, old: Option<CellCoord>, new_cell: CellCoord) -> MoveOutcome {
        if let Some(old) = old {
            let old_key = old.key();
            if let Some(bucket) = self.buckets.get_mut(&old_key) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    self.buckets.remove(&old_key);
                }
            }
        }
        self.buckets.entry(new_cell.key()).or_default().insert(id);
        self.entity_cells.insert(id, new_cell);
        trace!("Entity {} rebucketed {:?} -> {:?}", id, old, new_cell);

        let mut outcome = self.resubscribe(id, new_cell);
        outcome.cell_changed = true;
        outcome
    }

    pub fn resubscribe(&mut self, id: EntityId, cell: CellCoord) -> MoveOutcome {
        let mut new_subs = AHashSet::new();
        for neighbor in cell.neighborhood() {
            if let Some(bucket) = self.buckets.get(&neighbor.key()) {
                new_subs.extend(bucket.iter().copied().filter(|other| *other != id));
            }
        }

        let previous = self.subscribers.remove(&id).unwrap_or_default();
        let mut outcome = MoveOutcome::default();

        for other in previous.difference(&new_subs) {
            if let Some(set) = self.subscribers.get_mut(other) {
                set.remove(&id);
            }
            outcome.lost.push(*other);
        }
        for other in new_subs.difference(&previous) {
            self.subscribers.entry(*other).or_default().insert(id);
            outcome.gained.push(*other);
        }

        self.subscribers.insert(id, new_subs);
        outcome
    }

    /// Buckets a newcomer and marks every neighbor dirty so both sides see each
    /// other on the next flush.
    pub fn register_new_entity(&mut self, id: EntityId, position: &Position) -> MoveOutcome {
        let outcome = self.mark_moved(id, position);
        let neighbors: EntityList = self
            .subscribers
            .get(&id)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default();
        for other in neighbors {
            self.subscribers.entry(other).or_default().insert(id);
            self.mark_dirty(other);
        }
        outcome
    }

    /// Drops the entity everywhere. Returns who could see it.
    pub fn remove_entity(&mut self, id: EntityId) -> AHashSet<EntityId> {
        if let Some(cell) = self.entity_cells.remove(&id) {
            let key = cell.key();
            if let Some(bucket) = self.buckets.get_mut(&key) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
        let former = self.subscribers.remove(&id).unwrap_or_default();
        for other in &former {
            if let Some(set) = self.subscribers.get_mut(other) {
                set.remove(&id);
            }
        }
        if self.dirty_set.remove(&id) {
            self.dirty.retain(|d| *d != id);
        }
        former
    }

    /// Entities in the 27 cells around `position`.
    pub fn entities_near(&self, position: &Position) -> Vec<EntityId> {
        let center = CellCoord::from_position(position, self.cell_size);
        center
            .neighborhood()
            .filter_map(|cell| self.buckets.get(&cell.key()))
            .flat_map(|bucket| bucket.iter().copied())
            .collect()
    }

    /// Hands every dirty entity and its subscribers to `emit`, then clears the
    /// dirty list. Returns how many entities were flushed.
    pub fn flush_updates<F>(&mut self, mut emit: F) -> usize
    where
        F: FnMut(EntityId, &AHashSet<EntityId>),
    {
        let dirty = std::mem::take(&mut self.dirty);
        self.dirty_set.clear();
        let empty = AHashSet::new();
        for id in &dirty {
            let subs = self.subscribers.get(id).unwrap_or(&empty);
            emit(*id, subs);
        }
        let flushed = dirty.len();
        // Keep the allocation for the next tick.
        self.dirty = dirty;
        self.dirty.clear();
        flushed
    }
}
