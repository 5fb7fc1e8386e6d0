// world_server/server/src/systems/quest.rs
//! Quest dispatch: zone short name → NPC name → event type → handler.
//!
//! The table is built at compile time (see `quest_zones`) and held behind an
//! `ArcSwap`, so `reload` can replace it while zones keep running. Handlers
//! never touch zone state directly; they emit `QuestEffect`s which the zone
//! applies after the call returns.

use crate::core::types::EntityId;
use crate::entities::Entity;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Name under which zone-wide fallback handlers are registered.
pub const ZONE_WIDE: &str = "";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QuestEventType {
    Say,
    Spawn,
    EnterZone,
    Despawn,
}

pub struct QuestEvent<'a> {
    pub event_type: QuestEventType,
    pub actor: Option<&'a Entity>,
    pub receiver: Option<&'a Entity>,
    pub message: Option<&'a str>,
}

impl<'a> QuestEvent<'a> {
    pub fn new(event_type: QuestEventType) -> Self {
        QuestEvent { event_type, actor: None, receiver: None, message: None }
    }

    pub fn actor(mut self, actor: &'a Entity) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn receiver(mut self, receiver: &'a Entity) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn message(mut self, message: &'a str) -> Self {
        self.message = Some(message);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuestEffect {
    Say { speaker: EntityId, message: String },
    Despawn(EntityId),
}

#[derive(Debug, Default)]
pub struct QuestEffects {
    effects: Vec<QuestEffect>,
}

impl QuestEffects {
    pub fn say(&mut self, speaker: &Entity, message: impl Into<String>) {
        self.effects.push(QuestEffect::Say { speaker: speaker.id(), message: message.into() });
    }

    pub fn despawn(&mut self, entity: &Entity) {
        self.effects.push(QuestEffect::Despawn(entity.id()));
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn into_vec(self) -> Vec<QuestEffect> {
        self.effects
    }
}

pub type QuestHandler = fn(&QuestEvent<'_>, &mut QuestEffects) -> bool;

/// Handlers registered for one zone.
#[derive(Default, Clone)]
pub struct ZoneQuests {
    handlers: HashMap<String, HashMap<QuestEventType, QuestHandler>>,
}

impl ZoneQuests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, event_type: QuestEventType, handler: QuestHandler) -> &mut Self {
        self.handlers.entry(name.to_string()).or_default().insert(event_type, handler);
        self
    }

    pub fn unregister(&mut self, name: &str, event_type: QuestEventType) {
        if let Some(events) = self.handlers.get_mut(name) {
            events.remove(&event_type);
            if events.is_empty() {
                self.handlers.remove(name);
            }
        }
    }

    pub fn has_handler(&self, name: &str, event_type: QuestEventType) -> bool {
        self.handlers.get(name).map_or(false, |events| events.contains_key(&event_type))
    }

    /// Runs the handler registered for `name`, or the zone-wide one when
    /// `name` has none for this event. Returns whether a handler claimed it.
    pub fn invoke(&self, name: &str, event: &QuestEvent<'_>, effects: &mut QuestEffects) -> bool {
        let handler = self
            .handlers
            .get(name)
            .and_then(|events| events.get(&event.event_type))
            .or_else(|| self.handlers.get(ZONE_WIDE).and_then(|events| events.get(&event.event_type)));
        match handler {
            Some(handler) => handler(event, effects),
            None => {
                debug!("No {:?} quest handler for '{}'", event.event_type, name);
                false
            }
        }
    }
}

pub type QuestTable = HashMap<String, Arc<ZoneQuests>>;

pub struct QuestRegistry {
    table: ArcSwap<QuestTable>,
}

impl QuestRegistry {
    pub fn new(table: QuestTable) -> Self {
        QuestRegistry { table: ArcSwap::from_pointee(table) }
    }

    /// Registry loaded with the compiled-in zone scripts.
    pub fn builtin() -> Self {
        Self::new(super::quest_zones::builtin_table())
    }

    pub fn zone(&self, short_name: &str) -> Option<Arc<ZoneQuests>> {
        self.table.load().get(short_name).cloned()
    }

    /// Atomically replaces the whole table. Zones pick up the new handlers on
    /// their next dispatch.
    pub fn reload(&self, table: QuestTable) {
        let zones = table.len();
        self.table.store(Arc::new(table));
        info!("Quest table reloaded ({} zones)", zones);
    }

    pub fn zone_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.load().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for QuestRegistry {
    fn default() -> Self {
        Self::new(QuestTable::new())
    }
}
