// world_server/server/src/server/instance.rs
use crate::concurrent::ingress_queue::IngressQueue;
use crate::core::config::ServerConfig;
use crate::core::error::{ServerError, ServerResult};
use crate::core::types::{EntityId, Position, SessionId, SpawnId, ZoneKey, ZoneLifecycle};
use crate::entities::npc::{NpcEntity, PathState};
use crate::entities::player::PlayerEntity;
use crate::entities::{Broadcastable, Entity, Locatable, Nameable};
use crate::network::messages;
use crate::network::opcodes::OpCode;
use crate::network::session::Session;
use crate::persistence::records::{NpcTemplate, SpawnPoolEntry, Waypoint, ZoneStaticData};
use crate::persistence::{with_timeout, WorldStore};
use crate::systems::quest::{QuestEffect, QuestEffects, QuestEvent, QuestEventType, QuestRegistry};
use crate::systems::zone_handlers::ZoneHandlerRegistry;
use crate::world::spatial_grid::{InterestGrid, MoveOutcome};
use crate::world::spawn_pool::SpawnScheduler;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use prost::Message;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Work item on a zone's backlog.
#[derive(Debug)]
pub enum ZoneInbound {
    Packet { session: Arc<Session>, opcode: OpCode, payload: Bytes },
    /// The session's grace period ran out.
    ClientLeft { session_id: SessionId },
}

/// Read-only view of an entity published for other subsystems.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySummary {
    pub id: EntityId,
    pub name: String,
    pub is_npc: bool,
    pub session_id: Option<SessionId>,
}

/// Collaborators every zone is built with.
#[derive(Clone)]
pub struct ZoneServices {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn WorldStore>,
    pub handlers: Arc<ZoneHandlerRegistry>,
    pub quests: Arc<QuestRegistry>,
}

/// Shared handle to a running zone. Everything mutable about the simulation
/// lives in [`Zone`], owned by the zone's task.
pub struct ZoneInstance {
    key: ZoneKey,
    short_name: String,
    lifecycle: AtomicU8,
    pub(crate) backlog: IngressQueue<ZoneInbound>,
    pub(crate) quit: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
    roster: RwLock<HashMap<SessionId, Option<EntityId>>>,
    entities: RwLock<HashMap<EntityId, EntitySummary>>,
}

impl std::fmt::Debug for ZoneInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneInstance")
            .field("key", &self.key)
            .field("short_name", &self.short_name)
            .field("lifecycle", &self.lifecycle())
            .field("backlog", &self.backlog.len())
            .finish()
    }
}

impl ZoneInstance {
    fn new(key: ZoneKey, short_name: String, max_backlog: usize) -> Self {
        ZoneInstance {
            key,
            short_name,
            lifecycle: AtomicU8::new(ZoneLifecycle::Created as u8),
            backlog: IngressQueue::new(max_backlog),
            quit: Notify::new(),
            task: Mutex::new(None),
            roster: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Builds the zone state and spawns its actor loop.
    pub fn start(
        key: ZoneKey,
        static_data: ZoneStaticData,
        spawn_pool: HashMap<SpawnId, SpawnPoolEntry>,
        services: ZoneServices,
    ) -> Arc<ZoneInstance> {
        let handle = Arc::new(ZoneInstance::new(key, static_data.short_name.clone(), services.config.max_backlog));
        let zone = Zone::new(handle.clone(), static_data, spawn_pool, services);
        let task = tokio::spawn(super::game_loop::run_zone(zone));
        *handle.task.lock() = Some(task);
        handle
    }

    pub fn key(&self) -> ZoneKey {
        self.key
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn lifecycle(&self) -> ZoneLifecycle {
        ZoneLifecycle::from_u8(self.lifecycle.load(Ordering::SeqCst))
    }

    pub(crate) fn set_lifecycle(&self, state: ZoneLifecycle) {
        self.lifecycle.store(state as u8, Ordering::SeqCst);
    }

    pub fn accepts_work(&self) -> bool {
        matches!(self.lifecycle(), ZoneLifecycle::Created | ZoneLifecycle::Running)
    }

    /// Appends to the backlog and wakes the zone loop.
    pub fn enqueue(&self, item: ZoneInbound) -> ServerResult<()> {
        if !self.accepts_work() {
            return Err(ServerError::ZoneStopping(self.key));
        }
        self.backlog.push(item).map_err(|_| {
            warn!("[{}] backlog full, dropping packet", self.key);
            ServerError::BacklogFull { zone: self.key, limit: self.backlog.capacity() }
        })?;
        // The loop may have run its last drain between the check and the push.
        if self.lifecycle() == ZoneLifecycle::Stopped {
            debug!("[{}] stopped while enqueueing, item may not run", self.key);
            return Err(ServerError::ZoneStopping(self.key));
        }
        Ok(())
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn has_client(&self, session_id: SessionId) -> bool {
        self.roster.read().contains_key(&session_id)
    }

    pub fn client_entity(&self, session_id: SessionId) -> Option<EntityId> {
        self.roster.read().get(&session_id).copied().flatten()
    }

    pub fn roster_snapshot(&self) -> Vec<(SessionId, Option<EntityId>)> {
        let mut roster: Vec<_> = self.roster.read().iter().map(|(s, e)| (*s, *e)).collect();
        roster.sort_unstable_by_key(|(s, _)| *s);
        roster
    }

    pub fn entity_summary(&self, id: EntityId) -> Option<EntitySummary> {
        self.entities.read().get(&id).cloned()
    }

    pub fn entity_summaries(&self) -> Vec<EntitySummary> {
        let mut all: Vec<_> = self.entities.read().values().cloned().collect();
        all.sort_unstable_by_key(|e| e.id);
        all
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Signals the loop to finish and waits until it has exited.
    pub async fn stop(&self) {
        if self.accepts_work() {
            self.set_lifecycle(ZoneLifecycle::ShuttingDown);
        }
        self.quit.notify_one();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("[{}] zone task ended abnormally: {}", self.key, e);
            }
        }
        self.set_lifecycle(ZoneLifecycle::Stopped);
    }
}

pub struct ClientEntry {
    pub session: Arc<Session>,
    pub entity_id: Option<EntityId>,
}

/// How a payload should reach its recipients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Datagram,
    Stream,
}

/// Simulation state of one zone. Owned and mutated only by the zone task.
pub struct Zone {
    pub(crate) handle: Arc<ZoneInstance>,
    static_data: Arc<ZoneStaticData>,
    entities: HashMap<EntityId, Entity>,
    next_entity_id: EntityId,
    pub(crate) grid: InterestGrid,
    pub(crate) spawns: SpawnScheduler,
    clients: HashMap<SessionId, ClientEntry>,
    handlers: Arc<ZoneHandlerRegistry>,
    quests: Arc<QuestRegistry>,
    store: Arc<dyn WorldStore>,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) rng: StdRng,
    paths: HashMap<u32, Arc<[Waypoint]>>,
}

impl Zone {
    pub(crate) fn new(
        handle: Arc<ZoneInstance>,
        static_data: ZoneStaticData,
        spawn_pool: HashMap<SpawnId, SpawnPoolEntry>,
        services: ZoneServices,
    ) -> Self {
        let rng = match services.config.spawn_rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ (handle.key.zone_id as u64) << 32 ^ handle.key.instance_id as u64),
            None => StdRng::from_entropy(),
        };
        let paths = static_data
            .grids
            .iter()
            .map(|(id, waypoints)| (*id, Arc::from(waypoints.as_slice())))
            .collect();
        let spawns = SpawnScheduler::new(spawn_pool, services.config.respawn_interval(), Instant::now());
        debug!("[{}] {} spawn points loaded", handle.key, spawns.len());

        Zone {
            handle,
            static_data: Arc::new(static_data),
            entities: HashMap::new(),
            next_entity_id: 1,
            grid: InterestGrid::default(),
            spawns,
            clients: HashMap::new(),
            handlers: services.handlers,
            quests: services.quests,
            store: services.store,
            config: services.config,
            rng,
            paths,
        }
    }

    pub fn key(&self) -> ZoneKey {
        self.handle.key
    }

    pub fn short_name(&self) -> &str {
        &self.static_data.short_name
    }

    pub fn static_data(&self) -> &ZoneStaticData {
        &self.static_data
    }

    pub fn entity_by_id(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_by_id_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn client_entity_id(&self, session_id: SessionId) -> Option<EntityId> {
        self.clients.get(&session_id).and_then(|c| c.entity_id)
    }

    /// Closest NPC carrying `name` (case-insensitive) to `origin`.
    pub fn npc_by_name(&self, name: &str, origin: &Position) -> Option<EntityId> {
        self.entities
            .values()
            .filter(|e| e.is_npc() && e.name().eq_ignore_ascii_case(name))
            .min_by(|a, b| {
                let da = a.position().distance_to(origin);
                let db = b.position().distance_to(origin);
                da.total_cmp(&db)
            })
            .map(|e| e.id())
    }

    fn allocate_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id = self.next_entity_id.wrapping_add(1).max(1);
        id
    }

    pub(crate) fn handle_inbound(&mut self, item: ZoneInbound) {
        match item {
            ZoneInbound::Packet { session, opcode, payload } => {
                self.ensure_client(&session);
                let Some(handler) = self.handlers.get(opcode) else {
                    warn!("[{}] no zone handler for {:?} from session {}, dropping", self.key(), opcode, session.id());
                    crate::operational::monitoring::metrics::record_packet_dropped("no_zone_handler");
                    return;
                };
                if let Err(e) = handler(self, &session, &payload) {
                    warn!("[{}] {:?} from session {} failed: {}", self.key(), opcode, session.id(), e);
                }
            }
            ZoneInbound::ClientLeft { session_id } => self.remove_client(session_id),
        }
    }

    fn ensure_client(&mut self, session: &Arc<Session>) {
        if self.clients.contains_key(&session.id()) {
            return;
        }
        self.clients.insert(session.id(), ClientEntry { session: session.clone(), entity_id: None });
        self.handle.roster.write().insert(session.id(), None);
        info!("[{}] added client session {}", self.key(), session.id());
    }

    fn publish_entity(&self, entity: &Entity) {
        let summary = EntitySummary {
            id: entity.id(),
            name: entity.name().to_string(),
            is_npc: entity.is_npc(),
            session_id: entity.as_player().map(|p| p.session_id),
        };
        self.handle.entities.write().insert(summary.id, summary);
    }

    /// Creates the avatar for a client that has a character loaded and
    /// registers it with the grid.
    pub fn add_player(&mut self, session: &Arc<Session>) -> ServerResult<(EntityId, MoveOutcome)> {
        let mut character = session
            .character()
            .ok_or_else(|| ServerError::NotFound(format!("character for session {}", session.id())))?;
        self.ensure_client(session);

        let key = self.key();
        let position = if character.zone_id == key.zone_id && character.position != Position::default() {
            character.position
        } else {
            self.static_data.safe_point
        };
        character.zone_id = key.zone_id;
        character.instance_id = key.instance_id;

        let id = self.allocate_entity_id();
        let entity = Entity::Player(PlayerEntity::new(id, session.id(), character, position));
        self.publish_entity(&entity);
        self.entities.insert(id, entity);
        let outcome = self.grid.register_new_entity(id, &position);

        if let Some(client) = self.clients.get_mut(&session.id()) {
            client.entity_id = Some(id);
        }
        self.handle.roster.write().insert(session.id(), Some(id));
        session.set_entity_id(Some(id));
        info!("[{}] session {} entered as entity {}", key, session.id(), id);
        Ok((id, outcome))
    }

    /// Materialises an NPC and announces it to every client in range.
    pub fn spawn_npc(
        &mut self,
        template: Arc<NpcTemplate>,
        spawn_id: Option<SpawnId>,
        position: Position,
        grid_id: Option<u32>,
    ) -> EntityId {
        let id = self.allocate_entity_id();
        let mut npc = NpcEntity::new(id, template, spawn_id, position);
        if let Some((grid, waypoints)) = grid_id.and_then(|g| self.paths.get(&g).map(|w| (g, w.clone()))) {
            npc = npc.with_path(PathState::new(grid, waypoints, Instant::now()));
        }
        let entity = Entity::Npc(npc);
        self.publish_entity(&entity);
        self.entities.insert(id, entity);

        let outcome = self.grid.register_new_entity(id, &position);
        self.announce_spawn(id, &outcome);
        self.invoke_quest_on(id, QuestEventType::Spawn, None, None);
        id
    }

    /// Applies a new position through the grid and patches visibility.
    pub fn move_entity(&mut self, id: EntityId, position: Position) -> Option<MoveOutcome> {
        let entity = self.entities.get_mut(&id)?;
        entity.set_position(position);
        let outcome = self.grid.mark_moved(id, &position);
        if outcome.cell_changed {
            self.apply_visibility(id, &outcome);
        }
        Some(outcome)
    }

    /// Removes an entity, telling everyone who could see it.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        if self.entities.get(&id).map_or(false, |e| e.is_npc()) {
            // Runs while the NPC is still in view so its last words reach the area.
            self.invoke_quest_on(id, QuestEventType::Despawn, None, None);
        }
        let entity = self.entities.remove(&id)?;
        let former = self.grid.remove_entity(id);
        let delete = messages::DeleteSpawn { spawn_id: id };
        for subscriber in former {
            self.send_to_entity(subscriber, OpCode::DeleteSpawn, &delete, Delivery::Stream);
        }
        if entity.is_npc() && self.spawns.release(id, Instant::now()).is_some() {
            debug!("[{}] spawn slot freed by entity {}", self.key(), id);
        }
        self.handle.entities.write().remove(&id);
        Some(entity)
    }

    /// Drops a client, persisting its character in the background.
    pub fn remove_client(&mut self, session_id: SessionId) {
        let Some(entry) = self.clients.remove(&session_id) else {
            return;
        };
        self.handle.roster.write().remove(&session_id);

        if let Some(entity_id) = entry.entity_id {
            if let Some(Entity::Player(player)) = self.remove_entity(entity_id) {
                let record = player.character;
                entry.session.set_character(Some(record.clone()));
                let store = self.store.clone();
                let limit = self.config.storage_timeout();
                tokio::spawn(async move {
                    if let Err(e) = with_timeout(limit, store.save_character(&record)).await {
                        warn!("Saving character {} failed: {}", record.name, e);
                    }
                });
            }
        }
        if entry.session.entity_id().is_some() && entry.entity_id == entry.session.entity_id() {
            entry.session.set_entity_id(None);
        }
        info!("[{}] removed client session {}", self.key(), session_id);
    }

    pub fn send_to_entity<M: Message>(&self, target: EntityId, opcode: OpCode, msg: &M, delivery: Delivery) {
        let Some(Entity::Player(player)) = self.entities.get(&target) else {
            return;
        };
        if let Some(client) = self.clients.get(&player.session_id) {
            send(&client.session, opcode, msg, delivery);
        }
    }

    /// Sends `msg` to every client subscribed to `origin`, and to `origin`
    /// itself when `include_self` is set.
    pub fn broadcast_to_area<M: Message>(
        &self,
        origin: EntityId,
        opcode: OpCode,
        msg: &M,
        delivery: Delivery,
        include_self: bool,
    ) {
        if include_self {
            self.send_to_entity(origin, opcode, msg, delivery);
        }
        if let Some(subscribers) = self.grid.subscribers_of(origin) {
            for subscriber in subscribers {
                self.send_to_entity(*subscriber, opcode, msg, delivery);
            }
        }
    }

    /// Sends spawn/delete messages for a cell transition.
    fn apply_visibility(&self, id: EntityId, outcome: &MoveOutcome) {
        let Some(mover) = self.entities.get(&id) else {
            return;
        };
        let mover_spawn = messages::Spawns { spawns: vec![mover.to_spawn()] };
        for other in &outcome.gained {
            self.send_to_entity(*other, OpCode::ZoneSpawns, &mover_spawn, Delivery::Stream);
            if let Some(entity) = self.entities.get(other) {
                let spawn = messages::Spawns { spawns: vec![entity.to_spawn()] };
                self.send_to_entity(id, OpCode::ZoneSpawns, &spawn, Delivery::Stream);
            }
        }
        for other in &outcome.lost {
            self.send_to_entity(*other, OpCode::DeleteSpawn, &messages::DeleteSpawn { spawn_id: id }, Delivery::Stream);
            self.send_to_entity(id, OpCode::DeleteSpawn, &messages::DeleteSpawn { spawn_id: *other }, Delivery::Stream);
        }
    }

    fn announce_spawn(&self, id: EntityId, outcome: &MoveOutcome) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let spawn = messages::Spawns { spawns: vec![entity.to_spawn()] };
        for other in &outcome.gained {
            self.send_to_entity(*other, OpCode::ZoneSpawns, &spawn, Delivery::Stream);
        }
    }

    /// Spawn records for everything `id` can currently see.
    pub fn visible_spawns(&self, id: EntityId) -> messages::Spawns {
        let spawns = self
            .grid
            .subscribers_of(id)
            .map(|subs| {
                let mut visible: Vec<_> = subs.iter().filter_map(|s| self.entities.get(s)).collect();
                visible.sort_unstable_by_key(|e| e.id());
                visible.into_iter().map(|e| e.to_spawn()).collect()
            })
            .unwrap_or_default();
        messages::Spawns { spawns }
    }

    pub fn new_zone_message(&self) -> messages::NewZone {
        let data = &self.static_data;
        messages::NewZone {
            short_name: data.short_name.clone(),
            long_name: data.long_name.clone(),
            zone_id: data.zone_id,
            instance_id: self.key().instance_id,
            safe_x: data.safe_point.x,
            safe_y: data.safe_point.y,
            safe_z: data.safe_point.z,
            zone_points: data.zone_points.iter().map(messages::ZonePoint::from).collect(),
        }
    }

    /// Dispatches a quest event where `target` is the receiver, then applies
    /// the handler's effects. Returns whether a handler claimed the event.
    pub fn invoke_quest_on(
        &mut self,
        target: EntityId,
        event_type: QuestEventType,
        actor: Option<EntityId>,
        message: Option<&str>,
    ) -> bool {
        let Some(quests) = self.quests.zone(self.short_name()) else {
            return false;
        };
        let Some(receiver) = self.entities.get(&target) else {
            return false;
        };
        let mut event = QuestEvent::new(event_type).receiver(receiver);
        if let Some(actor) = actor.and_then(|a| self.entities.get(&a)) {
            event = event.actor(actor);
        }
        if let Some(message) = message {
            event = event.message(message);
        }
        let mut effects = QuestEffects::default();
        let handled = quests.invoke(receiver.name(), &event, &mut effects);
        drop(event);
        self.apply_quest_effects(effects, event_type);
        handled
    }

    fn apply_quest_effects(&mut self, effects: QuestEffects, cause: QuestEventType) {
        for effect in effects.into_vec() {
            match effect {
                QuestEffect::Say { speaker, message } => {
                    let Some(entity) = self.entities.get(&speaker) else {
                        continue;
                    };
                    let chat = messages::ChannelMessage {
                        sender: entity.name().to_string(),
                        target_name: String::new(),
                        message,
                        chan_num: messages::channel::SAY,
                    };
                    self.broadcast_to_area(speaker, OpCode::ChannelMessage, &chat, Delivery::Stream, true);
                }
                // Despawn scripts cannot chain further despawns.
                QuestEffect::Despawn(_) if cause == QuestEventType::Despawn => {
                    debug!("[{}] despawn requested from a despawn script, ignored", self.key());
                }
                QuestEffect::Despawn(id) => {
                    if self.entities.get(&id).map_or(false, |e| e.is_npc()) {
                        self.remove_entity(id);
                    }
                }
            }
        }
    }

    /// Broadcasts one position update per dirty entity to its subscribers.
    pub fn flush_updates(&mut self) -> usize {
        let Zone { grid, entities, clients, .. } = self;
        grid.flush_updates(|id, subscribers| {
            let Some(entity) = entities.get(&id) else {
                return;
            };
            let update = entity.to_position_update();
            for subscriber in subscribers {
                if *subscriber == id {
                    continue;
                }
                if let Some(Entity::Player(player)) = entities.get(subscriber) {
                    if let Some(client) = clients.get(&player.session_id) {
                        send(&client.session, OpCode::SpawnPositionUpdate, &update, Delivery::Datagram);
                    }
                }
            }
        })
    }

    /// Releases every client on shutdown.
    pub(crate) fn evict_all_clients(&mut self) {
        let sessions: Vec<SessionId> = self.clients.keys().copied().collect();
        for session_id in sessions {
            self.remove_client(session_id);
        }
    }

    pub(crate) fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub(crate) fn npc_mut(&mut self, id: EntityId) -> Option<&mut NpcEntity> {
        self.entities.get_mut(&id).and_then(Entity::as_npc_mut)
    }
}

fn send<M: Message>(session: &Session, opcode: OpCode, msg: &M, delivery: Delivery) {
    let result = match delivery {
        Delivery::Datagram => session.send_datagram(opcode, msg),
        Delivery::Stream => session.send_stream(opcode, msg),
    };
    if let Err(e) = result {
        debug!("Send {:?} to session {} failed: {}", opcode, session.id(), e);
    }
}

#[cfg(test)]
pub(crate) fn test_zone(static_data: ZoneStaticData, spawn_pool: HashMap<SpawnId, SpawnPoolEntry>) -> Zone {
    let config = Arc::new(ServerConfig { spawn_rng_seed: Some(7), ..ServerConfig::default() });
    let services = ZoneServices {
        config: config.clone(),
        store: Arc::new(crate::persistence::MemoryStore::new(Default::default())),
        handlers: Arc::new(ZoneHandlerRegistry::with_defaults()),
        quests: Arc::new(QuestRegistry::builtin()),
    };
    let key = ZoneKey::new(static_data.zone_id, 0);
    let handle = Arc::new(ZoneInstance::new(key, static_data.short_name.clone(), config.max_backlog));
    Zone::new(handle, static_data, spawn_pool, services)
}
