// world_server/server/src/network/session.rs
use crate::core::error::{ServerResult, SessionError};
use crate::core::types::{AccountId, EntityId, SessionId, ZoneKey};
use crate::network::framing::FrameBuffer;
use crate::network::opcodes::OpCode;
use crate::network::transport::{DetachedSink, TransportSink};
use crate::operational::monitoring::metrics;
use crate::persistence::records::CharacterRecord;
use parking_lot::{Mutex, RwLock};
use prost::Message;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Mutable per-session bindings, guarded together.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    pub account_id: Option<AccountId>,
    pub zone: Option<ZoneKey>,
    pub character: Option<CharacterRecord>,
    pub entity_id: Option<EntityId>,
}

pub struct Session {
    id: SessionId,
    ip: IpAddr,
    authenticated: AtomicBool,
    connected: AtomicBool,
    // Bumped on every attach/detach so a stale grace timer can tell it lost.
    generation: AtomicU64,
    state: RwLock<SessionState>,
    sink: RwLock<Arc<dyn TransportSink>>,
    scratch: Mutex<FrameBuffer>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("ip", &self.ip)
            .field("authenticated", &self.is_authenticated())
            .field("connected", &self.is_connected())
            .field("state", &*self.state.read())
            .finish()
    }
}

impl Session {
    fn new(id: SessionId, ip: IpAddr, sink: Arc<dyn TransportSink>, buffer_size: usize) -> Self {
        Session {
            id,
            ip,
            authenticated: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            state: RwLock::new(SessionState::default()),
            sink: RwLock::new(sink),
            scratch: Mutex::new(FrameBuffer::with_capacity(buffer_size)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.state.read().account_id
    }

    pub fn set_account_id(&self, account_id: AccountId) {
        self.state.write().account_id = Some(account_id);
    }

    pub fn zone(&self) -> Option<ZoneKey> {
        self.state.read().zone
    }

    pub fn set_zone(&self, zone: Option<ZoneKey>) {
        self.state.write().zone = zone;
    }

    pub fn character(&self) -> Option<CharacterRecord> {
        self.state.read().character.clone()
    }

    pub fn character_name(&self) -> Option<String> {
        self.state.read().character.as_ref().map(|c| c.name.clone())
    }

    pub fn set_character(&self, character: Option<CharacterRecord>) {
        self.state.write().character = character;
    }

    pub fn update_character<F: FnOnce(&mut CharacterRecord)>(&self, f: F) {
        if let Some(character) = self.state.write().character.as_mut() {
            f(character);
        }
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        self.state.read().entity_id
    }

    pub fn set_entity_id(&self, entity_id: Option<EntityId>) {
        self.state.write().entity_id = entity_id;
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn send_datagram<M: Message>(&self, opcode: OpCode, msg: &M) -> ServerResult<()> {
        let mut scratch = self.scratch.lock();
        let frame = scratch.encode_datagram(opcode.as_u16(), msg)?;
        self.sink.read().send_datagram(self.id, frame)?;
        Ok(())
    }

    pub fn send_stream<M: Message>(&self, opcode: OpCode, msg: &M) -> ServerResult<()> {
        let mut scratch = self.scratch.lock();
        let frame = scratch.encode_stream(opcode.as_u16(), msg)?;
        self.sink.read().send_stream(self.id, frame)?;
        Ok(())
    }

    /// Swaps in a fresh transport after a reconnect. Returns the generation
    /// the new transport owns.
    pub(crate) fn attach_transport(&self, sink: Arc<dyn TransportSink>) -> u64 {
        let mut current = self.sink.write();
        *current = sink;
        self.connected.store(true, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops the transport attached at `attached`. A newer attach wins and
    /// the call returns `None`.
    pub(crate) fn detach_transport(&self, attached: u64) -> Option<u64> {
        let mut current = self.sink.write();
        if self.generation.load(Ordering::Acquire) != attached {
            return None;
        }
        *current = Arc::new(DetachedSink);
        self.connected.store(false, Ordering::Release);
        Some(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn scratch_capacity(&self) -> usize {
        self.scratch.lock().capacity()
    }

    fn release_buffers(&self) {
        self.scratch.lock().release();
    }
}

/// Process-wide map of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    next_id: AtomicU32,
    buffer_size: usize,
}

impl SessionRegistry {
    pub fn new(buffer_size: usize) -> Self {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            buffer_size,
        }
    }

    /// Next unused session id. Ids only move forward, so an id is never handed
    /// out twice within a process lifetime.
    pub fn allocate_id(&self) -> SessionId {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 && !self.sessions.read().contains_key(&id) {
                return id;
            }
        }
    }

    pub fn create_session(&self, sink: Arc<dyn TransportSink>, id: SessionId, ip: IpAddr) -> Arc<Session> {
        let session = Arc::new(Session::new(id, ip, sink, self.buffer_size));
        let count = {
            let mut sessions = self.sessions.write();
            if sessions.insert(id, session.clone()).is_some() {
                warn!("Session {} replaced an existing entry", id);
            }
            sessions.len()
        };
        metrics::set_sessions_active(count);
        info!("Created session {} for {}", id, ip);
        session
    }

    pub fn get_session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Lookup for reconnects: the caller must come from the stored address.
    pub fn get_valid_session(&self, id: SessionId, ip: IpAddr) -> Result<Arc<Session>, SessionError> {
        let session = self.get_session(id).ok_or(SessionError::NotFound(id))?;
        if session.ip() != ip {
            warn!("Session {} reconnect from {} rejected (stored {})", id, ip, session.ip());
            return Err(SessionError::IpMismatch(id));
        }
        Ok(session)
    }

    pub fn remove_session(&self, id: SessionId) -> Option<Arc<Session>> {
        let (removed, count) = {
            let mut sessions = self.sessions.write();
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };
        if let Some(session) = &removed {
            session.release_buffers();
            metrics::set_sessions_active(count);
            info!("Removed session {}", id);
        }
        removed
    }

    /// Removes the session only if it is still detached at `generation`.
    /// A reconnect in between bumps the generation and wins.
    pub fn expire_if_detached(&self, id: SessionId, generation: u64) -> Option<Arc<Session>> {
        let (removed, count) = {
            let mut sessions = self.sessions.write();
            let stale = sessions
                .get(&id)
                .map(|s| !s.is_connected() && s.generation() == generation)
                .unwrap_or(false);
            if !stale {
                debug!("Session {} superseded before grace expiry, cleanup skipped", id);
                return None;
            }
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };
        if let Some(session) = &removed {
            session.release_buffers();
            metrics::set_sessions_active(count);
            info!("Session {} expired after grace period", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
