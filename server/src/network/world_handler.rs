// world_server/server/src/network/world_handler.rs
use super::framing::decode_datagram;
use super::opcodes::OpCode;
use super::session::{Session, SessionRegistry};
use super::transport::TransportSink;
use crate::core::config::ServerConfig;
use crate::core::types::SessionId;
use crate::operational::monitoring::metrics;
use crate::persistence::WorldStore;
use crate::server::instance::ZoneInbound;
use crate::server::zone_manager::ZoneManager;
use crate::systems::world_handlers::{global_handlers, TokenValidator};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

pub type GlobalHandler = for<'a> fn(&'a WorldHandler, &'a Arc<Session>, &'a [u8]) -> BoxFuture<'a, crate::core::error::ServerResult<()>>;

/// Entry point for every decoded datagram. Global opcodes run here; anything
/// else goes onto the backlog of the session's zone.
pub struct WorldHandler {
    config: Arc<ServerConfig>,
    sessions: Arc<SessionRegistry>,
    zones: Arc<ZoneManager>,
    store: Arc<dyn WorldStore>,
    validator: Arc<dyn TokenValidator>,
    global: HashMap<OpCode, GlobalHandler>,
}

impl WorldHandler {
    pub fn new(
        config: Arc<ServerConfig>,
        sessions: Arc<SessionRegistry>,
        zones: Arc<ZoneManager>,
        store: Arc<dyn WorldStore>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        WorldHandler { config, sessions, zones, store, validator, global: global_handlers() }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn zones(&self) -> &Arc<ZoneManager> {
        &self.zones
    }

    pub fn store(&self) -> &dyn WorldStore {
        self.store.as_ref()
    }

    pub fn validator(&self) -> &dyn TokenValidator {
        self.validator.as_ref()
    }

    pub fn storage_timeout(&self) -> Duration {
        self.config.storage_timeout()
    }

    /// Registers a transport. A non-zero `requested` id resumes that session
    /// when it exists and the address matches; otherwise a new one is made.
    /// Also returns the transport generation to hand back to `disconnect`.
    pub fn connect(&self, sink: Arc<dyn TransportSink>, ip: IpAddr, requested: Option<SessionId>) -> (Arc<Session>, u64) {
        if let Some(id) = requested {
            match self.sessions.get_valid_session(id, ip) {
                Ok(session) => {
                    let generation = session.attach_transport(sink);
                    info!("Session {} resumed from {} (generation {})", id, ip, generation);
                    return (session, generation);
                }
                Err(e) => info!("Resume refused ({}), issuing a new session", e),
            }
        }
        let id = self.sessions.allocate_id();
        let session = self.sessions.create_session(sink, id, ip);
        let generation = session.generation();
        (session, generation)
    }

    /// Transport `attached` went away. The session survives for the grace
    /// period and is removed afterwards unless a reconnect attached to it in
    /// between.
    pub fn disconnect(self: &Arc<Self>, session: &Arc<Session>, attached: u64) {
        let Some(generation) = session.detach_transport(attached) else {
            debug!("Session {} already resumed elsewhere, keeping it", session.id());
            return;
        };
        let grace = self.config.grace_period();
        debug!("Session {} detached, expiring in {:?} unless resumed", session.id(), grace);

        let world = Arc::clone(self);
        let id = session.id();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            world.expire_session(id, generation);
        });
    }

    pub fn expire_session(&self, id: SessionId, generation: u64) {
        let Some(session) = self.sessions.expire_if_detached(id, generation) else {
            return;
        };
        let Some(key) = session.zone() else {
            return;
        };
        match self.zones.get(key) {
            Some(zone) => {
                if let Err(e) = zone.enqueue(ZoneInbound::ClientLeft { session_id: id }) {
                    warn!("Session {}: could not notify {} of departure: {}", id, key, e);
                }
            }
            None => debug!("Session {} expired, {} no longer loaded", id, key),
        }
    }

    /// Routes one datagram-shaped frame (`[opcode][payload]`).
    pub async fn handle_packet(&self, session: &Arc<Session>, frame: Bytes) {
        let opcode = match decode_datagram(&frame) {
            Ok((raw, _)) => raw,
            Err(e) => {
                warn!("Session {}: malformed frame dropped: {}", session.id(), e);
                metrics::record_packet_dropped("malformed");
                return;
            }
        };
        let payload = frame.slice(crate::core::constants::DATAGRAM_HEADER_LEN..);

        let opcode = match OpCode::try_from(opcode) {
            Ok(op) => op,
            Err(_) => {
                warn!("Session {}: unknown opcode {:#06x}, dropping", session.id(), opcode);
                metrics::record_packet_dropped("unknown_opcode");
                return;
            }
        };

        if !session.is_authenticated() && !opcode.allowed_unauthenticated() {
            warn!("Session {}: {:?} before authentication, dropping", session.id(), opcode);
            metrics::record_packet_dropped("unauthenticated");
            return;
        }

        if opcode.is_global() {
            let Some(handler) = self.global.get(&opcode).copied() else {
                warn!("Session {}: no handler registered for {:?}", session.id(), opcode);
                metrics::record_packet_dropped("no_global_handler");
                return;
            };
            trace!("Session {}: global {:?}", session.id(), opcode);
            if let Err(e) = handler(self, session, &payload).await {
                warn!("Session {}: {:?} failed: {}", session.id(), opcode, e);
            }
            metrics::record_packet_routed();
            return;
        }

        let Some(key) = session.zone() else {
            warn!("Session {}: {:?} without a zone, dropping", session.id(), opcode);
            metrics::record_packet_dropped("no_zone");
            return;
        };
        let Some(zone) = self.zones.get_or_create(key).await else {
            warn!("Session {}: {} unavailable, dropping {:?}", session.id(), key, opcode);
            metrics::record_packet_dropped("zone_unavailable");
            return;
        };
        match zone.enqueue(ZoneInbound::Packet { session: session.clone(), opcode, payload }) {
            Ok(()) => metrics::record_packet_routed(),
            Err(e) => {
                warn!("Session {}: {:?} not queued: {}", session.id(), opcode, e);
                metrics::record_packet_dropped("backlog");
            }
        }
    }
}
