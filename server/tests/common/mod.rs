// world_server/server/tests/common/mod.rs
#![allow(dead_code)]

use bytes::Bytes;
use prost::Message;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use world_server_core::core::config::ServerConfig;
use world_server_core::network::framing::{decode_stream, FrameBuffer};
use world_server_core::network::messages;
use world_server_core::network::opcodes::OpCode;
use world_server_core::network::session::{Session, SessionRegistry};
use world_server_core::network::transport::{ChannelSink, Outbound};
use world_server_core::persistence::{MemoryStore, WorldStore};
use world_server_core::server::{ZoneManager, ZoneServices};
use world_server_core::systems::quest::QuestRegistry;
use world_server_core::systems::world_handlers::PassthroughTokenValidator;
use world_server_core::systems::zone_handlers::ZoneHandlerRegistry;
use world_server_core::WorldHandler;

pub const WORLD_YAML: &str = r#"
zones:
  - zone_id: 1
    short_name: qeynos
    long_name: South Qeynos
    safe_point: { x: 186.0, y: 14.0, z: 4.0 }
  - zone_id: 2
    short_name: qeynos2
    long_name: North Qeynos
    safe_point: { x: 114.0, y: 678.0, z: 4.0 }
    zone_points:
      - { number: 1, position: { x: 240.0, y: -20.0, z: 2.0 }, target_zone_id: 1 }
npc_templates:
  - { id: 1, name: Guard_Gehnus, level: 25 }
  - { id: 2, name: Phin_Esrinap, level: 10 }
  - { id: 3, name: a_large_rat, level: 1 }
spawns:
  - spawn_id: 1
    zone: qeynos2
    position: { x: 120.0, y: 660.0, z: 4.0 }
    candidates: [{ template_id: 1, chance: 100 }]
  - spawn_id: 2
    zone: qeynos2
    position: { x: 130.0, y: 690.0, z: 4.0 }
    candidates: [{ template_id: 2, chance: 100 }]
  - spawn_id: 3
    zone: qeynos2
    position: { x: 420.0, y: 900.0, z: 0.0 }
    candidates: [{ template_id: 3, chance: 100 }]
"#;

pub const WAIT: Duration = Duration::from_secs(3);

pub fn test_config() -> ServerConfig {
    ServerConfig { spawn_rng_seed: Some(42), sim_tick_ms: 20, initial_frame_buffer: 512, ..ServerConfig::default() }
}

pub struct Harness {
    pub config: Arc<ServerConfig>,
    pub world: Arc<WorldHandler>,
    pub zones: Arc<ZoneManager>,
    pub store: Arc<dyn WorldStore>,
}

impl Harness {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_handlers(config, ZoneHandlerRegistry::with_defaults())
    }

    pub fn with_handlers(config: ServerConfig, handlers: ZoneHandlerRegistry) -> Self {
        let config = Arc::new(config);
        let store: Arc<dyn WorldStore> = Arc::new(MemoryStore::from_yaml_str(WORLD_YAML).expect("world data"));
        let zones = Arc::new(ZoneManager::new(ZoneServices {
            config: config.clone(),
            store: store.clone(),
            handlers: Arc::new(handlers),
            quests: Arc::new(QuestRegistry::builtin()),
        }));
        let sessions = Arc::new(SessionRegistry::new(config.initial_frame_buffer));
        let world = Arc::new(WorldHandler::new(
            config.clone(),
            sessions,
            zones.clone(),
            store.clone(),
            Arc::new(PassthroughTokenValidator),
        ));
        Harness { config, world, zones, store }
    }

    pub fn connect(&self) -> TestClient {
        self.connect_from(IpAddr::V4(Ipv4Addr::LOCALHOST), None)
    }

    pub fn connect_from(&self, ip: IpAddr, requested: Option<u32>) -> TestClient {
        let (sink, rx) = ChannelSink::new();
        let (session, generation) = self.world.connect(Arc::new(sink), ip, requested);
        TestClient { world: self.world.clone(), session, generation, rx, scratch: FrameBuffer::with_capacity(256) }
    }

    /// Logs in, creates a character in North Qeynos and enters its zone.
    pub async fn enter_zone(&self, name: &str) -> TestClient {
        let mut client = self.connect();
        client.send(OpCode::JwtLogin, &messages::JwtLogin { token: name.to_lowercase() }).await;
        let create = messages::CharacterCreate {
            name: name.to_string(),
            race: 1,
            char_class: 1,
            gender: 0,
            start_zone: 2,
        };
        client.send(OpCode::CharacterCreate, &create).await;
        client.send(OpCode::EnterWorld, &messages::StringValue { value: name.to_string() }).await;
        let target: messages::ZoneSession = client.expect(OpCode::PostEnterWorld).await;
        client.send(OpCode::ZoneSession, &target).await;
        let valid: messages::IntValue = client.expect(OpCode::ZoneSessionValid).await;
        assert_eq!(valid.value, 1, "zone session refused for {}", name);
        client.send(OpCode::RequestClientZoneChange, &messages::IntValue::default()).await;
        let _: messages::PlayerProfile = client.expect(OpCode::PlayerProfile).await;
        client
    }
}

pub struct TestClient {
    pub world: Arc<WorldHandler>,
    pub session: Arc<Session>,
    pub generation: u64,
    pub rx: UnboundedReceiver<Outbound>,
    scratch: FrameBuffer,
}

impl TestClient {
    pub fn id(&self) -> u32 {
        self.session.id()
    }

    pub async fn send<M: Message>(&mut self, opcode: OpCode, msg: &M) {
        let frame = Bytes::copy_from_slice(self.scratch.encode_datagram(opcode.as_u16(), msg).expect("encode"));
        self.world.handle_packet(&self.session, frame).await;
    }

    pub async fn send_raw(&mut self, frame: &[u8]) {
        self.world.handle_packet(&self.session, Bytes::copy_from_slice(frame)).await;
    }

    pub fn disconnect(&self) {
        self.world.disconnect(&self.session, self.generation);
    }

    /// Waits for the next stream frame carrying `opcode`, skipping others.
    pub async fn expect<M: Message + Default>(&mut self, opcode: OpCode) -> M {
        self.try_expect(opcode, WAIT)
            .await
            .unwrap_or_else(|| panic!("session {} never received {:?}", self.id(), opcode))
    }

    pub async fn try_expect<M: Message + Default>(&mut self, opcode: OpCode, wait: Duration) -> Option<M> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let next = tokio::time::timeout_at(deadline, self.rx.recv()).await.ok()??;
            if let Outbound::Stream(frame) = next {
                let (op, payload) = decode_stream(&frame).expect("well-formed stream frame");
                if op == opcode.as_u16() {
                    return Some(M::decode(payload).expect("payload decodes"));
                }
            }
        }
    }

    /// Waits for a frame carrying `opcode` whose payload satisfies `pred`.
    pub async fn expect_where<M, F>(&mut self, opcode: OpCode, mut pred: F) -> M
    where
        M: Message + Default,
        F: FnMut(&M) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.try_expect::<M>(opcode, left).await {
                Some(msg) if pred(&msg) => return msg,
                Some(_) => continue,
                None => panic!("session {} never received a matching {:?}", self.id(), opcode),
            }
        }
    }

    /// Stream opcodes received so far, in order.
    pub fn drain_opcodes(&mut self) -> Vec<u16> {
        let mut ops = Vec::new();
        while let Ok(next) = self.rx.try_recv() {
            if let Outbound::Stream(frame) = next {
                if let Ok((op, _)) = decode_stream(&frame) {
                    ops.push(op);
                }
            }
        }
        ops
    }
}

/// Polls `check` until it holds or `WAIT` elapses.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
