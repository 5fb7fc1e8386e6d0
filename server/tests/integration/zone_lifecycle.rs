// world_server/server/tests/integration/zone_lifecycle.rs
#[path = "../common/mod.rs"]
mod common;

use common::{eventually, Harness};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use world_server_core::core::error::{ServerError, ServerResult};
use world_server_core::core::types::{ZoneKey, ZoneLifecycle};
use world_server_core::network::framing::decode_payload;
use world_server_core::network::messages;
use world_server_core::network::opcodes::OpCode;
use world_server_core::network::session::Session;
use world_server_core::network::transport::ChannelSink;
use world_server_core::server::instance::{Zone, ZoneInbound};
use world_server_core::systems::zone_handlers::ZoneHandlerRegistry;

const NORTH_QEYNOS: ZoneKey = ZoneKey { zone_id: 2, instance_id: 0 };

fn echo(_zone: &mut Zone, session: &Arc<Session>, payload: &[u8]) -> ServerResult<()> {
    let msg: messages::StringValue = decode_payload(payload)?;
    session.send_stream(OpCode::ChannelMessage, &msg)
}

#[tokio::test]
async fn packets_from_different_sessions_run_in_arrival_order() {
    let mut handlers = ZoneHandlerRegistry::new();
    handlers.register(OpCode::ChannelMessage, echo);
    let harness = Harness::with_handlers(common::test_config(), handlers);

    // All three sessions write into one sink so the output order is global.
    let (sink, mut rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let sessions: Vec<_> = (0..3).map(|_| harness.world.connect(sink.clone(), ip, None).0).collect();

    let zone = harness.zones.get_or_create(NORTH_QEYNOS).await.expect("zone loads");
    for (i, session) in sessions.iter().enumerate() {
        let payload = prost::Message::encode_to_vec(&messages::StringValue { value: format!("P{}", i + 1) });
        zone.enqueue(ZoneInbound::Packet {
            session: session.clone(),
            opcode: OpCode::ChannelMessage,
            payload: payload.into(),
        })
        .unwrap();
    }

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let frame = tokio::time::timeout(common::WAIT, rx.recv()).await.unwrap().unwrap();
        let (_, payload) = world_server_core::network::framing::decode_stream(frame.bytes()).unwrap();
        seen.push(decode_payload::<messages::StringValue>(payload).unwrap().value);
    }
    assert_eq!(seen, vec!["P1", "P2", "P3"]);
}

fn faulty(_zone: &mut Zone, _session: &Arc<Session>, _payload: &[u8]) -> ServerResult<()> {
    panic!("handler bug")
}

#[tokio::test]
async fn panicked_zone_is_replaced_on_next_lookup() {
    let mut handlers = ZoneHandlerRegistry::new();
    handlers.register(OpCode::Animation, faulty);
    let harness = Harness::with_handlers(common::test_config(), handlers);
    let client = harness.connect();

    let zone = harness.zones.get_or_create(NORTH_QEYNOS).await.unwrap();
    assert!(eventually(|| zone.lifecycle() == ZoneLifecycle::Running).await);
    zone.enqueue(ZoneInbound::Packet {
        session: client.session.clone(),
        opcode: OpCode::Animation,
        payload: Default::default(),
    })
    .unwrap();

    assert!(eventually(|| zone.lifecycle() == ZoneLifecycle::Stopped).await);
    assert!(matches!(
        zone.enqueue(ZoneInbound::ClientLeft { session_id: client.id() }),
        Err(ServerError::ZoneStopping(_))
    ));

    let fresh = harness.zones.get_or_create(NORTH_QEYNOS).await.unwrap();
    assert!(!Arc::ptr_eq(&zone, &fresh));
    assert!(eventually(|| fresh.lifecycle() == ZoneLifecycle::Running).await);
    assert!(eventually(|| fresh.entity_count() == 3).await);
}

#[tokio::test]
async fn concurrent_lookups_share_one_instance() {
    let harness = Harness::new(common::test_config());
    let (a, b) = tokio::join!(
        harness.zones.get_or_create(NORTH_QEYNOS),
        harness.zones.get_or_create(NORTH_QEYNOS)
    );
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(harness.zones.len(), 1);
}

#[tokio::test]
async fn unknown_zone_is_not_created() {
    let harness = Harness::new(common::test_config());
    assert!(harness.zones.get_or_create(ZoneKey::new(99, 0)).await.is_none());
    assert!(harness.zones.is_empty());
    assert!(harness.zones.get(ZoneKey::new(99, 0)).is_none());
}

#[tokio::test]
async fn spawn_pool_fills_on_first_tick() {
    let harness = Harness::new(common::test_config());
    let zone = harness.zones.get_or_create(NORTH_QEYNOS).await.unwrap();

    assert!(eventually(|| zone.entity_count() == 3).await);
    let names: Vec<String> = zone.entity_summaries().into_iter().map(|e| e.name).collect();
    assert!(names.contains(&"Guard_Gehnus".to_string()));
    assert!(names.contains(&"a_large_rat".to_string()));
    assert!(zone.entity_summaries().iter().all(|e| e.is_npc));
}

#[tokio::test]
async fn stop_waits_for_the_loop_and_refuses_new_work() {
    let harness = Harness::new(common::test_config());
    let zone = harness.zones.get_or_create(NORTH_QEYNOS).await.unwrap();
    assert!(eventually(|| zone.lifecycle() == ZoneLifecycle::Running).await);

    assert!(harness.zones.remove(NORTH_QEYNOS).await);
    assert_eq!(zone.lifecycle(), ZoneLifecycle::Stopped);
    assert!(matches!(
        zone.enqueue(ZoneInbound::ClientLeft { session_id: 1 }),
        Err(ServerError::ZoneStopping(_))
    ));

    // A later lookup starts a fresh instance.
    let fresh = harness.zones.get_or_create(NORTH_QEYNOS).await.unwrap();
    assert!(!Arc::ptr_eq(&zone, &fresh));
}

#[tokio::test]
async fn shutdown_stops_every_zone() {
    let harness = Harness::new(common::test_config());
    let north = harness.zones.get_or_create(NORTH_QEYNOS).await.unwrap();
    let south = harness.zones.get_or_create(ZoneKey::new(1, 0)).await.unwrap();
    assert_eq!(harness.zones.keys(), vec![ZoneKey::new(1, 0), NORTH_QEYNOS]);

    harness.zones.shutdown().await;
    assert_eq!(north.lifecycle(), ZoneLifecycle::Stopped);
    assert_eq!(south.lifecycle(), ZoneLifecycle::Stopped);
    assert!(harness.zones.is_empty());
}

#[tokio::test]
async fn departed_client_is_removed_from_roster() {
    let harness = Harness::new(common::test_config());
    let alice = harness.enter_zone("Alice").await;
    let zone = harness.zones.get(NORTH_QEYNOS).unwrap();
    let entity = zone.client_entity(alice.id()).expect("avatar");
    assert_eq!(zone.roster_snapshot(), vec![(alice.id(), Some(entity))]);

    zone.enqueue(ZoneInbound::ClientLeft { session_id: alice.id() }).unwrap();
    assert!(eventually(|| !zone.has_client(alice.id())).await);
    assert!(zone.entity_summary(entity).is_none());
    assert_eq!(alice.session.entity_id(), None);
}
