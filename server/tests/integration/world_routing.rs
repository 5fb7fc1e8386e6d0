// world_server/server/tests/integration/world_routing.rs
#[path = "../common/mod.rs"]
mod common;

use common::{eventually, Harness};
use std::sync::Arc;
use std::time::Duration;
use world_server_core::core::config::ServerConfig;
use world_server_core::core::types::ZoneKey;
use world_server_core::network::messages;
use world_server_core::network::opcodes::OpCode;

#[tokio::test]
async fn packets_before_login_are_dropped() {
    let harness = Harness::new(common::test_config());
    let mut client = harness.connect();

    let create = messages::CharacterCreate { name: "Sneaky".into(), race: 1, char_class: 1, gender: 0, start_zone: 2 };
    client.send(OpCode::CharacterCreate, &create).await;
    client.send(OpCode::ClientUpdate, &messages::ClientPositionUpdate::default()).await;

    assert!(client.drain_opcodes().is_empty());
    assert!(harness.store.load_character("Sneaky").await.is_err());
    assert!(!client.session.is_authenticated());
}

#[tokio::test]
async fn unknown_and_runt_frames_are_dropped_without_closing() {
    let harness = Harness::new(common::test_config());
    let mut client = harness.connect();

    client.send_raw(&[0x77, 0x77, 0x01]).await;
    client.send_raw(&[0x01]).await;
    assert!(client.drain_opcodes().is_empty());

    client.send(OpCode::JwtLogin, &messages::JwtLogin { token: "alice".into() }).await;
    let response: messages::JwtResponse = client.expect(OpCode::JwtResponse).await;
    assert_eq!(response.status, 1);
}

#[tokio::test]
async fn rejected_token_leaves_session_unauthenticated() {
    let harness = Harness::new(common::test_config());
    let mut client = harness.connect();
    client.send(OpCode::JwtLogin, &messages::JwtLogin { token: "   ".into() }).await;
    let response: messages::JwtResponse = client.expect(OpCode::JwtResponse).await;
    assert_eq!(response.status, 0);
    assert!(!client.session.is_authenticated());
}

#[tokio::test]
async fn character_management_round() {
    let harness = Harness::new(common::test_config());
    let mut client = harness.connect();
    client.send(OpCode::JwtLogin, &messages::JwtLogin { token: "alice".into() }).await;
    let list: messages::CharacterList = client.expect(OpCode::CharacterList).await;
    assert!(list.characters.is_empty());

    let create = messages::CharacterCreate { name: "Soandso".into(), race: 1, char_class: 1, gender: 0, start_zone: 2 };
    client.send(OpCode::CharacterCreate, &create).await;
    let result: messages::IntValue = client.expect(OpCode::CharacterCreateResult).await;
    assert_eq!(result.value, 1);
    let list: messages::CharacterList = client.expect(OpCode::CharacterList).await;
    assert_eq!(list.characters.len(), 1);
    assert_eq!(list.characters[0].zone_id, 2);

    let bad = messages::CharacterCreate { name: "x1".into(), ..create.clone() };
    client.send(OpCode::CharacterCreate, &bad).await;
    let result: messages::IntValue = client.expect(OpCode::CharacterCreateResult).await;
    assert_eq!(result.value, 0);
    let list: messages::CharacterList = client.expect(OpCode::CharacterList).await;
    assert_eq!(list.characters.len(), 1);

    client.send(OpCode::DeleteCharacter, &messages::StringValue { value: "Soandso".into() }).await;
    let list: messages::CharacterList = client.expect(OpCode::CharacterList).await;
    assert!(list.characters.is_empty());
}

#[tokio::test]
async fn cannot_enter_world_as_someone_elses_character() {
    let harness = Harness::new(common::test_config());
    let _alice = harness.enter_zone("Alice").await;

    let mut mallory = harness.connect();
    mallory.send(OpCode::JwtLogin, &messages::JwtLogin { token: "mallory".into() }).await;
    mallory.send(OpCode::EnterWorld, &messages::StringValue { value: "Alice".into() }).await;
    let got: Option<messages::ZoneSession> = mallory.try_expect(OpCode::PostEnterWorld, Duration::from_millis(100)).await;
    assert!(got.is_none());
    assert!(mallory.session.character_name().is_none());
}

#[tokio::test]
async fn zone_entry_makes_players_visible_to_each_other() {
    let harness = Harness::new(common::test_config());
    let mut alice = harness.enter_zone("Alice").await;

    let mut bob = harness.connect();
    bob.send(OpCode::JwtLogin, &messages::JwtLogin { token: "bob".into() }).await;
    let create = messages::CharacterCreate { name: "Bobby".into(), race: 1, char_class: 1, gender: 0, start_zone: 2 };
    bob.send(OpCode::CharacterCreate, &create).await;
    bob.send(OpCode::EnterWorld, &messages::StringValue { value: "Bobby".into() }).await;
    let target: messages::ZoneSession = bob.expect(OpCode::PostEnterWorld).await;
    bob.send(OpCode::ZoneSession, &target).await;
    bob.send(OpCode::RequestClientZoneChange, &messages::IntValue::default()).await;

    let zone: messages::NewZone = bob.expect(OpCode::NewZone).await;
    assert_eq!(zone.short_name, "qeynos2");
    let profile: messages::PlayerProfile = bob.expect(OpCode::PlayerProfile).await;
    assert_eq!(profile.name, "Bobby");
    let batch: messages::Spawns = bob.expect(OpCode::BatchZoneSpawns).await;
    assert!(batch.spawns.iter().any(|s| s.name == "Alice" && !s.is_npc));

    let seen: messages::Spawns =
        alice.expect_where(OpCode::ZoneSpawns, |m: &messages::Spawns| m.spawns.iter().any(|s| s.name == "Bobby")).await;
    assert_eq!(seen.spawns[0].spawn_id, profile.spawn_id);
    assert!(!seen.spawns[0].is_npc);
}

#[tokio::test]
async fn movement_reaches_nearby_players() {
    let harness = Harness::new(common::test_config());
    let mut alice = harness.enter_zone("Alice").await;
    let mut bob = harness.enter_zone("Bobby").await;
    let bob_entity = bob.session.entity_id().unwrap();

    let update = messages::ClientPositionUpdate { x: 120.0, y: 680.0, z: 4.0, heading: 90.0, animation: 0 };
    bob.send(OpCode::ClientUpdate, &update).await;

    let deadline = tokio::time::Instant::now() + common::WAIT;
    let mut found = false;
    while tokio::time::Instant::now() < deadline && !found {
        let Ok(Some(frame)) = tokio::time::timeout_at(deadline, alice.rx.recv()).await else {
            break;
        };
        if let world_server_core::network::transport::Outbound::Datagram(bytes) = frame {
            let (op, payload) = world_server_core::network::framing::decode_datagram(&bytes).unwrap();
            if op == OpCode::SpawnPositionUpdate.as_u16() {
                let pos: messages::EntityPositionUpdate =
                    world_server_core::network::framing::decode_payload(payload).unwrap();
                found = pos.spawn_id == bob_entity && pos.x == 120.0;
            }
        }
    }
    assert!(found, "alice never saw bob move");
}

#[tokio::test]
async fn absurd_coordinates_do_not_take_the_zone_down() {
    let harness = Harness::new(common::test_config());
    let mut alice = harness.enter_zone("Alice").await;
    let zone = harness.zones.get(ZoneKey::new(2, 0)).unwrap();

    let wild = messages::ClientPositionUpdate { x: 1e13, y: f32::NAN, z: 4.0, heading: 0.0, animation: 0 };
    alice.send(OpCode::ClientUpdate, &wild).await;

    let say = messages::ChannelMessage {
        sender: String::new(),
        target_name: String::new(),
        message: "still here".into(),
        chan_num: messages::channel::SAY,
    };
    alice.send(OpCode::ChannelMessage, &say).await;
    let echoed: messages::ChannelMessage = alice.expect(OpCode::ChannelMessage).await;
    assert_eq!(echoed.message, "still here");
    assert_eq!(zone.lifecycle(), world_server_core::core::types::ZoneLifecycle::Running);
    assert!(Arc::ptr_eq(&zone, &harness.zones.get_or_create(ZoneKey::new(2, 0)).await.unwrap()));
}

#[tokio::test]
async fn saying_hail_to_a_guard_gets_a_reply() {
    let harness = Harness::new(common::test_config());
    let mut alice = harness.enter_zone("Alice").await;
    let zone = harness.zones.get(ZoneKey::new(2, 0)).unwrap();
    assert!(eventually(|| zone.entity_summaries().iter().any(|e| e.name == "Guard_Gehnus")).await);

    let say = messages::ChannelMessage {
        sender: String::new(),
        target_name: "Guard_Gehnus".into(),
        message: "Hail, Guard_Gehnus".into(),
        chan_num: messages::channel::SAY,
    };
    alice.send(OpCode::ChannelMessage, &say).await;

    let echoed: messages::ChannelMessage = alice.expect(OpCode::ChannelMessage).await;
    assert_eq!(echoed.sender, "Alice");
    let reply: messages::ChannelMessage = alice.expect(OpCode::ChannelMessage).await;
    assert_eq!(reply.sender, "Guard_Gehnus");
    assert_eq!(reply.message, "Hello, Alice! How can I assist you today?");
}

#[tokio::test]
async fn expired_session_is_removed_from_view() {
    let config = ServerConfig { grace_period_secs: 0, ..common::test_config() };
    let harness = Harness::new(config);
    let mut alice = harness.enter_zone("Alice").await;
    let mut bob = harness.enter_zone("Bobby").await;
    let alice_entity = alice.session.entity_id().unwrap();

    let update = messages::ClientPositionUpdate { x: 150.0, y: 700.0, z: 4.0, heading: 0.0, animation: 0 };
    alice.send(OpCode::ClientUpdate, &update).await;
    alice.disconnect();
    let gone: messages::DeleteSpawn = bob.expect(OpCode::DeleteSpawn).await;
    assert_eq!(gone.spawn_id, alice_entity);
    assert!(harness.world.sessions().get_session(alice.id()).is_none());

    // The last known position is persisted on the way out.
    let deadline = tokio::time::Instant::now() + common::WAIT;
    loop {
        let saved = harness.store.load_character("Alice").await.unwrap();
        if saved.position.x == 150.0 {
            assert_eq!(saved.zone_id, 2);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "character was never saved");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn zone_change_moves_the_client_to_the_target_zone() {
    let harness = Harness::new(common::test_config());
    let mut alice = harness.enter_zone("Alice").await;

    alice.send(OpCode::ZoneChange, &messages::ZoneChange { zone_id: 1, instance_id: 0 }).await;
    let accepted: messages::ZoneChange = alice.expect(OpCode::ZoneChangeAccepted).await;
    assert_eq!(accepted.zone_id, 1);
    assert_eq!(alice.session.zone(), Some(ZoneKey::new(1, 0)));

    alice.send(OpCode::RequestClientZoneChange, &messages::IntValue::default()).await;
    let zone: messages::NewZone = alice.expect(OpCode::NewZone).await;
    assert_eq!(zone.short_name, "qeynos");
    let profile: messages::PlayerProfile = alice.expect(OpCode::PlayerProfile).await;
    assert_eq!((profile.x, profile.y), (186.0, 14.0));

    let north = harness.zones.get(ZoneKey::new(2, 0)).unwrap();
    assert!(!north.has_client(alice.id()));
}
