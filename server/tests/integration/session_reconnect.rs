// world_server/server/tests/integration/session_reconnect.rs
#[path = "../common/mod.rs"]
mod common;

use common::Harness;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use world_server_core::core::types::ZoneKey;
use world_server_core::network::messages::{channel, ChannelMessage, IntValue};
use world_server_core::network::opcodes::OpCode;

const HOME: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const ELSEWHERE: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));

fn grace(harness: &Harness) -> Duration {
    harness.config.grace_period()
}

#[tokio::test(start_paused = true)]
async fn reconnect_within_grace_resumes_the_same_session() {
    let harness = Harness::new(common::test_config());
    let first = harness.connect_from(HOME, None);
    let id = first.id();
    first.disconnect();
    assert!(!first.session.is_connected());

    tokio::time::sleep(grace(&harness) / 2).await;
    let second = harness.connect_from(HOME, Some(id));
    assert!(Arc::ptr_eq(&first.session, &second.session));
    assert!(second.session.is_connected());

    // The timer from the first disconnect fires and finds a newer transport.
    tokio::time::sleep(grace(&harness) * 2).await;
    assert!(harness.world.sessions().get_session(id).is_some());
}

#[tokio::test(start_paused = true)]
async fn session_expires_after_grace() {
    let harness = Harness::new(common::test_config());
    let first = harness.connect_from(HOME, None);
    let id = first.id();
    first.disconnect();

    tokio::time::sleep(grace(&harness) + Duration::from_millis(50)).await;
    assert!(harness.world.sessions().get_session(id).is_none());

    let second = harness.connect_from(HOME, Some(id));
    assert_ne!(second.id(), id);
    assert_eq!(harness.world.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn resume_from_another_address_gets_a_new_session() {
    let harness = Harness::new(common::test_config());
    let first = harness.connect_from(HOME, None);
    first.disconnect();

    let intruder = harness.connect_from(ELSEWHERE, Some(first.id()));
    assert_ne!(intruder.id(), first.id());
    assert!(!first.session.is_connected());
    assert_eq!(harness.world.sessions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn late_close_of_the_old_connection_keeps_the_new_one() {
    let harness = Harness::new(common::test_config());
    let first = harness.connect_from(HOME, None);
    let mut second = harness.connect_from(HOME, Some(first.id()));
    assert!(second.generation > first.generation);

    // The old socket only now notices it is gone.
    first.disconnect();
    assert!(second.session.is_connected());

    second.session.send_stream(OpCode::SessionAssigned, &IntValue { value: 7 }).unwrap();
    let got: IntValue = second.expect(OpCode::SessionAssigned).await;
    assert_eq!(got.value, 7);

    tokio::time::sleep(grace(&harness) * 2).await;
    assert!(harness.world.sessions().get_session(first.id()).is_some());
}

#[tokio::test(start_paused = true)]
async fn a_second_drop_restarts_the_grace_window() {
    let harness = Harness::new(common::test_config());
    let first = harness.connect_from(HOME, None);
    let id = first.id();
    first.disconnect();

    tokio::time::sleep(grace(&harness) / 2).await;
    let second = harness.connect_from(HOME, Some(id));
    second.disconnect();

    // Past the first deadline but inside the second.
    tokio::time::sleep(grace(&harness) * 3 / 4).await;
    assert!(harness.world.sessions().get_session(id).is_some());

    tokio::time::sleep(grace(&harness)).await;
    assert!(harness.world.sessions().get_session(id).is_none());
}

#[tokio::test(start_paused = true)]
async fn resume_keeps_zone_membership_and_avatar() {
    let harness = Harness::new(common::test_config());
    let first = harness.enter_zone("Alice").await;
    let id = first.id();
    let avatar = first.session.entity_id().expect("avatar in zone");
    first.disconnect();

    tokio::time::sleep(grace(&harness) / 2).await;
    let mut second = harness.connect_from(HOME, Some(id));
    assert!(Arc::ptr_eq(&first.session, &second.session));
    tokio::time::sleep(grace(&harness) * 2).await;

    assert_eq!(second.session.entity_id(), Some(avatar));
    assert_eq!(second.session.zone(), Some(ZoneKey::new(2, 0)));
    let zone = harness.zones.get(ZoneKey::new(2, 0)).expect("zone still loaded");
    assert!(zone.has_client(id));
    assert_eq!(zone.client_entity(id), Some(avatar));

    // Zone traffic flows over the resumed transport.
    let say = ChannelMessage {
        sender: String::new(),
        target_name: String::new(),
        message: "back again".into(),
        chan_num: channel::SAY,
    };
    second.send(OpCode::ChannelMessage, &say).await;
    let echoed: ChannelMessage = second.expect(OpCode::ChannelMessage).await;
    assert_eq!((echoed.sender.as_str(), echoed.message.as_str()), ("Alice", "back again"));
}
