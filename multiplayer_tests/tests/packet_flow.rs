// Integration tests for packet delivery between peers on the in-memory hub.
//
// Covers the full send path (target resolution, transfer mode, session
// acceptance) and the receive path (poll batching across channels,
// unknown-sender filtering, FIFO order, cleanup when a sender departs).

use multiplayer_tests::{SteamHub, TestPeer, settle, steam_id};
use serde_json::json;
use steam_peer::{
    Channel, GlobalIdentity, LobbyId, PeerConfig, PeerError, PeerId, SendTarget, TransferMode,
};

const HOST: GlobalIdentity = steam_id(0x20);
const JOINER: GlobalIdentity = steam_id(0x2A);
const OTHER: GlobalIdentity = steam_id(0x30);

const JOINER_ID: PeerId = PeerId(0x2A);
const OTHER_ID: PeerId = PeerId(0x30);

fn config(value: serde_json::Value) -> PeerConfig {
    PeerConfig::from_json(&value.to_string()).unwrap()
}

/// Host plus the given joiners, all connected and past their join events.
fn session(hub: &SteamHub, host: TestPeer, joiners: Vec<TestPeer>) -> (LobbyId, Vec<TestPeer>) {
    let lobby = hub.create_lobby(host.identity());
    let mut peers = vec![host];
    peers.extend(joiners);
    for peer in &mut peers {
        peer.join(lobby).unwrap();
    }
    settle(&mut peers.iter_mut().collect::<Vec<_>>());
    for peer in &mut peers {
        peer.take_events();
    }
    (lobby, peers)
}

fn pair(hub: &SteamHub) -> (TestPeer, TestPeer) {
    let (_, mut peers) = session(
        hub,
        TestPeer::new(hub, HOST),
        vec![TestPeer::new(hub, JOINER)],
    );
    let joiner = peers.pop().unwrap();
    let host = peers.pop().unwrap();
    (host, joiner)
}

#[test]
fn first_message_waits_for_session_acceptance() {
    let hub = SteamHub::new();
    let (mut host, mut joiner) = pair(&hub);

    joiner.send(PeerId::AUTHORITY.0, b"hello").unwrap();
    assert_eq!(hub.held_count(HOST, JOINER), 1);
    assert!(host.receive_all().is_empty());

    host.pump();
    assert_eq!(host.receive_all(), vec![(JOINER_ID, b"hello".to_vec())]);

    host.send(JOINER_ID.0, b"welcome").unwrap();
    assert_eq!(
        joiner.receive_all(),
        vec![(PeerId::AUTHORITY, b"welcome".to_vec())]
    );
}

#[test]
fn refusing_peer_never_accepts_sessions() {
    let hub = SteamHub::new();
    let (mut host, mut joiner) = pair(&hub);
    host.peer.set_refuse_new_connections(true);

    joiner.send(PeerId::AUTHORITY.0, b"knock").unwrap();
    host.pump();

    assert!(host.receive_all().is_empty());
    assert_eq!(hub.held_count(HOST, JOINER), 1);
}

#[test]
fn packets_arrive_in_send_order() {
    let hub = SteamHub::new();
    let (mut host, mut joiner) = pair(&hub);

    for payload in [b"one".as_slice(), b"two", b"three"] {
        joiner.send(PeerId::AUTHORITY.0, payload).unwrap();
    }
    host.pump();

    let data: Vec<Vec<u8>> = host.receive_all().into_iter().map(|(_, d)| d).collect();
    assert_eq!(data, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
}

#[test]
fn broadcast_reaches_everyone_but_sender() {
    let hub = SteamHub::new();
    let (_, mut peers) = session(
        &hub,
        TestPeer::new(&hub, HOST),
        vec![TestPeer::new(&hub, JOINER), TestPeer::new(&hub, OTHER)],
    );

    peers[0].send(0, b"tick").unwrap();
    assert_eq!(hub.sent_count(HOST), 2);

    for peer in &mut peers[1..] {
        peer.pump();
        assert_eq!(
            peer.receive_all(),
            vec![(PeerId::AUTHORITY, b"tick".to_vec())]
        );
    }
    assert!(peers[0].receive_all().is_empty());
}

#[test]
fn negative_target_excludes_one_peer() {
    let hub = SteamHub::new();
    let (_, mut peers) = session(
        &hub,
        TestPeer::new(&hub, HOST),
        vec![TestPeer::new(&hub, JOINER), TestPeer::new(&hub, OTHER)],
    );

    peers[0].send(-JOINER_ID.0, b"secret").unwrap();
    assert_eq!(hub.sent_count(HOST), 1);

    for peer in &mut peers[1..] {
        peer.pump();
    }
    assert!(peers[1].receive_all().is_empty());
    assert_eq!(
        peers[2].receive_all(),
        vec![(PeerId::AUTHORITY, b"secret".to_vec())]
    );
}

#[test]
fn joiner_can_address_other_joiner_directly() {
    let hub = SteamHub::new();
    let (_, mut peers) = session(
        &hub,
        TestPeer::new(&hub, HOST),
        vec![TestPeer::new(&hub, JOINER), TestPeer::new(&hub, OTHER)],
    );

    peers[1].send(OTHER_ID.0, b"psst").unwrap();
    peers[2].pump();

    assert_eq!(peers[2].receive_all(), vec![(JOINER_ID, b"psst".to_vec())]);
}

#[test]
fn send_to_unmapped_peer_sends_nothing() {
    let hub = SteamHub::new();
    let (mut host, _joiner) = pair(&hub);

    let err = host.send(777, b"lost").unwrap_err();

    assert!(matches!(err, PeerError::UnresolvedTarget(PeerId(777))));
    assert_eq!(hub.sent_count(HOST), 0);
}

#[test]
fn send_before_connecting_fails() {
    let hub = SteamHub::new();
    let mut lonely = TestPeer::new(&hub, JOINER);

    assert!(matches!(
        lonely.send(PeerId::AUTHORITY.0, b"anyone?"),
        Err(PeerError::NotConnected)
    ));
}

#[test]
fn oversized_packet_is_rejected_before_sending() {
    let hub = SteamHub::new();
    let (_, mut peers) = session(
        &hub,
        TestPeer::with_config(&hub, HOST, config(json!({ "max_packet_size": 4 }))),
        vec![TestPeer::new(&hub, JOINER)],
    );

    let err = peers[0].send(JOINER_ID.0, b"too long").unwrap_err();

    assert!(matches!(err, PeerError::PacketTooLarge { size: 8, max: 4 }));
    assert_eq!(hub.sent_count(HOST), 0);
    peers[0].send(JOINER_ID.0, b"ok").unwrap();
    assert_eq!(hub.sent_count(HOST), 1);
}

#[test]
fn packet_keeps_channel_and_transfer_mode() {
    let hub = SteamHub::new();
    let (_, mut peers) = session(
        &hub,
        TestPeer::with_config(&hub, HOST, config(json!({ "channel_count": 3 }))),
        vec![TestPeer::new(&hub, JOINER)],
    );

    peers[1]
        .peer
        .put_packet(
            b"pos",
            SendTarget::Peer(PeerId::AUTHORITY),
            Channel(2),
            TransferMode::Unreliable,
        )
        .unwrap();
    peers[0].pump();
    peers[0].peer.poll().unwrap();

    let packet = peers[0].peer.get_packet().unwrap();
    assert_eq!(packet.channel, Channel(2));
    assert!(!packet.reliable);
    assert_eq!(packet.transfer_mode(), TransferMode::Unreliable);
    assert_eq!(packet.sender, JOINER_ID);
}

#[test]
fn channels_beyond_channel_count_are_not_polled() {
    let hub = SteamHub::new();
    let (mut host, mut joiner) = pair(&hub);

    joiner
        .peer
        .put_packet(
            b"side",
            SendTarget::Peer(PeerId::AUTHORITY),
            Channel(1),
            TransferMode::Reliable,
        )
        .unwrap();
    host.pump();
    assert!(host.receive_all().is_empty());

    host.peer.set_channel_count(2).unwrap();
    assert_eq!(host.receive_all(), vec![(JOINER_ID, b"side".to_vec())]);
}

#[test]
fn poll_takes_bounded_batches() {
    let hub = SteamHub::new();
    let (_, mut peers) = session(
        &hub,
        TestPeer::with_config(&hub, HOST, config(json!({ "max_messages_per_poll": 2 }))),
        vec![TestPeer::new(&hub, JOINER)],
    );
    for i in 0..5u8 {
        peers[1].send(PeerId::AUTHORITY.0, &[i]).unwrap();
    }
    peers[0].pump();

    assert_eq!(peers[0].peer.poll().unwrap(), 2);
    assert_eq!(peers[0].peer.poll().unwrap(), 2);
    assert_eq!(peers[0].peer.poll().unwrap(), 1);
    assert_eq!(peers[0].peer.available_packet_count(), 5);
}

#[test]
fn messages_from_strangers_are_dropped() {
    let hub = SteamHub::new();
    let (mut host, mut joiner) = pair(&hub);

    hub.inject_message(HOST, steam_id(0x99), Channel(0), b"spam");
    joiner.send(PeerId::AUTHORITY.0, b"real").unwrap();
    host.pump();

    assert_eq!(host.receive_all(), vec![(JOINER_ID, b"real".to_vec())]);
}

#[test]
fn departed_sender_packets_are_discarded() {
    let hub = SteamHub::new();
    let (_, mut peers) = session(
        &hub,
        TestPeer::new(&hub, HOST),
        vec![TestPeer::new(&hub, JOINER), TestPeer::new(&hub, OTHER)],
    );
    peers[1].send(PeerId::AUTHORITY.0, b"from joiner").unwrap();
    peers[2].send(PeerId::AUTHORITY.0, b"from other").unwrap();
    peers[0].pump();
    peers[0].peer.poll().unwrap();
    assert_eq!(peers[0].peer.available_packet_count(), 2);

    peers[1].peer.close().unwrap();
    peers[0].pump();

    assert_eq!(peers[0].peer.available_packet_count(), 1);
    assert_eq!(peers[0].receive_all(), vec![(OTHER_ID, b"from other".to_vec())]);
}

#[test]
fn poll_reports_unreachable_transport() {
    let hub = SteamHub::new();
    let (mut host, _joiner) = pair(&hub);

    hub.set_offline(HOST, true);

    assert!(matches!(host.peer.poll(), Err(PeerError::Unavailable(_))));
}
