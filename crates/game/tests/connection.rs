use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec2;

use tether::net::{CHANNEL_EVENTS, CHANNEL_STATE, TimeoutConfig, worker};
use tether::{
    ActorKind, ActorSpawn, ClientSessionConfig, ConnectError, EntityId, HostConfig, Message,
    NetClient, NetError, NetFlags, NetHost, NetworkEvent, Packet, PeerId, PeerState,
};

fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        ping_interval: Duration::from_millis(50),
        timeout_limit: 1,
        timeout_min: Duration::from_millis(200),
        timeout_max: Duration::from_millis(400),
        fragment_timeout: Duration::from_millis(500),
    }
}

fn bind_host(config: HostConfig) -> NetHost {
    NetHost::bind("127.0.0.1:0", config).expect("bind host")
}

fn connect_client(addr: SocketAddr, config: ClientSessionConfig) -> NetClient {
    let mut client = NetClient::new(config);
    client.connect(addr).expect("start connect");
    client
}

/// A host and one client, serviced in lockstep on the test thread.
struct Loopback {
    host: NetHost,
    client: NetClient,
    host_events: Vec<NetworkEvent>,
    client_events: Vec<NetworkEvent>,
}

impl Loopback {
    fn new(host_config: HostConfig, client_config: ClientSessionConfig) -> Self {
        let host = bind_host(host_config);
        let client = connect_client(host.local_addr(), client_config);
        Self {
            host,
            client,
            host_events: Vec::new(),
            client_events: Vec::new(),
        }
    }

    fn connected() -> Self {
        let mut pair = Self::new(HostConfig::default(), ClientSessionConfig::default());
        assert!(
            pair.pump_until(2000, |p| {
                p.host_connected().is_some() && p.client_connected().is_some()
            }),
            "handshake did not complete"
        );
        pair
    }

    fn pump(&mut self) {
        self.host.service().expect("host service");
        while let Some(event) = self.host.pop_event() {
            self.host_events.push(event);
        }
        self.client.service().expect("client service");
        while let Some(event) = self.client.pop_event() {
            self.client_events.push(event);
        }
    }

    fn pump_until(&mut self, timeout_ms: u64, done: impl Fn(&Self) -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            self.pump();
            if done(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn host_connected(&self) -> Option<PeerId> {
        self.host_events.iter().find_map(|e| match e {
            NetworkEvent::PeerConnected(handle) => Some(handle.id),
            _ => None,
        })
    }

    fn client_connected(&self) -> Option<PeerId> {
        self.client_events.iter().find_map(|e| match e {
            NetworkEvent::PeerConnected(handle) => Some(handle.id),
            _ => None,
        })
    }

    fn host_packets(&self) -> Vec<(Packet, u8)> {
        received(&self.host_events)
    }

    fn client_packets(&self) -> Vec<(Packet, u8)> {
        received(&self.client_events)
    }
}

fn received(events: &[NetworkEvent]) -> Vec<(Packet, u8)> {
    events
        .iter()
        .filter_map(|e| match e {
            NetworkEvent::PacketReceived {
                packet, channel, ..
            } => Some((packet.clone(), *channel)),
            _ => None,
        })
        .collect()
}

fn disconnected_state(events: &[NetworkEvent]) -> Option<PeerState> {
    events.iter().find_map(|e| match e {
        NetworkEvent::PeerDisconnected(handle) => Some(handle.state),
        _ => None,
    })
}

#[test]
fn test_handshake_assigns_matching_peer_id() {
    let pair = Loopback::connected();

    assert_eq!(pair.host_connected(), pair.client_connected());
    assert_eq!(pair.host.connected_count(), 1);
    assert!(pair.client.is_connected());
    assert_eq!(pair.client.state(), PeerState::Connected);
}

#[test]
fn test_reliable_packets_arrive_in_order() {
    let mut pair = Loopback::connected();

    for i in 0u32..50 {
        let packet = Packet::new(i.to_le_bytes().to_vec());
        pair.client
            .send(&packet, NetFlags::RELIABLE, CHANNEL_EVENTS)
            .expect("queue");
    }

    assert!(pair.pump_until(2000, |p| p.host_packets().len() >= 50));

    let order: Vec<u32> = pair
        .host_packets()
        .iter()
        .map(|(packet, _)| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(packet.data());
            u32::from_le_bytes(raw)
        })
        .collect();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
    assert!(pair.host_packets().iter().all(|(_, ch)| *ch == CHANNEL_EVENTS));
}

#[test]
fn test_large_packet_is_reassembled() {
    let mut pair = Loopback::connected();
    let id = pair.host_connected().expect("peer id");

    let body: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    pair.host
        .send(id, &Packet::new(body.clone()), NetFlags::RELIABLE, CHANNEL_EVENTS)
        .expect("queue");

    assert!(pair.pump_until(2000, |p| !p.client_packets().is_empty()));
    let packets = pair.client_packets();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].0.data(), body.as_slice());
}

#[test]
fn test_broadcast_carries_game_messages() {
    let mut pair = Loopback::connected();

    let spawn = Message::ActorSpawned(ActorSpawn {
        entity: EntityId(42),
        kind: ActorKind::Crate,
        owner: u32::MAX,
        position: Vec2::new(100.5, -3.25),
        velocity: Vec2::new(1.0, 0.0),
    });
    pair.host
        .broadcast(&spawn.encode(), NetFlags::RELIABLE, CHANNEL_EVENTS)
        .expect("broadcast");

    assert!(pair.pump_until(2000, |p| !p.client_packets().is_empty()));
    let (packet, channel) = &pair.client_packets()[0];
    assert_eq!(*channel, CHANNEL_EVENTS);
    assert_eq!(Message::decode(packet).expect("decode"), spawn);
}

#[test]
fn test_unreliable_state_reaches_host() {
    let mut pair = Loopback::connected();

    let packet = Packet::new(vec![7u8; 32]);
    pair.client
        .send(&packet, NetFlags::UNRELIABLE, CHANNEL_STATE)
        .expect("queue");
    pair.client
        .send(&packet, NetFlags::UNSEQUENCED, CHANNEL_STATE)
        .expect("queue");

    assert!(pair.pump_until(2000, |p| p.host_packets().len() >= 2));
}

#[test]
fn test_send_rejects_bad_flags_and_channels() {
    let mut pair = Loopback::connected();
    let packet = Packet::new(vec![1u8]);

    assert!(matches!(
        pair.client
            .send(&packet, NetFlags::RELIABLE | NetFlags::UNSEQUENCED, CHANNEL_EVENTS),
        Err(NetError::InvalidFlags(_))
    ));
    assert!(matches!(
        pair.client.send(&packet, NetFlags::RELIABLE, 9),
        Err(NetError::InvalidChannel { channel: 9, .. })
    ));
    assert!(matches!(
        pair.host.send(PeerId(999), &packet, NetFlags::RELIABLE, CHANNEL_EVENTS),
        Err(NetError::UnknownPeer(PeerId(999)))
    ));
}

#[test]
fn test_client_disconnect_is_graceful_on_both_ends() {
    let mut pair = Loopback::connected();

    pair.client.disconnect();
    assert!(pair.pump_until(2000, |p| {
        disconnected_state(&p.host_events).is_some()
            && disconnected_state(&p.client_events).is_some()
    }));

    assert_eq!(
        disconnected_state(&pair.host_events),
        Some(PeerState::Disconnected)
    );
    assert_eq!(
        disconnected_state(&pair.client_events),
        Some(PeerState::Disconnected)
    );
    assert!(pair.pump_until(1000, |p| p.host.connected_count() == 0));
    assert!(!pair.client.is_connected());
}

#[test]
fn test_host_disconnect_reaches_client() {
    let mut pair = Loopback::connected();
    let id = pair.host_connected().expect("peer id");

    pair.host.disconnect(id).expect("disconnect");
    assert!(pair.pump_until(2000, |p| disconnected_state(&p.client_events).is_some()));
    assert_eq!(
        disconnected_state(&pair.client_events),
        Some(PeerState::Disconnected)
    );
    assert_eq!(pair.client.last_error(), None);
}

#[test]
fn test_disconnect_later_flushes_reliable_data_first() {
    let mut pair = Loopback::connected();
    let id = pair.host_connected().expect("peer id");

    let farewell = Packet::new(b"farewell".to_vec());
    pair.host
        .send(id, &farewell, NetFlags::RELIABLE, CHANNEL_EVENTS)
        .expect("queue farewell");
    pair.host.disconnect_later(id).expect("disconnect later");
    assert_eq!(
        pair.host.peer(id).map(|h| h.state),
        Some(PeerState::DisconnectLater)
    );

    // Still counted as connected, but closed to new traffic.
    assert_eq!(pair.host.connected_count(), 1);
    let late = Packet::new(b"late".to_vec());
    pair.host
        .broadcast(&late, NetFlags::RELIABLE, CHANNEL_EVENTS)
        .expect("broadcast");
    assert!(matches!(
        pair.host.send(id, &late, NetFlags::RELIABLE, CHANNEL_EVENTS),
        Err(NetError::NotConnected)
    ));

    assert!(pair.pump_until(3000, |p| {
        disconnected_state(&p.client_events).is_some()
            && disconnected_state(&p.host_events).is_some()
    }));

    let delivered: Vec<Vec<u8>> = pair
        .client_packets()
        .iter()
        .map(|(packet, _)| packet.data().to_vec())
        .collect();
    assert_eq!(delivered, vec![b"farewell".to_vec()]);

    // The payload lands before the disconnect does.
    let packet_at = pair
        .client_events
        .iter()
        .position(|e| matches!(e, NetworkEvent::PacketReceived { .. }));
    let closed_at = pair
        .client_events
        .iter()
        .position(|e| matches!(e, NetworkEvent::PeerDisconnected(_)));
    assert!(packet_at < closed_at);

    assert_eq!(
        disconnected_state(&pair.client_events),
        Some(PeerState::Disconnected)
    );
    assert_eq!(pair.client.last_error(), None);
    assert!(pair.pump_until(1000, |p| p.host.connected_count() == 0));
}

#[test]
fn test_silent_client_becomes_zombie() {
    let mut host = bind_host(HostConfig {
        timeouts: fast_timeouts(),
        ..HostConfig::default()
    });
    let mut client = connect_client(host.local_addr(), ClientSessionConfig::default());

    let start = Instant::now();
    let mut connected = false;
    while start.elapsed() < Duration::from_secs(2) && !connected {
        host.service().expect("host service");
        client.service().expect("client service");
        while let Some(event) = host.pop_event() {
            connected |= matches!(event, NetworkEvent::PeerConnected(_));
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert!(connected, "handshake did not complete");

    // vanish without a disconnect
    drop(client);

    let start = Instant::now();
    let mut state = None;
    while start.elapsed() < Duration::from_secs(3) && state.is_none() {
        host.service().expect("host service");
        while let Some(event) = host.pop_event() {
            if let NetworkEvent::PeerDisconnected(handle) = event {
                state = Some(handle.state);
            }
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(state, Some(PeerState::Zombie));
    assert_eq!(host.connected_count(), 0);
}

#[test]
fn test_full_host_refuses_connection() {
    let mut host = bind_host(HostConfig {
        max_peers: 1,
        ..HostConfig::default()
    });
    let mut first = connect_client(host.local_addr(), ClientSessionConfig::default());
    let mut second = None;

    let start = Instant::now();
    let mut refused = None;
    let mut reported = None;
    while start.elapsed() < Duration::from_secs(3) && refused.is_none() {
        host.service().expect("host service");
        while host.pop_event().is_some() {}
        first.service().expect("first service");
        while first.pop_event().is_some() {}

        if second.is_none() && first.is_connected() {
            second = Some(connect_client(
                host.local_addr(),
                ClientSessionConfig::default(),
            ));
        }
        if let Some(client) = second.as_mut() {
            client.service().expect("second service");
            while let Some(event) = client.pop_event() {
                match event {
                    NetworkEvent::ConnectFailed(error) => reported = Some(error),
                    NetworkEvent::PeerDisconnected(_) => {
                        assert!(reported.is_some(), "failure reported after disconnect");
                        refused = client.last_error().cloned();
                    }
                    _ => {}
                }
            }
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(
        refused,
        Some(ConnectError::ConnectionRefused("server full".to_string()))
    );
    assert_eq!(reported, refused);
    assert_eq!(host.connected_count(), 1);
}

#[test]
fn test_silent_host_is_unreachable() {
    // Bound but never read, so nothing answers and no ICMP comes back.
    let blackhole = UdpSocket::bind("127.0.0.1:0").expect("bind blackhole");
    let mut client = connect_client(
        blackhole.local_addr().expect("blackhole addr"),
        ClientSessionConfig {
            connect_timeout: Duration::from_millis(300),
            connect_retry: Duration::from_millis(50),
            ..ClientSessionConfig::default()
        },
    );

    let start = Instant::now();
    let mut events = Vec::new();
    while start.elapsed() < Duration::from_secs(2) && disconnected_state(&events).is_none() {
        client.service().expect("client service");
        while let Some(event) = client.pop_event() {
            events.push(event);
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert!(matches!(
        events.as_slice(),
        [
            NetworkEvent::ConnectFailed(ConnectError::HostUnreachable),
            NetworkEvent::PeerDisconnected(_),
        ]
    ));
    assert_eq!(client.last_error(), Some(&ConnectError::HostUnreachable));
    assert_eq!(client.state(), PeerState::Disconnected);
}

#[test]
fn test_sessions_on_worker_threads() {
    let host = bind_host(HostConfig::default());
    let addr = host.local_addr();
    let mut host = worker::spawn(host, 64).expect("spawn host worker");
    let mut client =
        worker::spawn(connect_client(addr, ClientSessionConfig::default()), 64)
            .expect("spawn client worker");

    let start = Instant::now();
    let mut peer = None;
    let mut client_ready = false;
    while start.elapsed() < Duration::from_secs(2) && !(peer.is_some() && client_ready) {
        if let Some(NetworkEvent::PeerConnected(handle)) = host.poll() {
            peer = Some(handle.id);
        }
        if let Some(NetworkEvent::PeerConnected(_)) = client.poll() {
            client_ready = true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    let peer = peer.expect("host saw the client");
    assert!(client_ready);

    let hello = Message::EntityDestroyed {
        entity: EntityId(3),
        position: Vec2::new(1.0, 2.0),
    };
    host.send(peer, hello.encode(), NetFlags::RELIABLE, CHANNEL_EVENTS)
        .expect("queue on worker");

    let start = Instant::now();
    let mut got = None;
    while start.elapsed() < Duration::from_secs(2) && got.is_none() {
        if let Some(NetworkEvent::PacketReceived { packet, .. }) = client.poll() {
            got = Message::decode(&packet).ok();
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(got, Some(hello));

    client.shutdown();
    host.shutdown();
    assert!(!host.is_running());
    assert!(matches!(
        host.disconnect(peer),
        Err(NetError::WorkerClosed)
    ));
}
