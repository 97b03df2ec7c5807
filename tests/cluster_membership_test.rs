// Multi-Peer Membership Integration Test
//
// Drives several peers over the in-process transport and validates the
// gossip membership protocol end to end: single-node boot, the join
// handshake, cluster-wide convergence, and eviction of a killed peer.

use rusty_dht::dht::find_nodes;
use rusty_dht::{
    Address, EventLog, LogRecord, Params, ParamsConfig, Peer, Transport, MEMBERSHIP_PORT,
};

/// Test harness hosting a cluster of peers on one transport
struct TestCluster {
    params: Params,
    transport: Transport,
    events: EventLog,
    peers: Vec<Peer>,
}

impl TestCluster {
    fn new(node_count: usize) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let params = Params::new(ParamsConfig {
            num_nodes: node_count,
            ..Default::default()
        })
        .unwrap();
        let transport = Transport::new(params.msg_drop_rate());
        let events = EventLog::new();
        let peers = (1..=node_count as u32)
            .map(|id| Peer::new(id, params.clone(), transport.clone(), events.clone()))
            .collect();
        Self {
            params,
            transport,
            events,
            peers,
        }
    }

    fn spawn(&mut self, id: u32) {
        self.peers.push(Peer::new(
            id,
            self.params.clone(),
            self.transport.clone(),
            self.events.clone(),
        ));
    }

    /// One simulated tick: every peer runs, then time advances.
    fn step(&mut self) {
        for peer in &mut self.peers {
            peer.tick();
        }
        self.params.advance();
    }

    fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.step();
        }
    }

    fn peer(&self, id: u32) -> &Peer {
        self.peers.iter().find(|p| p.id() == id).unwrap()
    }

    fn kill(&mut self, id: u32) {
        self.peers
            .iter_mut()
            .find(|p| p.id() == id)
            .unwrap()
            .fail();
    }

    fn live_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| !p.is_failed())
    }
}

#[test]
fn test_single_node_boot() {
    let mut cluster = TestCluster::new(1);
    cluster.run(5);

    let introducer = cluster.peer(1);
    assert!(introducer.membership().in_group());
    assert_eq!(introducer.membership().table().len(), 1);
    assert!(introducer.membership().heartbeat() >= 5);

    assert_eq!(introducer.dht().ring().len(), 1);
    assert!(find_nodes(introducer.dht().ring(), "k", cluster.params.ring_size()).is_empty());
}

#[test]
fn test_two_node_join() {
    let mut cluster = TestCluster::new(1);
    cluster.run(1);
    cluster.spawn(2);
    cluster.run(2);

    for id in [1, 2] {
        let table = cluster.peer(id).membership().table();
        assert_eq!(table.len(), 2, "peer {} has an incomplete table", id);
        assert!(table.contains(Address::new(1, MEMBERSHIP_PORT)));
        assert!(table.contains(Address::new(2, MEMBERSHIP_PORT)));
    }

    let added: Vec<(Address, Address)> = cluster
        .events
        .snapshot()
        .into_iter()
        .filter_map(|r| match r {
            LogRecord::NodeAdded {
                observer, subject, ..
            } => Some((observer, subject)),
            _ => None,
        })
        .collect();
    let one = Address::new(1, MEMBERSHIP_PORT);
    let two = Address::new(2, MEMBERSHIP_PORT);
    assert_eq!(added.iter().filter(|&&(o, s)| o == one && s == two).count(), 1);
    assert_eq!(added.iter().filter(|&&(o, s)| o == two && s == one).count(), 1);
}

#[test]
fn test_five_node_convergence() {
    let mut cluster = TestCluster::new(5);
    cluster.run(10);

    let now = cluster.params.currtime();
    let reference: Vec<u64> = cluster
        .peer(1)
        .dht()
        .ring()
        .iter()
        .map(|n| n.hash_code)
        .collect();

    for peer in cluster.live_peers() {
        let table = peer.membership().table();
        assert_eq!(table.len(), 5);

        // Self always present.
        assert!(table.contains(peer.address()));

        // No entry has aged past the eviction bound.
        for entry in table.entries() {
            assert!(now - entry.last_seen <= cluster.params.t_remove());
        }

        // Rings are sorted, duplicate-free, and identical everywhere.
        let ring = peer.dht().ring();
        assert_eq!(ring.len(), 5);
        assert!(ring.windows(2).all(|w| w[0].hash_code <= w[1].hash_code));
        let hashes: Vec<u64> = ring.iter().map(|n| n.hash_code).collect();
        assert_eq!(hashes, reference);
    }
}

#[test]
fn test_heartbeats_are_monotone() {
    let mut cluster = TestCluster::new(3);
    cluster.run(3);

    let watched = Address::new(2, MEMBERSHIP_PORT);
    let mut previous = 0u64;
    for _ in 0..15 {
        cluster.step();
        if let Some(entry) = cluster.peer(1).membership().table().get(watched) {
            assert!(entry.heartbeat >= previous, "heartbeat went backwards");
            previous = entry.heartbeat;
        }
    }
    assert!(previous > 0);
}

#[test]
fn test_killed_peer_is_evicted_everywhere() {
    let mut cluster = TestCluster::new(5);
    cluster.run(10);
    cluster.kill(5);
    cluster.run((cluster.params.t_remove() + 10) as usize);

    let dead = Address::new(5, MEMBERSHIP_PORT);
    for peer in cluster.live_peers() {
        assert!(
            !peer.membership().table().contains(dead),
            "peer {} still lists the dead peer",
            peer.id()
        );
        assert_eq!(peer.dht().ring().len(), 4);
        assert!(peer.dht().ring().iter().all(|n| n.address.id != 5));
    }

    // Every live peer observed the removal exactly once.
    let removals: Vec<Address> = cluster
        .events
        .snapshot()
        .into_iter()
        .filter_map(|r| match r {
            LogRecord::NodeRemoved {
                observer,
                subject,
                ..
            } if subject == dead => Some(observer),
            _ => None,
        })
        .collect();
    for id in [1u32, 2, 3, 4] {
        assert_eq!(
            removals
                .iter()
                .filter(|o| **o == Address::new(id, MEMBERSHIP_PORT))
                .count(),
            1
        );
    }
}
