// Peer
//
// One process participant: a membership layer and a DHT layer stacked
// on the shared transport, advanced cooperatively by the host once per
// simulated tick. Within a tick the order is fixed: both layers take
// their inbound frames, the membership layer settles its view, then
// the DHT layer derives its ring from that view, serves traffic, and
// times out stale client transactions. The membership snapshot the DHT
// observes is therefore stable for the whole tick.

use crate::dht::DhtLayer;
use crate::logging::EventLog;
use crate::membership::MembershipLayer;
use crate::params::Params;
use crate::transport::{Address, Transport};

pub struct Peer {
    membership: MembershipLayer,
    dht: DhtLayer,
}

impl Peer {
    /// Create and boot a peer. The peer with the introducer's node id
    /// seeds the group; everyone else sends a join request.
    pub fn new(node_id: u32, params: Params, transport: Transport, events: EventLog) -> Self {
        let mut membership =
            MembershipLayer::new(node_id, params.clone(), transport.clone(), events.clone());
        membership.start();
        let dht = DhtLayer::new(node_id, params, transport, events);
        Self { membership, dht }
    }

    pub fn id(&self) -> u32 {
        self.membership.address().id
    }

    pub fn address(&self) -> Address {
        self.membership.address()
    }

    pub fn membership(&self) -> &MembershipLayer {
        &self.membership
    }

    pub fn dht(&self) -> &DhtLayer {
        &self.dht
    }

    pub fn is_failed(&self) -> bool {
        self.membership.is_failed()
    }

    /// Kill switch: the peer stops participating in all future ticks.
    /// Frames already addressed to it are never drained.
    pub fn fail(&mut self) {
        self.membership.fail();
        self.dht.fail();
    }

    /// Advance the peer by one tick.
    pub fn tick(&mut self) {
        if self.is_failed() {
            return;
        }

        self.membership.drain_transport();
        self.dht.drain_transport();

        self.membership.check_messages();
        self.membership.node_loop_ops();

        self.dht.update_ring(&self.membership.snapshot());
        self.dht.check_messages();
        self.dht.sweep_timeouts();
    }

    /// Client CREATE on this peer as coordinator
    pub fn create(&mut self, key: &str, value: &str) {
        if self.is_failed() {
            return;
        }
        self.dht.client_create(key, value);
    }

    /// Client READ on this peer as coordinator
    pub fn read(&mut self, key: &str) {
        if self.is_failed() {
            return;
        }
        self.dht.client_read(key);
    }

    /// Client UPDATE on this peer as coordinator
    pub fn update(&mut self, key: &str, value: &str) {
        if self.is_failed() {
            return;
        }
        self.dht.client_update(key, value);
    }

    /// Client DELETE on this peer as coordinator
    pub fn delete(&mut self, key: &str) {
        if self.is_failed() {
            return;
        }
        self.dht.client_delete(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamsConfig;

    fn harness() -> (Params, Transport, EventLog) {
        let params = Params::new(ParamsConfig::default()).unwrap();
        (params, Transport::new(0.0), EventLog::new())
    }

    #[test]
    fn test_introducer_ticks_alone() {
        let (params, transport, events) = harness();
        let mut peer = Peer::new(1, params.clone(), transport, events);

        for _ in 0..5 {
            peer.tick();
            params.advance();
        }

        assert!(peer.membership().in_group());
        assert_eq!(peer.membership().table().len(), 1);
        assert!(peer.membership().heartbeat() >= 5);
        assert_eq!(peer.dht().ring().len(), 1);
    }

    #[test]
    fn test_two_peers_converge() {
        let (params, transport, events) = harness();
        let mut introducer = Peer::new(1, params.clone(), transport.clone(), events.clone());
        let mut joiner = Peer::new(2, params.clone(), transport, events);

        for _ in 0..3 {
            introducer.tick();
            joiner.tick();
            params.advance();
        }

        assert!(joiner.membership().in_group());
        assert_eq!(introducer.membership().table().len(), 2);
        assert_eq!(joiner.membership().table().len(), 2);
        assert_eq!(introducer.dht().ring().len(), 2);
    }

    #[test]
    fn test_failed_peer_ignores_everything() {
        let (params, transport, events) = harness();
        let mut peer = Peer::new(1, params.clone(), transport, events);
        peer.fail();

        peer.tick();
        peer.create("k", "v");
        params.advance();
        peer.tick();

        assert_eq!(peer.membership().heartbeat(), 0);
        assert_eq!(peer.dht().pending_len(), 0);
    }
}
