// Gossip Membership Protocol
//
// Heartbeat-counter failure detection with randomized gossip
// dissemination:
//
// - Join handshake through a well-known introducer
// - Per-tick maintenance: heartbeat bump, eviction, gossip fanout
// - Monotone heartbeat merge; receipt of gossip counts as liveness
// - Time-based suspicion (t_fail) before eviction (t_remove)
//
// The layer is entirely tick-driven; the owning peer calls
// `drain_transport`, `check_messages` and `node_loop_ops` in that
// order once per simulated tick.
//
// Reference: "A Gossip-Style Failure Detection Service"
// (van Renesse et al., 1998)

use crate::logging::EventLog;
use crate::membership::message::MembershipMessage;
use crate::membership::table::{MembershipEntry, MembershipTable};
use crate::params::Params;
use crate::transport::{Address, Transport, MEMBERSHIP_PORT};
use rand::seq::IndexedRandom;
use std::collections::VecDeque;

pub struct MembershipLayer {
    addr: Address,
    params: Params,
    transport: Transport,
    events: EventLog,
    table: MembershipTable,
    heartbeat: u64,
    in_group: bool,
    failed: bool,
    inbox: VecDeque<Vec<u8>>,
}

impl MembershipLayer {
    pub fn new(node_id: u32, params: Params, transport: Transport, events: EventLog) -> Self {
        let addr = Address::new(node_id, MEMBERSHIP_PORT);
        transport.register(addr);
        let now = params.currtime();
        Self {
            addr,
            params,
            transport,
            events,
            table: MembershipTable::new(addr, now),
            heartbeat: 0,
            in_group: false,
            failed: false,
            inbox: VecDeque::new(),
        }
    }

    /// Boot the layer: the introducer starts the group by itself,
    /// everyone else asks the introducer to be let in.
    pub fn start(&mut self) {
        let introducer = Address::introducer();
        if self.addr == introducer {
            tracing::info!(node = %self.addr, "starting up group");
            self.in_group = true;
        } else {
            tracing::info!(node = %self.addr, %introducer, "trying to join");
            let req = MembershipMessage::JoinReq { from: self.addr };
            self.transport.send(&self.addr, &introducer, req.encode());
        }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn in_group(&self) -> bool {
        self.in_group
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Kill switch; every subsequent loop is a no-op.
    pub fn fail(&mut self) {
        self.failed = true;
    }

    pub fn heartbeat(&self) -> u64 {
        self.heartbeat
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    /// Membership snapshot handed to the DHT layer
    pub fn snapshot(&self) -> Vec<MembershipEntry> {
        self.table.entries().to_vec()
    }

    /// Pull buffered frames from the transport into the local queue
    pub fn drain_transport(&mut self) {
        if self.failed {
            return;
        }
        self.transport.drain(&self.addr, &mut self.inbox);
    }

    /// Drain the local queue, dispatching each frame to its handler
    pub fn check_messages(&mut self) {
        if self.failed {
            return;
        }
        while let Some(frame) = self.inbox.pop_front() {
            match MembershipMessage::decode(&frame) {
                Ok(MembershipMessage::JoinReq { from }) => self.handle_join_req(from),
                Ok(MembershipMessage::JoinRep { members, .. }) => self.handle_join_rep(members),
                Ok(MembershipMessage::Gossip { from, members }) => {
                    self.handle_gossip(from, members)
                }
                Err(e) => {
                    tracing::warn!(node = %self.addr, error = %e, "dropping undecodable membership frame");
                }
            }
        }
    }

    /// Per-tick maintenance: advance the own heartbeat, evict expired
    /// entries, then gossip the fresh part of the table.
    pub fn node_loop_ops(&mut self) {
        if self.failed || !self.in_group {
            return;
        }
        let now = self.params.currtime();

        self.heartbeat += 1;
        self.table.touch_self(self.heartbeat, now);

        for addr in self.table.evict_expired(now, self.params.t_remove()) {
            self.events.node_removed(self.addr, addr, now);
        }

        self.send_gossips(now);
    }

    fn handle_join_req(&mut self, from: Address) {
        let now = self.params.currtime();
        if self
            .table
            .insert(MembershipEntry::new(from.id, from.port, 0, now))
        {
            self.events.node_added(self.addr, from, now);
        } else if let Some(entry) = self.table.get_mut(from) {
            // Known peer asking again; keep its heartbeat, refresh the evidence.
            entry.last_seen = now;
        }

        let rep = MembershipMessage::JoinRep {
            from: self.addr,
            members: self.snapshot(),
        };
        self.transport.send(&self.addr, &from, rep.encode());
    }

    fn handle_join_rep(&mut self, members: Vec<MembershipEntry>) {
        let now = self.params.currtime();
        self.table.replace_all(members, self.heartbeat, now);
        self.in_group = true;
        tracing::info!(node = %self.addr, members = self.table.len(), "joined group");

        for entry in self.table.entries().to_vec() {
            if entry.address() != self.addr {
                self.events.node_added(self.addr, entry.address(), now);
            }
        }
    }

    fn handle_gossip(&mut self, from: Address, members: Vec<MembershipEntry>) {
        let now = self.params.currtime();

        // Receipt of gossip is liveness evidence for the sender,
        // independent of any heartbeat it carries. A self-addressed
        // gossip earns no bump; the own entry advances with the
        // heartbeat counter.
        if from != self.addr {
            if let Some(entry) = self.table.get_mut(from) {
                entry.heartbeat += 1;
                entry.last_seen = now;
            }
        }

        for member in members {
            match self.table.get_mut(member.address()) {
                Some(entry) => {
                    if member.heartbeat > entry.heartbeat {
                        entry.heartbeat = member.heartbeat;
                        entry.last_seen = now;
                    }
                }
                None => {
                    self.table.insert(MembershipEntry::new(
                        member.id,
                        member.port,
                        member.heartbeat,
                        now,
                    ));
                    self.events.node_added(self.addr, member.address(), now);
                }
            }
        }
    }

    fn send_gossips(&mut self, now: i64) {
        let digest = self.table.digest(now, self.params.t_fail());
        let mut rng = rand::rng();
        let targets: Vec<Address> = (0..self.params.gossip_fanout())
            .filter_map(|_| self.table.entries().choose(&mut rng))
            .map(|entry| entry.address())
            .collect();

        for target in targets {
            let msg = MembershipMessage::Gossip {
                from: self.addr,
                members: digest.clone(),
            };
            self.transport.send(&self.addr, &target, msg.encode());
        }
    }
}
