// Replicated DHT Protocol
//
// One layer instance per peer, stacked on the shared transport next to
// the membership layer. Responsibilities:
//
// - Ring refresh from the membership snapshot, with change detection
// - Client-side quorum coordination of CREATE/READ/UPDATE/DELETE
// - Server-side request handling against the local replica store
// - Stabilization: re-replication of local keys after a ring change
//
// Reliability is quorum-only: requests fan out to the three replicas
// of a key, and a transaction retires on two agreeing replies or on
// timeout. There are no transport ACKs and no retries.

use crate::dht::message::{DhtMessage, DhtPayload, ReplicaLabel, TransactionId};
use crate::dht::ring::{self, RingNode};
use crate::dht::store::KeyValueStore;
use crate::logging::{DhtOp, EventLog};
use crate::membership::MembershipEntry;
use crate::params::Params;
use crate::transport::{Address, Transport, DHT_PORT};
use std::collections::VecDeque;

/// Replies required to settle a transaction, in either direction
const REPLY_QUORUM: u32 = 2;

/// One outstanding client transaction awaiting its quorum
#[derive(Debug, Clone)]
struct PendingTransaction {
    trans_id: TransactionId,
    started_at: i64,
    positive: u32,
    negative: u32,
    op: DhtOp,
    key: String,
    value: Option<String>,
}

pub struct DhtLayer {
    addr: Address,
    params: Params,
    transport: Transport,
    events: EventLog,
    ring: Vec<RingNode>,
    store: KeyValueStore,
    pending: Vec<PendingTransaction>,
    next_trans_id: TransactionId,
    failed: bool,
    inbox: VecDeque<Vec<u8>>,
}

impl DhtLayer {
    pub fn new(node_id: u32, params: Params, transport: Transport, events: EventLog) -> Self {
        let addr = Address::new(node_id, DHT_PORT);
        transport.register(addr);
        Self {
            addr,
            params,
            transport,
            events,
            ring: Vec::new(),
            store: KeyValueStore::new(),
            pending: Vec::new(),
            next_trans_id: 0,
            failed: false,
            inbox: VecDeque::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn ring(&self) -> &[RingNode] {
        &self.ring
    }

    pub fn store(&self) -> &KeyValueStore {
        &self.store
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Kill switch; every subsequent loop is a no-op.
    pub fn fail(&mut self) {
        self.failed = true;
    }

    /// Pull buffered frames from the transport into the local queue
    pub fn drain_transport(&mut self) {
        if self.failed {
            return;
        }
        self.transport.drain(&self.addr, &mut self.inbox);
    }

    /// Rebuild the ring from the membership snapshot; a changed ring
    /// triggers stabilization.
    pub fn update_ring(&mut self, members: &[MembershipEntry]) {
        if self.failed {
            return;
        }
        let new_ring = ring::build_ring(members, self.params.ring_size());
        if ring::ring_changed(&self.ring, &new_ring) {
            tracing::debug!(node = %self.addr, size = new_ring.len(), "ring changed");
            self.ring = new_ring;
            self.stabilize();
        }
    }

    /// Client-side CREATE: replicate `value` under `key` on the key's
    /// replica set, succeeding on a positive quorum.
    pub fn client_create(&mut self, key: &str, value: &str) {
        if self.failed {
            return;
        }
        let replicas = self.replicas_of(key);
        if replicas.is_empty() {
            return;
        }
        let trans_id = self.next_trans_id();
        for (position, replica) in replicas.iter().enumerate() {
            let msg = DhtMessage::new(
                trans_id,
                self.addr,
                DhtPayload::Create {
                    key: key.to_string(),
                    value: value.to_string(),
                    replica: ReplicaLabel::from_position(position),
                },
            );
            self.send_to(replica.address, &msg);
        }
        self.record_pending(trans_id, DhtOp::Create, key, Some(value));
    }

    /// Client-side READ: a value read by any two replicas wins.
    pub fn client_read(&mut self, key: &str) {
        if self.failed {
            return;
        }
        let replicas = self.replicas_of(key);
        if replicas.is_empty() {
            return;
        }
        let trans_id = self.next_trans_id();
        for replica in &replicas {
            let msg = DhtMessage::new(
                trans_id,
                self.addr,
                DhtPayload::Read {
                    key: key.to_string(),
                },
            );
            self.send_to(replica.address, &msg);
        }
        self.record_pending(trans_id, DhtOp::Read, key, None);
    }

    /// Client-side UPDATE: succeeds iff two replicas held the key.
    pub fn client_update(&mut self, key: &str, value: &str) {
        if self.failed {
            return;
        }
        let replicas = self.replicas_of(key);
        if replicas.is_empty() {
            return;
        }
        let trans_id = self.next_trans_id();
        for (position, replica) in replicas.iter().enumerate() {
            let msg = DhtMessage::new(
                trans_id,
                self.addr,
                DhtPayload::Update {
                    key: key.to_string(),
                    value: value.to_string(),
                    replica: ReplicaLabel::from_position(position),
                },
            );
            self.send_to(replica.address, &msg);
        }
        self.record_pending(trans_id, DhtOp::Update, key, Some(value));
    }

    /// Client-side DELETE: succeeds iff two replicas held the key.
    pub fn client_delete(&mut self, key: &str) {
        if self.failed {
            return;
        }
        let replicas = self.replicas_of(key);
        if replicas.is_empty() {
            return;
        }
        let trans_id = self.next_trans_id();
        for replica in &replicas {
            let msg = DhtMessage::new(
                trans_id,
                self.addr,
                DhtPayload::Delete {
                    key: key.to_string(),
                },
            );
            self.send_to(replica.address, &msg);
        }
        self.record_pending(trans_id, DhtOp::Delete, key, None);
    }

    /// Drain the local queue, serving requests and aggregating replies
    pub fn check_messages(&mut self) {
        if self.failed {
            return;
        }
        while let Some(frame) = self.inbox.pop_front() {
            let text = match String::from_utf8(frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(node = %self.addr, error = %e, "dropping non-utf8 DHT frame");
                    continue;
                }
            };
            let msg = match DhtMessage::decode(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(node = %self.addr, error = %e, "dropping undecodable DHT frame");
                    continue;
                }
            };
            match msg.payload.clone() {
                DhtPayload::Create { key, value, .. } => self.serve_create(&msg, &key, &value),
                DhtPayload::Read { key } => self.serve_read(&msg, &key),
                DhtPayload::Update { key, value, .. } => self.serve_update(&msg, &key, &value),
                DhtPayload::Delete { key } => self.serve_delete(&msg, &key),
                DhtPayload::Reply { success } => self.on_reply(msg.trans_id, success, None),
                DhtPayload::ReadReply { value } => {
                    self.on_reply(msg.trans_id, !value.is_empty(), Some(&value))
                }
            }
        }
    }

    /// Fail every pending transaction older than the client timeout.
    /// Bounds the pending table and settles partial failures where a
    /// deciding reply never arrives.
    pub fn sweep_timeouts(&mut self) {
        if self.failed {
            return;
        }
        let now = self.params.currtime();
        let timeout = self.params.client_timeout();
        let events = self.events.clone();
        let addr = self.addr;
        self.pending.retain(|tx| {
            if now - tx.started_at > timeout {
                events.op_fail(
                    addr,
                    true,
                    tx.op,
                    tx.trans_id,
                    &tx.key,
                    tx.value.as_deref(),
                    now,
                );
                false
            } else {
                true
            }
        });
    }

    fn next_trans_id(&mut self) -> TransactionId {
        self.next_trans_id += 1;
        self.next_trans_id
    }

    fn replicas_of(&self, key: &str) -> Vec<RingNode> {
        ring::find_nodes(&self.ring, key, self.params.ring_size())
    }

    fn send_to(&self, node_addr: Address, msg: &DhtMessage) {
        let dest = node_addr.with_port(DHT_PORT);
        self.transport
            .send(&self.addr, &dest, msg.encode().into_bytes());
    }

    fn record_pending(&mut self, trans_id: TransactionId, op: DhtOp, key: &str, value: Option<&str>) {
        self.pending.push(PendingTransaction {
            trans_id,
            started_at: self.params.currtime(),
            positive: 0,
            negative: 0,
            op,
            key: key.to_string(),
            value: value.map(str::to_string),
        });
    }

    fn serve_create(&mut self, msg: &DhtMessage, key: &str, value: &str) {
        let now = self.params.currtime();
        let success = self.store.create(key, value);
        if success {
            self.events
                .op_success(self.addr, false, DhtOp::Create, msg.trans_id, key, Some(value), now);
        } else {
            self.events
                .op_fail(self.addr, false, DhtOp::Create, msg.trans_id, key, Some(value), now);
        }
        let reply = DhtMessage::new(msg.trans_id, self.addr, DhtPayload::Reply { success });
        self.transport
            .send(&self.addr, &msg.from, reply.encode().into_bytes());
    }

    fn serve_read(&mut self, msg: &DhtMessage, key: &str) {
        let now = self.params.currtime();
        let value = self.store.read(key);
        if value.is_empty() {
            self.events
                .op_fail(self.addr, false, DhtOp::Read, msg.trans_id, key, None, now);
        } else {
            self.events.op_success(
                self.addr,
                false,
                DhtOp::Read,
                msg.trans_id,
                key,
                Some(&value),
                now,
            );
        }
        let reply = DhtMessage::new(msg.trans_id, self.addr, DhtPayload::ReadReply { value });
        self.transport
            .send(&self.addr, &msg.from, reply.encode().into_bytes());
    }

    fn serve_update(&mut self, msg: &DhtMessage, key: &str, value: &str) {
        let now = self.params.currtime();
        let success = self.store.update(key, value);
        if success {
            self.events
                .op_success(self.addr, false, DhtOp::Update, msg.trans_id, key, Some(value), now);
        } else {
            self.events
                .op_fail(self.addr, false, DhtOp::Update, msg.trans_id, key, Some(value), now);
        }
        let reply = DhtMessage::new(msg.trans_id, self.addr, DhtPayload::Reply { success });
        self.transport
            .send(&self.addr, &msg.from, reply.encode().into_bytes());
    }

    fn serve_delete(&mut self, msg: &DhtMessage, key: &str) {
        let now = self.params.currtime();
        let success = self.store.delete(key);
        if success {
            self.events
                .op_success(self.addr, false, DhtOp::Delete, msg.trans_id, key, None, now);
        } else {
            self.events
                .op_fail(self.addr, false, DhtOp::Delete, msg.trans_id, key, None, now);
        }
        let reply = DhtMessage::new(msg.trans_id, self.addr, DhtPayload::Reply { success });
        self.transport
            .send(&self.addr, &msg.from, reply.encode().into_bytes());
    }

    /// Count one reply toward its transaction's quorum and retire the
    /// transaction once either side reaches two. Replies for unknown
    /// transactions (already retired, or stabilization traffic) are
    /// dropped.
    fn on_reply(&mut self, trans_id: TransactionId, positive: bool, read_value: Option<&str>) {
        let now = self.params.currtime();
        let Some(index) = self.pending.iter().position(|tx| tx.trans_id == trans_id) else {
            return;
        };
        let tx = &mut self.pending[index];
        if positive {
            tx.positive += 1;
        } else {
            tx.negative += 1;
        }

        if tx.positive >= REPLY_QUORUM {
            let value = match tx.op {
                DhtOp::Read => read_value.map(str::to_string),
                _ => tx.value.clone(),
            };
            self.events.op_success(
                self.addr,
                true,
                tx.op,
                tx.trans_id,
                &tx.key,
                value.as_deref(),
                now,
            );
            self.pending.remove(index);
        } else if tx.negative >= REPLY_QUORUM {
            self.events.op_fail(
                self.addr,
                true,
                tx.op,
                tx.trans_id,
                &tx.key,
                tx.value.as_deref(),
                now,
            );
            self.pending.remove(index);
        }
    }

    /// Re-replicate every locally held key onto its current replica
    /// set. Server CREATE absorbs duplicates, so a second pass over an
    /// unchanged ring leaves placement untouched. Replicas that
    /// dropped out of a key's set keep their stale copy; such nodes
    /// leave the ring on departure or eviction.
    fn stabilize(&mut self) {
        let pairs: Vec<(String, String)> = self
            .store
            .entries()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if pairs.is_empty() {
            return;
        }
        tracing::debug!(node = %self.addr, keys = pairs.len(), "running stabilization");
        for (key, value) in pairs {
            let replicas = self.replicas_of(&key);
            if replicas.is_empty() {
                continue;
            }
            let trans_id = self.next_trans_id();
            for (position, replica) in replicas.iter().enumerate() {
                let msg = DhtMessage::new(
                    trans_id,
                    self.addr,
                    DhtPayload::Create {
                        key: key.clone(),
                        value: value.clone(),
                        replica: ReplicaLabel::from_position(position),
                    },
                );
                self.send_to(replica.address, &msg);
            }
        }
    }
}
