// Replicated DHT Layer
//
// Key placement and quorum replication over the membership view:
//
// - `ring`: consistent-hash ring construction and replica lookup
// - `store`: the in-memory store backing one replica
// - `message`: the textual request/reply wire codec
// - `protocol`: client coordinator, server handlers, stabilization

pub mod message;
pub mod protocol;
pub mod ring;
pub mod store;

pub use message::{DhtMessage, DhtPayload, ReplicaLabel, TransactionId};
pub use protocol::DhtLayer;
pub use ring::{build_ring, find_nodes, hash_position, ring_changed, HashPosition, RingNode, REPLICATION_FACTOR};
pub use store::KeyValueStore;
