// RustyDHT - Gossip-based distributed key-value store
// Core library module

pub mod dht;
pub mod error;
pub mod logging;
pub mod membership;
pub mod params;
pub mod peer;
pub mod transport;

pub use dht::{DhtLayer, KeyValueStore, ReplicaLabel, RingNode, TransactionId};
pub use error::{DhtError, Result};
pub use logging::{DhtOp, EventLog, LogRecord};
pub use membership::{MembershipEntry, MembershipLayer, MembershipTable};
pub use params::{Params, ParamsConfig};
pub use peer::Peer;
pub use transport::{Address, Transport, DHT_PORT, INTRODUCER_ID, MEMBERSHIP_PORT};
