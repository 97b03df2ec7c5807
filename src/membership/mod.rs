// Membership Layer
//
// Gossip-based, eventually consistent view of the set of live peers:
//
// - `table`: the per-peer membership table and its invariants
// - `message`: the binary join/gossip wire codec
// - `protocol`: join handshake, heartbeat, gossip merge, eviction

pub mod message;
pub mod protocol;
pub mod table;

pub use message::MembershipMessage;
pub use protocol::MembershipLayer;
pub use table::{MembershipEntry, MembershipTable};
