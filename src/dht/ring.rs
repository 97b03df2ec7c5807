// Consistent-Hash Ring
//
// Node addresses and keys share one hash function modulo the ring
// size; a key's replicas are the first ring node at or clockwise past
// its position plus the next two. The ring is rebuilt from the
// membership snapshot every tick and compared element-wise to detect
// reconfiguration.

use crate::membership::table::MembershipEntry;
use crate::transport::Address;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Position on the ring (0..ring_size)
pub type HashPosition = u64;

/// Copies of every key kept on the ring
pub const REPLICATION_FACTOR: usize = 3;

/// One peer placed on the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingNode {
    pub address: Address,
    pub hash_code: HashPosition,
}

/// Hash a key or address string to its ring position
pub fn hash_position(input: &str, ring_size: u64) -> HashPosition {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish() % ring_size
}

/// Place the membership snapshot on the ring, sorted ascending by
/// position. The sort is stable, so position ties keep snapshot order.
pub fn build_ring(members: &[MembershipEntry], ring_size: u64) -> Vec<RingNode> {
    let mut ring: Vec<RingNode> = members
        .iter()
        .map(|entry| {
            let address = entry.address();
            RingNode {
                address,
                hash_code: hash_position(&address.to_string(), ring_size),
            }
        })
        .collect();
    ring.sort_by_key(|node| node.hash_code);
    ring
}

/// Whether the ring differs from the cached one in length or in any
/// position-wise hash code.
pub fn ring_changed(old: &[RingNode], new: &[RingNode]) -> bool {
    old.len() != new.len()
        || old
            .iter()
            .zip(new.iter())
            .any(|(a, b)| a.hash_code != b.hash_code)
}

/// The replica set of a key: the successor node of its position and
/// the two nodes after it, wrapping around. Rings smaller than the
/// replication factor place nothing.
pub fn find_nodes(ring: &[RingNode], key: &str, ring_size: u64) -> Vec<RingNode> {
    if ring.len() < REPLICATION_FACTOR {
        return Vec::new();
    }
    let pos = hash_position(key, ring_size);
    let n = ring.len();
    let start = if pos <= ring[0].hash_code || pos > ring[n - 1].hash_code {
        0
    } else {
        ring.iter()
            .position(|node| pos <= node.hash_code)
            .unwrap_or(0)
    };
    (0..REPLICATION_FACTOR)
        .map(|offset| ring[(start + offset) % n])
        .collect()
}
