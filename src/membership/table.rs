// Membership Table
//
// Insertion-ordered list of known peers, unique by (id, port). The
// entry for self is always present. Heartbeats only ever increase;
// `last_seen` records the local tick at which fresh evidence for an
// entry last arrived.

use crate::transport::Address;
use serde::{Deserialize, Serialize};

/// One peer as seen by the local failure detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEntry {
    pub id: u32,
    pub port: u16,
    pub heartbeat: u64,
    pub last_seen: i64,
}

impl MembershipEntry {
    pub fn new(id: u32, port: u16, heartbeat: u64, last_seen: i64) -> Self {
        Self {
            id,
            port,
            heartbeat,
            last_seen,
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.id, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct MembershipTable {
    self_addr: Address,
    entries: Vec<MembershipEntry>,
}

impl MembershipTable {
    /// A fresh table containing only the owning peer
    pub fn new(self_addr: Address, now: i64) -> Self {
        Self {
            self_addr,
            entries: vec![MembershipEntry::new(self_addr.id, self_addr.port, 0, now)],
        }
    }

    pub fn self_addr(&self) -> Address {
        self.self_addr
    }

    pub fn entries(&self) -> &[MembershipEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.get(addr).is_some()
    }

    pub fn get(&self, addr: Address) -> Option<&MembershipEntry> {
        self.entries
            .iter()
            .find(|e| e.id == addr.id && e.port == addr.port)
    }

    pub fn get_mut(&mut self, addr: Address) -> Option<&mut MembershipEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == addr.id && e.port == addr.port)
    }

    /// Append a new entry. Returns false (and leaves the table
    /// untouched) when an entry with the same (id, port) exists.
    pub fn insert(&mut self, entry: MembershipEntry) -> bool {
        if self.contains(entry.address()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Write the own heartbeat into the self entry, re-creating it if
    /// a wholesale replacement lost it. Never lowers the stored value:
    /// gossip echoes may have inflated it beyond the own counter.
    pub fn touch_self(&mut self, heartbeat: u64, now: i64) {
        let self_addr = self.self_addr;
        match self.get_mut(self_addr) {
            Some(entry) => {
                entry.heartbeat = entry.heartbeat.max(heartbeat);
                entry.last_seen = now;
            }
            None => {
                self.entries.push(MembershipEntry::new(
                    self_addr.id,
                    self_addr.port,
                    heartbeat,
                    now,
                ));
            }
        }
    }

    /// Replace the table wholesale (join handshake), stamping every
    /// entry as seen now and keeping self present.
    pub fn replace_all(&mut self, entries: Vec<MembershipEntry>, self_heartbeat: u64, now: i64) {
        self.entries.clear();
        for mut entry in entries {
            entry.last_seen = now;
            if !self.contains(entry.address()) {
                self.entries.push(entry);
            }
        }
        if !self.contains(self.self_addr) {
            self.touch_self(self_heartbeat, now);
        }
    }

    /// Drop every non-self entry whose last evidence is older than
    /// `t_remove` ticks. Returns the evicted addresses.
    pub fn evict_expired(&mut self, now: i64, t_remove: i64) -> Vec<Address> {
        let self_addr = self.self_addr;
        let mut evicted = Vec::new();
        self.entries.retain(|entry| {
            let addr = entry.address();
            if addr != self_addr && now - entry.last_seen > t_remove {
                evicted.push(addr);
                false
            } else {
                true
            }
        });
        evicted
    }

    /// The entries fresh enough to vouch for: strictly younger than
    /// `t_fail`. Suspected entries stay in the table but are withheld
    /// from outbound digests.
    pub fn digest(&self, now: i64, t_fail: i64) -> Vec<MembershipEntry> {
        self.entries
            .iter()
            .filter(|e| now - e.last_seen < t_fail)
            .copied()
            .collect()
    }
}
