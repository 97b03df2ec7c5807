// Datagram Transport Emulator
//
// In-process, best-effort datagram transport shared by all peers in a
// host. Frames are buffered per destination address and handed over in
// bulk when a peer drains its queue. Delivery is unordered across
// addresses, unreliable (a configurable fraction of frames is dropped
// on send), and carries no acknowledgements; reliability lives in the
// quorum layer above.
//
// Port convention: port 0 addresses the membership layer of a node id,
// port 1 its DHT layer.

use crate::error::{DhtError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Node id of the well-known introducer
pub const INTRODUCER_ID: u32 = 1;

/// Port of the membership layer
pub const MEMBERSHIP_PORT: u16 = 0;

/// Port of the DHT layer
pub const DHT_PORT: u16 = 1;

/// Network address of one protocol endpoint: a node id plus a port.
/// Six bytes on the wire, both fields little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub id: u32,
    pub port: u16,
}

impl Address {
    /// Encoded size in bytes
    pub const WIRE_LEN: usize = 6;

    pub fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }

    /// The well-known join coordinator
    pub fn introducer() -> Self {
        Self::new(INTRODUCER_ID, MEMBERSHIP_PORT)
    }

    /// Same node id, different port
    pub fn with_port(self, port: u16) -> Self {
        Self { port, ..self }
    }

    pub fn to_wire(self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..].copy_from_slice(&self.port.to_le_bytes());
        buf
    }

    pub fn from_wire(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::WIRE_LEN {
            return Err(DhtError::Codec(format!(
                "address needs {} bytes, got {}",
                Self::WIRE_LEN,
                buf.len()
            )));
        }
        let id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let port = u16::from_le_bytes([buf[4], buf[5]]);
        Ok(Self { id, port })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

impl FromStr for Address {
    type Err = DhtError;

    fn from_str(s: &str) -> Result<Self> {
        let (id, port) = s
            .split_once(':')
            .ok_or_else(|| DhtError::Codec(format!("malformed address: {}", s)))?;
        let id = id
            .parse::<u32>()
            .map_err(|e| DhtError::Codec(format!("bad node id in address {}: {}", s, e)))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| DhtError::Codec(format!("bad port in address {}: {}", s, e)))?;
        Ok(Self { id, port })
    }
}

/// Shared frame switch with a loss model
#[derive(Debug, Clone)]
pub struct Transport {
    queues: Arc<DashMap<Address, VecDeque<Vec<u8>>>>,
    drop_rate: Arc<AtomicU64>,
}

impl Transport {
    pub fn new(drop_rate: f64) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            drop_rate: Arc::new(AtomicU64::new(drop_rate.to_bits())),
        }
    }

    /// Create the inbound queue for an endpoint. Idempotent.
    pub fn register(&self, addr: Address) {
        self.queues.entry(addr).or_default();
    }

    pub fn drop_rate(&self) -> f64 {
        f64::from_bits(self.drop_rate.load(Ordering::Relaxed))
    }

    /// Change the loss model mid-run; hosts use this to start a
    /// cluster clean and degrade the network afterwards.
    pub fn set_drop_rate(&self, rate: f64) {
        self.drop_rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    /// Best-effort enqueue of a frame into the destination's inbound
    /// queue. Returns whether the frame was buffered; frames to
    /// unregistered addresses and frames hit by the loss model vanish.
    pub fn send(&self, from: &Address, to: &Address, frame: Vec<u8>) -> bool {
        let drop_rate = self.drop_rate();
        if drop_rate > 0.0 && rand::random::<f64>() < drop_rate {
            tracing::trace!(%from, %to, "frame dropped by loss model");
            return false;
        }
        match self.queues.get_mut(to) {
            Some(mut queue) => {
                queue.push_back(frame);
                true
            }
            None => {
                tracing::trace!(%from, %to, "frame to unregistered address");
                false
            }
        }
    }

    /// Move every buffered frame for `addr` into `out`, returning how
    /// many were transferred.
    pub fn drain(&self, addr: &Address, out: &mut VecDeque<Vec<u8>>) -> usize {
        match self.queues.get_mut(addr) {
            Some(mut queue) => {
                let count = queue.len();
                out.extend(queue.drain(..));
                count
            }
            None => 0,
        }
    }
}
