// Parameter Facade
//
// Shared simulation parameters and the discrete logical clock. Every
// peer in a process holds a cheap clone of `Params`; the hosting test
// harness (or application) owns the single clock and advances it once
// per simulated tick.

use crate::error::{DhtError, Result};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Tunable protocol constants
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsConfig {
    /// Number of peers the host intends to run
    pub num_nodes: usize,
    /// Age (in ticks) past which a membership entry is suspected and
    /// withheld from outbound gossip digests
    pub t_fail: i64,
    /// Age past which a suspected entry is evicted
    pub t_remove: i64,
    /// Gossip targets picked per maintenance pass
    pub gossip_fanout: usize,
    /// Modulus of the consistent-hash ring
    pub ring_size: u64,
    /// Probability that the transport drops a frame
    pub msg_drop_rate: f64,
    /// Ticks after which an unanswered client transaction fails
    pub client_timeout: i64,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            num_nodes: 10,
            t_fail: 5,
            t_remove: 20,
            gossip_fanout: 4,
            ring_size: 512,
            msg_drop_rate: 0.0,
            client_timeout: 3,
        }
    }
}

/// Handle to the shared parameters and logical clock
#[derive(Debug, Clone)]
pub struct Params {
    config: ParamsConfig,
    global_time: Arc<AtomicI64>,
}

impl Params {
    pub fn new(config: ParamsConfig) -> Result<Self> {
        if config.t_fail >= config.t_remove {
            return Err(DhtError::Configuration(format!(
                "t_fail ({}) must be less than t_remove ({})",
                config.t_fail, config.t_remove
            )));
        }
        if config.ring_size == 0 {
            return Err(DhtError::Configuration(
                "ring_size must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.msg_drop_rate) {
            return Err(DhtError::Configuration(format!(
                "msg_drop_rate ({}) must be within [0, 1]",
                config.msg_drop_rate
            )));
        }
        Ok(Self {
            config,
            global_time: Arc::new(AtomicI64::new(0)),
        })
    }

    /// Current logical time
    pub fn globaltime(&self) -> i64 {
        self.global_time.load(Ordering::SeqCst)
    }

    /// Alias of `globaltime`
    pub fn currtime(&self) -> i64 {
        self.globaltime()
    }

    /// Advance the clock by one tick, returning the new time
    pub fn advance(&self) -> i64 {
        self.global_time.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn num_nodes(&self) -> usize {
        self.config.num_nodes
    }

    pub fn t_fail(&self) -> i64 {
        self.config.t_fail
    }

    pub fn t_remove(&self) -> i64 {
        self.config.t_remove
    }

    pub fn gossip_fanout(&self) -> usize {
        self.config.gossip_fanout
    }

    pub fn ring_size(&self) -> u64 {
        self.config.ring_size
    }

    pub fn msg_drop_rate(&self) -> f64 {
        self.config.msg_drop_rate
    }

    pub fn client_timeout(&self) -> i64 {
        self.config.client_timeout
    }
}
