// Protocol Event Log
//
// Well-known success/failure records emitted by both protocol layers
// and consumed by tests. Every peer holds a clone of the shared
// recorder; records are additionally mirrored to structured `tracing`
// output for interactive debugging.

use crate::error::{DhtError, Result};
use crate::transport::Address;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The four client-visible DHT operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DhtOp {
    Create,
    Read,
    Update,
    Delete,
}

impl DhtOp {
    pub fn name(&self) -> &'static str {
        match self {
            DhtOp::Create => "create",
            DhtOp::Read => "read",
            DhtOp::Update => "update",
            DhtOp::Delete => "delete",
        }
    }
}

/// One well-known record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    NodeAdded {
        observer: Address,
        subject: Address,
        time: i64,
    },
    NodeRemoved {
        observer: Address,
        subject: Address,
        time: i64,
    },
    OpSuccess {
        observer: Address,
        coordinator: bool,
        op: DhtOp,
        trans_id: i32,
        key: String,
        value: Option<String>,
        time: i64,
    },
    OpFail {
        observer: Address,
        coordinator: bool,
        op: DhtOp,
        trans_id: i32,
        key: String,
        value: Option<String>,
        time: i64,
    },
}

/// Shared, append-only record collector
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Arc<RwLock<Vec<LogRecord>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_added(&self, observer: Address, subject: Address, time: i64) {
        tracing::info!(%observer, %subject, time, "node added");
        self.records.write().push(LogRecord::NodeAdded {
            observer,
            subject,
            time,
        });
    }

    pub fn node_removed(&self, observer: Address, subject: Address, time: i64) {
        tracing::info!(%observer, %subject, time, "node removed");
        self.records.write().push(LogRecord::NodeRemoved {
            observer,
            subject,
            time,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn op_success(
        &self,
        observer: Address,
        coordinator: bool,
        op: DhtOp,
        trans_id: i32,
        key: &str,
        value: Option<&str>,
        time: i64,
    ) {
        tracing::debug!(
            %observer,
            coordinator,
            op = op.name(),
            trans_id,
            key,
            value,
            time,
            "operation succeeded"
        );
        self.records.write().push(LogRecord::OpSuccess {
            observer,
            coordinator,
            op,
            trans_id,
            key: key.to_string(),
            value: value.map(str::to_string),
            time,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn op_fail(
        &self,
        observer: Address,
        coordinator: bool,
        op: DhtOp,
        trans_id: i32,
        key: &str,
        value: Option<&str>,
        time: i64,
    ) {
        tracing::debug!(
            %observer,
            coordinator,
            op = op.name(),
            trans_id,
            key,
            value,
            time,
            "operation failed"
        );
        self.records.write().push(LogRecord::OpFail {
            observer,
            coordinator,
            op,
            trans_id,
            key: key.to_string(),
            value: value.map(str::to_string),
            time,
        });
    }

    /// Copy of every record emitted so far
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Records rendered as a JSON array, for external consumers
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&*self.records.read())
            .map_err(|e| DhtError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Address, DHT_PORT, MEMBERSHIP_PORT};

    #[test]
    fn test_records_are_shared_between_clones() {
        let events = EventLog::new();
        let clone = events.clone();

        events.node_added(Address::new(1, MEMBERSHIP_PORT), Address::new(2, MEMBERSHIP_PORT), 0);
        clone.node_removed(Address::new(1, MEMBERSHIP_PORT), Address::new(2, MEMBERSHIP_PORT), 7);

        let records = events.snapshot();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], LogRecord::NodeAdded { time: 0, .. }));
        assert!(matches!(records[1], LogRecord::NodeRemoved { time: 7, .. }));
    }

    #[test]
    fn test_operation_records() {
        let events = EventLog::new();
        let observer = Address::new(3, DHT_PORT);

        events.op_success(observer, true, DhtOp::Create, 1, "k", Some("v"), 4);
        events.op_fail(observer, false, DhtOp::Read, 2, "k", None, 5);

        let records = events.snapshot();
        assert_eq!(
            records[0],
            LogRecord::OpSuccess {
                observer,
                coordinator: true,
                op: DhtOp::Create,
                trans_id: 1,
                key: "k".to_string(),
                value: Some("v".to_string()),
                time: 4,
            }
        );
        assert!(matches!(
            records[1],
            LogRecord::OpFail {
                op: DhtOp::Read,
                coordinator: false,
                ..
            }
        ));
    }

    #[test]
    fn test_json_export() {
        let events = EventLog::new();
        events.node_added(Address::new(1, 0), Address::new(2, 0), 1);
        let json = events.to_json().unwrap();
        assert!(json.contains("NodeAdded"));
    }
}
