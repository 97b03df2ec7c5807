// DHT Wire Codec
//
// Textual, `::`-delimited frames: `trans_id::from::type::...`.
// Fields after the numeric type code:
//
//   CREATE(0) / UPDATE(2)   key::value::replica
//   READ(1) / DELETE(3)     key
//   REPLY(4)                1 | 0
//   READREPLY(5)            value (possibly empty)
//
// Keys and values are arbitrary strings that do not contain the
// delimiter; an empty READREPLY value encodes "key not present".

use crate::error::{DhtError, Result};
use crate::transport::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

const DELIMITER: &str = "::";

const TYPE_CREATE: u8 = 0;
const TYPE_READ: u8 = 1;
const TYPE_UPDATE: u8 = 2;
const TYPE_DELETE: u8 = 3;
const TYPE_REPLY: u8 = 4;
const TYPE_READREPLY: u8 = 5;

/// Transaction identifier, unique per coordinating peer
pub type TransactionId = i32;

/// Positional hint of a replica within a key's replica set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaLabel {
    Primary,
    Secondary,
    Tertiary,
}

impl ReplicaLabel {
    pub fn from_position(position: usize) -> Self {
        match position {
            0 => ReplicaLabel::Primary,
            1 => ReplicaLabel::Secondary,
            _ => ReplicaLabel::Tertiary,
        }
    }

    fn code(self) -> u8 {
        match self {
            ReplicaLabel::Primary => 0,
            ReplicaLabel::Secondary => 1,
            ReplicaLabel::Tertiary => 2,
        }
    }

    fn from_code(code: &str) -> Result<Self> {
        match code {
            "0" => Ok(ReplicaLabel::Primary),
            "1" => Ok(ReplicaLabel::Secondary),
            "2" => Ok(ReplicaLabel::Tertiary),
            other => Err(DhtError::Codec(format!("bad replica label: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DhtPayload {
    Create {
        key: String,
        value: String,
        replica: ReplicaLabel,
    },
    Read {
        key: String,
    },
    Update {
        key: String,
        value: String,
        replica: ReplicaLabel,
    },
    Delete {
        key: String,
    },
    Reply {
        success: bool,
    },
    ReadReply {
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtMessage {
    pub trans_id: TransactionId,
    pub from: Address,
    pub payload: DhtPayload,
}

impl DhtMessage {
    pub fn new(trans_id: TransactionId, from: Address, payload: DhtPayload) -> Self {
        Self {
            trans_id,
            from,
            payload,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn decode(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split(DELIMITER).collect();
        if fields.len() < 4 {
            return Err(DhtError::Codec(format!("short DHT frame: {:?}", text)));
        }
        let trans_id = fields[0]
            .parse::<TransactionId>()
            .map_err(|e| DhtError::Codec(format!("bad transaction id {}: {}", fields[0], e)))?;
        let from: Address = fields[1].parse()?;
        let kind = fields[2]
            .parse::<u8>()
            .map_err(|e| DhtError::Codec(format!("bad message type {}: {}", fields[2], e)))?;

        let payload = match (kind, fields.len()) {
            (TYPE_CREATE, 6) => DhtPayload::Create {
                key: fields[3].to_string(),
                value: fields[4].to_string(),
                replica: ReplicaLabel::from_code(fields[5])?,
            },
            (TYPE_UPDATE, 6) => DhtPayload::Update {
                key: fields[3].to_string(),
                value: fields[4].to_string(),
                replica: ReplicaLabel::from_code(fields[5])?,
            },
            (TYPE_READ, 4) => DhtPayload::Read {
                key: fields[3].to_string(),
            },
            (TYPE_DELETE, 4) => DhtPayload::Delete {
                key: fields[3].to_string(),
            },
            (TYPE_REPLY, 4) => DhtPayload::Reply {
                success: match fields[3] {
                    "1" => true,
                    "0" => false,
                    other => {
                        return Err(DhtError::Codec(format!("bad success bit: {}", other)));
                    }
                },
            },
            (TYPE_READREPLY, 4) => DhtPayload::ReadReply {
                value: fields[3].to_string(),
            },
            (kind, arity) => {
                return Err(DhtError::Codec(format!(
                    "malformed DHT frame: type {} with {} fields",
                    kind, arity
                )));
            }
        };

        Ok(Self {
            trans_id,
            from,
            payload,
        })
    }
}

impl fmt::Display for DhtMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = format!("{}{}{}", self.trans_id, DELIMITER, self.from);
        match &self.payload {
            DhtPayload::Create {
                key,
                value,
                replica,
            } => write!(
                f,
                "{0}{1}{2}{1}{3}{1}{4}{1}{5}",
                head,
                DELIMITER,
                TYPE_CREATE,
                key,
                value,
                replica.code()
            ),
            DhtPayload::Update {
                key,
                value,
                replica,
            } => write!(
                f,
                "{0}{1}{2}{1}{3}{1}{4}{1}{5}",
                head,
                DELIMITER,
                TYPE_UPDATE,
                key,
                value,
                replica.code()
            ),
            DhtPayload::Read { key } => {
                write!(f, "{0}{1}{2}{1}{3}", head, DELIMITER, TYPE_READ, key)
            }
            DhtPayload::Delete { key } => {
                write!(f, "{0}{1}{2}{1}{3}", head, DELIMITER, TYPE_DELETE, key)
            }
            DhtPayload::Reply { success } => write!(
                f,
                "{0}{1}{2}{1}{3}",
                head,
                DELIMITER,
                TYPE_REPLY,
                if *success { "1" } else { "0" }
            ),
            DhtPayload::ReadReply { value } => {
                write!(f, "{0}{1}{2}{1}{3}", head, DELIMITER, TYPE_READREPLY, value)
            }
        }
    }
}
