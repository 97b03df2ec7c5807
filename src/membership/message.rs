// Membership Wire Codec
//
// Compact binary frames, all integers little-endian:
//
//   JOINREQ  kind(1) sender(6)
//   JOINREP  kind(1) sender(6) count(4) entries(count * 14)
//   GOSSIP   kind(1) sender(6) count(4) entries(count * 14)
//
// An entry is (id:4, port:2, heartbeat:8). Timestamps are local
// observations and never cross the wire; receivers stamp entries with
// their own clock.

use crate::error::{DhtError, Result};
use crate::membership::table::MembershipEntry;
use crate::transport::Address;
use bytes::{Buf, BufMut, BytesMut};

const KIND_JOINREQ: u8 = 0;
const KIND_JOINREP: u8 = 1;
const KIND_GOSSIP: u8 = 2;

const ENTRY_WIRE_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipMessage {
    JoinReq {
        from: Address,
    },
    JoinRep {
        from: Address,
        members: Vec<MembershipEntry>,
    },
    Gossip {
        from: Address,
        members: Vec<MembershipEntry>,
    },
}

impl MembershipMessage {
    pub fn sender(&self) -> Address {
        match self {
            MembershipMessage::JoinReq { from } => *from,
            MembershipMessage::JoinRep { from, .. } => *from,
            MembershipMessage::Gossip { from, .. } => *from,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            MembershipMessage::JoinReq { from } => {
                buf.put_u8(KIND_JOINREQ);
                buf.put_slice(&from.to_wire());
            }
            MembershipMessage::JoinRep { from, members } => {
                buf.put_u8(KIND_JOINREP);
                buf.put_slice(&from.to_wire());
                put_entries(&mut buf, members);
            }
            MembershipMessage::Gossip { from, members } => {
                buf.put_u8(KIND_GOSSIP);
                buf.put_slice(&from.to_wire());
                put_entries(&mut buf, members);
            }
        }
        buf.to_vec()
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut buf = frame;
        if buf.remaining() < 1 + Address::WIRE_LEN {
            return Err(DhtError::Codec(format!(
                "membership frame too short: {} bytes",
                frame.len()
            )));
        }
        let kind = buf.get_u8();
        let from = Address::from_wire(&buf[..Address::WIRE_LEN])?;
        buf.advance(Address::WIRE_LEN);

        match kind {
            KIND_JOINREQ => Ok(MembershipMessage::JoinReq { from }),
            KIND_JOINREP => Ok(MembershipMessage::JoinRep {
                from,
                members: get_entries(&mut buf)?,
            }),
            KIND_GOSSIP => Ok(MembershipMessage::Gossip {
                from,
                members: get_entries(&mut buf)?,
            }),
            other => Err(DhtError::Codec(format!(
                "unknown membership message kind: {}",
                other
            ))),
        }
    }
}

fn put_entries(buf: &mut BytesMut, members: &[MembershipEntry]) {
    buf.put_u32_le(members.len() as u32);
    for entry in members {
        buf.put_u32_le(entry.id);
        buf.put_u16_le(entry.port);
        buf.put_u64_le(entry.heartbeat);
    }
}

fn get_entries(buf: &mut &[u8]) -> Result<Vec<MembershipEntry>> {
    if buf.remaining() < 4 {
        return Err(DhtError::Codec("missing member list length".to_string()));
    }
    let count = buf.get_u32_le() as usize;
    if buf.remaining() < count * ENTRY_WIRE_LEN {
        return Err(DhtError::Codec(format!(
            "member list truncated: want {} entries, {} bytes left",
            count,
            buf.remaining()
        )));
    }
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let id = buf.get_u32_le();
        let port = buf.get_u16_le();
        let heartbeat = buf.get_u64_le();
        members.push(MembershipEntry::new(id, port, heartbeat, 0));
    }
    Ok(members)
}
