//! Messages as conversations see them and records as the wire sees them.

use std::fmt;

use prober::codec::{encode_prefixed, Codec, Reader};

use crate::tls::enums::{
    AlertDescription, AlertLevel, ContentType, HandshakeType, HeartbeatMessageType,
    ProtocolVersion,
};

pub const HEADER_SIZE: usize = 1 + 2 + 2;

/// Largest plaintext fragment a record may carry.
pub const MAX_FRAGMENT_LEN: usize = 1 << 14;

/// Largest fragment we accept from the wire, leaving room for MAC, padding and AEAD expansion.
pub const MAX_WIRE_FRAGMENT_LEN: usize = MAX_FRAGMENT_LEN + 2048;

/// A content type and an opaque payload.
///
/// Handshake payloads carry one handshake message including its four byte header. Once a
/// message has been handed to the transport it is never changed.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub typ: ContentType,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(typ: ContentType, payload: Vec<u8>) -> Self {
        Self { typ, payload }
    }

    pub fn handshake_type(&self) -> Option<HandshakeType> {
        match self.typ {
            ContentType::Handshake => self.payload.first().map(|t| HandshakeType::from(*t)),
            _ => None,
        }
    }

    pub fn is_handshake(&self, typ: HandshakeType) -> bool {
        self.handshake_type() == Some(typ)
    }

    pub fn alert(&self) -> Option<Alert> {
        match self.typ {
            ContentType::Alert => Alert::read_bytes(&self.payload),
            _ => None,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alert) = self.alert() {
            return write!(f, "Alert({:?}, {:?})", alert.level, alert.description);
        }
        match self.handshake_type() {
            Some(typ) => write!(f, "Handshake({:?}, {} bytes)", typ, self.payload.len()),
            None => write!(f, "{:?}({} bytes)", self.typ, self.payload.len()),
        }
    }
}

/// One record as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub typ: ContentType,
    pub version: ProtocolVersion,
    pub fragment: Vec<u8>,
}

/// Outcome of looking at the front of a receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum RecordHeader {
    /// Not even a header yet, or the fragment is still incomplete.
    Incomplete,
    /// The record, header included, spans this many bytes.
    Complete(usize),
    /// The length field exceeds anything a record may carry.
    Oversized(usize),
}

impl Record {
    pub fn new(typ: ContentType, version: ProtocolVersion, fragment: Vec<u8>) -> Self {
        Self {
            typ,
            version,
            fragment,
        }
    }

    pub fn inspect(buf: &[u8]) -> RecordHeader {
        if buf.len() < HEADER_SIZE {
            return RecordHeader::Incomplete;
        }
        let len = usize::from(u16::from_be_bytes([buf[3], buf[4]]));
        if len > MAX_WIRE_FRAGMENT_LEN {
            return RecordHeader::Oversized(len);
        }
        if buf.len() < HEADER_SIZE + len {
            return RecordHeader::Incomplete;
        }
        RecordHeader::Complete(HEADER_SIZE + len)
    }
}

impl Codec for Record {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        self.version.encode(bytes);
        encode_prefixed(bytes, 2, |out| out.extend_from_slice(&self.fragment));
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = ContentType::read(r)?;
        let version = ProtocolVersion::read(r)?;
        let len = usize::from(u16::read(r)?);
        if len > MAX_WIRE_FRAGMENT_LEN {
            return None;
        }
        let fragment = r.take(len)?.to_vec();
        Some(Self {
            typ,
            version,
            fragment,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Codec for Alert {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.level.encode(bytes);
        self.description.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let level = AlertLevel::read(r)?;
        let description = AlertDescription::read(r)?;
        Some(Self { level, description })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub typ: HeartbeatMessageType,
    pub payload: Vec<u8>,
    pub padding: Vec<u8>,
}

impl Codec for Heartbeat {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        encode_prefixed(bytes, 2, |out| out.extend_from_slice(&self.payload));
        bytes.extend_from_slice(&self.padding);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = HeartbeatMessageType::read(r)?;
        let len = usize::from(u16::read(r)?);
        let payload = r.take(len)?.to_vec();
        let padding = r.rest().to_vec();
        Some(Self {
            typ,
            payload,
            padding,
        })
    }
}
