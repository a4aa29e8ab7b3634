use std::mem::size_of;

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

mod id;

pub use id::MessageId;

/// One unit of the ordering protocol, on the wire and in the pending queue.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Message {
    pub id: MessageId,
    pub kind: Kind,
    /// Application text; for an [ACK][Kind::Ack], the ID of the acknowledged
    /// message.
    pub payload: String,
}

impl Message {
    const MAGIC: u64 = u64::from_be_bytes(*b"ordcast\0");
    const MIN_LEN: usize =
        size_of::<u64>() + 2 * size_of::<u8>() + size_of::<u16>() + size_of::<u32>();

    /// The wire format version written by [`Message::write`].
    pub const VERSION: u8 = 1;

    pub fn new(id: MessageId, kind: Kind, payload: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            payload: payload.into(),
        }
    }

    /// Create an acknowledgment, stamped `id`, of the message `target`.
    pub fn ack(id: MessageId, target: MessageId) -> Self {
        Self::new(id, Kind::Ack, target.to_string())
    }

    /// The ID of the message this [ACK][Kind::Ack] acknowledges.
    pub fn ack_target(&self) -> Result<MessageId, ProtocolError> {
        self.payload
            .parse()
            .map_err(|_| ProtocolError::AckTarget(self.payload.clone()))
    }

    /// Decode exactly one message, consuming all of `data`.
    pub fn read<B: Buf>(data: &mut B) -> Result<Self, ProtocolError> {
        if data.remaining() < Self::MIN_LEN {
            return Err(ProtocolError::Truncated);
        }
        if data.get_u64() != Self::MAGIC {
            return Err(ProtocolError::Magic);
        }

        match data.get_u8() {
            Self::VERSION => (),
            version => return Err(ProtocolError::Version(version)),
        }

        let kind = Kind::try_from(data.get_u8())?;

        let len = data.get_u16() as usize;
        let id = text(data, len)?;
        let id = id.parse::<MessageId>()?;

        if data.remaining() < size_of::<u32>() {
            return Err(ProtocolError::Truncated);
        }
        let len = data.get_u32() as usize;
        let payload = text(data, len)?;

        match data.remaining() {
            0 => Ok(Self { id, kind, payload }),
            n => Err(ProtocolError::Trailing(n)),
        }
    }

    /// Encode this message, returning the number of bytes written.
    pub fn write<B: BufMut>(&self, data: &mut B) -> Result<usize, ProtocolError> {
        let id = self.id.to_string();
        let id_len: u16 = id.len().try_into().map_err(|_| ProtocolError::TooLarge(id.len()))?;
        let payload_len: u32 = self
            .payload
            .len()
            .try_into()
            .map_err(|_| ProtocolError::TooLarge(self.payload.len()))?;

        data.put_u64(Self::MAGIC);
        data.put_u8(Self::VERSION);
        data.put_u8(self.kind.into());
        data.put_u16(id_len);
        data.put_slice(id.as_bytes());
        data.put_u32(payload_len);
        data.put_slice(self.payload.as_bytes());

        Ok(Self::MIN_LEN + id.len() + self.payload.len())
    }
}

/// What a [`Message`] carries.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Kind {
    /// Point-to-point text for a single member.
    P2p = 0x01,
    /// Text for every member, delivered in the group-wide total order.
    Multicast = 0x02,
    /// One member's acknowledgment of a multicast.
    Ack = 0x03,
}

impl From<Kind> for u8 {
    fn from(value: Kind) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Kind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Kind::P2p),
            0x02 => Ok(Kind::Multicast),
            0x03 => Ok(Kind::Ack),
            other => Err(ProtocolError::Kind(other)),
        }
    }
}

fn text<B: Buf>(data: &mut B, len: usize) -> Result<String, ProtocolError> {
    if data.remaining() < len {
        return Err(ProtocolError::Truncated);
    }

    String::from_utf8(data.copy_to_bytes(len).to_vec()).map_err(|_| ProtocolError::Utf8)
}
