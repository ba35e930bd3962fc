use super::{Packet, PacketCoder};
use crate::codec::{self, wire};

use std::any::Any;

use bytes::{Bytes, BytesMut};

/// Type id the empty acknowledgement packet registers under.
pub const ACK_PACKET_TYPE_ID: u32 = 0;

/// Type id the string packet registers under.
pub const STRING_PACKET_TYPE_ID: u32 = 1;

/// Empty control packet sent as an automatic acknowledgement.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AckPacket;

impl Packet for AckPacket {
    fn subject(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Coder for [`AckPacket`]; the body is empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct AckPacketCoder;

impl PacketCoder for AckPacketCoder {
    fn encode(&self, packet: &dyn Packet) -> Result<Bytes, codec::Error> {
        packet
            .as_any()
            .downcast_ref::<AckPacket>()
            .ok_or(codec::Error::UnexpectedPacket("AckPacket"))?;
        Ok(Bytes::new())
    }

    fn decode(&self, _body: &[u8]) -> Result<Box<dyn Packet>, codec::Error> {
        Ok(Box::new(AckPacket))
    }
}

/// A packet carrying a routing subject and a string payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StringPacket {
    subject: String,
    payload: String,
}

impl StringPacket {
    /// Creates a packet for `subject` carrying `payload`.
    pub fn new(subject: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }

    /// The string payload.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl Packet for StringPacket {
    fn subject(&self) -> Option<&str> {
        Some(&self.subject)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Coder for [`StringPacket`]: two length-prefixed strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringPacketCoder;

impl PacketCoder for StringPacketCoder {
    fn encode(&self, packet: &dyn Packet) -> Result<Bytes, codec::Error> {
        let packet = packet
            .as_any()
            .downcast_ref::<StringPacket>()
            .ok_or(codec::Error::UnexpectedPacket("StringPacket"))?;

        let mut body = BytesMut::new();
        wire::put_string(&mut body, &packet.subject);
        wire::put_string(&mut body, &packet.payload);
        Ok(body.freeze())
    }

    fn decode(&self, body: &[u8]) -> Result<Box<dyn Packet>, codec::Error> {
        let mut body = body;
        let subject = wire::get_string(&mut body)?;
        let payload = wire::get_string(&mut body)?;
        Ok(Box::new(StringPacket { subject, payload }))
    }
}
