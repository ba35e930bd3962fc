/// Built-in packet shapes and their coders.
pub mod builtin;

/// Bidirectional mapping between type ids, packet shapes, and coders.
pub mod registry;

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;

/// The reserved receiver token addressing every server.
pub const WILDCARD_RECEIVER: &str = "*";

/// A typed, routable unit of pub/sub communication.
///
/// Concrete shapes are plain structs registered with the
/// [`registry::PacketRegistry`] at startup. Packets are immutable; wire
/// metadata is paired with them rather than stored inside them.
pub trait Packet: Any + Debug + Send + Sync {
    /// The routing subject; control packets carry none.
    fn subject(&self) -> Option<&str>;

    /// Upcast used to recover the concrete shape after decode.
    fn as_any(&self) -> &dyn Any;
}

/// Encoder/decoder pair for one registered packet shape.
pub trait PacketCoder: Debug + Send + Sync {
    /// Serializes the packet body.
    ///
    /// # Errors
    /// Fails if `packet` is not the shape this coder was registered for.
    fn encode(&self, packet: &dyn Packet) -> Result<Bytes, crate::codec::Error>;

    /// Deserializes a packet body.
    ///
    /// # Errors
    /// Fails if `body` is not a valid encoding of this shape.
    fn decode(&self, body: &[u8]) -> Result<Box<dyn Packet>, crate::codec::Error>;
}

/// Classification of a frame on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageType {
    /// An application packet routed to subject handlers.
    Publish,

    /// Automatic acknowledgement of a received publish.
    Ack,

    /// An application-level reply correlated to an earlier publish.
    Response,
}

impl MessageType {
    /// The wire discriminant.
    #[must_use]
    pub const fn id(self) -> i32 {
        match self {
            Self::Publish => 1,
            Self::Ack => 2,
            Self::Response => 3,
        }
    }

    /// Resolves a wire discriminant back to a message type.
    #[must_use]
    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Self::Publish),
            2 => Some(Self::Ack),
            3 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Immutable wire metadata built for every packet at send time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PacketMetadata {
    /// Registry id of the concrete packet shape.
    pub packet_type_id: u32,

    /// Frame classification.
    pub message_type: MessageType,

    /// Globally unique id of this transmission; replies correlate on it.
    pub message_id: String,

    /// Server id of the sender.
    pub sender: String,

    /// Addressed server ids, or the wildcard token for everyone.
    pub receivers: Vec<String>,

    /// Whether the sender is waiting for an automatic acknowledgement.
    pub requires_ack: bool,

    /// Whether the sender is waiting for an application response.
    pub requires_response: bool,

    /// On ACK/RESPONSE frames, the `message_id` being answered.
    pub callback_id: Option<String>,

    /// Sender clock at publish, epoch milliseconds. Best-effort metadata.
    pub publish_time: i64,
}

impl PacketMetadata {
    /// Whether this packet is addressed to `server_id` (directly or through
    /// the wildcard token).
    #[must_use]
    pub fn addressed_to(&self, server_id: &str) -> bool {
        self.receivers
            .iter()
            .any(|receiver| receiver == WILDCARD_RECEIVER || receiver == server_id)
    }
}

/// A decoded inbound packet paired with the wire metadata it arrived with.
#[derive(Clone, Debug)]
pub struct InboundPacket {
    /// The wire metadata.
    pub metadata: Arc<PacketMetadata>,

    /// The decoded packet body.
    pub packet: Arc<dyn Packet>,
}

impl InboundPacket {
    /// Recovers the concrete packet shape.
    #[must_use]
    pub fn downcast_ref<P: Packet>(&self) -> Option<&P> {
        self.packet.as_any().downcast_ref()
    }

    /// The routing subject of the packet, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.packet.subject()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(receivers: Vec<String>) -> PacketMetadata {
        PacketMetadata {
            packet_type_id: 1,
            message_type: MessageType::Publish,
            message_id: "m-1".to_owned(),
            sender: "a".to_owned(),
            receivers,
            requires_ack: false,
            requires_response: false,
            callback_id: None,
            publish_time: 0,
        }
    }

    #[test]
    fn test_wildcard_addresses_everyone() {
        let metadata = metadata(vec![WILDCARD_RECEIVER.to_owned()]);
        assert!(metadata.addressed_to("a"));
        assert!(metadata.addressed_to("b"));
    }

    #[test]
    fn test_targeted_addresses_members_only() {
        let metadata = metadata(vec!["b".to_owned(), "c".to_owned()]);
        assert!(metadata.addressed_to("b"));
        assert!(metadata.addressed_to("c"));
        assert!(!metadata.addressed_to("a"));
    }

    #[test]
    fn test_empty_receivers_address_nobody() {
        let metadata = metadata(Vec::new());
        assert!(!metadata.addressed_to("a"));
    }

    #[test]
    fn test_message_type_ids_round_trip() {
        for message_type in [MessageType::Publish, MessageType::Ack, MessageType::Response] {
            assert_eq!(MessageType::from_id(message_type.id()), Some(message_type));
        }
        assert_eq!(MessageType::from_id(0), None);
        assert_eq!(MessageType::from_id(4), None);
    }
}
