mod error;
pub(crate) mod wire;

pub use error::Error;

use crate::packet::registry::PacketRegistry;
use crate::packet::{MessageType, Packet, PacketMetadata};

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Serializes `metadata` into its self-describing binary form.
#[must_use]
pub fn encode_metadata(metadata: &PacketMetadata) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32(metadata.packet_type_id);
    buf.put_i32(metadata.message_type.id());
    wire::put_string(&mut buf, &metadata.message_id);
    wire::put_string(&mut buf, &metadata.sender);
    wire::put_string_array(&mut buf, &metadata.receivers);
    wire::put_bool(&mut buf, metadata.requires_ack);
    wire::put_bool(&mut buf, metadata.requires_response);
    wire::put_opt_string(&mut buf, metadata.callback_id.as_deref());
    buf.put_i64(metadata.publish_time);
    buf.freeze()
}

/// Parses the self-describing metadata block.
///
/// # Errors
/// Fails on truncation, bad lengths, invalid UTF-8, or an unknown message
/// type discriminant.
pub fn decode_metadata(bytes: &[u8]) -> Result<PacketMetadata, Error> {
    let mut buf = bytes;
    let packet_type_id = wire::get_u32(&mut buf)?;
    let message_type_id = wire::get_i32(&mut buf)?;
    let message_type = MessageType::from_id(message_type_id)
        .ok_or(Error::UnknownMessageType(message_type_id))?;
    let message_id = wire::get_string(&mut buf)?;
    let sender = wire::get_string(&mut buf)?;
    let receivers = wire::get_string_array(&mut buf)?.unwrap_or_default();
    let requires_ack = wire::get_bool(&mut buf)?;
    let requires_response = wire::get_bool(&mut buf)?;
    let callback_id = wire::get_opt_string(&mut buf)?;
    let publish_time = wire::get_i64(&mut buf)?;

    Ok(PacketMetadata {
        packet_type_id,
        message_type,
        message_id,
        sender,
        receivers,
        requires_ack,
        requires_response,
        callback_id,
        publish_time,
    })
}

/// Encodes one wire frame: `[i32 metaLen][metaBytes][bodyBytes]`.
///
/// The body coder is resolved through `registry` by the metadata's packet
/// type id.
///
/// # Errors
/// Fails when the type id has no coder or the body fails to encode.
pub fn encode_frame(
    registry: &PacketRegistry,
    metadata: &PacketMetadata,
    packet: &dyn Packet,
) -> Result<Bytes, Error> {
    let coder = registry.coder(metadata.packet_type_id)?;
    let body = coder.encode(packet)?;
    let meta = encode_metadata(metadata);

    let mut frame = BytesMut::with_capacity(4 + meta.len() + body.len());
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let meta_len = meta.len() as i32;
    frame.put_i32(meta_len);
    frame.put_slice(&meta);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Decodes one wire frame into its metadata and typed body.
///
/// Metadata is self-contained and parsed first; the remaining bytes are the
/// body, decoded by the coder bound to the metadata's packet type id.
///
/// # Errors
/// Fails on malformed metadata, an unknown type id, or a malformed body.
pub fn decode_frame(
    registry: &PacketRegistry,
    frame: &[u8],
) -> Result<(PacketMetadata, Box<dyn Packet>), Error> {
    let mut buf = frame;
    let meta_len = wire::get_i32(&mut buf)?;
    let meta_len = usize::try_from(meta_len).map_err(|_| Error::InvalidLength(meta_len))?;
    if buf.remaining() < meta_len {
        return Err(Error::Truncated);
    }
    let meta = buf.copy_to_bytes(meta_len);
    let metadata = decode_metadata(&meta)?;

    let coder = registry.coder(metadata.packet_type_id)?;
    let packet = coder.decode(buf)?;
    Ok((metadata, packet))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::packet::WILDCARD_RECEIVER;
    use crate::packet::builtin::{
        ACK_PACKET_TYPE_ID, AckPacket, STRING_PACKET_TYPE_ID, StringPacket,
    };

    fn metadata() -> PacketMetadata {
        PacketMetadata {
            packet_type_id: STRING_PACKET_TYPE_ID,
            message_type: MessageType::Publish,
            message_id: "8c2b9f1e".to_owned(),
            sender: "server-a".to_owned(),
            receivers: vec!["server-b".to_owned(), "server-c".to_owned()],
            requires_ack: true,
            requires_response: false,
            callback_id: None,
            publish_time: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_metadata_round_trip() {
        let original = metadata();
        let decoded = decode_metadata(&encode_metadata(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_metadata_round_trips_edge_values() {
        let original = PacketMetadata {
            packet_type_id: ACK_PACKET_TYPE_ID,
            message_type: MessageType::Ack,
            message_id: String::new(),
            sender: String::new(),
            receivers: Vec::new(),
            requires_ack: false,
            requires_response: false,
            callback_id: Some("8c2b9f1e".to_owned()),
            publish_time: 0,
        };
        let decoded = decode_metadata(&encode_metadata(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_metadata_round_trips_wildcard() {
        let mut original = metadata();
        original.receivers = vec![WILDCARD_RECEIVER.to_owned()];
        let decoded = decode_metadata(&encode_metadata(&original)).unwrap();
        assert_eq!(decoded.receivers, vec![WILDCARD_RECEIVER.to_owned()]);
    }

    #[test]
    fn test_frame_round_trip() {
        let registry = PacketRegistry::new();
        let packet = StringPacket::new("greetings", "hello");
        let original = metadata();

        let frame = encode_frame(&registry, &original, &packet).unwrap();
        let (decoded_metadata, decoded_packet) = decode_frame(&registry, &frame).unwrap();

        assert_eq!(decoded_metadata, original);
        let decoded_packet = decoded_packet
            .as_any()
            .downcast_ref::<StringPacket>()
            .unwrap();
        assert_eq!(decoded_packet, &packet);
    }

    #[test]
    fn test_ack_frame_round_trip() {
        let registry = PacketRegistry::new();
        let mut original = metadata();
        original.packet_type_id = ACK_PACKET_TYPE_ID;
        original.message_type = MessageType::Ack;
        original.callback_id = Some(original.message_id.clone());

        let frame = encode_frame(&registry, &original, &AckPacket).unwrap();
        let (decoded_metadata, decoded_packet) = decode_frame(&registry, &frame).unwrap();

        assert_eq!(decoded_metadata, original);
        assert!(decoded_packet.as_any().downcast_ref::<AckPacket>().is_some());
    }

    #[test]
    fn test_unknown_type_id_is_reported() {
        let registry = PacketRegistry::new();
        let mut unknown = metadata();
        unknown.packet_type_id = 99;

        // Metadata still parses; only the coder lookup fails.
        let meta = encode_metadata(&unknown);
        let mut frame = BytesMut::new();
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let meta_len = meta.len() as i32;
        frame.put_i32(meta_len);
        frame.put_slice(&meta);

        let result = decode_frame(&registry, &frame);
        assert!(matches!(result, Err(Error::Registry(_))));
    }

    #[test]
    fn test_unknown_message_type_is_reported() {
        let mut buf = BytesMut::new();
        buf.put_u32(STRING_PACKET_TYPE_ID);
        buf.put_i32(9);

        let result = decode_metadata(&buf);
        assert!(matches!(result, Err(Error::UnknownMessageType(9))));
    }

    #[test]
    fn test_truncated_frame_is_reported() {
        let registry = PacketRegistry::new();
        let frame = encode_frame(&registry, &metadata(), &StringPacket::new("s", "p")).unwrap();

        let result = decode_frame(&registry, &frame[..6]);
        assert!(matches!(result, Err(Error::Truncated)));
    }
}
