use super::builtin::{
    ACK_PACKET_TYPE_ID, AckPacket, AckPacketCoder, STRING_PACKET_TYPE_ID, StringPacket,
    StringPacketCoder,
};
use super::{Packet, PacketCoder};

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// Error type for packet registration and lookup.
#[derive(Debug, Error)]
pub enum Error {
    /// The type id is already bound; the first registration stands.
    #[error("packet type id {0} is already registered")]
    DuplicateTypeId(u32),

    /// The concrete shape is already bound to another type id.
    #[error("packet type `{0}` is already registered")]
    DuplicateType(&'static str),

    /// No registration exists for the type id.
    #[error("no packet registered for type id {0}")]
    UnknownTypeId(u32),

    /// The concrete shape was never registered. Sending an unregistered
    /// packet is a programmer error, surfaced at the send site.
    #[error("packet is not registered: {0}")]
    UnregisteredType(String),
}

#[derive(Debug)]
struct Registration {
    type_name: &'static str,
    coder: Arc<dyn PacketCoder>,
}

/// Bidirectional mapping between small integer type ids, concrete packet
/// shapes, and their coders.
///
/// Populated once at startup (registration is write-once; duplicates are
/// rejected), then shared read-only behind an `Arc` — lookups need no
/// synchronization.
#[derive(Debug)]
pub struct PacketRegistry {
    by_id: HashMap<u32, Registration>,
    by_type: HashMap<TypeId, u32>,
}

impl PacketRegistry {
    /// Creates a registry with the built-in shapes bound: [`AckPacket`] at
    /// id 0 and [`StringPacket`] at id 1.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            by_id: HashMap::new(),
            by_type: HashMap::new(),
        };
        registry.insert::<AckPacket>(ACK_PACKET_TYPE_ID, Arc::new(AckPacketCoder));
        registry.insert::<StringPacket>(STRING_PACKET_TYPE_ID, Arc::new(StringPacketCoder));
        registry
    }

    /// Binds `type_id` to the shape `P` and its coder.
    ///
    /// # Errors
    /// Rejects ids and shapes that are already bound, leaving the earlier
    /// registration intact.
    pub fn register<P: Packet>(
        &mut self,
        type_id: u32,
        coder: Arc<dyn PacketCoder>,
    ) -> Result<(), Error> {
        if self.by_id.contains_key(&type_id) {
            return Err(Error::DuplicateTypeId(type_id));
        }
        if self.by_type.contains_key(&TypeId::of::<P>()) {
            return Err(Error::DuplicateType(std::any::type_name::<P>()));
        }
        self.insert::<P>(type_id, coder);
        Ok(())
    }

    /// The coder bound to `type_id`.
    ///
    /// # Errors
    /// An unknown id is a transport-level decode failure, not a crash.
    pub fn coder(&self, type_id: u32) -> Result<Arc<dyn PacketCoder>, Error> {
        self.by_id
            .get(&type_id)
            .map(|registration| registration.coder.clone())
            .ok_or(Error::UnknownTypeId(type_id))
    }

    /// The registered name of the shape bound to `type_id`.
    ///
    /// # Errors
    /// Fails for unknown ids.
    pub fn type_name(&self, type_id: u32) -> Result<&'static str, Error> {
        self.by_id
            .get(&type_id)
            .map(|registration| registration.type_name)
            .ok_or(Error::UnknownTypeId(type_id))
    }

    /// The type id under which `packet`'s concrete shape was registered.
    ///
    /// # Errors
    /// Fails for unregistered shapes — fatal at the send call site.
    pub fn type_id_of(&self, packet: &dyn Packet) -> Result<u32, Error> {
        self.by_type
            .get(&packet.as_any().type_id())
            .copied()
            .ok_or_else(|| Error::UnregisteredType(format!("{packet:?}")))
    }

    fn insert<P: Packet>(&mut self, type_id: u32, coder: Arc<dyn PacketCoder>) {
        self.by_id.insert(
            type_id,
            Registration {
                type_name: std::any::type_name::<P>(),
                coder,
            },
        );
        self.by_type.insert(TypeId::of::<P>(), type_id);
    }
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug)]
    struct ProbePacket;

    impl Packet for ProbePacket {
        fn subject(&self) -> Option<&str> {
            Some("probe")
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_builtins_are_bound() {
        let registry = PacketRegistry::new();
        assert_eq!(registry.type_id_of(&AckPacket).unwrap(), ACK_PACKET_TYPE_ID);
        assert_eq!(
            registry.type_id_of(&StringPacket::new("s", "p")).unwrap(),
            STRING_PACKET_TYPE_ID
        );
    }

    #[test]
    fn test_duplicate_type_id_is_rejected() {
        let mut registry = PacketRegistry::new();
        let result = registry.register::<ProbePacket>(STRING_PACKET_TYPE_ID, Arc::new(AckPacketCoder));
        assert!(matches!(result, Err(Error::DuplicateTypeId(1))));

        // The first registration is intact.
        assert_eq!(
            registry.type_id_of(&StringPacket::new("s", "p")).unwrap(),
            STRING_PACKET_TYPE_ID
        );
    }

    #[test]
    fn test_duplicate_shape_is_rejected() {
        let mut registry = PacketRegistry::new();
        let result = registry.register::<StringPacket>(7, Arc::new(StringPacketCoder));
        assert!(matches!(result, Err(Error::DuplicateType(_))));
    }

    #[test]
    fn test_unknown_type_id_fails_lookup() {
        let registry = PacketRegistry::new();
        assert!(matches!(registry.coder(42), Err(Error::UnknownTypeId(42))));
        assert!(matches!(registry.type_name(42), Err(Error::UnknownTypeId(42))));
    }

    #[test]
    fn test_unregistered_shape_fails_reverse_lookup() {
        let registry = PacketRegistry::new();
        let result = registry.type_id_of(&ProbePacket);
        assert!(matches!(result, Err(Error::UnregisteredType(_))));
    }

    #[test]
    fn test_registration_extends_the_closed_set() {
        let mut registry = PacketRegistry::new();
        registry
            .register::<ProbePacket>(7, Arc::new(AckPacketCoder))
            .unwrap();
        assert_eq!(registry.type_id_of(&ProbePacket).unwrap(), 7);
        assert!(registry.coder(7).is_ok());
    }
}
