use super::Error;

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Flat string fields of one stream entry.
pub type FieldMap = HashMap<String, String>;

/// A typed message carried on a durable work log.
pub trait QueueMessage: Any + Debug + Send + Sync {
    /// The registry key identifying this shape on the wire.
    fn type_name(&self) -> &'static str;

    /// Upcast used to recover the concrete shape after decode.
    fn as_any(&self) -> &dyn Any;
}

/// Field-map serializer for one registered message shape.
pub trait MessageCodec: Debug + Send + Sync {
    /// Serializes the message into payload fields.
    ///
    /// # Errors
    /// Fails if `message` is not the shape this codec was registered for.
    fn encode(&self, message: &dyn QueueMessage) -> Result<FieldMap, Error>;

    /// Rebuilds the message from entry fields.
    ///
    /// # Errors
    /// Fails when a payload field is missing or malformed.
    fn decode(&self, fields: &FieldMap) -> Result<Box<dyn QueueMessage>, Error>;
}

/// Type-name-keyed registry of message codecs.
///
/// Populated at startup and shared read-only behind an `Arc` afterwards.
#[derive(Debug)]
pub struct MessageCodecRegistry {
    codecs: HashMap<String, Arc<dyn MessageCodec>>,
}

impl MessageCodecRegistry {
    /// Creates a registry with [`StringMessage`] pre-registered.
    #[must_use]
    pub fn new() -> Self {
        let mut codecs: HashMap<String, Arc<dyn MessageCodec>> = HashMap::new();
        codecs.insert(
            StringMessage::TYPE_NAME.to_owned(),
            Arc::new(StringMessageCodec),
        );
        Self { codecs }
    }

    /// Registers `codec` under `type_name`.
    ///
    /// # Errors
    /// Rejects names that are already taken, leaving the earlier
    /// registration intact.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        codec: Arc<dyn MessageCodec>,
    ) -> Result<(), Error> {
        let type_name = type_name.into();
        if self.codecs.contains_key(&type_name) {
            return Err(Error::DuplicateMessageType(type_name));
        }
        self.codecs.insert(type_name, codec);
        Ok(())
    }

    /// The codec registered under `type_name`.
    ///
    /// # Errors
    /// Fails for unknown names.
    pub fn codec(&self, type_name: &str) -> Result<Arc<dyn MessageCodec>, Error> {
        self.codecs
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::UnknownMessageType(type_name.to_owned()))
    }
}

impl Default for MessageCodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream metadata carried in the reserved entry fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageMetadata {
    /// Registry key of the payload shape.
    pub type_name: String,

    /// Correlates a reply appended to the origin's response log.
    pub callback_id: String,

    /// Server id of the sender.
    pub origin: String,

    /// Sender clock at append, epoch milliseconds. Best-effort metadata.
    pub timestamp: i64,
}

impl MessageMetadata {
    /// Reserved entry key carrying the payload shape name.
    pub const KEY_TYPE_NAME: &'static str = "_className";

    /// Reserved entry key carrying the reply correlation id.
    pub const KEY_CALLBACK_ID: &'static str = "_callbackId";

    /// Reserved entry key carrying the sender's server id.
    pub const KEY_ORIGIN: &'static str = "_origin";

    /// Reserved entry key carrying the send timestamp.
    pub const KEY_TIMESTAMP: &'static str = "_timestamp";

    /// Writes the reserved fields into `fields`, overriding payload keys of
    /// the same name.
    pub fn write_into(&self, fields: &mut FieldMap) {
        fields.insert(Self::KEY_TYPE_NAME.to_owned(), self.type_name.clone());
        fields.insert(Self::KEY_CALLBACK_ID.to_owned(), self.callback_id.clone());
        fields.insert(Self::KEY_ORIGIN.to_owned(), self.origin.clone());
        fields.insert(Self::KEY_TIMESTAMP.to_owned(), self.timestamp.to_string());
    }

    /// Reads the reserved fields back out of an entry.
    ///
    /// # Errors
    /// Fails when a reserved field is missing or the timestamp does not
    /// parse.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, Error> {
        let type_name = fields
            .get(Self::KEY_TYPE_NAME)
            .ok_or(Error::MissingField(Self::KEY_TYPE_NAME))?
            .clone();
        let callback_id = fields
            .get(Self::KEY_CALLBACK_ID)
            .ok_or(Error::MissingField(Self::KEY_CALLBACK_ID))?
            .clone();
        let origin = fields
            .get(Self::KEY_ORIGIN)
            .ok_or(Error::MissingField(Self::KEY_ORIGIN))?
            .clone();
        let timestamp = fields
            .get(Self::KEY_TIMESTAMP)
            .ok_or(Error::MissingField(Self::KEY_TIMESTAMP))?
            .parse()
            .map_err(|_| Error::MalformedField(Self::KEY_TIMESTAMP))?;

        Ok(Self {
            type_name,
            callback_id,
            origin,
            timestamp,
        })
    }
}

/// Stream message metadata paired with its decoded payload, handed to queue
/// consumers.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// The reserved-field metadata.
    pub metadata: MessageMetadata,

    /// The decoded payload.
    pub payload: Arc<dyn QueueMessage>,
}

impl Envelope {
    /// Recovers the concrete payload shape.
    #[must_use]
    pub fn downcast_ref<M: QueueMessage>(&self) -> Option<&M> {
        self.payload.as_any().downcast_ref()
    }
}

/// A work message carrying one string payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StringMessage {
    payload: String,
}

impl StringMessage {
    /// Registry key for this shape.
    pub const TYPE_NAME: &'static str = "string";

    /// Creates a message carrying `payload`.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The payload.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl QueueMessage for StringMessage {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Codec for [`StringMessage`]: a single `payload` field.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringMessageCodec;

impl MessageCodec for StringMessageCodec {
    fn encode(&self, message: &dyn QueueMessage) -> Result<FieldMap, Error> {
        let message = message
            .as_any()
            .downcast_ref::<StringMessage>()
            .ok_or(Error::UnexpectedMessage("StringMessage"))?;
        Ok(FieldMap::from([(
            "payload".to_owned(),
            message.payload.clone(),
        )]))
    }

    fn decode(&self, fields: &FieldMap) -> Result<Box<dyn QueueMessage>, Error> {
        let payload = fields
            .get("payload")
            .ok_or(Error::MissingField("payload"))?;
        Ok(Box::new(StringMessage::new(payload.clone())))
    }
}
