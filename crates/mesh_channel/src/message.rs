//! Channel message envelope.
//!
//! A [`ChannelMessage`] combines a category, a subtype, the identifier it is
//! addressed to and a value. Construction checks that the subtype belongs to
//! the category and that identifier and value have the expected kinds. The
//! source participant is stamped by the sender at transmission time.
//!
//! On the wire every message is one JSON object whose identifier and value
//! are the strings produced by the category and subtype codecs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel_type::{ChannelType, Identifier};
use crate::error::ChannelError;
use crate::identity::Participant;
use crate::message_type::MessageType;
use crate::value::Value;

/// A typed message travelling through the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct ChannelMessage {
    channel_type: ChannelType,
    message_type: MessageType,
    identifier: Identifier,
    value: Value,
    source: Option<Participant>,
}

impl ChannelMessage {
    pub fn new(
        channel_type: ChannelType,
        identifier: impl Into<Identifier>,
        message_type: MessageType,
        value: impl Into<Value>,
    ) -> Result<Self, ChannelError> {
        let identifier = identifier.into();
        let value = value.into();

        if !channel_type.permits(&message_type) {
            return Err(ChannelError::InvalidMessageType {
                channel_type,
                message_type,
            });
        }
        channel_type.check_identifier(&identifier)?;
        if value.kind() != message_type.value_kind() {
            return Err(ChannelError::InvalidValue {
                message_type,
                expected: message_type.value_kind(),
                found: value.kind(),
            });
        }

        Ok(Self {
            channel_type,
            message_type,
            identifier,
            value,
            source: None,
        })
    }

    /// A void-valued message.
    pub fn signal(
        channel_type: ChannelType,
        identifier: impl Into<Identifier>,
        message_type: MessageType,
    ) -> Result<Self, ChannelError> {
        Self::new(channel_type, identifier, message_type, Value::Void)
    }

    pub fn server(
        name: impl Into<String>,
        message_type: MessageType,
        value: impl Into<Value>,
    ) -> Result<Self, ChannelError> {
        Self::new(ChannelType::Server, Identifier::Name(name.into()), message_type, value)
    }

    pub fn user(
        user: Uuid,
        message_type: MessageType,
        value: impl Into<Value>,
    ) -> Result<Self, ChannelError> {
        Self::new(ChannelType::User, user, message_type, value)
    }

    /// A control message identified by the sending participant.
    pub fn control(
        sender: Participant,
        message_type: MessageType,
        value: impl Into<Value>,
    ) -> Result<Self, ChannelError> {
        Self::new(ChannelType::Control, sender, message_type, value)
    }

    pub fn heartbeat(sender: Participant, message_type: MessageType) -> Result<Self, ChannelError> {
        Self::signal(ChannelType::Heartbeat, sender, message_type)
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The participant that transmitted this message, once sent.
    pub fn source(&self) -> Option<&Participant> {
        self.source.as_ref()
    }

    pub(crate) fn set_source(&mut self, source: Participant) {
        self.source = Some(source);
    }

    pub fn is_control(&self) -> bool {
        self.channel_type == ChannelType::Control
    }

    /// Serialize the message to a JSON string for transmission.
    pub fn to_json(&self) -> Result<String, ChannelError> {
        let wire = WireMessage::try_from(self)?;
        Ok(serde_json::to_string(&wire)?)
    }

    /// Deserialize a message from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ChannelError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    channel: String,
    message_type: String,
    identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<Participant>,
}

impl TryFrom<WireMessage> for ChannelMessage {
    type Error = ChannelError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let channel_type = ChannelType::from_name(&wire.channel)?;
        let message_type = channel_type.message_type(&wire.message_type)?;
        let identifier = channel_type.parse_identifier(&wire.identifier)?;
        let value = message_type.decode(wire.value.as_deref())?;
        let mut message = Self::new(channel_type, identifier, message_type, value)?;
        message.source = wire.source;
        Ok(message)
    }
}

impl TryFrom<&ChannelMessage> for WireMessage {
    type Error = ChannelError;

    fn try_from(message: &ChannelMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            channel: message.channel_type.name().to_string(),
            message_type: message.message_type.name().to_string(),
            identifier: message.identifier.to_string(),
            value: message.message_type.encode(&message.value)?,
            source: message.source.clone(),
        })
    }
}

impl Serialize for ChannelMessage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireMessage::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_type::{control, discord, heartbeat, server, user};
    use crate::scope::ListenerFilter;
    use crate::value::{Allocation, ServerStatus, Sound};

    #[test]
    fn test_message_creation() {
        let msg = ChannelMessage::server("lobby", server::ONLINE_PLAYERS, Value::Int(12)).unwrap();
        assert_eq!(msg.channel_type(), ChannelType::Server);
        assert_eq!(msg.message_type(), server::ONLINE_PLAYERS);
        assert_eq!(msg.identifier(), &Identifier::from("lobby"));
        assert_eq!(msg.value(), &Value::Int(12));
        assert!(msg.source().is_none());
    }

    #[test]
    fn test_foreign_message_type_is_rejected() {
        let result = ChannelMessage::server("lobby", user::SOUND, Value::Sound(Sound::Pling));
        match result {
            Err(ChannelError::InvalidMessageType {
                channel_type,
                message_type,
            }) => {
                assert_eq!(channel_type, ChannelType::Server);
                assert_eq!(message_type, user::SOUND);
            }
            other => panic!("Expected InvalidMessageType, got {other:?}"),
        }
    }

    #[test]
    fn test_same_named_type_from_other_category_is_rejected() {
        let sender = Participant::new("h", 1);
        let result = ChannelMessage::signal(ChannelType::Heartbeat, sender.clone(), server::PING);
        assert!(matches!(result, Err(ChannelError::InvalidMessageType { .. })));

        let ok = ChannelMessage::signal(ChannelType::Heartbeat, sender, heartbeat::PING).unwrap();
        assert_eq!(ok.message_type(), heartbeat::PING);
        assert!(ChannelMessage::server("lobby", user::COMMAND, "say hi").is_err());
    }

    #[test]
    fn test_encode_failure_surfaces_from_to_json() {
        let broken = ChannelMessage {
            channel_type: ChannelType::Server,
            message_type: server::ONLINE_PLAYERS,
            identifier: Identifier::from("lobby"),
            value: Value::Text("twelve".to_string()),
            source: None,
        };
        assert!(matches!(broken.to_json(), Err(ChannelError::Codec(_))));
        assert!(serde_json::to_string(&broken).is_err());
    }

    #[test]
    fn test_wrong_value_kind_is_rejected() {
        let result = ChannelMessage::server("lobby", server::STATUS, "ONLINE");
        assert!(matches!(result, Err(ChannelError::InvalidValue { .. })));
    }

    #[test]
    fn test_wrong_identifier_kind_is_rejected() {
        let result = ChannelMessage::new(ChannelType::User, "steve", user::ALIAS, Value::Void);
        assert!(matches!(result, Err(ChannelError::InvalidIdentifier { .. })));
    }

    #[test]
    fn test_message_json_roundtrip() {
        let mut msg = ChannelMessage::server("game-1", server::STATUS, ServerStatus::Online).unwrap();
        msg.set_source(Participant::new("127.0.0.1", 4000));

        let json = msg.to_json().unwrap();
        let back = ChannelMessage::from_json(&json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.source(), Some(&Participant::new("127.0.0.1", 4000)));
    }

    #[test]
    fn test_control_message_json_roundtrip() {
        let sender = Participant::new("10.0.0.1", 4000);
        let filter = ListenerFilter::accept_all().allow(ChannelType::Server);
        let msg = ChannelMessage::control(sender.clone(), control::INIT, Value::Filter(filter))
            .unwrap();

        let back = ChannelMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.identifier().as_participant(), Some(&sender));
    }

    #[test]
    fn test_void_message_omits_value() {
        let msg = ChannelMessage::signal(ChannelType::Discord, "event", discord::DELETE_UNUSED)
            .unwrap();
        let json = msg.to_json().unwrap();
        assert!(!json.contains("\"value\""));
        assert_eq!(ChannelMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_allocation_message_roundtrip() {
        let allocation = Allocation::new().with_team("Red", vec![Uuid::new_v4()]).unwrap();
        let msg = ChannelMessage::new(
            ChannelType::Discord,
            "event",
            discord::MOVE_MEMBERS,
            Value::Allocation(allocation),
        )
        .unwrap();
        assert_eq!(ChannelMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(ChannelMessage::from_json("{not json").is_err());
        let unknown = r#"{"channel":"SERVER","message_type":"nope","identifier":"x"}"#;
        assert!(ChannelMessage::from_json(unknown).is_err());
    }
}
