//! Channel categories and their identifiers.
//!
//! A [`ChannelType`] is one of a closed set of categories. Each category
//! fixes the [`MessageType`]s it permits and the kind of [`Identifier`] its
//! messages are addressed by (a server name, a user id, a participant, …).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::identity::Participant;
use crate::message_type::{self, MessageType};

/// Message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Server,
    User,
    Group,
    Support,
    Control,
    Ping,
    Heartbeat,
    Logging,
    Discord,
    Templates,
}

impl ChannelType {
    pub const ALL: [ChannelType; 10] = [
        ChannelType::Server,
        ChannelType::User,
        ChannelType::Group,
        ChannelType::Support,
        ChannelType::Control,
        ChannelType::Ping,
        ChannelType::Heartbeat,
        ChannelType::Logging,
        ChannelType::Discord,
        ChannelType::Templates,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChannelType::Server => "SERVER",
            ChannelType::User => "USER",
            ChannelType::Group => "GROUP",
            ChannelType::Support => "SUPPORT",
            ChannelType::Control => "CONTROL",
            ChannelType::Ping => "PING",
            ChannelType::Heartbeat => "HEARTBEAT",
            ChannelType::Logging => "LOGGING",
            ChannelType::Discord => "DISCORD",
            ChannelType::Templates => "TEMPLATES",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ChannelError> {
        Self::ALL
            .into_iter()
            .find(|ct| ct.name() == name)
            .ok_or_else(|| ChannelError::UnknownType(format!("channel type '{name}'")))
    }

    /// The kind of identifier messages of this category are addressed by.
    pub fn identifier_kind(self) -> IdentifierKind {
        match self {
            ChannelType::User => IdentifierKind::Uuid,
            ChannelType::Control | ChannelType::Heartbeat => IdentifierKind::Participant,
            _ => IdentifierKind::Name,
        }
    }

    /// The closed set of message types this category permits.
    pub fn message_types(self) -> &'static [MessageType] {
        message_type::catalog(self)
    }

    pub fn permits(self, message_type: &MessageType) -> bool {
        message_type.channel_type() == self && self.message_types().contains(message_type)
    }

    /// Look up one of this category's message types by name.
    pub fn message_type(self, name: &str) -> Result<MessageType, ChannelError> {
        self.message_types()
            .iter()
            .copied()
            .find(|mt| mt.name() == name)
            .ok_or_else(|| ChannelError::UnknownType(format!("message type '{name}' in {self}")))
    }

    /// Decode a wire identifier for this category.
    pub fn parse_identifier(self, raw: &str) -> Result<Identifier, ChannelError> {
        match self.identifier_kind() {
            IdentifierKind::Name => Ok(Identifier::Name(raw.to_string())),
            IdentifierKind::Uuid => Uuid::parse_str(raw)
                .map(Identifier::Uuid)
                .map_err(|e| ChannelError::Codec(format!("Bad {self} identifier '{raw}': {e}"))),
            IdentifierKind::Participant => raw.parse().map(Identifier::Participant),
        }
    }

    /// Fail unless `identifier` has the kind this category expects.
    pub fn check_identifier(self, identifier: &Identifier) -> Result<(), ChannelError> {
        let expected = self.identifier_kind();
        if identifier.kind() == expected {
            Ok(())
        } else {
            Err(ChannelError::InvalidIdentifier {
                channel_type: self,
                expected,
                found: identifier.kind(),
            })
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelType {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Shape of the identifier a category uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Name,
    Uuid,
    Participant,
}

/// The address part of a message within its category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Name(String),
    Uuid(Uuid),
    Participant(Participant),
}

impl Identifier {
    pub fn kind(&self) -> IdentifierKind {
        match self {
            Identifier::Name(_) => IdentifierKind::Name,
            Identifier::Uuid(_) => IdentifierKind::Uuid,
            Identifier::Participant(_) => IdentifierKind::Participant,
        }
    }

    pub fn as_participant(&self) -> Option<&Participant> {
        match self {
            Identifier::Participant(participant) => Some(participant),
            _ => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Name(name) => f.write_str(name),
            Identifier::Uuid(id) => write!(f, "{id}"),
            Identifier::Participant(participant) => write!(f, "{participant}"),
        }
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::Name(name.to_string())
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Identifier::Name(name)
    }
}

impl From<Uuid> for Identifier {
    fn from(id: Uuid) -> Self {
        Identifier::Uuid(id)
    }
}

impl From<Participant> for Identifier {
    fn from(participant: Participant) -> Self {
        Identifier::Participant(participant)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_type::{control, server, user};

    #[test]
    fn test_names_are_unique_and_resolvable() {
        for ct in ChannelType::ALL {
            assert_eq!(ChannelType::from_name(ct.name()).unwrap(), ct);
        }
        assert!(ChannelType::from_name("WHATEVER").is_err());
    }

    #[test]
    fn test_membership_is_closed() {
        assert!(ChannelType::Server.permits(&server::STATUS));
        assert!(!ChannelType::Server.permits(&user::SOUND));
        assert!(ChannelType::Control.permits(&control::INIT));
        // Same name, different category.
        assert!(!ChannelType::User.permits(&server::STATUS));
    }

    #[test]
    fn test_message_type_lookup() {
        assert_eq!(ChannelType::Server.message_type("status").unwrap(), server::STATUS);
        assert!(ChannelType::Group.message_type("status").is_err());
    }

    #[test]
    fn test_identifier_codec() {
        let id = Uuid::new_v4();
        assert_eq!(
            ChannelType::User.parse_identifier(&id.to_string()).unwrap(),
            Identifier::Uuid(id)
        );
        assert!(ChannelType::User.parse_identifier("lobby").is_err());

        let participant = Participant::new("10.1.1.1", 4000);
        let parsed = ChannelType::Control.parse_identifier("10.1.1.1:4000").unwrap();
        assert_eq!(parsed, Identifier::Participant(participant));
        assert_eq!(parsed.to_string(), "10.1.1.1:4000");
    }

    #[test]
    fn test_check_identifier() {
        assert!(ChannelType::Server.check_identifier(&Identifier::from("lobby")).is_ok());
        match ChannelType::User.check_identifier(&Identifier::from("lobby")) {
            Err(ChannelError::InvalidIdentifier { expected, found, .. }) => {
                assert_eq!(expected, IdentifierKind::Uuid);
                assert_eq!(found, IdentifierKind::Name);
            }
            other => panic!("Expected InvalidIdentifier, got {other:?}"),
        }
    }
}
