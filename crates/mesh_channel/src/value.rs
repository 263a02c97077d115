//! Message values and their string codecs.
//!
//! Every [`MessageType`](crate::message_type::MessageType) declares the
//! [`ValueKind`] it carries. The kind owns the codec that turns a [`Value`]
//! into the optional string transmitted on the wire and back again.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::ChannelError;
use crate::identity::Participant;
use crate::scope::{ListenerFilter, MessageListenerData};

/// Declares a closed, upper-case-named enum with `as_str` and `FromStr`.
macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ChannelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ChannelError::Codec(format!(
                        "Unknown {} '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

named_enum!(
    /// Lifecycle status of a game server.
    ServerStatus {
        Offline => "OFFLINE",
        Launching => "LAUNCHING",
        Loading => "LOADING",
        Online => "ONLINE",
        Service => "SERVICE",
        PreGame => "PRE_GAME",
        InGame => "IN_GAME",
        PostGame => "POST_GAME",
    }
);

named_enum!(
    /// Presence status of a user.
    UserStatus {
        Offline => "OFFLINE",
        Online => "ONLINE",
        PreGame => "PRE_GAME",
        InGame => "IN_GAME",
        OutGame => "OUT_GAME",
        Spectator => "SPECTATOR",
        Jail => "JAIL",
    }
);

named_enum!(
    /// Readiness state reported by a server.
    ServerState {
        Ready => "READY",
    }
);

named_enum!(
    /// Notification sound played to a user.
    Sound {
        Pling => "PLING",
        Plong => "PLONG",
    }
);

/// Ordered assignment of members to voice teams.
///
/// Wire form: teams separated by `#`, the team name and its member ids
/// separated by `/`, e.g. `Red/<uuid>/<uuid>#Blue/<uuid>#Spectator`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Allocation {
    teams: Vec<(String, Vec<Uuid>)>,
}

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a team.
    ///
    /// The name must be non-empty and free of the `#` and `/` separators.
    pub fn with_team(
        mut self,
        name: impl Into<String>,
        members: Vec<Uuid>,
    ) -> Result<Self, ChannelError> {
        let name = name.into();
        check_team_name(&name)?;
        self.teams.push((name, members));
        Ok(self)
    }

    pub fn teams(&self) -> &[(String, Vec<Uuid>)] {
        &self.teams
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn encode(&self) -> String {
        self.teams
            .iter()
            .map(|(name, members)| {
                let mut part = name.clone();
                for member in members {
                    part.push('/');
                    part.push_str(&member.to_string());
                }
                part
            })
            .collect::<Vec<_>>()
            .join("#")
    }

    pub fn decode(raw: &str) -> Result<Self, ChannelError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let mut allocation = Self::default();
        for team in raw.split('#') {
            let mut parts = team.split('/');
            let name = parts.next().unwrap_or_default().to_string();
            check_team_name(&name)?;
            let members = parts
                .map(|id| {
                    Uuid::parse_str(id)
                        .map_err(|e| ChannelError::Codec(format!("Bad member id '{id}': {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            allocation.teams.push((name, members));
        }
        Ok(allocation)
    }
}

fn check_team_name(name: &str) -> Result<(), ChannelError> {
    if name.is_empty() || name.contains(['#', '/']) {
        return Err(ChannelError::Codec(format!("Bad team name '{name}'")));
    }
    Ok(())
}

/// The payload carried by a channel message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Void,
    Int(i32),
    Long(i64),
    Bool(bool),
    Text(String),
    Uuid(Uuid),
    TextPair(String, String),
    TextList(Vec<String>),
    ServerStatus(ServerStatus),
    UserStatus(UserStatus),
    ServerState(ServerState),
    Sound(Sound),
    Allocation(Allocation),
    Filter(ListenerFilter),
    Scopes(Vec<MessageListenerData>),
    Participants(Vec<Participant>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Bool(_) => ValueKind::Bool,
            Value::Text(_) => ValueKind::Text,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::TextPair(..) => ValueKind::TextPair,
            Value::TextList(_) => ValueKind::TextList,
            Value::ServerStatus(_) => ValueKind::ServerStatus,
            Value::UserStatus(_) => ValueKind::UserStatus,
            Value::ServerState(_) => ValueKind::ServerState,
            Value::Sound(_) => ValueKind::Sound,
            Value::Allocation(_) => ValueKind::Allocation,
            Value::Filter(_) => ValueKind::Filter,
            Value::Scopes(_) => ValueKind::Scopes,
            Value::Participants(_) => ValueKind::Participants,
        }
    }

    pub fn as_filter(&self) -> Option<&ListenerFilter> {
        match self {
            Value::Filter(filter) => Some(filter),
            _ => None,
        }
    }

    pub fn as_scopes(&self) -> Option<&[MessageListenerData]> {
        match self {
            Value::Scopes(scopes) => Some(scopes),
            _ => None,
        }
    }

    pub fn as_participants(&self) -> Option<&[Participant]> {
        match self {
            Value::Participants(participants) => Some(participants),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<ServerStatus> for Value {
    fn from(value: ServerStatus) -> Self {
        Value::ServerStatus(value)
    }
}

impl From<UserStatus> for Value {
    fn from(value: UserStatus) -> Self {
        Value::UserStatus(value)
    }
}

/// The shape of value a message type carries, and its codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    Void,
    Int,
    Long,
    Bool,
    Text,
    Uuid,
    TextPair,
    TextList,
    ServerStatus,
    UserStatus,
    ServerState,
    Sound,
    Allocation,
    Filter,
    Scopes,
    Participants,
}

impl ValueKind {
    /// Encode a value of this kind. `Void` encodes to `None`.
    pub fn encode(self, value: &Value) -> Result<Option<String>, ChannelError> {
        if value.kind() != self {
            return Err(ChannelError::Codec(format!(
                "Cannot encode {:?} value as {self:?}",
                value.kind()
            )));
        }
        let encoded = match value {
            Value::Void => return Ok(None),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Uuid(v) => v.to_string(),
            Value::TextPair(a, b) => serde_json::to_string(&(a, b))?,
            Value::TextList(v) => serde_json::to_string(v)?,
            Value::ServerStatus(v) => v.as_str().to_string(),
            Value::UserStatus(v) => v.as_str().to_string(),
            Value::ServerState(v) => v.as_str().to_string(),
            Value::Sound(v) => v.as_str().to_string(),
            Value::Allocation(v) => v.encode(),
            Value::Filter(v) => serde_json::to_string(v)?,
            Value::Scopes(v) => serde_json::to_string(v)?,
            Value::Participants(v) => serde_json::to_string(v)?,
        };
        Ok(Some(encoded))
    }

    /// Decode the wire string of this kind. Only `Void` accepts `None`.
    pub fn decode(self, raw: Option<&str>) -> Result<Value, ChannelError> {
        let Some(raw) = raw else {
            return match self {
                ValueKind::Void => Ok(Value::Void),
                other => Err(ChannelError::Codec(format!("Missing {other:?} value"))),
            };
        };
        let bad = |e: &dyn fmt::Display| ChannelError::Codec(format!("Bad {self:?} value '{raw}': {e}"));
        let value = match self {
            ValueKind::Void => {
                return Err(ChannelError::Codec(format!("Unexpected value '{raw}' for Void")));
            }
            ValueKind::Int => Value::Int(raw.parse().map_err(|e| bad(&e))?),
            ValueKind::Long => Value::Long(raw.parse().map_err(|e| bad(&e))?),
            ValueKind::Bool => Value::Bool(raw.parse().map_err(|e| bad(&e))?),
            ValueKind::Text => Value::Text(raw.to_string()),
            ValueKind::Uuid => Value::Uuid(Uuid::parse_str(raw).map_err(|e| bad(&e))?),
            ValueKind::TextPair => {
                let (a, b): (String, String) = serde_json::from_str(raw)?;
                Value::TextPair(a, b)
            }
            ValueKind::TextList => Value::TextList(serde_json::from_str(raw)?),
            ValueKind::ServerStatus => Value::ServerStatus(raw.parse()?),
            ValueKind::UserStatus => Value::UserStatus(raw.parse()?),
            ValueKind::ServerState => Value::ServerState(raw.parse()?),
            ValueKind::Sound => Value::Sound(raw.parse()?),
            ValueKind::Allocation => Value::Allocation(Allocation::decode(raw)?),
            ValueKind::Filter => Value::Filter(serde_json::from_str(raw)?),
            ValueKind::Scopes => Value::Scopes(serde_json::from_str(raw)?),
            ValueKind::Participants => Value::Participants(serde_json::from_str(raw)?),
        };
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let kind = value.kind();
        let encoded = kind.encode(&value).unwrap();
        let decoded = kind.decode(encoded.as_deref()).unwrap();
        assert_eq!(decoded, value, "round trip failed for {kind:?}");
    }

    #[test]
    fn test_scalar_boundaries_round_trip() {
        round_trip(Value::Void);
        round_trip(Value::Int(i32::MIN));
        round_trip(Value::Int(i32::MAX));
        round_trip(Value::Long(i64::MIN));
        round_trip(Value::Long(0));
        round_trip(Value::Bool(true));
        round_trip(Value::Bool(false));
        round_trip(Value::Text(String::new()));
        round_trip(Value::Text("lobby;with;separators#/".to_string()));
        round_trip(Value::Uuid(Uuid::nil()));
    }

    #[test]
    fn test_enum_values_round_trip() {
        for status in ServerStatus::ALL {
            round_trip(Value::ServerStatus(*status));
        }
        for status in UserStatus::ALL {
            round_trip(Value::UserStatus(*status));
        }
        round_trip(Value::ServerState(ServerState::Ready));
        round_trip(Value::Sound(Sound::Plong));
    }

    #[test]
    fn test_void_encodes_to_none() {
        assert_eq!(ValueKind::Void.encode(&Value::Void).unwrap(), None);
        assert!(ValueKind::Void.decode(Some("x")).is_err());
        assert!(ValueKind::Int.decode(None).is_err());
    }

    #[test]
    fn test_encode_rejects_wrong_kind() {
        let result = ValueKind::Int.encode(&Value::Text("7".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_allocation_wire_format() {
        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();
        let allocation = Allocation::new()
            .with_team("Red", vec![red])
            .and_then(|a| a.with_team("Blue", vec![blue]))
            .and_then(|a| a.with_team("Spectator", vec![]))
            .unwrap();

        let encoded = allocation.encode();
        assert_eq!(encoded, format!("Red/{red}#Blue/{blue}#Spectator"));
        assert_eq!(Allocation::decode(&encoded).unwrap(), allocation);
    }

    #[test]
    fn test_allocation_empty_and_invalid() {
        assert!(Allocation::decode("").unwrap().is_empty());
        assert!(Allocation::decode("Red/not-a-uuid").is_err());
        assert!(Allocation::decode("Red#").is_err());
        assert!(Allocation::decode("#Blue").is_err());
    }

    #[test]
    fn test_allocation_rejects_unencodable_team_names() {
        for name in ["", "A/B", "Red#Blue", "/", "#"] {
            match Allocation::new().with_team(name, vec![]) {
                Err(ChannelError::Codec(_)) => {}
                other => panic!("Expected codec error for '{name}', got {other:?}"),
            }
        }
    }

    #[test]
    fn test_accepted_allocations_round_trip() {
        let member = Uuid::new_v4();
        let cases = [
            Allocation::new(),
            Allocation::new().with_team("Solo", vec![]).unwrap(),
            Allocation::new().with_team("Red Team", vec![member]).unwrap(),
            Allocation::new()
                .with_team("a", vec![])
                .and_then(|a| a.with_team("b", vec![member, Uuid::nil()]))
                .unwrap(),
        ];
        for allocation in cases {
            let decoded = Allocation::decode(&allocation.encode()).unwrap();
            assert_eq!(decoded, allocation);
        }
    }

    #[test]
    fn test_structured_values_round_trip() {
        round_trip(Value::TextPair("intro".to_string(), "chapter-1".to_string()));
        round_trip(Value::TextList(vec![]));
        round_trip(Value::TextList(vec!["world_a".to_string(), "world b".to_string()]));
        round_trip(Value::Participants(vec![
            Participant::new("127.0.0.1", 4000),
            Participant::new("game-1", 4001),
        ]));
        round_trip(Value::Allocation(
            Allocation::new()
                .with_team("Green", vec![Uuid::new_v4(), Uuid::new_v4()])
                .unwrap(),
        ));
    }

    #[test]
    fn test_bad_scalar_is_codec_error() {
        match ValueKind::Int.decode(Some("twelve")) {
            Err(ChannelError::Codec(msg)) => assert!(msg.contains("twelve")),
            other => panic!("Expected codec error, got {other:?}"),
        }
        assert!(ValueKind::ServerStatus.decode(Some("ASLEEP")).is_err());
    }
}
