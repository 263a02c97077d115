//! Listener scopes and negotiated inbound filters.
//!
//! A [`MessageListenerData`] names a routable interest: a category, a
//! message type and either one identifier or the wildcard. A
//! [`ListenerFilter`] is what a node tells its peers during the handshake
//! about which scopes it wants to hear announcements for.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel_type::{ChannelType, Identifier};
use crate::error::ChannelError;
use crate::message::ChannelMessage;
use crate::message_type::MessageType;

/// A (channel type, message type, identifier-or-wildcard) interest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WireScope", into = "WireScope")]
pub struct MessageListenerData {
    channel_type: ChannelType,
    message_type: MessageType,
    identifier: Option<Identifier>,
}

impl MessageListenerData {
    pub fn new(
        channel_type: ChannelType,
        message_type: MessageType,
        identifier: Option<Identifier>,
    ) -> Result<Self, ChannelError> {
        if !channel_type.permits(&message_type) {
            return Err(ChannelError::InvalidMessageType {
                channel_type,
                message_type,
            });
        }
        if let Some(identifier) = &identifier {
            channel_type.check_identifier(identifier)?;
        }
        Ok(Self {
            channel_type,
            message_type,
            identifier,
        })
    }

    /// Scope matching every identifier of the (type, subtype) pair.
    ///
    /// The pair must come from the catalog; use [`new`](Self::new) when it
    /// is not known to be consistent.
    pub fn wildcard(channel_type: ChannelType, message_type: MessageType) -> Self {
        Self {
            channel_type,
            message_type,
            identifier: None,
        }
    }

    /// The exact scope a message is addressed to.
    pub fn of_message(message: &ChannelMessage) -> Self {
        Self {
            channel_type: message.channel_type(),
            message_type: message.message_type(),
            identifier: Some(message.identifier().clone()),
        }
    }

    /// The wildcard scope covering a message.
    pub fn wildcard_of(message: &ChannelMessage) -> Self {
        Self::wildcard(message.channel_type(), message.message_type())
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.identifier.is_none()
    }
}

impl fmt::Display for MessageListenerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Some(identifier) => write!(f, "{}/{}/{identifier}", self.channel_type, self.message_type),
            None => write!(f, "{}/{}/*", self.channel_type, self.message_type),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireScope {
    channel: String,
    message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
}

impl TryFrom<WireScope> for MessageListenerData {
    type Error = ChannelError;

    fn try_from(wire: WireScope) -> Result<Self, Self::Error> {
        let channel_type = ChannelType::from_name(&wire.channel)?;
        let message_type = channel_type.message_type(&wire.message_type)?;
        let identifier = wire
            .identifier
            .map(|raw| channel_type.parse_identifier(&raw))
            .transpose()?;
        Ok(Self {
            channel_type,
            message_type,
            identifier,
        })
    }
}

impl From<MessageListenerData> for WireScope {
    fn from(scope: MessageListenerData) -> Self {
        Self {
            channel: scope.channel_type.name().to_string(),
            message_type: scope.message_type.name().to_string(),
            identifier: scope.identifier.map(|id| id.to_string()),
        }
    }
}

/// Per-category rule inside a [`ListenerFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterRule {
    /// Every scope of the category.
    Any,
    /// Wildcard scopes plus scopes for these encoded identifiers.
    Identifiers(BTreeSet<String>),
}

/// The set of listener scopes a node wants announced to it.
///
/// An empty filter accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerFilter {
    #[serde(default)]
    rules: BTreeMap<ChannelType, FilterRule>,
}

impl ListenerFilter {
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn is_accept_all(&self) -> bool {
        self.rules.is_empty()
    }

    /// Accept every scope of `channel_type`.
    pub fn allow(mut self, channel_type: ChannelType) -> Self {
        self.rules.insert(channel_type, FilterRule::Any);
        self
    }

    /// Accept wildcard scopes of `channel_type` and the given identifiers.
    ///
    /// Fails if an identifier does not match the category's identifier kind.
    pub fn allow_identifiers(
        mut self,
        channel_type: ChannelType,
        identifiers: impl IntoIterator<Item = Identifier>,
    ) -> Result<Self, ChannelError> {
        let mut accepted = BTreeSet::new();
        for identifier in identifiers {
            channel_type.check_identifier(&identifier)?;
            accepted.insert(identifier.to_string());
        }
        match self.rules.get_mut(&channel_type) {
            Some(FilterRule::Any) => {}
            Some(FilterRule::Identifiers(existing)) => existing.extend(accepted),
            None => {
                self.rules
                    .insert(channel_type, FilterRule::Identifiers(accepted));
            }
        }
        Ok(self)
    }

    pub fn accepts(&self, scope: &MessageListenerData) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        match self.rules.get(&scope.channel_type()) {
            None => false,
            Some(FilterRule::Any) => true,
            Some(FilterRule::Identifiers(accepted)) => match scope.identifier() {
                None => true,
                Some(identifier) => accepted.contains(&identifier.to_string()),
            },
        }
    }

    /// The subset of `scopes` this filter accepts, in input order.
    pub fn filter<'a>(
        &self,
        scopes: impl IntoIterator<Item = &'a MessageListenerData>,
    ) -> Vec<MessageListenerData> {
        scopes
            .into_iter()
            .filter(|scope| self.accepts(scope))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
