//! Channel error types.

use std::time::Duration;

use crate::channel_type::{ChannelType, IdentifierKind};
use crate::identity::Participant;
use crate::message_type::MessageType;
use crate::value::ValueKind;

/// Errors that can occur in the mesh_channel crate.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A message type was used with a channel type that does not declare it.
    #[error("Message type '{message_type}' is not permitted for channel type {channel_type}")]
    InvalidMessageType {
        channel_type: ChannelType,
        message_type: MessageType,
    },

    /// The identifier does not have the kind the channel type expects.
    #[error("Identifier of kind {found:?} does not fit channel type {channel_type} (expects {expected:?})")]
    InvalidIdentifier {
        channel_type: ChannelType,
        expected: IdentifierKind,
        found: IdentifierKind,
    },

    /// The value does not have the kind the message type expects.
    #[error("Value of kind {found:?} does not fit message type '{message_type}' (expects {expected:?})")]
    InvalidValue {
        message_type: MessageType,
        expected: ValueKind,
        found: ValueKind,
    },

    /// A listener declares bindings or filters that contradict its channel type.
    #[error("Inconsistent channel listener: {0}")]
    InconsistentListener(String),

    /// A channel type or message type name is not part of the catalog.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// A string could not be decoded into an identifier or value.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A transport-level error (socket connect/send/receive).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection's write lock could not be acquired in time.
    #[error("Timed out acquiring the send lock for {0}")]
    LockTimeout(String),

    /// Delivery failed on every attempt and the peer was dropped.
    #[error("Dropped {participant} after {attempts} attempts: {reason}")]
    PeerDropped {
        participant: Participant,
        attempts: usize,
        reason: String,
    },

    /// The connection has no socket and no identity to open one with.
    #[error("Connection to {0} is not established")]
    NotConnected(String),

    /// JSON serialization / deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation timed out.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The channel has not been started or was stopped.
    #[error("Channel not running")]
    NotRunning,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
