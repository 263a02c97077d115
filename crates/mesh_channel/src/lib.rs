//! Mesh Channel: a peer-to-peer control-plane message bus.
//!
//! Game-server nodes and their proxy form a mesh of persistent WebSocket
//! connections. Every node exposes typed publish/subscribe channels, tells
//! its peers which message scopes it listens to, and routes each message
//! only to the peers that asked for it.
//!
//! # Architecture
//!
//! - **Message model**: [`ChannelType`] categories with a closed set of
//!   [`MessageType`]s, each carrying a typed [`Value`].
//! - **Connections**: one socket per peer pair, one write lock and one
//!   receive task per connection; sockets are swapped in place on reconnect.
//! - **Control protocol**: INIT / INIT_ACK / INIT_FIN handshake, host list
//!   exchange for full-mesh discovery, RECONNECT and CLOSE.
//! - **Routing**: peers announce listener scopes; broadcasts go to the
//!   participants of the exact and the wildcard scope.
//! - **Listeners**: typed callbacks run on the host's synchronous executor
//!   or inline on the receive task.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use mesh_channel::{Channel, ChannelConfig, ChannelListener, ChannelMessage, ChannelType};
//! use mesh_channel::message_type::server;
//! use mesh_channel::value::ServerStatus;
//!
//! # async fn example() -> Result<(), mesh_channel::ChannelError> {
//! let channel = Channel::new(ChannelConfig::default());
//! channel.start().await?;
//! channel.bootstrap().await?;
//!
//! let listener = ChannelListener::new("status").on(ChannelType::Server, server::STATUS, |message| {
//!     println!("{} is {:?}", message.identifier(), message.value());
//! });
//! channel.add_listener(&listener).await?;
//!
//! let update = ChannelMessage::server("lobby", server::STATUS, ServerStatus::Online)?;
//! let report = channel.send_message_sync(update).await;
//! assert!(report.is_successful());
//!
//! channel.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod channel_type;
pub mod config;
pub mod connection;
mod control;
pub mod error;
pub mod executor;
mod heartbeat;
pub mod identity;
pub mod listener;
pub mod logging;
pub mod message;
pub mod message_type;
mod receiver;
pub mod report;
pub mod routing;
pub mod scope;
pub mod sender;
mod transport;
pub mod value;

// ── Re-exports for convenience ──────────────────────────────────────────

pub use channel::{Channel, NodeState};
pub use channel_type::{ChannelType, Identifier, IdentifierKind};
pub use config::ChannelConfig;
pub use connection::{ChannelConnection, ConnectionTable};
pub use error::ChannelError;
pub use executor::{InlineExecutor, QueueExecutor, SyncExecutor};
pub use identity::{Host, Participant};
pub use listener::{ChannelListener, ListenerRegistry};
pub use message::ChannelMessage;
pub use message_type::MessageType;
pub use report::DeliveryReport;
pub use scope::{ListenerFilter, MessageListenerData};
pub use value::{Allocation, Value, ValueKind};
