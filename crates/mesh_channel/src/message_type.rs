//! Message subtypes and the built-in catalog.
//!
//! Message types are plain constants grouped by category. Membership of a
//! type in its category is fixed here and checked whenever a
//! [`ChannelMessage`](crate::message::ChannelMessage) is built.

use std::fmt;

use crate::channel_type::ChannelType;
use crate::error::ChannelError;
use crate::value::{Value, ValueKind};

/// A named subtype within a category, carrying values of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageType {
    channel: ChannelType,
    name: &'static str,
    kind: ValueKind,
}

impl MessageType {
    pub const fn new(channel: ChannelType, name: &'static str, kind: ValueKind) -> Self {
        Self { channel, name, kind }
    }

    /// The category this type was defined in.
    pub fn channel_type(&self) -> ChannelType {
        self.channel
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value_kind(&self) -> ValueKind {
        self.kind
    }

    pub fn encode(&self, value: &Value) -> Result<Option<String>, ChannelError> {
        self.kind.encode(value)
    }

    pub fn decode(&self, raw: Option<&str>) -> Result<Value, ChannelError> {
        self.kind.decode(raw)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub(crate) fn catalog(channel_type: ChannelType) -> &'static [MessageType] {
    match channel_type {
        ChannelType::Server => server::TYPES,
        ChannelType::User => user::TYPES,
        ChannelType::Group => group::TYPES,
        ChannelType::Support => support::TYPES,
        ChannelType::Control => control::TYPES,
        ChannelType::Ping => ping::TYPES,
        ChannelType::Heartbeat => heartbeat::TYPES,
        ChannelType::Logging => logging::TYPES,
        ChannelType::Discord => discord::TYPES,
        ChannelType::Templates => templates::TYPES,
    }
}

pub mod server {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Server, name, kind)
    }

    pub const STATUS: MessageType = new("status", ValueKind::ServerStatus);
    pub const ONLINE_PLAYERS: MessageType = new("online_players", ValueKind::Int);
    pub const MAX_PLAYERS: MessageType = new("max_players", ValueKind::Int);
    pub const COMMAND: MessageType = new("command", ValueKind::Text);
    pub const PERMISSION: MessageType = new("permission", ValueKind::Void);
    pub const GAME_MAP: MessageType = new("game_map", ValueKind::Text);
    pub const GAME_WORLD: MessageType = new("game_world", ValueKind::Text);
    pub const GAME_PLAYERS: MessageType = new("game_players", ValueKind::Int);
    pub const PASSWORD: MessageType = new("password", ValueKind::Text);
    pub const OLD_PVP: MessageType = new("old_pvp", ValueKind::Bool);
    pub const STATE: MessageType = new("state", ValueKind::ServerState);
    pub const RESTART: MessageType = new("restart", ValueKind::Int);
    pub const DESTROY: MessageType = new("destroy", ValueKind::Int);
    pub const KILL_DESTROY: MessageType = new("kill_destroy", ValueKind::Long);
    pub const DISCORD: MessageType = new("discord", ValueKind::Bool);
    pub const USER_STATS: MessageType = new("user_stats", ValueKind::Text);
    pub const LOAD_WORLD: MessageType = new("load_world", ValueKind::Text);
    pub const UNLOAD_WORLD: MessageType = new("unload_world", ValueKind::Text);
    pub const LOADED_WORLD: MessageType = new("loaded_world", ValueKind::Text);
    pub const UNLOADED_WORLD: MessageType = new("unloaded_world", ValueKind::Text);
    pub const UNLOADED_ALL_WORLDS: MessageType =
        new("unloaded_all_worlds", ValueKind::Void);
    pub const PING: MessageType = new("ping", ValueKind::Void);
    pub const PONG: MessageType = new("pong", ValueKind::Void);
    pub const CUSTOM: MessageType = new("custom", ValueKind::Text);

    pub const TYPES: &[MessageType] = &[
        STATUS,
        ONLINE_PLAYERS,
        MAX_PLAYERS,
        COMMAND,
        PERMISSION,
        GAME_MAP,
        GAME_WORLD,
        GAME_PLAYERS,
        PASSWORD,
        OLD_PVP,
        STATE,
        RESTART,
        DESTROY,
        KILL_DESTROY,
        DISCORD,
        USER_STATS,
        LOAD_WORLD,
        UNLOAD_WORLD,
        LOADED_WORLD,
        UNLOADED_WORLD,
        UNLOADED_ALL_WORLDS,
        PING,
        PONG,
        CUSTOM,
    ];
}

pub mod user {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::User, name, kind)
    }

    pub const STATUS: MessageType = new("status", ValueKind::UserStatus);
    pub const SERVICE: MessageType = new("service", ValueKind::Bool);
    pub const SWITCH_PORT: MessageType = new("switch_port", ValueKind::Int);
    pub const SWITCH_NAME: MessageType = new("switch_name", ValueKind::Text);
    pub const PERMISSION: MessageType = new("permission", ValueKind::Void);
    pub const PUNISH: MessageType = new("punish", ValueKind::Text);
    pub const ALIAS: MessageType = new("alias", ValueKind::Void);
    pub const TASK: MessageType = new("task", ValueKind::Text);
    pub const COMMAND: MessageType = new("command", ValueKind::Text);
    pub const PROXY_COMMAND: MessageType = new("proxy_command", ValueKind::Text);
    pub const PERM_GROUP: MessageType = new("perm_group", ValueKind::Text);
    pub const DISPLAY_GROUP: MessageType = new("display_group", ValueKind::Void);
    pub const TEAM: MessageType = new("team", ValueKind::Text);
    pub const STATISTICS: MessageType = new("statistics", ValueKind::Text);
    pub const CUSTOM: MessageType = new("custom", ValueKind::Text);
    pub const SOUND: MessageType = new("sound", ValueKind::Sound);
    pub const STORY_START: MessageType = new("story_start", ValueKind::TextPair);
    pub const STORY_END: MessageType = new("story_end", ValueKind::Void);
    pub const STORY_AUDIO_PLAY: MessageType = new("story_audio_play", ValueKind::Text);
    pub const STORY_AUDIO_END: MessageType = new("story_audio_end", ValueKind::Text);
    pub const STORY_AUDIO_FAIL: MessageType = new("story_audio_fail", ValueKind::Text);

    pub const TYPES: &[MessageType] = &[
        STATUS,
        SERVICE,
        SWITCH_PORT,
        SWITCH_NAME,
        PERMISSION,
        PUNISH,
        ALIAS,
        TASK,
        COMMAND,
        PROXY_COMMAND,
        PERM_GROUP,
        DISPLAY_GROUP,
        TEAM,
        STATISTICS,
        CUSTOM,
        SOUND,
        STORY_START,
        STORY_END,
        STORY_AUDIO_PLAY,
        STORY_AUDIO_END,
        STORY_AUDIO_FAIL,
    ];
}

pub mod group {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Group, name, kind)
    }

    pub const ALIAS: MessageType = new("alias", ValueKind::Void);
    pub const PERMISSION: MessageType = new("permission", ValueKind::Void);

    pub const TYPES: &[MessageType] = &[ALIAS, PERMISSION];
}

pub mod support {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Support, name, kind)
    }

    pub const TICKET_LOCK: MessageType = new("ticket_lock", ValueKind::Int);
    pub const SUBMIT: MessageType = new("submit", ValueKind::Int);
    pub const REJECT: MessageType = new("reject", ValueKind::Int);
    pub const ACCEPT: MessageType = new("accept", ValueKind::Int);
    pub const CREATION: MessageType = new("creation", ValueKind::Int);

    pub const TYPES: &[MessageType] = &[TICKET_LOCK, SUBMIT, REJECT, ACCEPT, CREATION];
}

/// Protocol messages exchanged between channels themselves.
pub mod control {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Control, name, kind)
    }

    pub const INIT: MessageType = new("init", ValueKind::Filter);
    pub const INIT_ACK: MessageType = new("init_ack", ValueKind::Filter);
    pub const INIT_FIN: MessageType = new("init_fin", ValueKind::Void);
    pub const HOSTS_REQUEST: MessageType = new("hosts_request", ValueKind::Void);
    pub const HOSTS_LIST: MessageType = new("hosts_list", ValueKind::Participants);
    pub const RECONNECT: MessageType = new("reconnect", ValueKind::Void);
    pub const CLOSE: MessageType = new("close", ValueKind::Void);
    pub const LISTENER_ADD: MessageType = new("listener_add", ValueKind::Scopes);
    pub const LISTENER_REMOVE: MessageType = new("listener_remove", ValueKind::Scopes);

    pub const TYPES: &[MessageType] = &[
        INIT,
        INIT_ACK,
        INIT_FIN,
        HOSTS_REQUEST,
        HOSTS_LIST,
        RECONNECT,
        CLOSE,
        LISTENER_ADD,
        LISTENER_REMOVE,
    ];
}

pub mod ping {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Ping, name, kind)
    }

    pub const PING: MessageType = new("ping", ValueKind::Void);
    pub const PONG: MessageType = new("pong", ValueKind::Void);

    pub const TYPES: &[MessageType] = &[PING, PONG];
}

/// Liveness checks, consumed by the channel itself.
pub mod heartbeat {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Heartbeat, name, kind)
    }

    pub const PING: MessageType = new("ping", ValueKind::Void);
    pub const PONG: MessageType = new("pong", ValueKind::Void);

    pub const TYPES: &[MessageType] = &[PING, PONG];
}

pub mod logging {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Logging, name, kind)
    }

    pub const LOG: MessageType = new("log", ValueKind::Text);

    pub const TYPES: &[MessageType] = &[LOG];
}

pub mod discord {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Discord, name, kind)
    }

    pub const DESTROY_TEAMS: MessageType = new("destroy_teams", ValueKind::TextList);
    pub const DELETE_UNUSED: MessageType = new("delete_unused", ValueKind::Void);
    pub const HIDE_CHANNELS: MessageType = new("hide_channels", ValueKind::Bool);
    pub const MUTE_CHANNEL: MessageType = new("mute_channel", ValueKind::Text);
    pub const DISCONNECT_MEMBER: MessageType =
        new("disconnect_member", ValueKind::Uuid);
    pub const MOVE_MEMBERS: MessageType = new("move_members", ValueKind::Allocation);

    pub const TYPES: &[MessageType] = &[
        DESTROY_TEAMS,
        DELETE_UNUSED,
        HIDE_CHANNELS,
        MUTE_CHANNEL,
        DISCONNECT_MEMBER,
        MOVE_MEMBERS,
    ];
}

pub mod templates {
    use super::MessageType;
    use crate::channel_type::ChannelType;
    use crate::value::ValueKind;

    const fn new(name: &'static str, kind: ValueKind) -> MessageType {
        MessageType::new(ChannelType::Templates, name, kind)
    }

    pub const INIT_PLAYER_SERVER: MessageType =
        new("init_player_server", ValueKind::Text);
    pub const INIT_PUBLIC_PLAYER_SERVER: MessageType =
        new("init_public_player_server", ValueKind::Text);
    pub const UPDATE_WORLD: MessageType = new("update_world", ValueKind::TextList);

    pub const TYPES: &[MessageType] = &[INIT_PLAYER_SERVER, INIT_PUBLIC_PLAYER_SERVER, UPDATE_WORLD];
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use uuid::Uuid;

    use super::*;
    use crate::identity::Participant;
    use crate::scope::{ListenerFilter, MessageListenerData};
    use crate::value::{Allocation, ServerState, ServerStatus, Sound, UserStatus};

    fn sample(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Void => Value::Void,
            ValueKind::Int => Value::Int(-1),
            ValueKind::Long => Value::Long(i64::MAX),
            ValueKind::Bool => Value::Bool(true),
            ValueKind::Text => Value::Text("lobby-1".to_string()),
            ValueKind::Uuid => Value::Uuid(Uuid::new_v4()),
            ValueKind::TextPair => Value::TextPair("story".to_string(), "chapter".to_string()),
            ValueKind::TextList => Value::TextList(vec!["a".to_string(), "b".to_string()]),
            ValueKind::ServerStatus => Value::ServerStatus(ServerStatus::InGame),
            ValueKind::UserStatus => Value::UserStatus(UserStatus::Spectator),
            ValueKind::ServerState => Value::ServerState(ServerState::Ready),
            ValueKind::Sound => Value::Sound(Sound::Pling),
            ValueKind::Allocation => {
                Value::Allocation(Allocation::new().with_team("Red", vec![Uuid::new_v4()]).unwrap())
            }
            ValueKind::Filter => Value::Filter(ListenerFilter::accept_all()),
            ValueKind::Scopes => Value::Scopes(vec![MessageListenerData::wildcard(
                ChannelType::Server,
                server::STATUS,
            )]),
            ValueKind::Participants => {
                Value::Participants(vec![Participant::new("127.0.0.1", 4000)])
            }
        }
    }

    #[test]
    fn test_every_builtin_type_round_trips() {
        for ct in ChannelType::ALL {
            for mt in ct.message_types() {
                let value = sample(mt.value_kind());
                let encoded = mt.encode(&value).unwrap();
                let decoded = mt.decode(encoded.as_deref()).unwrap();
                assert_eq!(decoded, value, "{ct}/{mt} did not round trip");
            }
        }
    }

    #[test]
    fn test_names_unique_within_category() {
        for ct in ChannelType::ALL {
            let names: HashSet<_> = ct.message_types().iter().map(|mt| mt.name()).collect();
            assert_eq!(names.len(), ct.message_types().len(), "duplicate name in {ct}");
        }
    }

    #[test]
    fn test_equality_includes_category() {
        assert_ne!(server::PING, heartbeat::PING);
        assert_ne!(ping::PONG, heartbeat::PONG);
        assert_ne!(user::PERMISSION, group::PERMISSION);
        assert_ne!(server::COMMAND, user::COMMAND);
        assert_eq!(server::PING.name(), heartbeat::PING.name());
    }

    #[test]
    fn test_types_report_their_category() {
        for ct in ChannelType::ALL {
            for mt in ct.message_types() {
                assert_eq!(mt.channel_type(), ct, "{mt} listed under {ct}");
            }
        }
    }
}
