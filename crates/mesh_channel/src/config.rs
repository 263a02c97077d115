//! Channel configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::Host;
use crate::scope::ListenerFilter;

/// Configuration for one channel node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Address this node advertises to its peers. Port 0 binds an
    /// ephemeral port, which then becomes the advertised one.
    pub host: Host,

    /// Interface the server socket binds to.
    pub listen_hostname: String,

    /// Entry point used by [`Channel::bootstrap`](crate::channel::Channel::bootstrap).
    /// `None` makes the node found a new network.
    pub seed: Option<Host>,

    /// Scopes this node wants its peers to announce to it.
    pub listener_filter: ListenerFilter,

    /// Delivery attempts per message and peer, reconnect included.
    pub connect_attempts: usize,

    /// Longest wait for a connection's write lock.
    #[serde(with = "duration_serde")]
    pub write_lock_timeout: Duration,

    /// Timeout for opening a socket to a peer.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Overall deadline for joining the network through the seed.
    #[serde(with = "duration_serde")]
    pub register_timeout: Duration,

    /// Pause between INIT attempts while the seed is unreachable.
    #[serde(with = "duration_serde")]
    pub register_retry_interval: Duration,

    /// Maximum number of concurrent asynchronous sends.
    pub send_workers: usize,

    /// Interval between heartbeat rounds. `None` disables liveness checks.
    #[serde(with = "option_duration_serde")]
    pub heartbeat_interval: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: Host::new("127.0.0.1", 4000),
            listen_hostname: "0.0.0.0".to_string(),
            seed: None,
            listener_filter: ListenerFilter::accept_all(),
            connect_attempts: 3,
            write_lock_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
            register_timeout: Duration::from_secs(10),
            register_retry_interval: Duration::from_millis(250),
            send_workers: 100,
            heartbeat_interval: Some(Duration::from_secs(40)),
        }
    }
}

impl ChannelConfig {
    /// A loopback node on an ephemeral port without heartbeat, the usual
    /// shape for local test networks.
    pub fn local() -> Self {
        Self {
            host: Host::new("127.0.0.1", 0),
            listen_hostname: "127.0.0.1".to_string(),
            heartbeat_interval: None,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: Host) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_listener_filter(mut self, filter: ListenerFilter) -> Self {
        self.listener_filter = filter;
        self
    }

    /// Save the config to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory: {e}"))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Load config from a JSON file, or return defaults if the file is
    /// missing, unreadable or corrupt.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<ChannelConfig>(&data) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Corrupt channel config, using defaults: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!("Cannot read channel config, using defaults: {e}");
                }
            }
        }
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(dur.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match dur {
            Some(dur) => s.serialize_some(&(dur.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_type::ChannelType;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.host.to_string(), "127.0.0.1:4000");
        assert_eq!(config.listen_hostname, "0.0.0.0");
        assert!(config.seed.is_none());
        assert!(config.listener_filter.is_accept_all());
        assert_eq!(config.connect_attempts, 3);
        assert_eq!(config.write_lock_timeout, Duration::from_secs(3));
        assert_eq!(config.send_workers, 100);
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(40)));
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let json = serde_json::to_value(ChannelConfig::default()).unwrap();
        assert_eq!(json["write_lock_timeout"], 3000);
        assert_eq!(json["register_retry_interval"], 250);
        assert_eq!(json["heartbeat_interval"], 40000);
        assert_eq!(json["host"], "127.0.0.1:4000");
    }

    #[test]
    fn test_null_heartbeat_disables_it() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"heartbeat_interval": null, "seed": "10.0.0.1:4000"}"#)
                .unwrap();
        assert!(config.heartbeat_interval.is_none());
        assert_eq!(config.seed, Some(Host::new("10.0.0.1", 4000)));
        // Missing fields fall back to defaults.
        assert_eq!(config.connect_attempts, 3);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("channel.json");

        let original = ChannelConfig::local()
            .with_seed(Host::new("127.0.0.1", 4100))
            .with_listener_filter(ListenerFilter::accept_all().allow(ChannelType::Server));
        original.save_to_file(&path).unwrap();

        let loaded = ChannelConfig::load_or_default(&path);
        assert_eq!(loaded.seed, original.seed);
        assert_eq!(loaded.listener_filter, original.listener_filter);
        assert_eq!(loaded.host.port, 0);
        assert!(loaded.heartbeat_interval.is_none());
    }

    #[test]
    fn test_config_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChannelConfig::load_or_default(&dir.path().join("absent.json"));
        assert_eq!(config.host.port, 4000);
    }

    #[test]
    fn test_config_load_corrupt_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = ChannelConfig::load_or_default(&path);
        assert_eq!(config.connect_attempts, 3);
    }
}
