//! Node identity: participants and bootstrap hosts.
//!
//! A [`Participant`] is the stable identity of a node on the mesh: the
//! hostname it advertises plus the port it listens on. A [`Host`] has the
//! same shape but is used before any handshake, for a node's own address and
//! for the configured entry point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Stable identity of a node: advertised hostname and listen port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Participant {
    hostname: String,
    port: u16,
}

impl Participant {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// WebSocket URL used to open a connection to this participant.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.hostname, self.port)
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl FromStr for Participant {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hostname, port) = split_host_port(s)?;
        Ok(Self::new(hostname, port))
    }
}

impl TryFrom<String> for Participant {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Participant> for String {
    fn from(participant: Participant) -> Self {
        participant.to_string()
    }
}

impl From<Host> for Participant {
    fn from(host: Host) -> Self {
        Self::new(host.hostname, host.port)
    }
}

/// An address known before the node behind it has identified itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Host {
    pub hostname: String,
    pub port: u16,
}

impl Host {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl FromStr for Host {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hostname, port) = split_host_port(s)?;
        Ok(Self::new(hostname, port))
    }
}

impl TryFrom<String> for Host {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Host> for String {
    fn from(host: Host) -> Self {
        host.to_string()
    }
}

fn split_host_port(s: &str) -> Result<(&str, u16), ChannelError> {
    let (hostname, port) = s
        .rsplit_once(':')
        .ok_or_else(|| ChannelError::Codec(format!("Missing port in address '{s}'")))?;
    if hostname.is_empty() {
        return Err(ChannelError::Codec(format!("Missing hostname in address '{s}'")));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| ChannelError::Codec(format!("Bad port in address '{s}': {e}")))?;
    Ok((hostname, port))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_display_and_parse() {
        let participant = Participant::new("lobby.internal", 4000);
        assert_eq!(participant.to_string(), "lobby.internal:4000");

        let parsed: Participant = "lobby.internal:4000".parse().unwrap();
        assert_eq!(parsed, participant);
        assert_eq!(parsed.url(), "ws://lobby.internal:4000");
    }

    #[test]
    fn test_participant_value_equality() {
        let a = Participant::new("127.0.0.1", 4001);
        let b = Participant::new("127.0.0.1".to_string(), 4001);
        let c = Participant::new("127.0.0.1", 4002);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_participant_parse_errors() {
        assert!("no-port".parse::<Participant>().is_err());
        assert!(":4000".parse::<Participant>().is_err());
        assert!("host:99999".parse::<Participant>().is_err());
        assert!("host:abc".parse::<Participant>().is_err());
    }

    #[test]
    fn test_participant_serializes_as_string() {
        let participant = Participant::new("10.0.0.5", 4100);
        let json = serde_json::to_string(&participant).unwrap();
        assert_eq!(json, "\"10.0.0.5:4100\"");

        let back: Participant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, participant);
    }

    #[test]
    fn test_host_into_participant() {
        let host: Host = "proxy:25565".parse().unwrap();
        let participant = Participant::from(host.clone());
        assert_eq!(participant.hostname(), "proxy");
        assert_eq!(participant.port(), 25565);
        assert_eq!(host.to_string(), participant.to_string());
    }
}
