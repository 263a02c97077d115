//! Outbound path: fan-out, per-connection retry and the bootstrap stash.
//!
//! A broadcast is routed to the union of participants registered for the
//! message's exact scope and its wildcard scope, then written to each
//! recipient's connection under that connection's write lock. Failures are
//! recorded per participant in a [`DeliveryReport`] and never returned as
//! errors from the public API.
//!
//! While the node is bootstrapping, non-control broadcasts are held in a
//! stash and flushed once the handshake with every known peer completed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::connection::ChannelConnection;
use crate::error::ChannelError;
use crate::identity::Participant;
use crate::message::ChannelMessage;
use crate::message_type::{MessageType, control};
use crate::report::DeliveryReport;
use crate::scope::MessageListenerData;
use crate::transport::{self, PeerSink};
use crate::value::Value;

/// What a single delivery attempt does before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryStep {
    /// First socket for this connection; no announcement needed.
    OpenSilently,
    /// Open a fresh socket and announce ourselves with RECONNECT first.
    Reconnect,
    /// Write on the current socket.
    Write,
    /// Give up: drop the peer from routing and close the connection.
    Drop,
}

impl RetryStep {
    /// The step for `attempt` out of `attempts`.
    ///
    /// The last attempt only drops the peer and the one before it always
    /// reconnects, so with three attempts a dead socket is retried exactly
    /// once through a RECONNECT.
    pub(crate) fn plan(attempt: usize, attempts: usize, has_socket: bool, ever_connected: bool) -> Self {
        if attempt + 1 >= attempts {
            RetryStep::Drop
        } else if attempt + 2 == attempts {
            RetryStep::Reconnect
        } else if !has_socket && !ever_connected {
            RetryStep::OpenSilently
        } else if !has_socket {
            RetryStep::Reconnect
        } else {
            RetryStep::Write
        }
    }
}

#[derive(Debug)]
struct Stash {
    enabled: bool,
    pending: HashSet<ChannelMessage>,
}

/// Outbound message path of a channel.
pub struct Sender {
    attempts: usize,
    lock_timeout: Duration,
    connect_timeout: Duration,
    workers: Arc<Semaphore>,
    stash: Mutex<Stash>,
}

impl Sender {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            attempts: config.connect_attempts.max(2),
            lock_timeout: config.write_lock_timeout,
            connect_timeout: config.connect_timeout,
            workers: Arc::new(Semaphore::new(config.send_workers.max(1))),
            stash: Mutex::new(Stash {
                enabled: true,
                pending: HashSet::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Public send operations
    // -----------------------------------------------------------------------

    /// Broadcast on the worker pool. The handle resolves to the report.
    pub fn send(&self, channel: &Channel, message: ChannelMessage) -> JoinHandle<DeliveryReport> {
        let channel = channel.clone();
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            let _permit = workers.acquire_owned().await.ok();
            channel.sender().send_sync(&channel, message).await
        })
    }

    /// Point-to-point send on the worker pool.
    pub fn send_to(
        &self,
        channel: &Channel,
        participant: Participant,
        message: ChannelMessage,
    ) -> JoinHandle<DeliveryReport> {
        let channel = channel.clone();
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            let _permit = workers.acquire_owned().await.ok();
            channel
                .sender()
                .send_sync_to(&channel, &participant, &message)
                .await
        })
    }

    /// Broadcast and wait for every recipient.
    ///
    /// Non-control messages are stashed while the node bootstraps; the
    /// returned report is then empty.
    pub async fn send_sync(&self, channel: &Channel, message: ChannelMessage) -> DeliveryReport {
        if !message.is_control() && self.stash_if_enabled(&message) {
            debug!(
                "Stashed {}/{} until bootstrap completes",
                message.channel_type(),
                message.message_type()
            );
            return DeliveryReport::new();
        }
        self.fan_out(channel, &message).await
    }

    /// Send to one participant and wait for the outcome.
    pub async fn send_sync_to(
        &self,
        channel: &Channel,
        participant: &Participant,
        message: &ChannelMessage,
    ) -> DeliveryReport {
        let connection = channel.connections().get_or_create(participant);
        let result = self.deliver(channel, &connection, message).await;
        DeliveryReport::single(participant.clone(), result)
    }

    /// Send over a specific connection, bound or not.
    pub(crate) async fn send_sync_on(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        message: &ChannelMessage,
    ) -> Result<(), ChannelError> {
        self.deliver(channel, connection, message).await
    }

    async fn fan_out(&self, channel: &Channel, message: &ChannelMessage) -> DeliveryReport {
        let recipients = channel.routing().participants_for(message);
        if recipients.is_empty() {
            debug!(
                "No listeners for {}/{}/{}",
                message.channel_type(),
                message.message_type(),
                message.identifier()
            );
            return DeliveryReport::new();
        }

        let deliveries = recipients
            .iter()
            .map(|participant| self.send_sync_to(channel, participant, message));
        let mut report = DeliveryReport::new();
        for outcome in join_all(deliveries).await {
            report.merge(outcome);
        }
        report
    }

    // -----------------------------------------------------------------------
    // Delivery with retry
    // -----------------------------------------------------------------------

    async fn deliver(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        message: &ChannelMessage,
    ) -> Result<(), ChannelError> {
        let mut slot = match connection.lock_writer(self.lock_timeout).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Send lock error for {}: {e}", connection.describe());
                return Err(e);
            }
        };

        let own = channel.self_participant();
        let mut outbound = message.clone();
        outbound.set_source(own.clone());
        let frame = outbound.to_json()?;

        let mut last_error: Option<ChannelError> = None;
        for attempt in 0..self.attempts {
            let step = RetryStep::plan(
                attempt,
                self.attempts,
                slot.is_some(),
                connection.ever_connected(),
            );
            match step {
                RetryStep::Drop => {
                    let reason = last_error
                        .take()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no attempt succeeded".to_string());
                    warn!(
                        "Dropping {} after {attempt} failed attempts: {reason}",
                        connection.describe()
                    );
                    channel.drop_connection(connection, &mut slot).await;
                    return Err(match connection.participant() {
                        Some(participant) => ChannelError::PeerDropped {
                            participant,
                            attempts: attempt,
                            reason,
                        },
                        None => ChannelError::NotConnected(connection.describe()),
                    });
                }
                RetryStep::OpenSilently | RetryStep::Reconnect => {
                    let announce = step == RetryStep::Reconnect;
                    if let Err(e) = self
                        .open(channel, connection, &mut slot, &own, announce)
                        .await
                    {
                        debug!("Attempt {attempt} to open {} failed: {e}", connection.describe());
                        last_error = Some(e);
                        continue;
                    }
                }
                RetryStep::Write => {}
            }

            match write(&mut slot, &frame).await {
                Ok(()) => {
                    debug!(
                        "Sent {}/{} to {}",
                        message.channel_type(),
                        message.message_type(),
                        connection.describe()
                    );
                    return Ok(());
                }
                Err(e) => {
                    debug!("Attempt {attempt} to write to {} failed: {e}", connection.describe());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ChannelError::NotConnected(connection.describe())))
    }

    /// Open a socket for `connection` and install it. With `announce`, the
    /// first frame on the new socket is RECONNECT so the peer swaps it into
    /// its existing connection record.
    async fn open(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        slot: &mut Option<PeerSink>,
        own: &Participant,
        announce: bool,
    ) -> Result<(), ChannelError> {
        let participant = connection
            .participant()
            .ok_or_else(|| ChannelError::NotConnected(connection.describe()))?;

        if announce {
            info!("Reconnecting to {participant}");
        }
        let (sink, stream) = transport::connect(&participant, self.connect_timeout).await?;
        connection.install(channel, slot, sink, stream).await;

        if announce {
            let mut reconnect = ChannelMessage::control(own.clone(), control::RECONNECT, Value::Void)?;
            reconnect.set_source(own.clone());
            write(slot, &reconnect.to_json()?).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stash
    // -----------------------------------------------------------------------

    /// Hold `message` if the stash is still enabled. Returns whether it was held.
    fn stash_if_enabled(&self, message: &ChannelMessage) -> bool {
        let mut stash = self.stash.lock();
        if stash.enabled {
            stash.pending.insert(message.clone());
            true
        } else {
            false
        }
    }

    /// Disable the stash and deliver everything it held.
    pub(crate) async fn unstash(&self, channel: &Channel) -> DeliveryReport {
        let pending: Vec<ChannelMessage> = {
            let mut stash = self.stash.lock();
            stash.enabled = false;
            stash.pending.drain().collect()
        };
        if !pending.is_empty() {
            info!("Flushing {} stashed messages", pending.len());
        }

        let mut report = DeliveryReport::new();
        for message in &pending {
            report.merge(self.fan_out(channel, message).await);
        }
        report
    }

    /// Hold broadcasts again until the next activation.
    pub(crate) fn restash(&self) {
        let mut stash = self.stash.lock();
        stash.enabled = true;
        stash.pending.clear();
    }

    pub fn is_stash_enabled(&self) -> bool {
        self.stash.lock().enabled
    }

    pub fn stash_len(&self) -> usize {
        self.stash.lock().pending.len()
    }

    // -----------------------------------------------------------------------
    // Listener announcements
    // -----------------------------------------------------------------------

    /// Announce newly registered local scopes to every peer whose filter
    /// accepts them. Scopes announced before are skipped.
    pub(crate) async fn announce(
        &self,
        channel: &Channel,
        scopes: &[MessageListenerData],
    ) -> DeliveryReport {
        let fresh = channel.announced().claim(scopes);
        self.broadcast_scopes(channel, control::LISTENER_ADD, &fresh).await
    }

    /// Withdraw local scopes that no longer have handlers.
    pub(crate) async fn revoke(
        &self,
        channel: &Channel,
        scopes: &[MessageListenerData],
    ) -> DeliveryReport {
        let released = channel.announced().release(scopes);
        self.broadcast_scopes(channel, control::LISTENER_REMOVE, &released)
            .await
    }

    async fn broadcast_scopes(
        &self,
        channel: &Channel,
        message_type: MessageType,
        scopes: &[MessageListenerData],
    ) -> DeliveryReport {
        let mut report = DeliveryReport::new();
        if scopes.is_empty() {
            return report;
        }
        let own = channel.self_participant();

        for connection in channel.connections().connections() {
            let Some(participant) = connection.participant() else {
                continue;
            };
            let accepted = match connection.filter() {
                Some(filter) => filter.filter(scopes),
                None => scopes.to_vec(),
            };
            if accepted.is_empty() {
                continue;
            }
            let result = match ChannelMessage::control(own.clone(), message_type, Value::Scopes(accepted)) {
                Ok(message) => self.deliver(channel, &connection, &message).await,
                Err(e) => Err(e),
            };
            report.record(participant, result);
        }
        report
    }

    /// Replay every announced scope the peer's filter accepts.
    pub(crate) async fn send_announced_to(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
    ) -> Result<(), ChannelError> {
        let scopes = channel.announced().filtered(connection.filter().as_ref());
        if scopes.is_empty() {
            return Ok(());
        }
        let message = ChannelMessage::control(
            channel.self_participant(),
            control::LISTENER_ADD,
            Value::Scopes(scopes),
        )?;
        self.deliver(channel, connection, &message).await
    }
}

async fn write(slot: &mut Option<PeerSink>, frame: &str) -> Result<(), ChannelError> {
    match slot.as_mut() {
        Some(sink) => sink.send_text(frame.to_string()).await,
        None => Err(ChannelError::Transport("No socket".to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_type::server;
    use crate::value::ServerStatus;

    fn steps(attempts: usize, has_socket: bool, ever_connected: bool) -> Vec<RetryStep> {
        (0..attempts)
            .map(|attempt| RetryStep::plan(attempt, attempts, has_socket, ever_connected))
            .collect()
    }

    #[test]
    fn test_retry_sequence_for_fresh_connection() {
        assert_eq!(
            steps(3, false, false),
            vec![RetryStep::OpenSilently, RetryStep::Reconnect, RetryStep::Drop]
        );
    }

    #[test]
    fn test_retry_sequence_for_live_socket() {
        // Reconnect fires at attempt N-2, one before abandonment.
        assert_eq!(
            steps(3, true, true),
            vec![RetryStep::Write, RetryStep::Reconnect, RetryStep::Drop]
        );
    }

    #[test]
    fn test_retry_sequence_for_lost_socket() {
        assert_eq!(
            steps(3, false, true),
            vec![RetryStep::Reconnect, RetryStep::Reconnect, RetryStep::Drop]
        );
    }

    #[test]
    fn test_retry_sequence_longer_budget() {
        assert_eq!(
            steps(5, true, true),
            vec![
                RetryStep::Write,
                RetryStep::Write,
                RetryStep::Write,
                RetryStep::Reconnect,
                RetryStep::Drop
            ]
        );
    }

    #[test]
    fn test_stash_collapses_equal_messages() {
        let sender = Sender::new(&ChannelConfig::default());
        let online = ChannelMessage::server("lobby", server::STATUS, ServerStatus::Online).unwrap();
        let offline =
            ChannelMessage::server("lobby", server::STATUS, ServerStatus::Offline).unwrap();

        assert!(sender.is_stash_enabled());
        assert!(sender.stash_if_enabled(&online));
        assert!(sender.stash_if_enabled(&online.clone()));
        assert!(sender.stash_if_enabled(&offline));
        assert_eq!(sender.stash_len(), 2);
    }

    #[test]
    fn test_disabled_stash_passes_through() {
        let sender = Sender::new(&ChannelConfig::default());
        sender.stash.lock().enabled = false;
        let message = ChannelMessage::server("lobby", server::STATUS, ServerStatus::Online).unwrap();
        assert!(!sender.stash_if_enabled(&message));
        assert_eq!(sender.stash_len(), 0);
    }

    #[test]
    fn test_attempt_budget_has_a_floor() {
        let mut config = ChannelConfig::default();
        config.connect_attempts = 0;
        let sender = Sender::new(&config);
        assert_eq!(sender.attempts, 2);
    }
}
