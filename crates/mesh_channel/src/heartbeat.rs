//! Heartbeat liveness monitor.
//!
//! Each round first evaluates the previous one: a participant that did not
//! answer the last ping with a pong is dropped. Then every established
//! connection is pinged again. Heartbeat traffic never reaches listeners.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::connection::ChannelConnection;
use crate::identity::Participant;
use crate::message::ChannelMessage;
use crate::message_type::heartbeat;

#[derive(Default)]
pub(crate) struct Heartbeat {
    awaiting: Mutex<HashSet<Participant>>,
}

impl Heartbeat {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&self) {
        self.awaiting.lock().clear();
    }

    pub(crate) async fn handle(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        message: ChannelMessage,
    ) {
        let Some(peer) = message.identifier().as_participant().cloned() else {
            return;
        };
        match message.message_type() {
            heartbeat::PING => {
                let pong = match ChannelMessage::heartbeat(channel.self_participant(), heartbeat::PONG) {
                    Ok(pong) => pong,
                    Err(e) => {
                        warn!("Cannot build pong: {e}");
                        return;
                    }
                };
                if let Err(e) = channel.sender().send_sync_on(channel, connection, &pong).await {
                    debug!("Pong to {peer} failed: {e}");
                }
            }
            heartbeat::PONG => {
                self.awaiting.lock().remove(&peer);
            }
            _ => {}
        }
    }

    /// Run rounds every `interval` until shutdown.
    pub(crate) async fn run(
        &self,
        channel: &Channel,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Heartbeat every {interval:?}");
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.round(channel).await,
                _ = shutdown.recv() => {
                    debug!("Heartbeat stopped");
                    break;
                }
            }
        }
    }

    async fn round(&self, channel: &Channel) {
        let lost: Vec<Participant> = self.awaiting.lock().drain().collect();
        for participant in lost {
            warn!("Lost {participant}: no heartbeat answer");
            channel.disconnect(&participant).await;
        }

        let ping = match ChannelMessage::heartbeat(channel.self_participant(), heartbeat::PING) {
            Ok(ping) => ping,
            Err(e) => {
                warn!("Cannot build ping: {e}");
                return;
            }
        };
        for connection in channel.connections().connections() {
            if !connection.is_established() {
                continue;
            }
            let Some(participant) = connection.participant() else {
                continue;
            };
            self.awaiting.lock().insert(participant.clone());
            drop(channel.sender().send_to(channel, participant, ping.clone()));
        }
    }
}
