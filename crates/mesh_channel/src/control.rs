//! Control protocol: handshake, mesh discovery, reconnect and teardown.
//!
//! Join of P through seed S:
//!
//! ```text
//! P ── INIT(filter P) ──────────────▶ S   S binds the socket to P
//! P ◀──────────── INIT_ACK(filter S) ─ S
//! P ◀──────── LISTENER_ADD(scopes S) ─ S   filtered through P's filter
//! P ◀──────────────────── INIT_FIN ─── S
//! P ── LISTENER_ADD(scopes P) ───────▶ S   filtered through S's filter
//! P ── INIT_FIN ─────────────────────▶ S
//! ```
//!
//! A node leaves bootstrapping once every known connection carries a
//! filter. All control handling of one node is serialized.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::connection::ChannelConnection;
use crate::error::ChannelError;
use crate::identity::Participant;
use crate::message::ChannelMessage;
use crate::message_type::control;
use crate::scope::ListenerFilter;
use crate::value::Value;

#[derive(Default)]
pub(crate) struct ControlHandler {
    serial: tokio::sync::Mutex<()>,
    reconnects: AtomicUsize,
}

impl ControlHandler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of RECONNECTs that replaced the socket of a known connection.
    pub(crate) fn reconnects_accepted(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub(crate) async fn handle(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        message: ChannelMessage,
    ) {
        let Some(peer) = message.identifier().as_participant().cloned() else {
            warn!(
                "Control message {} from {} carries no participant",
                message.message_type(),
                connection.describe()
            );
            return;
        };

        let _serial = self.serial.lock().await;
        let result = match message.message_type() {
            control::INIT => self.on_init(channel, connection, peer, message.value()).await,
            control::INIT_ACK => self.on_init_ack(channel, connection, peer, message.value()).await,
            control::INIT_FIN => {
                self.on_init_fin(channel, connection, &peer).await;
                Ok(())
            }
            control::RECONNECT => {
                self.on_reconnect(channel, connection, peer).await;
                Ok(())
            }
            control::CLOSE => {
                info!("{peer} is leaving");
                channel.routing().remove_participant(&peer);
                channel.disconnect_connection(&peer, connection).await;
                Ok(())
            }
            control::HOSTS_REQUEST => {
                let known = channel.connections().participants();
                debug!("Sending {} known hosts to {peer}", known.len());
                let reply = ChannelMessage::control(
                    channel.self_participant(),
                    control::HOSTS_LIST,
                    Value::Participants(known),
                );
                match reply {
                    Ok(reply) => channel.sender().send_sync_on(channel, connection, &reply).await,
                    Err(e) => Err(e),
                }
            }
            control::HOSTS_LIST => {
                if let Some(hosts) = message.value().as_participants() {
                    self.on_hosts_list(channel, hosts).await;
                }
                Ok(())
            }
            control::LISTENER_ADD => {
                if let Some(scopes) = message.value().as_scopes() {
                    channel.routing().add(&peer, scopes);
                }
                Ok(())
            }
            control::LISTENER_REMOVE => {
                if let Some(scopes) = message.value().as_scopes() {
                    channel.routing().remove(&peer, scopes);
                }
                Ok(())
            }
            other => {
                warn!("Unhandled control message {other} from {peer}");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(
                "Handling {} from {} failed: {e}",
                message.message_type(),
                connection.describe()
            );
        }
    }

    async fn on_init(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        peer: Participant,
        value: &Value,
    ) -> Result<(), ChannelError> {
        info!("INIT from {peer}");
        let filter = value.as_filter().cloned().unwrap_or_default();
        connection.bind(peer.clone());
        connection.set_filter(filter);
        channel.connections().bind(&peer, connection);

        let own = channel.self_participant();
        let ack = ChannelMessage::control(
            own.clone(),
            control::INIT_ACK,
            Value::Filter(channel.listener_filter()),
        )?;
        let sender = channel.sender();
        sender.send_sync_on(channel, connection, &ack).await?;
        sender.send_announced_to(channel, connection).await?;
        let fin = ChannelMessage::control(own, control::INIT_FIN, Value::Void)?;
        sender.send_sync_on(channel, connection, &fin).await
    }

    async fn on_init_ack(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        peer: Participant,
        value: &Value,
    ) -> Result<(), ChannelError> {
        info!("INIT_ACK from {peer}");
        let filter: ListenerFilter = value.as_filter().cloned().unwrap_or_default();
        connection.bind(peer.clone());
        connection.set_filter(filter.clone());

        let table = channel.connections();
        if !table.bind_if_absent(&peer, connection) {
            if let Some(mapped) = table.get(&peer) {
                if !Arc::ptr_eq(&mapped, connection) && !mapped.has_filter() {
                    mapped.set_filter(filter);
                }
            }
        }

        let sender = channel.sender();
        sender.send_announced_to(channel, connection).await?;
        let fin = ChannelMessage::control(channel.self_participant(), control::INIT_FIN, Value::Void)?;
        sender.send_sync_on(channel, connection, &fin).await
    }

    async fn on_init_fin(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        peer: &Participant,
    ) {
        connection.mark_handshake_complete();
        info!("Handshake with {peer} complete");
        if channel.connections().all_filtered() {
            channel.activate().await;
        }
    }

    async fn on_reconnect(
        &self,
        channel: &Channel,
        connection: &Arc<ChannelConnection>,
        peer: Participant,
    ) {
        let table = channel.connections();
        match table.get(&peer) {
            Some(existing) if !Arc::ptr_eq(&existing, connection) => {
                existing.adopt(connection).await;
                table.forget_detached(connection);
                self.reconnects.fetch_add(1, Ordering::SeqCst);
                info!("{peer} reconnected");
            }
            Some(_) => {
                debug!("RECONNECT from {peer} on its current connection");
            }
            None => {
                warn!("RECONNECT from unknown {peer}, keeping the socket as a new connection");
                connection.bind(peer.clone());
                table.bind(&peer, connection);
            }
        }
    }

    /// Handshake with every listed participant not known yet.
    async fn on_hosts_list(&self, channel: &Channel, hosts: &[Participant]) {
        let own = channel.self_participant();
        for host in hosts {
            if *host == own || channel.connections().contains(host) {
                continue;
            }
            info!("Discovered {host}, joining");
            let report = channel.send_init(host).await;
            for (participant, e) in report.failures() {
                warn!("INIT to {participant} failed: {e}");
            }
        }
    }
}
