//! Channel: the node-level orchestrator.
//!
//! A [`Channel`] is a cheaply cloneable handle around one shared manager
//! that owns the server socket, the connection table, the routing table,
//! the sender, the control protocol handler, the listener registry and the
//! heartbeat monitor. Every background task holds a clone; there is no
//! global instance.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel_type::{ChannelType, Identifier};
use crate::config::ChannelConfig;
use crate::connection::{ChannelConnection, ConnectionTable};
use crate::control::ControlHandler;
use crate::error::ChannelError;
use crate::executor::{QueueExecutor, SyncExecutor};
use crate::heartbeat::Heartbeat;
use crate::identity::{Host, Participant};
use crate::listener::{ChannelListener, ListenerRegistry};
use crate::message::ChannelMessage;
use crate::message_type::control;
use crate::report::DeliveryReport;
use crate::routing::{AnnouncedScopes, RoutingTable};
use crate::scope::{ListenerFilter, MessageListenerData};
use crate::sender::Sender;
use crate::transport::{self, Accepted, PeerSink};
use crate::value::Value;

/// Bootstrap progress of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Started, handshakes with the peers known at bootstrap still pending.
    Bootstrapping,
    /// Handshaken with every peer known at bootstrap. Lasts until `stop()`.
    Active,
}

struct ChannelInner {
    config: ChannelConfig,
    own: RwLock<Participant>,
    connections: ConnectionTable,
    routing: RoutingTable,
    announced: AnnouncedScopes,
    /// Held across a registry change and the matching announcement.
    registration: tokio::sync::Mutex<()>,
    sender: Sender,
    control: ControlHandler,
    listeners: ListenerRegistry,
    executor: Arc<dyn SyncExecutor>,
    heartbeat: Heartbeat,
    state: watch::Sender<NodeState>,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
}

/// One node of the mesh.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// A channel whose synchronous listeners run on a dedicated queue thread.
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_executor(config, Arc::new(QueueExecutor::new()))
    }

    /// A channel whose synchronous listeners run on `executor`.
    pub fn with_executor(config: ChannelConfig, executor: Arc<dyn SyncExecutor>) -> Self {
        let own = Participant::from(config.host.clone());
        let routing = RoutingTable::new();
        routing.set_self(own.clone());
        let (state, _) = watch::channel(NodeState::Bootstrapping);

        Self {
            inner: Arc::new(ChannelInner {
                sender: Sender::new(&config),
                config,
                own: RwLock::new(own),
                connections: ConnectionTable::new(),
                routing,
                announced: AnnouncedScopes::new(),
                registration: tokio::sync::Mutex::new(()),
                control: ControlHandler::new(),
                listeners: ListenerRegistry::new(),
                executor,
                heartbeat: Heartbeat::new(),
                state,
                running: AtomicBool::new(false),
                shutdown_tx: Mutex::new(None),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Bind the server socket and start the background loops.
    pub async fn start(&self) -> Result<(), ChannelError> {
        if self.is_running() {
            return Ok(());
        }

        let config = &self.inner.config;
        let listener = transport::bind(&config.listen_hostname, config.host.port).await?;
        let port = listener.local_addr()?.port();
        let own = Participant::new(config.host.hostname.clone(), port);
        *self.inner.own.write() = own.clone();
        self.inner.routing.set_self(own.clone());

        let (shutdown_tx, _) = broadcast::channel(8);
        *self.inner.shutdown_tx.lock() = Some(shutdown_tx.clone());
        self.inner.running.store(true, Ordering::SeqCst);

        let (accepted_tx, mut accepted_rx) = mpsc::channel::<Accepted>(64);
        tokio::spawn(transport::serve(listener, accepted_tx, shutdown_tx.subscribe()));

        let channel = self.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = accepted_rx.recv() => match accepted {
                        Some(accepted) => channel.attach_accepted(accepted).await,
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
        });

        if let Some(interval) = config.heartbeat_interval {
            let channel = self.clone();
            let shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move {
                channel.inner.heartbeat.run(&channel, interval, shutdown).await;
            });
        }

        info!("Channel started as {own}");
        Ok(())
    }

    /// Leave the network: CLOSE to every established peer, then close every
    /// connection and forget all routes. A no-op when not running.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let own = self.self_participant();
        info!("Channel {own} stopping");

        match ChannelMessage::control(own, control::CLOSE, Value::Void) {
            Ok(close) => {
                for connection in self.inner.connections.connections() {
                    if !connection.is_established() {
                        continue;
                    }
                    if let Err(e) = self.inner.sender.send_sync_on(self, &connection, &close).await {
                        debug!("CLOSE to {} failed: {e}", connection.describe());
                    }
                }
            }
            Err(e) => warn!("Cannot build CLOSE: {e}"),
        }

        if let Some(shutdown_tx) = self.inner.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(());
        }
        for connection in self.inner.connections.drain() {
            connection.close().await;
        }
        self.inner.routing.clear();
        self.inner.heartbeat.reset();
        // A restarted channel bootstraps again. Local listeners and their
        // announced scopes survive and are replayed in the next handshakes.
        self.inner.sender.restash();
        self.inner.state.send_replace(NodeState::Bootstrapping);
        info!("Channel stopped");
    }

    /// Found a new network: there is nobody to handshake with.
    pub async fn self_init(&self) -> Result<(), ChannelError> {
        if !self.is_running() {
            return Err(ChannelError::NotRunning);
        }
        info!("{} founds a new network", self.self_participant());
        self.activate().await;
        Ok(())
    }

    /// Join the network through `seed` and wait until this node is active.
    ///
    /// INIT is retried every `register_retry_interval` while the seed is
    /// unreachable. The whole operation fails with a timeout after `timeout`.
    pub async fn register_to_network(&self, seed: Host, timeout: Duration) -> Result<(), ChannelError> {
        if !self.is_running() {
            return Err(ChannelError::NotRunning);
        }
        let seed = Participant::from(seed);
        if seed == self.self_participant() {
            return self.self_init().await;
        }

        let deadline = Instant::now() + timeout;
        let retry_interval = self.inner.config.register_retry_interval;
        loop {
            let report = self.send_init(&seed).await;
            if report.is_successful() {
                break;
            }
            for (participant, e) in report.failures() {
                debug!("INIT to seed {participant} failed: {e}");
            }
            if Instant::now() + retry_interval >= deadline {
                warn!("Seed {seed} unreachable, giving up");
                return Err(ChannelError::Timeout(timeout));
            }
            tokio::time::sleep(retry_interval).await;
        }
        info!("Registered with seed {seed}");

        let request = ChannelMessage::control(self.self_participant(), control::HOSTS_REQUEST, Value::Void)?;
        let report = self.inner.sender.send_sync_to(self, &seed, &request).await;
        for (participant, e) in report.failures() {
            warn!("HOSTS_REQUEST to {participant} failed: {e}");
        }

        let mut state = self.inner.state.subscribe();
        match tokio::time::timeout_at(deadline, state.wait_for(|s| *s == NodeState::Active)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ChannelError::NotRunning),
            Err(_) => Err(ChannelError::Timeout(timeout)),
        }
    }

    /// Join through the configured seed, or found a network without one.
    pub async fn bootstrap(&self) -> Result<(), ChannelError> {
        match self.inner.config.seed.clone() {
            Some(seed) => {
                self.register_to_network(seed, self.inner.config.register_timeout)
                    .await
            }
            None => self.self_init().await,
        }
    }

    /// Leave bootstrapping and flush the stash. Later calls do nothing.
    pub(crate) async fn activate(&self) {
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == NodeState::Bootstrapping {
                *state = NodeState::Active;
                true
            } else {
                false
            }
        });
        if !changed {
            return;
        }
        info!("Channel {} is active", self.self_participant());
        let report = self.inner.sender.unstash(self).await;
        for (participant, e) in report.failures() {
            warn!("Stashed delivery to {participant} failed: {e}");
        }
    }

    pub(crate) async fn send_init(&self, participant: &Participant) -> DeliveryReport {
        let init = ChannelMessage::control(
            self.self_participant(),
            control::INIT,
            Value::Filter(self.listener_filter()),
        );
        match init {
            Ok(init) => self.inner.sender.send_sync_to(self, participant, &init).await,
            Err(e) => DeliveryReport::single(participant.clone(), Err(e)),
        }
    }

    async fn attach_accepted(&self, accepted: Accepted) {
        let connection = ChannelConnection::unbound(accepted.addr.ip().to_string());
        self.inner.connections.add_detached(Arc::clone(&connection));
        connection
            .install_accepted(self, accepted.sink, accepted.stream)
            .await;
        debug!("Attached socket from {}", accepted.addr);
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register `listener` on the wildcard scope of each of its bindings.
    pub async fn add_listener(&self, listener: &ChannelListener) -> Result<(), ChannelError> {
        self.register_listener(listener, None).await
    }

    /// Register `listener` only for messages addressed to `identifiers`.
    pub async fn add_listener_for(
        &self,
        listener: &ChannelListener,
        identifiers: &[Identifier],
    ) -> Result<(), ChannelError> {
        self.register_listener(listener, Some(identifiers)).await
    }

    async fn register_listener(
        &self,
        listener: &ChannelListener,
        identifiers: Option<&[Identifier]>,
    ) -> Result<(), ChannelError> {
        let _registration = self.inner.registration.lock().await;
        let created = self.inner.listeners.add(listener, identifiers)?;
        if created.is_empty() {
            return Ok(());
        }
        let report = self.inner.sender.announce(self, &created).await;
        for (participant, e) in report.failures() {
            warn!("LISTENER_ADD to {participant} failed: {e}");
        }
        Ok(())
    }

    /// Unregister `listener` from `scopes`, or from everything when `None`.
    /// Scopes left without handlers are withdrawn from the peers.
    pub async fn remove_listener(
        &self,
        listener: &ChannelListener,
        scopes: Option<&[MessageListenerData]>,
    ) {
        let _registration = self.inner.registration.lock().await;
        let emptied = self.inner.listeners.remove(listener, scopes);
        if emptied.is_empty() {
            return;
        }
        let report = self.inner.sender.revoke(self, &emptied).await;
        for (participant, e) in report.failures() {
            warn!("LISTENER_REMOVE to {participant} failed: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Broadcast on the worker pool.
    pub fn send_message(&self, message: ChannelMessage) -> JoinHandle<DeliveryReport> {
        self.inner.sender.send(self, message)
    }

    /// Broadcast and wait for every recipient.
    pub async fn send_message_sync(&self, message: ChannelMessage) -> DeliveryReport {
        self.inner.sender.send_sync(self, message).await
    }

    /// Point-to-point send on the worker pool.
    pub fn send_message_to(
        &self,
        participant: Participant,
        message: ChannelMessage,
    ) -> JoinHandle<DeliveryReport> {
        self.inner.sender.send_to(self, participant, message)
    }

    /// Point-to-point send, waiting for the outcome.
    pub async fn send_message_sync_to(
        &self,
        participant: &Participant,
        message: &ChannelMessage,
    ) -> DeliveryReport {
        self.inner.sender.send_sync_to(self, participant, message).await
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    /// Route one decoded message arriving on `connection`.
    pub(crate) async fn handle_incoming(
        &self,
        connection: &Arc<ChannelConnection>,
        message: ChannelMessage,
    ) {
        match message.channel_type() {
            ChannelType::Control => {
                self.inner.control.handle(self, connection, message).await;
            }
            ChannelType::Heartbeat => {
                self.inner.heartbeat.handle(self, connection, message).await;
            }
            _ => {
                self.inner
                    .listeners
                    .dispatch(message, self.inner.executor.as_ref())
                    .await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Disconnection
    // -----------------------------------------------------------------------

    /// Forget `participant`: drop its routes and close its connection.
    pub async fn disconnect(&self, participant: &Participant) {
        self.inner.routing.remove_participant(participant);
        if let Some(connection) = self.inner.connections.get(participant) {
            self.inner.connections.remove(participant, &connection);
            connection.close().await;
            info!("Disconnected {participant}");
        }
    }

    /// Close `connection` and whatever connection is mapped to `participant`.
    pub(crate) async fn disconnect_connection(
        &self,
        participant: &Participant,
        connection: &Arc<ChannelConnection>,
    ) {
        self.disconnect(participant).await;
        self.inner.connections.forget_detached(connection);
        connection.close().await;
    }

    /// Drop a peer whose delivery failed on every attempt. The caller holds
    /// the connection's write lock and passes its slot.
    pub(crate) async fn drop_connection(
        &self,
        connection: &Arc<ChannelConnection>,
        slot: &mut Option<PeerSink>,
    ) {
        if let Some(participant) = connection.participant() {
            self.inner.routing.remove_participant(&participant);
            self.inner.connections.remove(&participant, connection);
        }
        self.inner.connections.forget_detached(connection);
        connection.shutdown(slot).await;
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> NodeState {
        *self.inner.state.borrow()
    }

    /// This node's identity. The port is final once [`start`](Self::start)
    /// returned.
    pub fn self_participant(&self) -> Participant {
        self.inner.own.read().clone()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// The filter this node negotiates with its peers.
    pub fn listener_filter(&self) -> ListenerFilter {
        self.inner.config.listener_filter.clone()
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.inner.connections
    }

    pub fn connection(&self, participant: &Participant) -> Option<Arc<ChannelConnection>> {
        self.inner.connections.get(participant)
    }

    pub fn known_participants(&self) -> Vec<Participant> {
        self.inner.connections.participants()
    }

    /// Peers that would receive `message` right now.
    pub fn listener_participants(&self, message: &ChannelMessage) -> HashSet<Participant> {
        self.inner.routing.participants_for(message)
    }

    /// Scopes with at least one local handler.
    pub fn local_scopes(&self) -> Vec<MessageListenerData> {
        self.inner.listeners.scopes()
    }

    /// Sockets that replaced a known connection's socket through RECONNECT.
    pub fn reconnects_accepted(&self) -> usize {
        self.inner.control.reconnects_accepted()
    }

    pub fn sender(&self) -> &Sender {
        &self.inner.sender
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.inner.routing
    }

    pub(crate) fn announced(&self) -> &AnnouncedScopes {
        &self.inner.announced
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("participant", &self.self_participant())
            .field("state", &self.state())
            .field("running", &self.is_running())
            .field("connections", &self.inner.connections.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::executor::InlineExecutor;
    use crate::message_type::server;
    use crate::value::ServerStatus;

    fn local_channel() -> Channel {
        Channel::with_executor(ChannelConfig::local(), Arc::new(InlineExecutor))
    }

    #[tokio::test]
    async fn test_start_assigns_ephemeral_port() {
        let channel = local_channel();
        assert_eq!(channel.self_participant().port(), 0);
        channel.start().await.unwrap();
        assert!(channel.is_running());
        assert_ne!(channel.self_participant().port(), 0);
        channel.stop().await;
        assert!(!channel.is_running());
    }

    #[tokio::test]
    async fn test_self_init_requires_running() {
        let channel = local_channel();
        assert!(matches!(channel.self_init().await, Err(ChannelError::NotRunning)));
    }

    #[tokio::test]
    async fn test_self_init_activates() {
        let channel = local_channel();
        channel.start().await.unwrap();
        assert_eq!(channel.state(), NodeState::Bootstrapping);
        channel.self_init().await.unwrap();
        assert_eq!(channel.state(), NodeState::Active);
        assert!(!channel.sender().is_stash_enabled());
        channel.stop().await;
    }

    #[tokio::test]
    async fn test_messages_stash_until_active() {
        let channel = local_channel();
        channel.start().await.unwrap();

        let message = ChannelMessage::server("lobby", server::STATUS, ServerStatus::Online).unwrap();
        let report = channel.send_message_sync(message.clone()).await;
        assert!(report.is_empty());
        channel.send_message_sync(message).await;
        assert_eq!(channel.sender().stash_len(), 1);

        channel.self_init().await.unwrap();
        assert_eq!(channel.sender().stash_len(), 0);
        channel.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let channel = local_channel();
        channel.stop().await;
        channel.start().await.unwrap();
        channel.stop().await;
        channel.stop().await;
        assert!(channel.known_participants().is_empty());
    }

    #[tokio::test]
    async fn test_stop_resets_bootstrap_state() {
        let channel = local_channel();
        channel.start().await.unwrap();
        channel.self_init().await.unwrap();
        assert_eq!(channel.state(), NodeState::Active);

        channel.stop().await;
        assert_eq!(channel.state(), NodeState::Bootstrapping);
        assert!(channel.sender().is_stash_enabled());

        channel.start().await.unwrap();
        let message = ChannelMessage::server("lobby", server::STATUS, ServerStatus::Online).unwrap();
        channel.send_message_sync(message).await;
        assert_eq!(channel.sender().stash_len(), 1);
        channel.self_init().await.unwrap();
        assert_eq!(channel.sender().stash_len(), 0);
        channel.stop().await;
    }

    #[tokio::test]
    async fn test_restarted_channel_handshakes_again() {
        let seed = local_channel();
        seed.start().await.unwrap();
        seed.self_init().await.unwrap();
        let seed_participant = seed.self_participant();
        let seed_host = Host::new("127.0.0.1", seed_participant.port());

        let joiner = local_channel();
        joiner.start().await.unwrap();
        joiner
            .register_to_network(seed_host.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        joiner.stop().await;
        assert!(joiner.connection(&seed_participant).is_none());

        joiner.start().await.unwrap();
        assert_eq!(joiner.state(), NodeState::Bootstrapping);
        joiner
            .register_to_network(seed_host, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(joiner.state(), NodeState::Active);
        let connection = joiner.connection(&seed_participant).unwrap();
        assert!(connection.is_established());

        joiner.stop().await;
        seed.stop().await;
    }

    #[tokio::test]
    async fn test_lock_timeout_fails_only_that_recipient() {
        let mut config = ChannelConfig::local();
        config.write_lock_timeout = Duration::from_millis(200);
        let seed = Channel::with_executor(config, Arc::new(InlineExecutor));
        seed.start().await.unwrap();
        seed.self_init().await.unwrap();
        let seed_host = Host::new("127.0.0.1", seed.self_participant().port());

        let hits = Arc::new(AtomicUsize::new(0));
        let mut peers = Vec::new();
        for _ in 0..2 {
            let peer = local_channel();
            peer.start().await.unwrap();
            peer.register_to_network(seed_host.clone(), Duration::from_secs(5))
                .await
                .unwrap();
            let counter = Arc::clone(&hits);
            let listener = ChannelListener::new("status").on(
                ChannelType::Server,
                server::STATUS,
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            );
            peer.add_listener(&listener).await.unwrap();
            peers.push(peer);
        }

        let message = ChannelMessage::server("lobby", server::STATUS, ServerStatus::Online).unwrap();
        let routed = tokio::time::timeout(Duration::from_secs(5), async {
            while seed.listener_participants(&message).len() < 2 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(routed.is_ok());

        let free = peers[0].self_participant();
        let busy = peers[1].self_participant();
        let connection = seed.connection(&busy).unwrap();
        let held = connection.lock_writer(Duration::from_secs(1)).await.unwrap();
        let report = seed.send_message_sync(message.clone()).await;
        drop(held);

        let failed: Vec<Participant> = report.failures().map(|(p, _)| p.clone()).collect();
        assert_eq!(failed, vec![busy.clone()]);
        assert!(matches!(report.get(&busy), Some(Err(ChannelError::LockTimeout(_)))));
        assert!(matches!(report.get(&free), Some(Ok(()))));

        let delivered = tokio::time::timeout(Duration::from_secs(5), async {
            while hits.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(delivered.is_ok());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A lock timeout is not a connection fault: the peer stays routed.
        assert!(seed.listener_participants(&message).contains(&busy));

        for peer in &peers {
            peer.stop().await;
        }
        seed.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_add_and_remove_keep_peers_consistent() {
        let seed = local_channel();
        seed.start().await.unwrap();
        seed.self_init().await.unwrap();
        let peer = local_channel();
        peer.start().await.unwrap();
        peer.register_to_network(
            Host::new("127.0.0.1", seed.self_participant().port()),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let listener =
            ChannelListener::new("flapping").on(ChannelType::Server, server::STATUS, |_| {});
        let scope = MessageListenerData::wildcard(ChannelType::Server, server::STATUS);
        let message = ChannelMessage::server("lobby", server::STATUS, ServerStatus::Online).unwrap();
        let peer_id = peer.self_participant();

        for round in 0..20 {
            let (added, ()) = tokio::join!(
                peer.add_listener(&listener),
                peer.remove_listener(&listener, None)
            );
            added.unwrap();
            if round % 3 == 0 {
                peer.remove_listener(&listener, None).await;
            }

            let registered = peer.local_scopes().contains(&scope);
            let settled = tokio::time::timeout(Duration::from_secs(5), async {
                while seed.listener_participants(&message).contains(&peer_id) != registered {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            assert!(settled.is_ok(), "round {round}: seed disagrees with registry ({registered})");
        }

        peer.stop().await;
        seed.stop().await;
    }

    #[tokio::test]
    async fn test_register_to_unreachable_seed_times_out() {
        let channel = local_channel();
        channel.start().await.unwrap();

        let listener = transport::bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = channel
            .register_to_network(Host::new("127.0.0.1", port), Duration::from_millis(600))
            .await;
        assert!(matches!(result, Err(ChannelError::Timeout(_))));
        assert!(channel.known_participants().is_empty());
        channel.stop().await;
    }

    #[tokio::test]
    async fn test_bootstrap_without_seed_founds_network() {
        let channel = local_channel();
        channel.start().await.unwrap();
        channel.bootstrap().await.unwrap();
        assert_eq!(channel.state(), NodeState::Active);
        channel.stop().await;
    }
}
