//! Per-peer connections and the table of known peers.
//!
//! A [`ChannelConnection`] owns the write half of one socket behind a single
//! async lock, the handle of the task reading the other half, and what the
//! handshake taught us about the peer (its participant identity and its
//! listener filter). On reconnect the socket is swapped underneath the same
//! connection object, so identity, filter and routing entries survive.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{MutexGuard, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::Channel;
use crate::error::ChannelError;
use crate::identity::Participant;
use crate::receiver;
use crate::scope::ListenerFilter;
use crate::transport::{PeerSink, PeerStream};

/// Connection a receive task currently delivers into. Swapped on reconnect.
pub(crate) type ReceiverTarget = Arc<RwLock<Arc<ChannelConnection>>>;

/// Handle to a running receive task.
pub(crate) struct ReceiverHandle {
    pub(crate) target: ReceiverTarget,
    pub(crate) stop: Arc<Notify>,
    pub(crate) task: JoinHandle<()>,
}

impl ReceiverHandle {
    /// Ask the task to exit after the frame it is processing, if any.
    fn stop(self) {
        self.stop.notify_one();
        drop(self.task);
    }
}

/// A connection to one peer.
pub struct ChannelConnection {
    hostname: String,
    participant: RwLock<Option<Participant>>,
    filter: RwLock<Option<ListenerFilter>>,
    handshake_complete: AtomicBool,
    ever_connected: AtomicBool,
    writer: tokio::sync::Mutex<Option<PeerSink>>,
    receiver: Mutex<Option<ReceiverHandle>>,
}

impl ChannelConnection {
    /// A connection for a socket accepted from `hostname`, identity unknown.
    pub(crate) fn unbound(hostname: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            hostname: hostname.into(),
            participant: RwLock::new(None),
            filter: RwLock::new(None),
            handshake_complete: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(None),
            receiver: Mutex::new(None),
        })
    }

    /// A connection to a known participant whose socket is opened lazily.
    pub(crate) fn for_participant(participant: Participant) -> Arc<Self> {
        let connection = Self::unbound(participant.hostname());
        *connection.participant.write() = Some(participant);
        connection
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn participant(&self) -> Option<Participant> {
        self.participant.read().clone()
    }

    /// The listener filter the peer negotiated, once known.
    pub fn filter(&self) -> Option<ListenerFilter> {
        self.filter.read().clone()
    }

    pub fn has_filter(&self) -> bool {
        self.filter.read().is_some()
    }

    /// Identity and filter are both known.
    pub fn is_established(&self) -> bool {
        self.participant.read().is_some() && self.filter.read().is_some()
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete.load(Ordering::SeqCst)
    }

    pub(crate) fn bind(&self, participant: Participant) {
        *self.participant.write() = Some(participant);
    }

    pub(crate) fn set_filter(&self, filter: ListenerFilter) {
        *self.filter.write() = Some(filter);
    }

    pub(crate) fn mark_handshake_complete(&self) {
        self.handshake_complete.store(true, Ordering::SeqCst);
    }

    /// Whether a socket was ever installed on this connection.
    pub(crate) fn ever_connected(&self) -> bool {
        self.ever_connected.load(Ordering::SeqCst)
    }

    /// Acquire the write lock, waiting at most `timeout`.
    pub(crate) async fn lock_writer(
        &self,
        timeout: Duration,
    ) -> Result<MutexGuard<'_, Option<PeerSink>>, ChannelError> {
        tokio::time::timeout(timeout, self.writer.lock())
            .await
            .map_err(|_| ChannelError::LockTimeout(self.describe()))
    }

    /// Install a fresh socket: the sink goes into the locked slot and a new
    /// receive task starts reading the stream. Any previous socket is closed.
    pub(crate) async fn install(
        self: &Arc<Self>,
        channel: &Channel,
        slot: &mut Option<PeerSink>,
        sink: PeerSink,
        stream: PeerStream,
    ) {
        self.stop_receiver();
        if let Some(mut previous) = slot.take() {
            previous.close().await;
        }
        *slot = Some(sink);
        self.ever_connected.store(true, Ordering::SeqCst);

        let handle = receiver::spawn(channel.clone(), Arc::clone(self), stream);
        *self.receiver.lock() = Some(handle);
    }

    /// Install a socket accepted by the server.
    pub(crate) async fn install_accepted(
        self: &Arc<Self>,
        channel: &Channel,
        sink: PeerSink,
        stream: PeerStream,
    ) {
        let mut slot = self.writer.lock().await;
        self.install(channel, &mut slot, sink, stream).await;
    }

    /// Take over the socket and receive task of `fresh`, a connection just
    /// accepted from the same peer. Identity, filter and routing entries of
    /// `self` are kept.
    pub(crate) async fn adopt(self: &Arc<Self>, fresh: &Arc<ChannelConnection>) {
        let sink = fresh.writer.lock().await.take();
        let handle = fresh.receiver.lock().take();

        let mut slot = self.writer.lock().await;
        self.stop_receiver();
        if let Some(mut previous) = slot.take() {
            previous.close().await;
        }
        *slot = sink;
        self.ever_connected.store(true, Ordering::SeqCst);

        if let Some(handle) = handle {
            *handle.target.write() = Arc::clone(self);
            *self.receiver.lock() = Some(handle);
        }
        debug!("Connection {} adopted a replacement socket", self.describe());
    }

    /// Stop reading and close the socket held in `slot`.
    pub(crate) async fn shutdown(&self, slot: &mut Option<PeerSink>) {
        self.stop_receiver();
        if let Some(mut sink) = slot.take() {
            sink.close().await;
        }
    }

    /// Lock the writer and shut the socket down.
    pub async fn close(&self) {
        let mut slot = self.writer.lock().await;
        self.shutdown(&mut slot).await;
    }

    fn stop_receiver(&self) {
        if let Some(handle) = self.receiver.lock().take() {
            handle.stop();
        }
    }

    /// Human-readable name: the participant if known, else the hostname.
    pub fn describe(&self) -> String {
        match self.participant() {
            Some(participant) => participant.to_string(),
            None => format!("{} (unbound)", self.hostname),
        }
    }
}

impl std::fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("hostname", &self.hostname)
            .field("participant", &self.participant())
            .field("filter", &self.filter())
            .field("handshake_complete", &self.is_handshake_complete())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Connection table
// ---------------------------------------------------------------------------

/// Known connections keyed by participant, plus detached ones.
///
/// Detached connections are sockets that carry no routing identity: freshly
/// accepted sockets before their first control message, and connections that
/// were superseded by a newer one for the same participant.
#[derive(Default)]
pub struct ConnectionTable {
    by_participant: RwLock<HashMap<Participant, Arc<ChannelConnection>>>,
    detached: Mutex<Vec<Arc<ChannelConnection>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, participant: &Participant) -> Option<Arc<ChannelConnection>> {
        self.by_participant.read().get(participant).cloned()
    }

    /// The connection for `participant`, created unopened if unknown.
    pub(crate) fn get_or_create(&self, participant: &Participant) -> Arc<ChannelConnection> {
        if let Some(existing) = self.get(participant) {
            return existing;
        }
        let mut map = self.by_participant.write();
        Arc::clone(
            map.entry(participant.clone())
                .or_insert_with(|| ChannelConnection::for_participant(participant.clone())),
        )
    }

    /// Map `participant` to `connection`. A different connection previously
    /// mapped becomes detached.
    pub(crate) fn bind(&self, participant: &Participant, connection: &Arc<ChannelConnection>) {
        self.forget_detached(connection);
        let previous = self
            .by_participant
            .write()
            .insert(participant.clone(), Arc::clone(connection));
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, connection) {
                debug!("Connection for {participant} superseded");
                self.detached.lock().push(previous);
            }
        }
    }

    /// Map `participant` to `connection` only if it is not mapped yet.
    /// Returns whether the mapping was made.
    pub(crate) fn bind_if_absent(
        &self,
        participant: &Participant,
        connection: &Arc<ChannelConnection>,
    ) -> bool {
        let mut map = self.by_participant.write();
        if map.contains_key(participant) {
            return false;
        }
        map.insert(participant.clone(), Arc::clone(connection));
        drop(map);
        self.forget_detached(connection);
        true
    }

    /// Remove the mapping for `participant` if it still points at `connection`.
    pub(crate) fn remove(&self, participant: &Participant, connection: &Arc<ChannelConnection>) -> bool {
        let mut map = self.by_participant.write();
        match map.get(participant) {
            Some(current) if Arc::ptr_eq(current, connection) => {
                map.remove(participant);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn add_detached(&self, connection: Arc<ChannelConnection>) {
        self.detached.lock().push(connection);
    }

    pub(crate) fn forget_detached(&self, connection: &Arc<ChannelConnection>) {
        self.detached
            .lock()
            .retain(|candidate| !Arc::ptr_eq(candidate, connection));
    }

    pub fn contains(&self, participant: &Participant) -> bool {
        self.by_participant.read().contains_key(participant)
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.by_participant.read().keys().cloned().collect()
    }

    pub fn connections(&self) -> Vec<Arc<ChannelConnection>> {
        self.by_participant.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_participant.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_participant.read().is_empty()
    }

    pub fn detached_len(&self) -> usize {
        self.detached.lock().len()
    }

    /// Every known connection carries a negotiated filter.
    pub fn all_filtered(&self) -> bool {
        self.by_participant
            .read()
            .values()
            .all(|connection| connection.has_filter())
    }

    /// Empty the table, returning every connection it held.
    pub(crate) fn drain(&self) -> Vec<Arc<ChannelConnection>> {
        let mut all: Vec<_> = self.by_participant.write().drain().map(|(_, c)| c).collect();
        all.append(&mut self.detached.lock());
        all
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
