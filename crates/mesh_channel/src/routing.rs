//! Routing table and the set of locally announced scopes.
//!
//! The routing table is filled by LISTENER_ADD / LISTENER_REMOVE control
//! messages from peers and answers "who wants this message". The announced
//! set records which local scopes were broadcast to peers, so each scope is
//! announced once and can be replayed to peers that join later.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use crate::identity::Participant;
use crate::message::ChannelMessage;
use crate::scope::{ListenerFilter, MessageListenerData};

/// Scope → participants that asked to receive it.
#[derive(Default)]
pub struct RoutingTable {
    own: RwLock<Option<Participant>>,
    routes: RwLock<HashMap<MessageListenerData, HashSet<Participant>>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local identity; routes for it are never stored.
    pub(crate) fn set_self(&self, participant: Participant) {
        *self.own.write() = Some(participant);
    }

    /// Recipients of `message`: the exact scope plus the wildcard scope.
    pub fn participants_for(&self, message: &ChannelMessage) -> HashSet<Participant> {
        let routes = self.routes.read();
        let mut recipients = HashSet::new();
        for scope in [
            MessageListenerData::of_message(message),
            MessageListenerData::wildcard_of(message),
        ] {
            if let Some(participants) = routes.get(&scope) {
                recipients.extend(participants.iter().cloned());
            }
        }
        recipients
    }

    pub fn participants_for_scope(&self, scope: &MessageListenerData) -> HashSet<Participant> {
        self.routes.read().get(scope).cloned().unwrap_or_default()
    }

    pub(crate) fn add(&self, participant: &Participant, scopes: &[MessageListenerData]) {
        if self.own.read().as_ref() == Some(participant) {
            return;
        }
        let mut routes = self.routes.write();
        for scope in scopes {
            debug!("Routing {scope} to {participant}");
            routes
                .entry(scope.clone())
                .or_default()
                .insert(participant.clone());
        }
    }

    pub(crate) fn remove(&self, participant: &Participant, scopes: &[MessageListenerData]) {
        let mut routes = self.routes.write();
        for scope in scopes {
            if let Some(participants) = routes.get_mut(scope) {
                participants.remove(participant);
                if participants.is_empty() {
                    routes.remove(scope);
                }
            }
        }
    }

    /// Drop `participant` from every scope.
    pub(crate) fn remove_participant(&self, participant: &Participant) {
        let mut routes = self.routes.write();
        routes.retain(|_, participants| {
            participants.remove(participant);
            !participants.is_empty()
        });
    }

    pub(crate) fn clear(&self) {
        self.routes.write().clear();
    }

    pub fn scope_count(&self) -> usize {
        self.routes.read().len()
    }
}

/// Local scopes already announced to peers.
#[derive(Default)]
pub struct AnnouncedScopes {
    scopes: RwLock<HashSet<MessageListenerData>>,
}

impl AnnouncedScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `scopes`, returning the ones not announced before.
    pub(crate) fn claim(&self, scopes: &[MessageListenerData]) -> Vec<MessageListenerData> {
        let mut announced = self.scopes.write();
        scopes
            .iter()
            .filter(|scope| announced.insert((*scope).clone()))
            .cloned()
            .collect()
    }

    /// Forget `scopes`, returning the ones that had been announced.
    pub(crate) fn release(&self, scopes: &[MessageListenerData]) -> Vec<MessageListenerData> {
        let mut announced = self.scopes.write();
        scopes
            .iter()
            .filter(|scope| announced.remove(*scope))
            .cloned()
            .collect()
    }

    /// Every announced scope a peer with `filter` wants to hear about.
    /// `None` means the peer's filter is not known yet and accepts all.
    pub fn filtered(&self, filter: Option<&ListenerFilter>) -> Vec<MessageListenerData> {
        let announced = self.scopes.read();
        match filter {
            Some(filter) => filter.filter(announced.iter()),
            None => announced.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
