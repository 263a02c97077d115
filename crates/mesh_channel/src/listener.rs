//! Local listeners, their registry and the dispatcher.
//!
//! A [`ChannelListener`] is a bundle of callbacks, each bound to one
//! (channel type, message type) pair. Registering a listener expands every
//! binding into scopes: one per identifier when identifiers are given, else
//! the wildcard scope. Unfiltered bindings always take the wildcard scope. Incoming messages are dispatched to the handlers of
//! their exact scope and of their wildcard scope.
//!
//! Plain handlers are queued on the host's [`SyncExecutor`]; async handlers
//! are awaited on the receive task that delivered the message, so they see
//! messages from one peer in order.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::channel_type::{ChannelType, Identifier};
use crate::error::ChannelError;
use crate::executor::SyncExecutor;
use crate::message::ChannelMessage;
use crate::message_type::MessageType;
use crate::scope::MessageListenerData;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

type SyncCallback = Arc<dyn Fn(&ChannelMessage) + Send + Sync>;
type AsyncCallback = Arc<dyn Fn(Arc<ChannelMessage>) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
enum Callback {
    Sync(SyncCallback),
    Async(AsyncCallback),
}

#[derive(Clone)]
struct Binding {
    channel_type: ChannelType,
    message_type: MessageType,
    callback: Callback,
    filtered: bool,
}

/// A set of typed callbacks registered together.
///
/// Clones share the listener's identity, so a clone can be used to remove
/// what the original registered.
#[derive(Clone)]
pub struct ChannelListener {
    id: u64,
    name: String,
    bindings: Vec<Binding>,
}

impl ChannelListener {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    /// Bind a callback run on the host's synchronous executor.
    pub fn on<F>(self, channel_type: ChannelType, message_type: MessageType, callback: F) -> Self
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        self.bind(channel_type, message_type, Callback::Sync(Arc::new(callback)), true)
    }

    /// Like [`on`](Self::on), but ignores the identifiers the listener is
    /// registered with and always listens on the wildcard scope.
    pub fn on_unfiltered<F>(
        self,
        channel_type: ChannelType,
        message_type: MessageType,
        callback: F,
    ) -> Self
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        self.bind(channel_type, message_type, Callback::Sync(Arc::new(callback)), false)
    }

    /// Bind an async callback awaited on the receiving task.
    pub fn on_async<F, Fut>(
        self,
        channel_type: ChannelType,
        message_type: MessageType,
        callback: F,
    ) -> Self
    where
        F: Fn(Arc<ChannelMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: AsyncCallback = Arc::new(move |message| callback(message).boxed());
        self.bind(channel_type, message_type, Callback::Async(callback), true)
    }

    /// Async counterpart of [`on_unfiltered`](Self::on_unfiltered).
    pub fn on_async_unfiltered<F, Fut>(
        self,
        channel_type: ChannelType,
        message_type: MessageType,
        callback: F,
    ) -> Self
    where
        F: Fn(Arc<ChannelMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: AsyncCallback = Arc::new(move |message| callback(message).boxed());
        self.bind(channel_type, message_type, Callback::Async(callback), false)
    }

    fn bind(
        mut self,
        channel_type: ChannelType,
        message_type: MessageType,
        callback: Callback,
        filtered: bool,
    ) -> Self {
        self.bindings.push(Binding {
            channel_type,
            message_type,
            callback,
            filtered,
        });
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every (channel type, message type) pair this listener binds.
    pub fn bindings(&self) -> Vec<(ChannelType, MessageType)> {
        self.bindings
            .iter()
            .map(|binding| (binding.channel_type, binding.message_type))
            .collect()
    }

    /// The scopes registering with `identifiers` would create.
    pub fn scopes(
        &self,
        identifiers: Option<&[Identifier]>,
    ) -> Result<Vec<MessageListenerData>, ChannelError> {
        let mut scopes = Vec::new();
        for binding in &self.bindings {
            for scope in self.binding_scopes(binding, identifiers)? {
                if !scopes.contains(&scope) {
                    scopes.push(scope);
                }
            }
        }
        Ok(scopes)
    }

    fn binding_scopes(
        &self,
        binding: &Binding,
        identifiers: Option<&[Identifier]>,
    ) -> Result<Vec<MessageListenerData>, ChannelError> {
        if !binding.channel_type.permits(&binding.message_type) {
            return Err(ChannelError::InconsistentListener(format!(
                "{} binds '{}' which is not a {} message type",
                self.name, binding.message_type, binding.channel_type
            )));
        }
        match identifiers.filter(|_| binding.filtered) {
            None => Ok(vec![MessageListenerData::wildcard(
                binding.channel_type,
                binding.message_type,
            )]),
            Some(identifiers) => identifiers
                .iter()
                .map(|identifier| {
                    MessageListenerData::new(
                        binding.channel_type,
                        binding.message_type,
                        Some(identifier.clone()),
                    )
                    .map_err(|e| {
                        ChannelError::InconsistentListener(format!(
                            "{} filters on {identifier}: {e}",
                            self.name
                        ))
                    })
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for ChannelListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListener")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bindings", &self.bindings())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Registration {
    listener_id: u64,
    binding: usize,
    callback: Callback,
}

/// Scope → registered callbacks.
#[derive(Default)]
pub struct ListenerRegistry {
    scopes: RwLock<HashMap<MessageListenerData, Vec<Registration>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`, returning the scopes that had no handler before.
    ///
    /// Fails without registering anything when a binding or an identifier
    /// does not fit its channel type. Registering the same listener for the
    /// same scope again is a no-op.
    pub fn add(
        &self,
        listener: &ChannelListener,
        identifiers: Option<&[Identifier]>,
    ) -> Result<Vec<MessageListenerData>, ChannelError> {
        let mut planned = Vec::new();
        for (index, binding) in listener.bindings.iter().enumerate() {
            for scope in listener.binding_scopes(binding, identifiers)? {
                planned.push((index, binding, scope));
            }
        }

        let mut scopes = self.scopes.write();
        let mut created = Vec::new();
        for (index, binding, scope) in planned {
            let entries = scopes.entry(scope.clone()).or_default();
            if entries
                .iter()
                .any(|entry| entry.listener_id == listener.id && entry.binding == index)
            {
                continue;
            }
            if entries.is_empty() && !created.contains(&scope) {
                created.push(scope.clone());
            }
            debug!("Listener {} registered for {scope}", listener.name);
            entries.push(Registration {
                listener_id: listener.id,
                binding: index,
                callback: binding.callback.clone(),
            });
        }
        Ok(created)
    }

    /// Remove `listener` from `only` (or from every scope when `None`),
    /// returning the scopes left without any handler.
    pub fn remove(
        &self,
        listener: &ChannelListener,
        only: Option<&[MessageListenerData]>,
    ) -> Vec<MessageListenerData> {
        let mut scopes = self.scopes.write();
        let mut emptied = Vec::new();
        scopes.retain(|scope, entries| {
            if only.is_some_and(|only| !only.contains(scope)) {
                return true;
            }
            let before = entries.len();
            entries.retain(|entry| entry.listener_id != listener.id);
            if entries.is_empty() && before > 0 {
                emptied.push(scope.clone());
                return false;
            }
            true
        });
        emptied
    }

    pub fn contains(&self, scope: &MessageListenerData) -> bool {
        self.scopes.read().contains_key(scope)
    }

    /// Registered scopes.
    pub fn scopes(&self) -> Vec<MessageListenerData> {
        self.scopes.read().keys().cloned().collect()
    }

    pub fn handler_count(&self, scope: &MessageListenerData) -> usize {
        self.scopes.read().get(scope).map_or(0, Vec::len)
    }

    /// Invoke every handler matching `message`. Returns how many matched.
    pub async fn dispatch(&self, message: ChannelMessage, executor: &dyn SyncExecutor) -> usize {
        let callbacks: Vec<Callback> = {
            let scopes = self.scopes.read();
            [
                MessageListenerData::of_message(&message),
                MessageListenerData::wildcard_of(&message),
            ]
            .iter()
            .filter_map(|scope| scopes.get(scope))
            .flat_map(|entries| entries.iter().map(|entry| entry.callback.clone()))
            .collect()
        };
        if callbacks.is_empty() {
            debug!(
                "No local handler for {}/{}/{}",
                message.channel_type(),
                message.message_type(),
                message.identifier()
            );
            return 0;
        }

        let message = Arc::new(message);
        for callback in &callbacks {
            match callback {
                Callback::Sync(callback) => {
                    let callback = Arc::clone(callback);
                    let message = Arc::clone(&message);
                    executor.run_sync(Box::new(move || callback(message.as_ref())));
                }
                Callback::Async(callback) => {
                    let run = AssertUnwindSafe(callback(Arc::clone(&message))).catch_unwind();
                    if run.await.is_err() {
                        warn!(
                            "Async handler for {}/{} panicked",
                            message.channel_type(),
                            message.message_type()
                        );
                    }
                }
            }
        }
        callbacks.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
