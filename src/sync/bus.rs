/*
    ABSTRACT: Definition of the thread-safe message bus and its supporting datatypes to
    deliver missives (see missive.rs) from publishers (see publish.rs) to listeners
    (see listener.rs and subscribe.rs)
*/
use crate::{
    config::BusConfig,
    error::{BusError, Result},
    sync::{
        types::{ChannelMap, ListenerList},
        Listener,
    },
    types::{execute_listeners, DispatchOutcome},
    Missive,
};
use parking_lot::Mutex;
use std::any::TypeId;
use tracing::{debug, trace};

struct Registry {
    open: bool,
    channels: ChannelMap,
}

impl Registry {
    fn list<M: Missive>(&self) -> Option<&ListenerList<M>> {
        self.channels
            .get(&TypeId::of::<M>())
            .and_then(|list| list.downcast_ref::<ListenerList<M>>())
    }

    fn list_mut<M: Missive>(&mut self) -> Option<&mut ListenerList<M>> {
        self.channels
            .get_mut(&TypeId::of::<M>())
            .and_then(|list| list.downcast_mut::<ListenerList<M>>())
    }
}

/// Thread-safe datastructure responsible for dispatching missives from publishers to listeners
///
/// This keeps the respective Pub/Sub systems decoupled from each other
///
/// Share it as `Arc<MessageBus>` or by reference. A single lock guards the registry and is held only while
/// snapshotting or mutating it, never while a listener runs, so listeners may call back into the bus.
pub struct MessageBus {
    config: BusConfig,
    registry: Mutex<Registry>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::open(BusConfig::default())
    }
}

impl MessageBus {
    pub fn open(config: BusConfig) -> Self {
        debug!(policy = %config.failure_policy, isolate_panics = config.isolate_panics, "message bus opened");
        Self {
            config,
            registry: Mutex::new(Registry {
                open: true,
                channels: ChannelMap::default(),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.registry.lock().open
    }

    /// Drops every registration and refuses further use of this `MessageBus`
    ///
    /// ### Notes
    /// - Closing an already closed bus does nothing.
    pub fn close(&self) {
        let channels = {
            let mut registry = self.registry.lock();
            if !registry.open {
                return;
            }
            registry.open = false;
            std::mem::take(&mut registry.channels)
        };
        debug!(channels = channels.len(), "message bus closed");
        drop(channels);
    }

    /// Adds the given `Listener` to the listener list of its missive type
    ///
    /// ### Returns
    /// - `bool`: `false` if a listener with the same id is already registered for `M`, or if the bus is closed.
    pub fn add_listener<M: Missive>(&self, listener: &Listener<M>) -> bool {
        let mut registry = self.registry.lock();
        if !registry.open {
            debug!(missive = M::name(), listener = %listener.id(), "bus is closed, listener refused");
            return false;
        }
        let Some(list) = registry
            .channels
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(ListenerList::<M>::new()))
            .downcast_mut::<ListenerList<M>>()
        else {
            return false;
        };
        // A dropped subscriber may have left its id behind
        list.retain(Listener::is_alive);
        if list.iter().any(|registered| registered.id() == listener.id()) {
            trace!(missive = M::name(), listener = %listener.id(), "listener already registered");
            return false;
        }
        list.push(listener.clone());
        debug!(missive = M::name(), listener = %listener.id(), listeners = list.len(), "listener added");
        true
    }

    /// Removes the given `Listener` from the listener list of its missive type
    ///
    /// ### Notes
    /// - Registration order of the remaining listeners is preserved.
    /// - A dispatch already in progress still reaches this listener if its snapshot contains it.
    ///
    /// ### Returns
    /// - `bool`: `true` if the listener was registered and has been removed.
    pub fn remove_listener<M: Missive>(&self, listener: &Listener<M>) -> bool {
        let removed = {
            let mut registry = self.registry.lock();
            let Some(list) = registry.list_mut::<M>() else {
                return false;
            };
            let Some(idx) = list
                .iter()
                .position(|registered| registered.id() == listener.id())
            else {
                return false;
            };
            let removed = list.remove(idx);
            let remaining = list.len();
            if remaining == 0 {
                registry.channels.remove(&TypeId::of::<M>());
            }
            debug!(missive = M::name(), listener = %listener.id(), listeners = remaining, "listener removed");
            removed
        };
        // Released outside of the lock, the callback's captures may call back into the bus on drop
        drop(removed);
        true
    }

    /// Removes every `Listener` registered for `M`, returning how many live ones there were
    pub fn remove_all_listeners<M: Missive>(&self) -> usize {
        let removed = self.registry.lock().channels.remove(&TypeId::of::<M>());
        let count = removed
            .as_ref()
            .and_then(|list| list.downcast_ref::<ListenerList<M>>())
            .map_or(0, |list| list.iter().filter(|l| l.is_alive()).count());
        if count > 0 {
            debug!(missive = M::name(), listeners = count, "all listeners removed");
        }
        count
    }

    /// Removes all listeners from this `MessageBus`, leaving it open
    pub fn clear(&self) {
        let channels = std::mem::take(&mut self.registry.lock().channels);
        debug!(channels = channels.len(), "message bus cleared");
        drop(channels);
    }

    /// Number of live listeners registered for `M`
    pub fn listener_count<M: Missive>(&self) -> usize {
        self.registry
            .lock()
            .list::<M>()
            .map_or(0, |list| list.iter().filter(|l| l.is_alive()).count())
    }

    pub fn has_listeners<M: Missive>(&self) -> bool {
        self.listener_count::<M>() > 0
    }

    /// Dispatches the given missive to every `Listener` registered for its exact type, in registration order,
    /// on the calling thread
    ///
    /// ### Notes
    /// - The listener list is snapshotted under the lock, which is released before the first invocation.
    /// - Automatically removes any dropped subscribers encountered during the dispatch.
    /// - Failing listeners never stop the rest of the snapshot. How they are reported depends on `BusConfig::failure_policy`.
    pub fn send<M: Missive>(&self, missive: &M) -> Result<DispatchOutcome> {
        let snapshot: ListenerList<M> = {
            let registry = self.registry.lock();
            if !registry.open {
                return Err(BusError::Closed);
            }
            match registry.list::<M>() {
                Some(list) => list.clone(),
                None => {
                    trace!(missive = M::name(), "no listeners");
                    return Ok(DispatchOutcome::NotNeeded);
                }
            }
        };
        trace!(missive = M::name(), listeners = snapshot.len(), "dispatching");

        let run = execute_listeners(&snapshot, missive, &self.config);
        if run.requires_cleanup() {
            self.prune_dropped::<M>();
        }
        run.finish(self.config.failure_policy)
    }

    fn prune_dropped<M: Missive>(&self) {
        let mut registry = self.registry.lock();
        let Some(list) = registry.list_mut::<M>() else {
            return;
        };
        let before = list.len();
        list.retain(Listener::is_alive);
        let remaining = list.len();
        if remaining == 0 {
            registry.channels.remove(&TypeId::of::<M>());
        }
        debug!(missive = M::name(), pruned = before - remaining, "dropped subscribers pruned");
    }
}
