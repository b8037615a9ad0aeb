/*
    ABSTRACT: Definition of the single-thread listener handle registered on a message bus
    (see bus.rs), wrapping either a closure or a weakly held subscriber (see subscribe.rs)
*/
use crate::{
    error::ListenerResult,
    rc::Subscriber,
    types::{Dispatchable, IntoListenerResult, ListenerId},
    Missive,
};
use std::fmt;
use std::rc::{Rc, Weak};

enum Handler<M: Missive> {
    Callback(Rc<dyn Fn(&M) -> ListenerResult>),
    // Non-owning, so the bus never keeps a subscriber alive
    Subscriber(Weak<dyn Subscriber<M>>),
}

/// Single-thread handle to a callback receiving missives of type `M`.
///
/// Cloning a `Listener` keeps its `ListenerId`, so a clone can be used to remove the original from a bus.
pub struct Listener<M: Missive> {
    id: ListenerId,
    handler: Handler<M>,
}

impl<M: Missive> Listener<M> {
    /// Wraps a closure; `M` is inferred from the closure's parameter type.
    ///
    /// ```rust
    /// use missive::{messages::HelpToggled, rc::Listener};
    ///
    /// let listener = Listener::new(|help: &HelpToggled| println!("help shown: {}", help.state));
    /// ```
    pub fn new<F, R>(callback: F) -> Self
    where
        F: Fn(&M) -> R + 'static,
        R: IntoListenerResult,
    {
        Self {
            id: ListenerId::new(),
            handler: Handler::Callback(Rc::new(move |missive: &M| {
                callback(missive).into_listener_result()
            })),
        }
    }

    /// Listens through a `Subscriber` object, keyed by the subscriber's own id.
    pub fn from_subscriber<S: Subscriber<M> + 'static>(subscriber: &Rc<S>) -> Self {
        let subscriber: Rc<dyn Subscriber<M>> = subscriber.clone();
        Self {
            id: ListenerId::from(*subscriber.id()),
            handler: Handler::Subscriber(Rc::downgrade(&subscriber)),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// `false` once the subscriber behind this listener has been dropped
    pub fn is_alive(&self) -> bool {
        match &self.handler {
            Handler::Callback(_) => true,
            Handler::Subscriber(weak) => weak.strong_count() > 0,
        }
    }
}

impl<M: Missive> Dispatchable<M> for Listener<M> {
    fn listener_id(&self) -> ListenerId {
        self.id
    }

    fn invoke(&self, missive: &M) -> Option<ListenerResult> {
        match &self.handler {
            Handler::Callback(callback) => Some(callback(missive)),
            Handler::Subscriber(weak) => weak.upgrade().map(|sub| sub.on_missive(missive)),
        }
    }
}

impl<M: Missive> Clone for Listener<M> {
    fn clone(&self) -> Self {
        let handler = match &self.handler {
            Handler::Callback(callback) => Handler::Callback(Rc::clone(callback)),
            Handler::Subscriber(weak) => Handler::Subscriber(Weak::clone(weak)),
        };
        Self {
            id: self.id,
            handler,
        }
    }
}

impl<M: Missive> fmt::Debug for Listener<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("missive", &M::name())
            .field("alive", &self.is_alive())
            .finish()
    }
}
