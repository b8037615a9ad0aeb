/*
    ABSTRACT: Definition of a thread-safe subscriber object which can be registered on an
    intermediary message bus (see bus.rs) that dispatches missives published to it.
*/
use crate::{error::ListenerResult, Missive};
use uuid::Uuid;

/// A thread-safe `Subscriber` which receives missives of type `M` from a `MessageBus`.
///
/// - The bus only keeps a weak reference to a subscriber (see `Listener::from_subscriber`), so dropping the
///   owning `Arc` is enough to stop receiving missives.
/// - `on_missive` may run on whichever thread publishes, so state belongs behind atomics or locks.
pub trait Subscriber<M: Missive>: Send + Sync {
    fn id(&self) -> &Uuid;
    fn on_missive(&self, missive: &M) -> ListenerResult;
}
