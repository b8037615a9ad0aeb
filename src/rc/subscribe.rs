/*
    ABSTRACT: Definition of a single-thread subscriber object which can be registered on an
    intermediary message bus (see bus.rs) that dispatches missives published to it.
*/
use crate::{error::ListenerResult, Missive};
use uuid::Uuid;

/// A single-thread `Subscriber` which receives missives of type `M` from a `MessageBus`.
///
/// - The bus only keeps a weak reference to a subscriber (see `Listener::from_subscriber`), so dropping the
///   owning `Rc` is enough to stop receiving missives.
/// - `id` must be stable for the lifetime of the subscriber; it is what makes registrations unique.
pub trait Subscriber<M: Missive> {
    fn id(&self) -> &Uuid;
    fn on_missive(&self, missive: &M) -> ListenerResult;
}
