/*
    ABSTRACT: Definition of a thread-safe publisher which utilizes an intermediary message bus
    (see bus.rs) to send missives to their respective listeners (see listener.rs)
*/
use crate::{error::Result, sync::MessageBus, types::DispatchOutcome, Missive};

/// A thread-safe `Publisher` which publishes missives `M` to a list of listeners via a `MessageBus`.
pub trait Publisher<M: Missive> {
    fn publish(&self, missive: &M, bus: &MessageBus) -> Result<DispatchOutcome> {
        bus.send(missive)
    }
}
