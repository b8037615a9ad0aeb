/*
    ABSTRACT: Definition of a single-thread publisher which utilizes an intermediary message bus
    (see bus.rs) to send missives to their respective listeners (see listener.rs)
*/
use crate::{error::Result, rc::MessageBus, types::DispatchOutcome, Missive};

/// A single-thread `Publisher` which publishes missives `M` to a list of listeners via a `MessageBus`.
pub trait Publisher<M: Missive> {
    fn publish(&self, missive: &M, bus: &MessageBus) -> Result<DispatchOutcome> {
        bus.send(missive)
    }
}
