use crate::{
    config::{BusConfig, FailurePolicy},
    error::{BusError, DispatchFailures, ListenerError, ListenerFailure, ListenerResult, Result},
    Missive,
};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;
use uuid::Uuid;

/// Identity of a registered listener. Clones of a `Listener` share the same id, which is what the
/// buses use to keep registrations unique per message type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ListenerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The end result of a bus's `send` method, which results in one of the following:
///
/// 1. `NotNeeded`: No listener was registered for the message's type.
/// 2. `Finished`: Every listener in the snapshot handled the message.
/// 3. `FinishedWithFailures`: Every listener was invoked, but some of them failed (lenient mode only).
#[derive(Debug, Eq, PartialEq, Hash, Clone, Copy)]
pub enum DispatchOutcome {
    NotNeeded,
    Finished(usize),
    FinishedWithFailures { delivered: usize, failed: usize },
}

impl DispatchOutcome {
    /// Number of listeners that handled the message successfully
    pub fn delivered(&self) -> usize {
        match self {
            DispatchOutcome::NotNeeded => 0,
            DispatchOutcome::Finished(delivered) => *delivered,
            DispatchOutcome::FinishedWithFailures { delivered, .. } => *delivered,
        }
    }

    pub fn failed(&self) -> usize {
        match self {
            DispatchOutcome::FinishedWithFailures { failed, .. } => *failed,
            _ => 0,
        }
    }
}

/// Conversion from whatever a listener callback returns into a `ListenerResult`.
///
/// Callbacks that cannot fail return `()`, fallible ones return `Result<(), E>`.
pub trait IntoListenerResult {
    fn into_listener_result(self) -> ListenerResult;
}

impl IntoListenerResult for () {
    fn into_listener_result(self) -> ListenerResult {
        Ok(())
    }
}

impl<E> IntoListenerResult for std::result::Result<(), E>
where
    E: Into<ListenerError>,
{
    fn into_listener_result(self) -> ListenerResult {
        self.map_err(Into::into)
    }
}

/// What both bus flavours need from their listener handles to run a dispatch
pub(crate) trait Dispatchable<M> {
    fn listener_id(&self) -> ListenerId;

    /// `None` means the listener's subscriber has been dropped by its owner
    fn invoke(&self, missive: &M) -> Option<ListenerResult>;
}

/// Tally of a single pass over a listener snapshot
#[derive(Debug)]
pub(crate) struct DispatchRun {
    missive: &'static str,
    delivered: usize,
    failures: Vec<ListenerFailure>,
    dropped: usize,
}

impl DispatchRun {
    /// Whether the live registry holds dead subscribers that should be pruned
    pub(crate) fn requires_cleanup(&self) -> bool {
        self.dropped > 0
    }

    pub(crate) fn finish(self, policy: FailurePolicy) -> Result<DispatchOutcome> {
        if self.failures.is_empty() {
            return Ok(if self.delivered == 0 {
                DispatchOutcome::NotNeeded
            } else {
                DispatchOutcome::Finished(self.delivered)
            });
        }
        match policy {
            FailurePolicy::Lenient => Ok(DispatchOutcome::FinishedWithFailures {
                delivered: self.delivered,
                failed: self.failures.len(),
            }),
            FailurePolicy::Strict => Err(BusError::Dispatch(DispatchFailures {
                missive: self.missive,
                delivered: self.delivered,
                failures: self.failures,
            })),
        }
    }
}

/// Given a snapshot of listeners taken by a bus, this runs every listener in order on the given message.
///
/// Failures (returned errors, and panics when `isolate_panics` is set) are logged and tallied, but never
/// stop the rest of the snapshot from being invoked.
pub(crate) fn execute_listeners<M, L>(snapshot: &[L], missive: &M, config: &BusConfig) -> DispatchRun
where
    M: Missive,
    L: Dispatchable<M>,
{
    let mut run = DispatchRun {
        missive: M::name(),
        delivered: 0,
        failures: Vec::new(),
        dropped: 0,
    };
    for listener in snapshot {
        match invoke_isolated(listener, missive, config.isolate_panics) {
            Some(Ok(())) => run.delivered += 1,
            Some(Err(err)) => {
                let id = listener.listener_id();
                warn!(missive = run.missive, listener = %id, error = %err, "listener failed");
                run.failures.push(ListenerFailure {
                    listener: id,
                    missive: run.missive,
                    reason: err.to_string(),
                });
            }
            // Subscriber went away, the bus prunes it once the pass is over
            None => run.dropped += 1,
        }
    }
    run
}

fn invoke_isolated<M, L>(listener: &L, missive: &M, isolate_panics: bool) -> Option<ListenerResult>
where
    L: Dispatchable<M>,
{
    if !isolate_panics {
        return listener.invoke(missive);
    }
    match panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(missive))) {
        Ok(result) => result,
        Err(payload) => Some(Err(
            format!("listener panicked: {}", panic_message(&*payload)).into(),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
