/*
    ABSTRACT: Error types surfaced by the message buses (see rc/bus.rs and sync/bus.rs)
    and the error type listeners may fail with.
*/
use crate::types::ListenerId;
use std::fmt;
use thiserror::Error;

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Error type a listener callback may fail with
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by listener callbacks
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Main error type for the message buses
#[derive(Error, Debug)]
pub enum BusError {
    /// The bus was closed before this call
    #[error("message bus is closed")]
    Closed,

    /// One or more listeners failed while the bus ran in strict mode
    #[error("{0}")]
    Dispatch(DispatchFailures),

    /// A configuration value could not be understood
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A single listener that failed during a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    pub listener: ListenerId,
    pub missive: &'static str,
    pub reason: String,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listener {} failed on {}: {}",
            self.listener, self.missive, self.reason
        )
    }
}

/// Aggregate of every listener failure from one strict-mode `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailures {
    pub missive: &'static str,
    pub delivered: usize,
    pub failures: Vec<ListenerFailure>,
}

impl DispatchFailures {
    /// Ids of the listeners that failed, in invocation order
    pub fn failed_listeners(&self) -> impl Iterator<Item = ListenerId> + '_ {
        self.failures.iter().map(|failure| failure.listener)
    }
}

impl fmt::Display for DispatchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} listener(s) failed on {}",
            self.failures.len(),
            self.failures.len() + self.delivered,
            self.missive
        )?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.listener, failure.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for DispatchFailures {}
