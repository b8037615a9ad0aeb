//! # Missive
//!
//! A typed, synchronous publish / subscribe message bus for decoupling the parts of an application
//! that raise events from the parts that react to them.
//!
//! - Every message ("missive") is its own Rust type implementing [`Missive`]; dispatch is keyed by that exact type.
//! - Listeners run in registration order, on the publisher's thread, before `send` returns.
//! - Each `send` iterates a snapshot of the listener list, so listeners may add, remove, or send while it runs.
//! - A failing or panicking listener never stops the others; see [`BusConfig`] for how failures are reported.
//!
//! Two flavours share the same contract: [`rc::MessageBus`] for single-thread use and [`sync::MessageBus`]
//! for sharing across threads.
//!
//! ```rust
//! use missive::{
//!     messages::{AudioClip, YearChanged, YearData},
//!     rc::{Listener, MessageBus},
//!     BusConfig, DispatchOutcome,
//! };
//!
//! let bus = MessageBus::open(BusConfig::default());
//! let on_year = Listener::new(|missive: &YearChanged| println!("now showing {}", missive.data.label));
//! bus.add_listener(&on_year);
//!
//! let year = YearChanged {
//!     data: YearData::new(1950, "1950", AudioClip::new("clipA")),
//! };
//! assert_eq!(bus.send(&year).unwrap(), DispatchOutcome::Finished(1));
//!
//! bus.remove_listener(&on_year);
//! assert_eq!(bus.send(&year).unwrap(), DispatchOutcome::NotNeeded);
//! bus.close();
//! ```
mod config;
mod error;
pub mod messages;
mod missive;
pub mod rc;
pub mod sync;
mod types;

#[cfg(test)]
mod test_support;

pub use config::{BusConfig, FailurePolicy, FAILURE_POLICY_ENV, ISOLATE_PANICS_ENV};
pub use error::{
    BusError, DispatchFailures, ListenerError, ListenerFailure, ListenerResult, Result,
};
pub use missive::Missive;
pub use types::{DispatchOutcome, IntoListenerResult, ListenerId};
