/*
    ABSTRACT: Definition of the message types ("missives") carried by the message buses.
*/
use std::any::Any;

/// A typed, data-only message which can be sent over a `MessageBus`.
///
/// - Dispatch is keyed by the concrete type implementing this trait, so every distinct event should be its own type.
///
/// ### Example
///
/// ```rust
/// use missive::Missive;
///
/// #[derive(Debug, Clone, PartialEq)]
/// pub struct LevelLoaded {
///     pub name: String,
/// }
///
/// impl Missive for LevelLoaded {}
///
/// assert!(LevelLoaded::name().ends_with("LevelLoaded"));
/// ```
pub trait Missive: Any {
    /// Name used in logs and failure reports
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}
