//! Message contracts
//!
//! Commands are intents routed to exactly one handler; events are facts
//! fanned out to zero or more handlers. Both are dispatched by concrete type.

use std::any::Any;
use std::fmt::Debug;

use super::entity::Entity;

/// Identity shared by commands and events.
pub trait Message: Any + Send + Sync + Debug {
    /// Display name used in diagnostics and logs
    fn name(&self) -> &'static str;
}

/// An intent to change state, handled by exactly one command handler.
pub trait Command: Message + Sized {
    /// The entity the handler returns to the caller
    type Output: Entity;
}

/// A fact that already happened.
pub trait Event: Message {
    /// Access to the concrete type for typed fan-out
    fn as_any(&self) -> &dyn Any;
}
