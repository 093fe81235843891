//! Message bus
//!
//! Command dispatch, event fan-out and the startup wiring that connects
//! handlers to their capabilities.

pub mod error;
pub mod handler;
pub mod injector;
pub mod message_bus;
pub mod registry;

pub use error::WiringError;
pub use handler::{CommandHandler, EventHandler};
pub use injector::{inject, Bindings, Container, Injectable, Param, Signature, TypeKey};
pub use message_bus::MessageBus;
pub use registry::HandlerRegistry;

/// Last path segment of a type name, for logs and errors
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
