//! Wiring errors
//!
//! Raised only while the composition root builds the bus. None of these can
//! occur once the process is serving commands.

/// Startup wiring failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WiringError {
    #[error("A handler is already registered for command {command}")]
    DuplicateCommandHandler { command: &'static str },

    #[error("Handler {handler} has parameter {param} without a type annotation")]
    MissingTypeAnnotation {
        handler: &'static str,
        param: &'static str,
    },

    #[error("Missing dependency {dependency} for handler {handler}")]
    MissingDependency {
        handler: &'static str,
        dependency: &'static str,
    },

    #[error("Dependency {dependency} for handler {handler} is a {found}, expected {expected}")]
    TypeMismatch {
        handler: &'static str,
        dependency: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}
