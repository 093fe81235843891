//! Message bus
//!
//! `handle` routes a command to its one handler, then drains the returned
//! entity's events and fans each out to every handler registered for it.
//!
//! Event handlers run sequentially in registration order. A failing event
//! handler is logged with the event and handler names and never reaches the
//! caller: the command has already committed by the time its events exist.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use super::registry::{BoundCommand, BoundEvent};
use super::short_type_name;
use crate::domain::{Command, Entity, Event};
use crate::error::{AppError, AppResult};

/// Dispatches commands and their resulting events.
///
/// Both maps are fixed when the bus is built.
pub struct MessageBus {
    commands: HashMap<TypeId, BoundCommand>,
    events: HashMap<TypeId, Vec<BoundEvent>>,
}

impl MessageBus {
    pub(crate) fn new(
        commands: HashMap<TypeId, BoundCommand>,
        events: HashMap<TypeId, Vec<BoundEvent>>,
    ) -> Self {
        Self { commands, events }
    }

    pub fn has_command_handler<C: Command>(&self) -> bool {
        self.commands.contains_key(&TypeId::of::<C>())
    }

    pub fn event_handler_count<E: Event>(&self) -> usize {
        self.events.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    // =========================================================================
    // Command dispatch
    // =========================================================================

    /// Handle a command and dispatch the events it produced
    pub async fn handle<C: Command>(&self, command: C) -> AppResult<C::Output> {
        let name = command.name();

        let Some(bound) = self.commands.get(&TypeId::of::<C>()) else {
            tracing::error!(command = name, "No handler registered for command");
            return Err(AppError::HandlerNotRegistered(name));
        };

        tracing::debug!(command = name, handler = bound.handler, "Handling command");

        let output = (bound.call)(Box::new(command)).await?;
        let mut entity = downcast_output::<C>(output)?;

        let events = entity.take_events();
        self.dispatch_events(events).await;

        Ok(entity)
    }

    // =========================================================================
    // Event fan-out
    // =========================================================================

    async fn dispatch_events(&self, events: Vec<Arc<dyn Event>>) {
        for event in events {
            let name = event.name();
            let handlers = match self.events.get(&event.as_any().type_id()) {
                Some(handlers) if !handlers.is_empty() => handlers,
                _ => {
                    tracing::warn!(event = name, "No handler registered for event");
                    continue;
                }
            };

            tracing::debug!(event = name, handlers = handlers.len(), "Dispatching event");

            for bound in handlers {
                match (bound.call)(event.clone()).await {
                    Ok(()) => {
                        tracing::debug!(event = name, handler = bound.handler, "Event handled");
                    }
                    Err(err) => {
                        tracing::error!(
                            event = name,
                            handler = bound.handler,
                            error = %err,
                            "Event handler failed"
                        );
                    }
                }
            }
        }
    }
}

fn downcast_output<C: Command>(output: Box<dyn Any + Send>) -> AppResult<C::Output> {
    output.downcast::<C::Output>().map(|boxed| *boxed).map_err(|_| {
        AppError::internal(format!(
            "handler for {} returned an unexpected type",
            short_type_name::<C>()
        ))
    })
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("commands", &self.commands.len())
            .field("event_types", &self.events.len())
            .finish()
    }
}
