//! Handler registry
//!
//! Maps command types to their single handler and event types to an ordered
//! list of handlers. Registration happens once in the composition root;
//! building the registry injects every handler and yields the bus.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::error::WiringError;
use super::handler::{CommandHandler, EventHandler};
use super::injector::{inject, Container, Injectable};
use super::message_bus::MessageBus;
use super::short_type_name;
use crate::domain::{Command, Event};
use crate::error::{AppError, AppResult};

pub(crate) type HandlerFuture<T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send>>;

pub(crate) type ErasedOutput = Box<dyn Any + Send>;

pub(crate) type CommandFn = Arc<dyn Fn(Box<dyn Any + Send>) -> HandlerFuture<ErasedOutput> + Send + Sync>;

pub(crate) type EventFn = Arc<dyn Fn(Arc<dyn Event>) -> HandlerFuture<()> + Send + Sync>;

type CommandBinder = fn(&Container) -> Result<CommandFn, WiringError>;

type EventBinder = fn(&Container) -> Result<EventFn, WiringError>;

struct CommandEntry {
    handler: &'static str,
    bind: CommandBinder,
}

struct EventEntry {
    handler: &'static str,
    bind: EventBinder,
}

/// A command handler ready to be called
#[derive(Clone)]
pub(crate) struct BoundCommand {
    pub handler: &'static str,
    pub call: CommandFn,
}

/// An event handler ready to be called
#[derive(Clone)]
pub(crate) struct BoundEvent {
    pub handler: &'static str,
    pub call: EventFn,
}

/// Startup-time handler registrations
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<TypeId, CommandEntry>,
    events: HashMap<TypeId, Vec<EventEntry>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a command type.
    ///
    /// A second registration for the same command is a wiring error.
    pub fn register_command<C, H>(&mut self) -> Result<&mut Self, WiringError>
    where
        C: Command,
        H: CommandHandler<C> + Injectable,
    {
        let key = TypeId::of::<C>();
        if self.commands.contains_key(&key) {
            return Err(WiringError::DuplicateCommandHandler {
                command: short_type_name::<C>(),
            });
        }

        self.commands.insert(
            key,
            CommandEntry {
                handler: short_type_name::<H>(),
                bind: bind_command::<C, H>,
            },
        );
        Ok(self)
    }

    /// Append a handler to an event's fan-out list
    pub fn register_event<E, H>(&mut self) -> &mut Self
    where
        E: Event,
        H: EventHandler<E> + Injectable,
    {
        self.events
            .entry(TypeId::of::<E>())
            .or_default()
            .push(EventEntry {
                handler: short_type_name::<H>(),
                bind: bind_event::<E, H>,
            });
        self
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn event_handler_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    /// Inject every registered handler and build the bus
    pub fn build(self, container: &Container) -> Result<MessageBus, WiringError> {
        let mut commands = HashMap::with_capacity(self.commands.len());
        for (key, entry) in self.commands {
            let call = (entry.bind)(container)?;
            commands.insert(
                key,
                BoundCommand {
                    handler: entry.handler,
                    call,
                },
            );
        }

        let mut events = HashMap::with_capacity(self.events.len());
        for (key, entries) in self.events {
            let mut bound = Vec::with_capacity(entries.len());
            for entry in entries {
                bound.push(BoundEvent {
                    handler: entry.handler,
                    call: (entry.bind)(container)?,
                });
            }
            events.insert(key, bound);
        }

        tracing::info!(
            commands = commands.len(),
            event_types = events.len(),
            "Message bus wired"
        );

        Ok(MessageBus::new(commands, events))
    }
}

fn bind_command<C, H>(container: &Container) -> Result<CommandFn, WiringError>
where
    C: Command,
    H: CommandHandler<C> + Injectable,
{
    let handler = Arc::new(inject::<H>(container)?);

    Ok(Arc::new(move |boxed: Box<dyn Any + Send>| -> HandlerFuture<ErasedOutput> {
        let handler = handler.clone();
        Box::pin(async move {
            // Keyed by TypeId::of::<C>, so the downcast only fails on a bus bug
            let command = boxed.downcast::<C>().map_err(|_| {
                AppError::internal(format!("command type mismatch for {}", short_type_name::<C>()))
            })?;
            let output = handler.handle(*command).await?;
            Ok(Box::new(output) as ErasedOutput)
        })
    }))
}

fn bind_event<E, H>(container: &Container) -> Result<EventFn, WiringError>
where
    E: Event,
    H: EventHandler<E> + Injectable,
{
    let handler = Arc::new(inject::<H>(container)?);

    Ok(Arc::new(move |event: Arc<dyn Event>| -> HandlerFuture<()> {
        let handler = handler.clone();
        Box::pin(async move {
            let Some(typed) = event.as_any().downcast_ref::<E>() else {
                return Err(AppError::internal(format!(
                    "event type mismatch for {}",
                    short_type_name::<E>()
                )));
            };
            handler.handle(typed).await
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::injector::{Bindings, Param, Signature};
    use crate::domain::{Entity, EventBuffer, Message};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Noop;

    impl Message for Noop {
        fn name(&self) -> &'static str {
            "Noop"
        }
    }

    impl Command for Noop {
        type Output = Nothing;
    }

    #[derive(Default)]
    struct Nothing {
        events: EventBuffer,
    }

    impl Entity for Nothing {
        fn events(&self) -> &EventBuffer {
            &self.events
        }

        fn events_mut(&mut self) -> &mut EventBuffer {
            &mut self.events
        }
    }

    struct NoopHandler;

    impl Injectable for NoopHandler {
        fn signature() -> Signature {
            Signature::new("NoopHandler").param(Param::message::<Noop>("cmd"))
        }

        fn from_bindings(_: &Bindings) -> Result<Self, WiringError> {
            Ok(NoopHandler)
        }
    }

    #[async_trait]
    impl CommandHandler<Noop> for NoopHandler {
        async fn handle(&self, _command: Noop) -> AppResult<Nothing> {
            Ok(Nothing::default())
        }
    }

    struct NeedsClock {
        _clock: Arc<u64>,
    }

    impl Injectable for NeedsClock {
        fn signature() -> Signature {
            Signature::new("NeedsClock")
                .param(Param::message::<Noop>("cmd"))
                .param(Param::required::<Arc<u64>>("clock"))
        }

        fn from_bindings(bindings: &Bindings) -> Result<Self, WiringError> {
            Ok(Self {
                _clock: bindings.get("clock")?,
            })
        }
    }

    #[async_trait]
    impl CommandHandler<Noop> for NeedsClock {
        async fn handle(&self, _command: Noop) -> AppResult<Nothing> {
            Ok(Nothing::default())
        }
    }

    #[test]
    fn test_second_command_registration_fails() {
        let mut registry = HandlerRegistry::new();
        registry.register_command::<Noop, NoopHandler>().unwrap();

        let err = registry
            .register_command::<Noop, NeedsClock>()
            .err()
            .unwrap();
        assert_eq!(err, WiringError::DuplicateCommandHandler { command: "Noop" });
        assert_eq!(registry.command_count(), 1);
    }

    #[test]
    fn test_build_fails_fast_on_missing_dependency() {
        let mut registry = HandlerRegistry::new();
        registry.register_command::<Noop, NeedsClock>().unwrap();

        let err = registry.build(&Container::new()).err().unwrap();
        assert_eq!(
            err,
            WiringError::MissingDependency {
                handler: "NeedsClock",
                dependency: "clock",
            }
        );
    }

    #[test]
    fn test_build_succeeds_with_dependencies() {
        let mut registry = HandlerRegistry::new();
        registry.register_command::<Noop, NeedsClock>().unwrap();

        let container = Container::new().provide("clock", Arc::new(7u64));
        let bus = registry.build(&container).unwrap();
        assert!(bus.has_command_handler::<Noop>());
    }
}
