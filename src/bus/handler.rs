//! Handler contracts

use async_trait::async_trait;

use crate::domain::{Command, Event};
use crate::error::AppResult;

/// Handles exactly one command type and returns the affected entity
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    async fn handle(&self, command: C) -> AppResult<C::Output>;
}

/// Reacts to an event after the command that produced it has completed
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    async fn handle(&self, event: &E) -> AppResult<()>;
}
