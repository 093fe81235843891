//! Best-effort notifications
//!
//! In-process topic hub on `tokio::sync::broadcast`. Publishing never fails
//! because nobody is listening; there is no delivery guarantee.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::error::AppResult;

/// Notification topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Notification,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Notification => "notification",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, kind: NotificationKind, payload: serde_json::Value) -> AppResult<()>;
}

/// Topic-keyed broadcast channels
#[derive(Clone)]
pub struct BroadcastPublisher {
    channels: Arc<RwLock<HashMap<NotificationKind, broadcast::Sender<serde_json::Value>>>>,
    capacity: usize,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribe to a topic, creating its channel if needed
    pub async fn subscribe(&self, kind: NotificationKind) -> broadcast::Receiver<serde_json::Value> {
        let mut channels = self.channels.write().await;
        channels
            .entry(kind)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(&self, kind: NotificationKind, payload: serde_json::Value) -> AppResult<()> {
        let channels = self.channels.read().await;
        let delivered = channels
            .get(&kind)
            .and_then(|tx| tx.send(payload).ok())
            .unwrap_or(0);

        if delivered == 0 {
            tracing::debug!(kind = %kind, "No subscribers for notification");
        }
        Ok(())
    }
}
