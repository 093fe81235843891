//! Snowflake id generator
//!
//! Layout, most significant first: 41 bits of milliseconds since a custom
//! epoch, 5 bits node id, 5 bits worker id, 12 bits per-millisecond sequence.
//! Ids are time-sortable and unique across processes with distinct
//! node/worker pairs.

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{ConfigError, SnowflakeSettings};

const NODE_BITS: u64 = 5;
const WORKER_BITS: u64 = 5;
const SEQUENCE_BITS: u64 = 12;

const MAX_NODE_ID: u64 = (1 << NODE_BITS) - 1;
const MAX_WORKER_ID: u64 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

const WORKER_SHIFT: u64 = SEQUENCE_BITS;
const NODE_SHIFT: u64 = SEQUENCE_BITS + WORKER_BITS;
const TIMESTAMP_SHIFT: u64 = SEQUENCE_BITS + WORKER_BITS + NODE_BITS;

/// Allocates unique 64-bit ids
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> u64;
}

#[derive(Debug, Default)]
struct State {
    last_ms: u64,
    sequence: u64,
}

#[derive(Debug)]
pub struct SnowflakeIdGenerator {
    epoch_ms: u64,
    node_id: u64,
    worker_id: u64,
    state: Mutex<State>,
}

impl SnowflakeIdGenerator {
    pub fn new(settings: SnowflakeSettings) -> Result<Self, ConfigError> {
        if settings.node_id > MAX_NODE_ID {
            return Err(ConfigError::InvalidValue("SNOWFLAKE_NODE_ID"));
        }
        if settings.worker_id > MAX_WORKER_ID {
            return Err(ConfigError::InvalidValue("SNOWFLAKE_WORKER_ID"));
        }

        Ok(Self {
            epoch_ms: settings.epoch_ms,
            node_id: settings.node_id,
            worker_id: settings.worker_id,
            state: Mutex::new(State::default()),
        })
    }

    fn now_ms(&self) -> u64 {
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        unix_ms.saturating_sub(self.epoch_ms)
    }

    /// Next id for a given clock reading
    fn next_id_at(&self, now_ms: u64) -> u64 {
        let mut state = self.state.lock();

        // A clock that steps backwards reuses the last timestamp
        let mut timestamp = now_ms.max(state.last_ms);

        if timestamp == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond: borrow the next one
                timestamp = state.last_ms + 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = timestamp;

        (timestamp << TIMESTAMP_SHIFT)
            | (self.node_id << NODE_SHIFT)
            | (self.worker_id << WORKER_SHIFT)
            | state.sequence
    }
}

impl IdGenerator for SnowflakeIdGenerator {
    fn next_id(&self) -> u64 {
        self.next_id_at(self.now_ms())
    }
}
