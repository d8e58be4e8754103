use crate::error::{Result, SurgeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the batching write queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteQueueConfig {
    /// Maximum number of intents drained per flush
    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Interval between timer-driven flushes (milliseconds)
    /// Default: 50ms
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    50
}

impl Default for WriteQueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl WriteQueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SurgeError::Config(
                "write_queue.batch_size must be at least 1".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(SurgeError::Config(
                "write_queue.flush_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
