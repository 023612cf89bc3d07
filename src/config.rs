use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Queue-wide settings, persisted as their own collection in the store.
///
/// `max_retries` is copied onto each job at enqueue time; `backoff_base` and
/// `worker_count` are read live, so edits take effect between worker ticks
/// without a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Default retry budget for jobs that don't specify their own.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds (delay = base^attempts).
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u64,
    /// Number of concurrent worker tasks.
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    2
}

fn default_worker_count() -> u32 {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            worker_count: default_worker_count(),
        }
    }
}

impl QueueConfig {
    /// Set a configuration key by its CLI name (kebab-case).
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| {
                QueueError::InvalidInput(format!("invalid value for {key}: {value}"))
            })
        }

        match key {
            "max-retries" => self.max_retries = parse(key, value)?,
            "backoff-base" => self.backoff_base = parse(key, value)?,
            "worker-count" => {
                let count: u32 = parse(key, value)?;
                if count < 1 {
                    return Err(QueueError::InvalidInput(
                        "worker-count must be at least 1".to_string(),
                    ));
                }
                self.worker_count = count;
            }
            other => {
                return Err(QueueError::InvalidInput(format!(
                    "unknown config key '{other}' (expected max-retries, backoff-base, or worker-count)"
                )))
            }
        }
        Ok(())
    }
}
