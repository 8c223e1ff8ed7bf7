//! Table statistics configuration
//!
//! Controls whether background collection starts enabled and how the
//! tracked version is shaped.

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};

/// Default number of LSM levels tracked by a version
pub const DEFAULT_NUM_LEVELS: usize = 7;

/// Table statistics collection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Start with collection suspended (pending tables are still tracked)
    pub disabled: bool,

    /// Number of LSM levels (default 7)
    pub num_levels: usize,

    /// Name given to the background collection thread
    pub worker_thread_name: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            num_levels: DEFAULT_NUM_LEVELS,
            worker_thread_name: "table-stats".to_string(),
        }
    }
}

impl StatsConfig {
    /// Config for tests: collection enabled, default level count
    pub fn for_testing() -> Self {
        Self {
            worker_thread_name: "table-stats-test".to_string(),
            ..Self::default()
        }
    }

    /// Config that starts with collection suspended until `enable()`
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    /// Override the number of levels
    pub fn with_num_levels(mut self, num_levels: usize) -> Self {
        self.num_levels = num_levels;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_levels == 0 {
            return Err(StorageError::InvalidArgument(
                "num_levels must be at least 1".into(),
            ));
        }
        if self.worker_thread_name.is_empty() {
            return Err(StorageError::InvalidArgument(
                "worker_thread_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}
