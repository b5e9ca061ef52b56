//! Lifecycle cache configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Active signals across all instruments before the oldest are evicted
    pub max_active_signals: usize,
    /// Command queue depth per instrument worker
    pub channel_capacity: usize,
    /// Completion records kept for `recent_completions`
    pub history_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_active_signals: 50,
            channel_capacity: 256,
            history_limit: 500,
        }
    }
}
