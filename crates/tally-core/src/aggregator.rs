//! Media-group turn aggregator
//!
//! Chat transports deliver an album as one message per attachment, all
//! sharing a group ID. Handling each one as its own turn would spam the
//! model, so the first arrival buffers and waits a quiet period while
//! the rest of the group trickles in. Exactly one submitter comes back
//! with the merged parts; the others are done the moment they merge.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::turn::UserPart;

/// How long the first submitter waits for the rest of the group
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Keyed buffer registry for in-flight media groups
pub struct TurnAggregator {
    quiet_period: Duration,
    buffers: Mutex<HashMap<String, Vec<UserPart>>>,
}

impl TurnAggregator {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Submit the parts of one transport message
    ///
    /// Returns `Some(merged)` for exactly one submitter per group, after
    /// the quiet period has elapsed. Every other submitter merges into
    /// the buffer and returns `None` immediately. No lock is held while
    /// waiting.
    pub async fn submit(&self, group_id: &str, parts: Vec<UserPart>) -> Option<Vec<UserPart>> {
        let is_first = {
            let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
            match buffers.entry(group_id.to_string()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().extend(parts);
                    false
                }
                Entry::Vacant(entry) => {
                    entry.insert(parts);
                    true
                }
            }
        };

        if !is_first {
            debug!(group_id, "Merged into existing media group buffer");
            return None;
        }

        tokio::time::sleep(self.quiet_period).await;

        let merged = {
            let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
            buffers.remove(group_id)
        };
        if let Some(parts) = &merged {
            debug!(group_id, part_count = parts.len(), "Media group flushed");
        }
        merged
    }
}

impl Default for TurnAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}
