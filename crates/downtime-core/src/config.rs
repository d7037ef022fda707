use serde::{Deserialize, Serialize};

use crate::ledger::DrawOrder;

/// Engine tunables. Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Which balance a debit draws from first.
    pub draw_order: DrawOrder,
    /// Validate+commit attempts before a `ConcurrentModification` is returned.
    pub max_commit_attempts: u32,
    pub reputation_queries_per_period: u32,
    /// Purchased and maintained items expire this many events later.
    pub item_lifetime_events: u32,
    /// Enforce the per-character engineering and science slot counts.
    pub enforce_action_slots: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            draw_order: DrawOrder::PersonalFirst,
            max_commit_attempts: 3,
            reputation_queries_per_period: 1,
            item_lifetime_events: 4,
            enforce_action_slots: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_commit_attempts must be at least 1")]
    NoCommitAttempts,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_commit_attempts == 0 {
            return Err(ConfigError::NoCommitAttempts);
        }
        Ok(())
    }
}
