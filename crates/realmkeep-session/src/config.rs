//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and sizing knobs for the session layer.
///
/// Every field has a default, so a config file only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a logged-out player stays cached for a fast reconnect.
    ///
    /// Default: 30 seconds. 0 evicts as soon as the scheduler gets to it.
    pub reconnect_grace_secs: u64,

    /// Period of the idle sweep. Default: 1000 ms.
    pub idle_tick_ms: u64,

    /// Idle ticks an online player may accumulate; one more forces a
    /// logout. Default: 10.
    pub idle_threshold: u32,

    /// Period of the full-write sweep. Default: 900 seconds (15 minutes).
    /// 0 disables the sweep.
    pub flush_interval_secs: u64,

    /// Operations a player's mailbox holds before new ones are dropped.
    /// Default: 128.
    pub mailbox_capacity: usize,

    /// How long a pushed login token stays valid. Default: 60 seconds.
    pub login_token_ttl_secs: u64,

    /// First player ID handed out by this world. Default: 10 000.
    pub first_player_id: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 30,
            idle_tick_ms: 1000,
            idle_threshold: 10,
            flush_interval_secs: 900,
            mailbox_capacity: 128,
            login_token_ttl_secs: 60,
            first_player_id: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.login_token_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference_constants() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.grace(), Duration::from_secs(30));
        assert_eq!(cfg.idle_tick(), Duration::from_secs(1));
        assert_eq!(cfg.idle_threshold, 10);
        assert_eq!(cfg.flush_interval(), Duration::from_secs(15 * 60));
        assert_eq!(cfg.mailbox_capacity, 128);
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{ "reconnect_grace_secs": 5 }"#).unwrap();
        assert_eq!(cfg.reconnect_grace_secs, 5);
        assert_eq!(cfg.idle_threshold, 10);
    }
}
