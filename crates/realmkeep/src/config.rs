//! World configuration.

use std::path::Path;

use realmkeep_protocol::WorldId;
use realmkeep_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::RealmError;

/// Everything a [`GameWorld`](crate::GameWorld) needs to start.
///
/// Only `world_id` and `address` are required; `session` falls back to
/// [`SessionConfig::default`] field by field.
///
/// ```rust
/// use realmkeep::WorldConfig;
///
/// let cfg = WorldConfig::from_json_str(
///     r#"{ "world_id": 1, "address": "10.0.0.5:7001",
///          "session": { "reconnect_grace_secs": 10 } }"#,
/// )
/// .unwrap();
/// assert_eq!(cfg.session.reconnect_grace_secs, 10);
/// assert_eq!(cfg.session.idle_threshold, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub world_id: WorldId,
    /// Where clients reach this world; handed out by the account center.
    pub address: String,
    #[serde(default)]
    pub session: SessionConfig,
}

impl WorldConfig {
    pub fn new(world_id: WorldId, address: impl Into<String>) -> Self {
        Self {
            world_id,
            address: address.into(),
            session: SessionConfig::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RealmError> {
        serde_json::from_str(json).map_err(RealmError::ConfigFormat)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RealmError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), world_id = %config.world_id, "world config loaded");
        Ok(config)
    }
}
