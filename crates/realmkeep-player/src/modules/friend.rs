//! Friend list and pending friend applications.

use realmkeep_protocol::{FriendEntry, PlayerId};
use realmkeep_store::collections;
use serde::{Deserialize, Serialize};

use crate::{Module, ModuleKind, PlayerError, PlayerModule};

/// Maximum number of friends per player.
pub const MAX_FRIENDS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRecord {
    pub player_id: PlayerId,
    pub name: String,
    pub since: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendApplication {
    pub player_id: PlayerId,
    pub name: String,
    pub at: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FriendModule {
    #[serde(default)]
    friends: Vec<FriendRecord>,
    #[serde(default)]
    applications: Vec<FriendApplication>,
}

impl FriendModule {
    pub fn is_friend(&self, id: PlayerId) -> bool {
        self.friends.iter().any(|f| f.player_id == id)
    }

    pub fn friend_count(&self) -> usize {
        self.friends.len()
    }

    pub fn applications(&self) -> &[FriendApplication] {
        &self.applications
    }

    /// Records an application from `from`. Returns `false` (and changes
    /// nothing) if `from` is already a friend or already applied.
    pub fn receive_application(&mut self, from: PlayerId, name: impl Into<String>) -> bool {
        if self.is_friend(from) || self.applications.iter().any(|a| a.player_id == from) {
            return false;
        }
        self.applications.push(FriendApplication {
            player_id: from,
            name: name.into(),
            at: chrono::Utc::now().timestamp(),
        });
        true
    }

    /// Accepts the application from `applicant` and adds them as a friend.
    pub fn agree(&mut self, applicant: PlayerId) -> Result<FriendRecord, PlayerError> {
        let pos = self
            .applications
            .iter()
            .position(|a| a.player_id == applicant)
            .ok_or(PlayerError::NoApplication(applicant))?;
        if self.friends.len() >= MAX_FRIENDS {
            return Err(PlayerError::FriendListFull);
        }
        let application = self.applications.remove(pos);
        let record = FriendRecord {
            player_id: application.player_id,
            name: application.name,
            since: chrono::Utc::now().timestamp(),
        };
        self.friends.push(record.clone());
        Ok(record)
    }

    pub fn refuse(&mut self, applicant: PlayerId) -> Result<(), PlayerError> {
        let before = self.applications.len();
        self.applications.retain(|a| a.player_id != applicant);
        if self.applications.len() == before {
            return Err(PlayerError::NoApplication(applicant));
        }
        Ok(())
    }

    /// Adds a friend directly (the other half of an accepted application).
    /// Idempotent; also clears any application from the same player.
    pub fn add_friend(&mut self, id: PlayerId, name: impl Into<String>) -> bool {
        self.applications.retain(|a| a.player_id != id);
        if self.is_friend(id) || self.friends.len() >= MAX_FRIENDS {
            return false;
        }
        self.friends.push(FriendRecord {
            player_id: id,
            name: name.into(),
            since: chrono::Utc::now().timestamp(),
        });
        true
    }

    pub fn remove_friend(&mut self, id: PlayerId) -> bool {
        let before = self.friends.len();
        self.friends.retain(|f| f.player_id != id);
        self.friends.len() != before
    }

    pub fn list(&self) -> Vec<FriendEntry> {
        self.friends
            .iter()
            .map(|f| FriendEntry {
                player_id: f.player_id,
                name: f.name.clone(),
            })
            .collect()
    }
}

impl PlayerModule for FriendModule {
    const KIND: ModuleKind = ModuleKind::Friend;
    const COLLECTION: &'static str = collections::FRIEND;

    fn project(module: &Module) -> Option<&Self> {
        match module {
            Module::Friend(m) => Some(m),
            _ => None,
        }
    }

    fn project_mut(module: &mut Module) -> Option<&mut Self> {
        match module {
            Module::Friend(m) => Some(m),
            _ => None,
        }
    }
}
