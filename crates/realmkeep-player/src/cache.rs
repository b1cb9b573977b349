//! The process-wide player index.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use realmkeep_protocol::{AccountId, PlayerId};

use crate::{PlayerError, PlayerHandle};

/// Maps player IDs (and account IDs) to the one live entity for each.
///
/// A pure in-memory index: it never loads anything. Cloning shares the same
/// maps. Insert and remove are atomic with respect to concurrent lookups;
/// both maps are always touched in the same order (players, then accounts).
#[derive(Clone, Default)]
pub struct PlayerCache {
    players: Arc<DashMap<PlayerId, PlayerHandle>>,
    accounts: Arc<DashMap<AccountId, PlayerId>>,
}

impl PlayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, player_id: PlayerId) -> Option<PlayerHandle> {
        self.players.get(&player_id).map(|h| h.value().clone())
    }

    pub fn lookup_by_account(&self, account_id: AccountId) -> Option<PlayerHandle> {
        let player_id = *self.accounts.get(&account_id)?;
        self.lookup(player_id)
    }

    /// Adds an entity to the index.
    ///
    /// # Errors
    /// - [`PlayerError::DuplicateKey`] if the player ID is already cached
    /// - [`PlayerError::DuplicateAccount`] if a different player of the same
    ///   account is cached
    pub fn insert(&self, handle: PlayerHandle) -> Result<(), PlayerError> {
        let player_id = handle.player_id();
        let account_id = handle.account_id();

        let Entry::Vacant(player_slot) = self.players.entry(player_id) else {
            return Err(PlayerError::DuplicateKey(player_id));
        };
        match self.accounts.entry(account_id) {
            Entry::Occupied(existing) if *existing.get() != player_id => {
                return Err(PlayerError::DuplicateAccount(account_id));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(account_slot) => {
                account_slot.insert(player_id);
            }
        }
        player_slot.insert(handle);
        tracing::debug!(%player_id, %account_id, "player cached");
        Ok(())
    }

    /// Drops the entity from the index. A no-op if it isn't there.
    pub fn remove(&self, player_id: PlayerId) -> Option<PlayerHandle> {
        let (_, handle) = self.players.remove(&player_id)?;
        self.accounts
            .remove_if(&handle.account_id(), |_, cached| *cached == player_id);
        tracing::debug!(%player_id, "player uncached");
        Some(handle)
    }

    /// A point-in-time copy of every cached handle. Sweeps iterate over
    /// this so no map shard stays locked while they await.
    pub fn handles(&self) -> Vec<PlayerHandle> {
        self.players.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
