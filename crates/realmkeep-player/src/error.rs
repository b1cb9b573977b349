//! Error types for the player layer.

use realmkeep_protocol::{AccountId, PlayerId};
use realmkeep_store::StoreError;

use crate::ModuleKind;

/// Errors raised by the cache, module operations, and flushes.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// A live entity with this player ID is already cached.
    #[error("player {0} is already cached")]
    DuplicateKey(PlayerId),

    /// Another cached player already belongs to this account.
    #[error("account {0} already has a cached player")]
    DuplicateAccount(AccountId),

    /// The entity's module set has no block of this kind.
    #[error("player has no {0} module")]
    ModuleMissing(ModuleKind),

    #[error("mail {0} not found")]
    MailNotFound(u32),

    #[error("no friend application from {0}")]
    NoApplication(PlayerId),

    #[error("{0} is not a friend")]
    NotFriends(PlayerId),

    #[error("friend list is full")]
    FriendListFull,

    /// A store call made on the entity's behalf failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
