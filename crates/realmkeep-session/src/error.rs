//! Error types for the session layer.

use realmkeep_player::PlayerError;
use realmkeep_protocol::{AccountId, PlayerId, WorldId};
use realmkeep_store::StoreError;

use crate::LoginKey;

/// Errors from creating, logging in, or logging out a player.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No player exists for the key, cached or stored.
    #[error("no player for {0}")]
    NotFound(LoginKey),

    /// The account already owns a player in this world.
    #[error("account {0} already owns a player")]
    AlreadyExists(AccountId),

    /// The login token was missing, mismatched, or expired.
    #[error("no valid login token for account {0}")]
    InvalidCredential(AccountId),

    /// The request needs the player online and it isn't.
    #[error("player {0} is not online")]
    NotOnline(PlayerId),

    /// The entity kept changing under the login; the caller may retry.
    #[error("login for {0} kept racing with eviction")]
    Contended(LoginKey),

    /// A store call on a synchronous path failed. Nothing was created.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Player(#[from] PlayerError),
}

/// Errors from the account center.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("account {0:?} not found")]
    AccountNotFound(String),

    #[error("account {0:?} is forbidden")]
    Forbidden(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("unknown world {0}")]
    InvalidWorld(WorldId),

    #[error("account name {0:?} is taken")]
    NameTaken(String),

    /// The world refused or never received the token push.
    #[error("world {world} unreachable: {reason}")]
    WorldUnreachable { world: WorldId, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
