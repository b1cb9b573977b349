//! Unified error type for Realmkeep.

use realmkeep_player::PlayerError;
use realmkeep_protocol::{NackCode, ProtocolError};
use realmkeep_session::{FederationError, SessionError};
use realmkeep_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `realmkeep` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RealmError {
    /// An encode/decode failure or a semantically invalid request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A persistent-store failure outside any player or session path.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A player-level error (missing mail, friend list full, ...).
    #[error(transparent)]
    Player(#[from] PlayerError),

    /// A session-level error (not found, already exists, bad token).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An account-federation error.
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// The world configuration could not be read.
    #[error("config unreadable: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// The world configuration is not valid JSON for [`crate::WorldConfig`].
    #[error("config invalid: {0}")]
    ConfigFormat(#[source] serde_json::Error),
}

impl RealmError {
    /// The negative-ack code a client sees for this error.
    pub fn nack_code(&self) -> NackCode {
        match self {
            Self::Protocol(_) | Self::ConfigIo(_) | Self::ConfigFormat(_) => {
                NackCode::InvalidRequest
            }
            Self::Store(e) => store_code(e),
            Self::Player(e) => player_code(e),
            Self::Session(e) => match e {
                SessionError::NotFound(_) => NackCode::NotFound,
                SessionError::AlreadyExists(_) => NackCode::DuplicateKey,
                SessionError::InvalidCredential(_) => NackCode::InvalidCredential,
                SessionError::NotOnline(_) | SessionError::Contended(_) => NackCode::NotOnline,
                SessionError::Store(e) => store_code(e),
                SessionError::Player(e) => player_code(e),
            },
            Self::Federation(e) => match e {
                FederationError::AccountNotFound(_)
                | FederationError::InvalidWorld(_)
                | FederationError::WorldUnreachable { .. } => NackCode::NotFound,
                FederationError::Forbidden(_) => NackCode::Forbidden,
                FederationError::InvalidPassword => NackCode::InvalidCredential,
                FederationError::NameTaken(_) => NackCode::DuplicateKey,
                FederationError::Store(e) => store_code(e),
            },
        }
    }
}

fn store_code(e: &StoreError) -> NackCode {
    match e {
        StoreError::DuplicateKey { .. } => NackCode::DuplicateKey,
        _ => NackCode::StoreUnavailable,
    }
}

fn player_code(e: &PlayerError) -> NackCode {
    match e {
        PlayerError::DuplicateKey(_) | PlayerError::DuplicateAccount(_) => NackCode::DuplicateKey,
        PlayerError::MailNotFound(_) | PlayerError::NoApplication(_) | PlayerError::NotFriends(_) => {
            NackCode::NotFound
        }
        PlayerError::ModuleMissing(_) | PlayerError::FriendListFull => NackCode::InvalidRequest,
        PlayerError::Store(e) => store_code(e),
    }
}
