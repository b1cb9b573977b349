//! Core protocol types: identities, requests, and responses.
//!
//! Every shape here is transport-agnostic. A transport decodes bytes into a
//! [`Request`], the world answers with a [`Response`], and the transport
//! encodes that back.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player (one character in one world).
///
/// Assigned at creation and never changes. `#[serde(transparent)]` keeps
/// the wire form a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for an account on the account center.
///
/// An account owns at most one player per world.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A-{}", self.0)
    }
}

/// Identifies one game-world instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorldId(pub u32);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W-{}", self.0)
    }
}

/// A single-use login token minted by the account center and pushed to the
/// target world before the client is told where to connect.
///
/// The value is opaque to the world; it is only compared for equality.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoginToken(String);

impl LoginToken {
    /// Wraps an already-minted token string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tokens are secrets: `Debug` never prints the value, so a stray
/// `?token` in a log line can't leak one.
impl fmt::Debug for LoginToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoginToken(..)")
    }
}

// ---------------------------------------------------------------------------
// Payload pieces
// ---------------------------------------------------------------------------

/// An item stack attached to a mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAttachment {
    pub item_id: u32,
    pub count: u32,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Every request a game-world instance accepts.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "Logout", "player_id": 10001 }`.
///
/// Requests carrying a `player_id` run in that player's own context; the
/// `target_id`/`applicant_id`/`friend_id` side of a request is only ever
/// reached through the target's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    // -- Account center → world --
    /// The account center pre-authorizes `account_id` on this world.
    PushLoginToken {
        account_id: AccountId,
        token: LoginToken,
    },

    // -- Session --
    /// Log in with the account's player. Answers `NotFound` when the
    /// account has no player yet (the client should send `Create`).
    Login {
        account_id: AccountId,
        token: LoginToken,
    },
    /// Create the account's player in this world.
    Create {
        account_id: AccountId,
        token: LoginToken,
        name: String,
    },
    Logout { player_id: PlayerId },
    /// Keep-alive; counts as activity for the idle sweep.
    Heartbeat { player_id: PlayerId },

    // -- Friends --
    FriendApply {
        player_id: PlayerId,
        target_id: PlayerId,
    },
    FriendAgree {
        player_id: PlayerId,
        applicant_id: PlayerId,
    },
    FriendRefuse {
        player_id: PlayerId,
        applicant_id: PlayerId,
    },
    FriendDelete {
        player_id: PlayerId,
        friend_id: PlayerId,
    },
    FriendList { player_id: PlayerId },

    // -- Mail --
    SendMail {
        player_id: PlayerId,
        target_id: PlayerId,
        title: String,
        content: String,
        attachment: Option<MailAttachment>,
    },
    ReadMail { player_id: PlayerId, mail_id: u32 },
    DeleteMail { player_id: PlayerId, mail_id: u32 },
    TakeMailAttachment { player_id: PlayerId, mail_id: u32 },

    // -- Chat --
    Whisper {
        player_id: PlayerId,
        target_id: PlayerId,
        text: String,
    },

    // -- Battle service → world --
    /// A finished match reported by the battle service. The result is
    /// recorded for `player_id` in its own context and mirrored onto the
    /// opponent through its mailbox.
    BattleReport {
        player_id: PlayerId,
        opponent_id: PlayerId,
        won: bool,
    },
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Why a request was refused.
///
/// These surface to the client as-is and are never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NackCode {
    /// Account, player, or world target does not exist.
    NotFound,
    /// The account is disabled.
    Forbidden,
    /// Password or login token mismatch, or the token expired.
    InvalidCredential,
    /// The account already owns a player, or an ID collided.
    DuplicateKey,
    /// The persistent store failed during a synchronous path.
    StoreUnavailable,
    /// The request needs a logged-in player and this one isn't.
    NotOnline,
    /// The request decoded but is semantically invalid.
    InvalidRequest,
}

impl fmt::Display for NackCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Forbidden => "forbidden",
            Self::InvalidCredential => "invalid credential",
            Self::DuplicateKey => "duplicate key",
            Self::StoreUnavailable => "store unavailable",
            Self::NotOnline => "not online",
            Self::InvalidRequest => "invalid request",
        };
        f.write_str(s)
    }
}

/// A friend as shown in a friend list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    pub player_id: PlayerId,
    pub name: String,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// The request was applied (or queued for its target).
    Ok,
    LoggedIn { player_id: PlayerId, name: String },
    Created { player_id: PlayerId },
    Friends { friends: Vec<FriendEntry> },
    AttachmentTaken { attachment: Option<MailAttachment> },
    Nack { code: NackCode },
}

impl Response {
    /// Shorthand for a negative acknowledgement.
    pub fn nack(code: NackCode) -> Self {
        Self::Nack { code }
    }
}

// =========================================================================
// Tests
// =========================================================================
