//! Persistent-store boundary for Realmkeep.
//!
//! The game world treats its database as a key-indexed document store. This
//! crate defines that boundary and nothing more:
//!
//! - [`DocumentStore`]: the four calls the world makes (find one record,
//!   synchronous insert, synchronous update, detached patch).
//! - [`Filter`] / [`Patch`]: the tiny update language used by detached
//!   writes (login counters, offline mail delivery).
//! - [`MemoryStore`]: an in-process implementation for development and
//!   tests, with switches to simulate outages.
//!
//! # Record layout
//!
//! Every record is a JSON object keyed by `_id`. The player base record and
//! each module's record share the player ID as `_id`, each in its own
//! collection (see [`collections`]).

mod error;
mod memory;
mod patch;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use patch::{Filter, Patch};
pub use store::{from_document, to_document, Document, DocumentStore};

/// Collection names, one logical partition per record kind.
pub mod collections {
    pub const ACCOUNT: &str = "Account";
    pub const PLAYER: &str = "Player";
    pub const MAIL: &str = "Mail";
    /// Mail delivered while the recipient was not online, appended by
    /// detached writes and absorbed at the recipient's next load.
    pub const MAIL_PENDING: &str = "MailPending";
    pub const FRIEND: &str = "Friend";
    pub const CHAT: &str = "Chat";
    pub const BATTLE: &str = "Battle";
}
