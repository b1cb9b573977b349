//! Player actors for Realmkeep.
//!
//! Each online player is a long-lived, mutable entity. This crate owns
//! everything about that entity that doesn't depend on *why* it is being
//! loaded or dropped:
//!
//! - **Entity** ([`Player`], [`PlayerHandle`], [`PlayerBase`]): identity,
//!   session fields, the ordered module set, and a bounded mailbox.
//! - **Modules** ([`PlayerModule`], [`Module`]): the lifecycle contract every
//!   data block implements, and the closed set of blocks a player carries.
//! - **Cache** ([`PlayerCache`]): the process-wide index, one live entity per
//!   player ID, with a secondary index by account.
//! - **Messaging** ([`Messenger`]): the only way one player's code may change
//!   another player's state.
//! - **Persistence** ([`PersistenceScheduler`]): the periodic full-write sweep.
//!
//! # Execution context
//!
//! A player's *own context* is whoever currently holds its entity lock
//! ([`PlayerHandle::enter`]). Own-context code may touch the entity freely.
//! Foreign code never takes another player's lock to mutate it; it wraps the
//! change in a closure and hands it to [`Messenger::notify`], and the owner
//! applies it the next time it drains its mailbox.
//!
//! Deciding *when* a player is created, logged in, or evicted lives one
//! layer up, in `realmkeep-session`.

mod cache;
mod error;
mod mailbox;
mod messenger;
mod module;
mod modules;
mod persist;
mod player;

pub use cache::PlayerCache;
pub use error::PlayerError;
pub use mailbox::{MailboxSender, Operation, PushError};
pub use messenger::{Delivery, Messenger, MessengerStats};
pub use module::{Module, ModuleKind, PlayerModule};
pub use modules::{
    BattleModule, ChatLine, ChatModule, FriendApplication, FriendModule, FriendRecord, Mail,
    MailModule,
};
pub use persist::{PersistenceScheduler, SweepReport};
pub use player::{Player, PlayerBase, PlayerHandle, SessionState};
