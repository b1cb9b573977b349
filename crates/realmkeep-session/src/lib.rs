//! Player sessions for Realmkeep.
//!
//! This crate decides *when* player entities come and go:
//!
//! 1. **Lifecycle** ([`SessionLifecycle`]): creation, login, logout, the
//!    idle timeout, and delayed eviction after a grace period.
//! 2. **Token handoff** ([`LoginTokens`]): the world-side record of tokens
//!    pushed by the account center, checked at login.
//! 3. **Federation** ([`WorldLink`], [`AccountCenter`]): the account-side
//!    half of the handoff.
//!
//! # How it fits in the stack
//!
//! ```text
//! Game world (above)   ← dispatches requests, runs the maintenance loop
//!     ↕
//! Session layer (this crate)  ← moves players between states
//!     ↕
//! Player layer (below) ← entities, cache, mailboxes, persistence sweep
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod federation;
mod lifecycle;
mod tokens;

pub use config::SessionConfig;
pub use error::{FederationError, SessionError};
pub use federation::{AccountCenter, AccountRecord, LoginGrant, WorldLink};
pub use lifecycle::{LoginKey, SessionLifecycle, ShutdownReport};
pub use tokens::LoginTokens;
