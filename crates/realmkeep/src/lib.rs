//! # Realmkeep
//!
//! Player-state backbone for multiplayer game worlds federated behind an
//! account service.
//!
//! A [`GameWorld`] keeps every online player as a long-lived entity: cached
//! while online, mutated by its own requests, mutated by other players only
//! through its mailbox, flushed to storage on a timer, and evicted after a
//! reconnect grace window.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use realmkeep::prelude::*;
//!
//! # async fn run() -> Result<(), RealmError> {
//! realmkeep::init_tracing();
//! let config = WorldConfig::load("world.json")?;
//! let world = Arc::new(GameWorld::new(config, Arc::new(MemoryStore::new()), JsonCodec));
//!
//! let maintenance = {
//!     let world = Arc::clone(&world);
//!     tokio::spawn(async move {
//!         world.run_maintenance(async { let _ = tokio::signal::ctrl_c().await; }).await
//!     })
//! };
//! // Hand frames from your transport to `world.handle_frame(&bytes)`.
//! let _ = maintenance.await;
//! world.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod world;

pub use config::WorldConfig;
pub use error::RealmError;
pub use world::{GameWorld, LocalWorldLink, LoginListener, MAX_NAME_CHARS};

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// more than once is harmless; only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Everything needed to run a world, in one import.
pub mod prelude {
    pub use crate::{GameWorld, LocalWorldLink, RealmError, WorldConfig};
    pub use realmkeep_player::{Delivery, Messenger, PlayerCache, PlayerHandle, SessionState};
    pub use realmkeep_protocol::{
        AccountId, Codec, FriendEntry, JsonCodec, LoginToken, MailAttachment, NackCode, PlayerId,
        ProtocolError, Request, Response, WorldId,
    };
    pub use realmkeep_session::{
        AccountCenter, FederationError, LoginGrant, LoginKey, SessionConfig, SessionError,
        WorldLink,
    };
    pub use realmkeep_store::{DocumentStore, MemoryStore, StoreError};
}
