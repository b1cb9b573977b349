//! The player entity and its shared handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use realmkeep_protocol::{AccountId, PlayerId};
use realmkeep_store::{collections, to_document, DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::mailbox::{mailbox, Mailbox, MailboxSender};
use crate::module::record_id;
use crate::{Module, PlayerError, PlayerModule};

// ---------------------------------------------------------------------------
// PlayerBase
// ---------------------------------------------------------------------------

/// The base record: identity plus session timestamps.
///
/// Stored in [`collections::PLAYER`] keyed by player ID. Timestamps are Unix
/// seconds, 0 meaning "never".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBase {
    #[serde(rename = "_id")]
    pub player_id: PlayerId,
    pub account_id: AccountId,
    pub name: String,
    #[serde(default)]
    pub login_time: i64,
    #[serde(default)]
    pub logout_time: i64,
}

impl PlayerBase {
    pub fn new(player_id: PlayerId, account_id: AccountId, name: impl Into<String>) -> Self {
        Self {
            player_id,
            account_id,
            name: name.into(),
            login_time: 0,
            logout_time: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where an entity is in its session lifecycle.
///
/// ```text
/// NonExistent ──→ Loading ──→ Online ──→ LoggingOut ──→ GracePeriod ──→ Evicted
///                               ↑                            │
///                               └────────── login ───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NonExistent,
    Loading,
    Online,
    LoggingOut,
    GracePeriod,
    /// Terminal. The entity has left the cache; a handle still pointing at
    /// it must not be used to log in.
    Evicted,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One player's in-memory state.
///
/// Only reachable through [`PlayerHandle::enter`], so every `&mut Player`
/// is, by construction, the player's own context.
pub struct Player {
    base: PlayerBase,
    modules: [Module; 4],
    state: SessionState,
    idle_ticks: u32,
    logout_epoch: u64,
    online: Arc<AtomicBool>,
    mailbox: Mailbox,
}

impl Player {
    pub fn base(&self) -> &PlayerBase {
        &self.base
    }

    pub fn player_id(&self) -> PlayerId {
        self.base.player_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `state`, keeping the handle's lock-free online flag in step.
    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.online
            .store(state == SessionState::Online, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.state == SessionState::Online
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Records activity: the idle counter goes back to zero.
    pub fn touch(&mut self) {
        self.idle_ticks = 0;
    }

    /// Advances the idle counter by one tick and returns the new value.
    pub fn tick_idle(&mut self) -> u32 {
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        self.idle_ticks
    }

    /// Incremented on every logout; a pending eviction only proceeds if the
    /// epoch it captured is still current.
    pub fn logout_epoch(&self) -> u64 {
        self.logout_epoch
    }

    pub fn set_login_time(&mut self, unix_secs: i64) {
        self.base.login_time = unix_secs;
    }

    /// Stamps the logout time and starts a new logout epoch, returning it.
    pub fn mark_logged_out(&mut self, unix_secs: i64) -> u64 {
        self.base.logout_time = unix_secs;
        self.logout_epoch += 1;
        self.logout_epoch
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Typed access to one module.
    pub fn module<M: PlayerModule>(&self) -> Result<&M, PlayerError> {
        M::project(&self.modules[M::KIND.index()]).ok_or(PlayerError::ModuleMissing(M::KIND))
    }

    /// Typed mutable access to one module.
    pub fn module_mut<M: PlayerModule>(&mut self) -> Result<&mut M, PlayerError> {
        M::project_mut(&mut self.modules[M::KIND.index()])
            .ok_or(PlayerError::ModuleMissing(M::KIND))
    }

    /// Pops and runs every operation queued when the drain started, in
    /// FIFO order. Operations queued while draining wait for the next call.
    ///
    /// Returns how many ran. Running at least one counts as activity.
    pub fn drain_mailbox(&mut self) -> usize {
        let queued = self.mailbox.pending();
        let mut applied = 0;
        for _ in 0..queued {
            let Some(op) = self.mailbox.try_pop() else {
                break;
            };
            op(self);
            applied += 1;
        }
        if applied > 0 {
            self.touch();
            tracing::trace!(player_id = %self.base.player_id, applied, "mailbox drained");
        }
        applied
    }

    /// Operations waiting in the mailbox.
    pub fn pending_operations(&self) -> usize {
        self.mailbox.pending()
    }

    // -- module lifecycle ---------------------------------------------------

    /// Runs every module's `init_and_insert` in registration order. All
    /// modules are attempted; the first failure is returned.
    pub async fn init_modules<S: DocumentStore>(&mut self, store: &S) -> Result<(), StoreError> {
        let mut first_err = None;
        for module in &mut self.modules {
            if let Err(e) = module.init_and_insert(&self.base, store).await {
                tracing::warn!(
                    player_id = %self.base.player_id,
                    module = %module.kind(),
                    error = %e,
                    "module init failed"
                );
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn on_login(&mut self) {
        for module in &mut self.modules {
            module.on_login(&self.base);
        }
    }

    pub fn on_logout(&mut self) {
        for module in &mut self.modules {
            module.on_logout(&self.base);
        }
    }

    /// Writes every module. All are attempted; the first failure is returned.
    pub async fn write_modules<S: DocumentStore>(&self, store: &S) -> Result<(), StoreError> {
        let owner = self.base.player_id;
        let mut first_err = None;
        for module in &self.modules {
            if let Err(e) = module.write_to_db(owner, store).await {
                tracing::warn!(player_id = %owner, module = %module.kind(), error = %e, "module write failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Full flush: the base record, then every module.
    pub async fn flush<S: DocumentStore>(&self, store: &S) -> Result<(), StoreError> {
        let base = to_document(&self.base)?;
        store
            .update_sync(collections::PLAYER, &record_id(self.base.player_id), base)
            .await?;
        self.write_modules(store).await
    }
}

// ---------------------------------------------------------------------------
// PlayerHandle
// ---------------------------------------------------------------------------

struct Shared {
    player_id: PlayerId,
    account_id: AccountId,
    name: String,
    online: Arc<AtomicBool>,
    mailbox: MailboxSender,
    entity: Mutex<Player>,
}

/// A shareable reference to one player entity.
///
/// Identity, the online flag, and the mailbox are readable from anywhere
/// without waiting. Everything else requires entering the player's own
/// context with [`enter`](Self::enter).
#[derive(Clone)]
pub struct PlayerHandle(Arc<Shared>);

impl PlayerHandle {
    /// Wraps a new entity, in [`SessionState::Loading`], with a mailbox of
    /// `mailbox_capacity` operations.
    pub fn new(base: PlayerBase, modules: [Module; 4], mailbox_capacity: usize) -> Self {
        let (tx, rx) = mailbox(mailbox_capacity);
        let online = Arc::new(AtomicBool::new(false));
        let player = Player {
            base: base.clone(),
            modules,
            state: SessionState::Loading,
            idle_ticks: 0,
            logout_epoch: 0,
            online: Arc::clone(&online),
            mailbox: rx,
        };
        Self(Arc::new(Shared {
            player_id: base.player_id,
            account_id: base.account_id,
            name: base.name,
            online,
            mailbox: tx,
            entity: Mutex::new(player),
        }))
    }

    pub fn player_id(&self) -> PlayerId {
        self.0.player_id
    }

    pub fn account_id(&self) -> AccountId {
        self.0.account_id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Lock-free read of the online flag. May lag a transition that is in
    /// progress on another task.
    pub fn is_online(&self) -> bool {
        self.0.online.load(Ordering::Acquire)
    }

    pub fn mailbox(&self) -> &MailboxSender {
        &self.0.mailbox
    }

    /// Enters the player's own context, waiting for whoever holds it.
    pub async fn enter(&self) -> MutexGuard<'_, Player> {
        self.0.entity.lock().await
    }

    /// Enters the player's own context only if nobody else is in it.
    pub fn try_enter(&self) -> Option<MutexGuard<'_, Player>> {
        self.0.entity.try_lock().ok()
    }

    /// Whether two handles refer to the same entity instance.
    pub fn same_entity(&self, other: &PlayerHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("player_id", &self.0.player_id)
            .field("account_id", &self.0.account_id)
            .field("online", &self.is_online())
            .finish()
    }
}
