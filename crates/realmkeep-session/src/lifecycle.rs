//! The session lifecycle: creation, login, logout, idle timeout, eviction.
//!
//! This is the only code that moves a player between states:
//!
//! ```text
//!                create ──────────────┐
//!                                     ▼
//! NonExistent ──login──→ Loading ──→ Online ──logout/idle──→ LoggingOut ──→ GracePeriod
//!                                     ▲                                         │
//!                                     └────────────── login (reclaim) ──────────┤
//!                                                                               ▼
//!                                                            grace elapsed: flush, Evicted
//! ```
//!
//! # Eviction without cancellation
//!
//! Logout arms a timer and forgets it. When the timer fires it re-enters the
//! player and only evicts if the player is still in its grace period *and*
//! no later logout has happened (the logout epoch it captured is current).
//! A reconnect therefore "cancels" eviction just by changing state.
//!
//! # Failure semantics
//!
//! Store failures on creation and on login-from-storage fail the request and
//! leave nothing behind in the cache.
//! A login never loads a player whose creation is still running. A failed eviction flush keeps the
//! player cached and re-arms the timer, so unflushed state is never dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use realmkeep_player::{
    Module, PersistenceScheduler, Player, PlayerBase, PlayerCache, PlayerError, PlayerHandle,
    SessionState,
};
use realmkeep_protocol::{AccountId, PlayerId};
use realmkeep_store::{collections, from_document, to_document, DocumentStore, StoreError};
use serde_json::Value;

use crate::{SessionConfig, SessionError};

/// Attempts at a fresh player ID before giving up on collisions.
const MAX_ID_ATTEMPTS: usize = 64;
/// Times a login retries after losing a race with load or eviction.
const MAX_LOGIN_ATTEMPTS: usize = 8;

/// How a login names its player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKey {
    Player(PlayerId),
    Account(AccountId),
}

impl fmt::Display for LoginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player(id) => write!(f, "{id}"),
            Self::Account(id) => write!(f, "{id}"),
        }
    }
}

/// Counts from [`SessionLifecycle::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub logged_out: usize,
    pub evicted: usize,
    pub failed: usize,
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

struct Inner<S> {
    store: Arc<S>,
    cache: PlayerCache,
    persistence: PersistenceScheduler,
    config: SessionConfig,
    next_player_id: AtomicU64,
    /// Accounts with a creation in progress.
    creating: DashSet<AccountId>,
}

/// Drives players through their session states. Cheap to clone; clones
/// share everything.
pub struct SessionLifecycle<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SessionLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Releases an account's creation claim when dropped.
struct CreateClaim<'a> {
    creating: &'a DashSet<AccountId>,
    account_id: AccountId,
}

impl Drop for CreateClaim<'_> {
    fn drop(&mut self) {
        self.creating.remove(&self.account_id);
    }
}

impl<S: DocumentStore> SessionLifecycle<S> {
    pub fn new(
        store: Arc<S>,
        cache: PlayerCache,
        persistence: PersistenceScheduler,
        config: SessionConfig,
    ) -> Self {
        let next_player_id = AtomicU64::new(config.first_player_id);
        Self {
            inner: Arc::new(Inner {
                store,
                cache,
                persistence,
                config,
                next_player_id,
                creating: DashSet::new(),
            }),
        }
    }

    pub fn cache(&self) -> &PlayerCache {
        &self.inner.cache
    }

    pub fn persistence(&self) -> &PersistenceScheduler {
        &self.inner.persistence
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Creates a player for an account that has none.
    ///
    /// Persists the base record synchronously, then each module's initial
    /// record, then caches the entity. The new player is left offline in
    /// its grace period; a following login reclaims it without touching
    /// storage.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyExists`] if the account owns a player (or a
    ///   creation for it is already running)
    /// - [`SessionError::Store`] if the base record can't be written
    pub async fn create(
        &self,
        account_id: AccountId,
        name: &str,
    ) -> Result<PlayerHandle, SessionError> {
        let Some(_claim) = self.claim_creation(account_id) else {
            return Err(SessionError::AlreadyExists(account_id));
        };
        let store = self.inner.store.as_ref();

        if self.inner.cache.lookup_by_account(account_id).is_some()
            || store
                .find_one(collections::PLAYER, "account_id", &Value::from(account_id.0))
                .await?
                .is_some()
        {
            return Err(SessionError::AlreadyExists(account_id));
        }

        let base = self.insert_base(account_id, name).await?;
        let player_id = base.player_id;
        let handle = PlayerHandle::new(base, Module::fresh_set(), self.inner.config.mailbox_capacity);

        let epoch = {
            let mut player = handle.enter().await;
            if let Err(e) = player.init_modules(store).await {
                tracing::warn!(%player_id, error = %e, "module records incomplete, next flush writes them");
            }
            player.set_state(SessionState::GracePeriod);
            player.logout_epoch()
        };

        self.inner.cache.insert(handle.clone())?;
        self.schedule_eviction(player_id, epoch);
        tracing::info!(%player_id, %account_id, name, "player created");
        Ok(handle)
    }

    fn claim_creation(&self, account_id: AccountId) -> Option<CreateClaim<'_>> {
        self.inner.creating.insert(account_id).then(|| CreateClaim {
            creating: &self.inner.creating,
            account_id,
        })
    }

    /// Inserts a base record under a fresh player ID, skipping IDs that are
    /// already taken in the store.
    async fn insert_base(&self, account_id: AccountId, name: &str) -> Result<PlayerBase, SessionError> {
        let mut last_err = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let player_id = PlayerId(self.inner.next_player_id.fetch_add(1, Ordering::Relaxed));
            let base = PlayerBase::new(player_id, account_id, name);
            match self
                .inner
                .store
                .insert_sync(collections::PLAYER, to_document(&base)?)
                .await
            {
                Ok(()) => return Ok(base),
                Err(e @ StoreError::DuplicateKey { .. }) => {
                    tracing::debug!(%player_id, "player id taken, trying the next one");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| StoreError::Unavailable("no player id available".into()))
            .into())
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    /// Brings a player online.
    ///
    /// - Cached and online: a duplicate session. The same entity comes back
    ///   with its idle counter reset.
    /// - Cached and in its grace period: reclaimed as is. No storage access.
    /// - Not cached: base record and modules are loaded, the entity cached.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if no player matches the key
    /// - [`SessionError::Store`] if loading the base record or any module
    ///   fails; nothing is cached
    /// - [`SessionError::Contended`] if the player's creation is still
    ///   running, or the login kept losing races with eviction
    pub async fn login(&self, key: LoginKey) -> Result<PlayerHandle, SessionError> {
        for _ in 0..MAX_LOGIN_ATTEMPTS {
            let cached = match key {
                LoginKey::Player(id) => self.inner.cache.lookup(id),
                LoginKey::Account(id) => self.inner.cache.lookup_by_account(id),
            };
            let handle = match cached {
                Some(handle) => handle,
                None => match self.load(key).await? {
                    Some(handle) => handle,
                    None => continue,
                },
            };

            let mut player = handle.enter().await;
            match player.state() {
                SessionState::Evicted => continue,
                SessionState::Online => {
                    player.touch();
                    player.drain_mailbox();
                    tracing::info!(player_id = %handle.player_id(), "duplicate login, keeping session");
                }
                _ => self.go_online(&handle, &mut player),
            }
            drop(player);
            return Ok(handle);
        }
        Err(SessionError::Contended(key))
    }

    /// Loads a player from storage and caches it. `None` means another task
    /// cached the same player first.
    async fn load(&self, key: LoginKey) -> Result<Option<PlayerHandle>, SessionError> {
        let store = self.inner.store.as_ref();
        let found = match key {
            LoginKey::Player(id) => {
                store
                    .find_one(collections::PLAYER, "_id", &Value::from(id.0))
                    .await?
            }
            LoginKey::Account(id) => {
                store
                    .find_one(collections::PLAYER, "account_id", &Value::from(id.0))
                    .await?
            }
        };
        let Some(doc) = found else {
            return Err(SessionError::NotFound(key));
        };
        let base: PlayerBase = from_document(doc)?;
        if self.inner.creating.contains(&base.account_id) {
            // Base record written, creation not finished: the entity isn't
            // cached yet and its module records may be missing.
            return Err(SessionError::Contended(key));
        }
        let player_id = base.player_id;
        let modules = Module::load_set(player_id, store).await?;
        let handle = PlayerHandle::new(base, modules, self.inner.config.mailbox_capacity);

        match self.inner.cache.insert(handle.clone()) {
            Ok(()) => {
                tracing::debug!(%player_id, "player loaded from store");
                Ok(Some(handle))
            }
            Err(PlayerError::DuplicateKey(_) | PlayerError::DuplicateAccount(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn go_online(&self, handle: &PlayerHandle, player: &mut Player) {
        let reclaimed = player.state() == SessionState::GracePeriod;
        player.set_state(SessionState::Online);
        player.touch();
        player.set_login_time(unix_now());
        player.on_login();
        player.drain_mailbox();
        self.inner.persistence.register(handle);
        tracing::info!(player_id = %handle.player_id(), reclaimed, "player online");
    }

    // -----------------------------------------------------------------------
    // Logout
    // -----------------------------------------------------------------------

    /// Logs an online player out and arms its eviction timer.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if the player isn't cached
    /// - [`SessionError::NotOnline`] if it is cached but not online
    pub async fn logout(&self, player_id: PlayerId) -> Result<(), SessionError> {
        let handle = self
            .inner
            .cache
            .lookup(player_id)
            .ok_or(SessionError::NotFound(LoginKey::Player(player_id)))?;
        let mut player = handle.enter().await;
        if !player.is_online() {
            return Err(SessionError::NotOnline(player_id));
        }
        let epoch = self.go_offline(&mut player).await;
        self.schedule_eviction(player_id, epoch);
        Ok(())
    }

    /// Online → LoggingOut → GracePeriod. Returns the new logout epoch.
    async fn go_offline(&self, player: &mut Player) -> u64 {
        let player_id = player.player_id();
        player.drain_mailbox();
        player.set_state(SessionState::LoggingOut);
        player.on_logout();
        let epoch = player.mark_logged_out(unix_now());
        if let Err(e) = player.write_modules(self.inner.store.as_ref()).await {
            tracing::warn!(%player_id, error = %e, "logout write failed, eviction flush will retry");
        }
        self.inner.persistence.unregister(player_id);
        player.set_state(SessionState::GracePeriod);
        tracing::info!(%player_id, "player logged out");
        epoch
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    fn schedule_eviction(&self, player_id: PlayerId, epoch: u64) {
        let this = self.clone();
        let grace = self.inner.config.grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            this.evict_if_offline(player_id, epoch).await;
        });
    }

    /// Evicts the player if it is still in the grace period that began with
    /// logout `epoch`. Returns whether it was evicted.
    pub async fn evict_if_offline(&self, player_id: PlayerId, epoch: u64) -> bool {
        let Some(handle) = self.inner.cache.lookup(player_id) else {
            return false;
        };
        let mut player = handle.enter().await;
        if player.state() != SessionState::GracePeriod || player.logout_epoch() != epoch {
            tracing::debug!(%player_id, "eviction aborted, player came back");
            return false;
        }
        self.evict_locked(&handle, &mut player).await
    }

    /// Final flush, then out of the cache. On a failed flush the player
    /// stays cached and the timer is re-armed.
    async fn evict_locked(&self, handle: &PlayerHandle, player: &mut Player) -> bool {
        let player_id = handle.player_id();
        player.drain_mailbox();
        match player.flush(self.inner.store.as_ref()).await {
            Ok(()) => {
                player.set_state(SessionState::Evicted);
                if self
                    .inner
                    .cache
                    .lookup(player_id)
                    .is_some_and(|cached| cached.same_entity(handle))
                {
                    self.inner.cache.remove(player_id);
                }
                tracing::info!(%player_id, "player evicted");
                true
            }
            Err(e) => {
                tracing::warn!(%player_id, error = %e, "eviction flush failed, keeping player cached");
                self.schedule_eviction(player_id, player.logout_epoch());
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Idle sweep
    // -----------------------------------------------------------------------

    /// One idle tick over every online player.
    ///
    /// Each player not busy in its own context has its mailbox drained
    /// (applied operations count as activity) and its idle counter bumped.
    /// Players past the threshold are logged out. Returns who was.
    pub async fn idle_tick(&self) -> Vec<PlayerId> {
        let threshold = self.inner.config.idle_threshold;
        let mut forced = Vec::new();

        for handle in self.inner.cache.handles() {
            if !handle.is_online() {
                continue;
            }
            // Busy means a request is running for this player right now.
            let Some(mut player) = handle.try_enter() else {
                continue;
            };
            if !player.is_online() {
                continue;
            }
            player.drain_mailbox();
            if player.tick_idle() > threshold {
                let player_id = handle.player_id();
                tracing::info!(%player_id, threshold, "idle limit reached, forcing logout");
                let epoch = self.go_offline(&mut player).await;
                self.schedule_eviction(player_id, epoch);
                forced.push(player_id);
            }
        }
        forced
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Logs out every online player and evicts every cached one right away.
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        for handle in self.inner.cache.handles() {
            let mut player = handle.enter().await;
            if player.is_online() {
                self.go_offline(&mut player).await;
                report.logged_out += 1;
            }
            if player.state() == SessionState::Evicted {
                continue;
            }
            if self.evict_locked(&handle, &mut player).await {
                report.evicted += 1;
            } else {
                report.failed += 1;
            }
        }
        tracing::info!(
            logged_out = report.logged_out,
            evicted = report.evicted,
            failed = report.failed,
            "sessions shut down"
        );
        report
    }

    /// Players currently online.
    pub fn online_count(&self) -> usize {
        self.inner
            .cache
            .handles()
            .iter()
            .filter(|h| h.is_online())
            .count()
    }
}
