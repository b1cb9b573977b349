//! Integration tests for the session lifecycle.
//!
//! Time-dependent paths (grace window, eviction timers) run on a paused
//! Tokio clock: `sleep` in the test body auto-advances time, and every
//! eviction timer due before the test wakes has already run.

use std::sync::Arc;
use std::time::Duration;

use realmkeep_player::{
    BattleModule, Delivery, Messenger, PersistenceScheduler, Player, PlayerCache, SessionState,
};
use realmkeep_protocol::{AccountId, PlayerId};
use realmkeep_session::{LoginKey, SessionConfig, SessionError, SessionLifecycle};
use realmkeep_store::{
    collections, Document, DocumentStore, Filter, MemoryStore, Patch, StoreError,
};
use serde_json::Value;
use tokio::sync::Semaphore;

// =========================================================================
// Helpers
// =========================================================================

fn aid(n: u64) -> AccountId {
    AccountId(n)
}

fn setup(grace_secs: u64) -> (SessionLifecycle<MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    let lifecycle = SessionLifecycle::new(
        Arc::new(store.clone()),
        PlayerCache::new(),
        PersistenceScheduler::new(),
        SessionConfig {
            reconnect_grace_secs: grace_secs,
            ..SessionConfig::default()
        },
    );
    (lifecycle, store)
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// A [`MemoryStore`] whose mail-record inserts wait for a permit, which
/// holds `create` between writing the base record and caching the player.
struct GatedStore {
    inner: MemoryStore,
    gate: Arc<Semaphore>,
}

impl DocumentStore for GatedStore {
    async fn find_one(
        &self,
        collection: &str,
        key: &str,
        value: &Value,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(collection, key, value).await
    }

    async fn insert_sync(&self, collection: &str, record: Document) -> Result<(), StoreError> {
        if collection == collections::MAIL {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        self.inner.insert_sync(collection, record).await
    }

    async fn update_sync(
        &self,
        collection: &str,
        id: &Value,
        record: Document,
    ) -> Result<(), StoreError> {
        self.inner.update_sync(collection, id, record).await
    }

    fn update_detached(&self, collection: &str, filter: Filter, patch: Patch) {
        self.inner.update_detached(collection, filter, patch);
    }

    fn upsert_detached(&self, collection: &str, id: &Value, patch: Patch) {
        self.inner.upsert_detached(collection, id, patch);
    }
}

/// Creates and logs in a player for `account`.
async fn online(lc: &SessionLifecycle<MemoryStore>, account: u64, name: &str) -> PlayerId {
    lc.create(aid(account), name).await.unwrap();
    lc.login(LoginKey::Account(aid(account))).await.unwrap().player_id()
}

// =========================================================================
// create()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_create_then_login_matches_input() {
    let (lc, _store) = setup(30);

    let created = lc.create(aid(1), "ash").await.unwrap();
    let logged_in = lc.login(LoginKey::Account(aid(1))).await.unwrap();

    assert!(created.same_entity(&logged_in));
    assert_eq!(logged_in.account_id(), aid(1));
    assert_eq!(logged_in.name(), "ash");
    assert!(logged_in.is_online());
    assert_eq!(lc.cache().len(), 1);
    assert!(lc.persistence().is_registered(logged_in.player_id()));
}

#[tokio::test(start_paused = true)]
async fn test_create_allocates_ids_from_configured_start() {
    let (lc, _store) = setup(30);
    let first = lc.create(aid(1), "a").await.unwrap();
    let second = lc.create(aid(2), "b").await.unwrap();
    assert_eq!(first.player_id(), PlayerId(10_000));
    assert_eq!(second.player_id(), PlayerId(10_001));
}

#[tokio::test(start_paused = true)]
async fn test_create_skips_ids_already_in_store() {
    let (lc, store) = setup(30);
    // A record left by an earlier run of this world.
    {
        use realmkeep_store::DocumentStore;
        store
            .insert_sync(
                collections::PLAYER,
                serde_json::json!({"_id": 10_000, "account_id": 99, "name": "old"}),
            )
            .await
            .unwrap();
    }

    let created = lc.create(aid(1), "new").await.unwrap();
    assert_eq!(created.player_id(), PlayerId(10_001));
}

#[tokio::test(start_paused = true)]
async fn test_create_duplicate_account_fails_without_second_record() {
    let (lc, store) = setup(30);
    lc.create(aid(1), "ash").await.unwrap();

    let err = lc.create(aid(1), "ash again").await.unwrap_err();

    assert!(matches!(err, SessionError::AlreadyExists(a) if a == aid(1)));
    assert_eq!(store.len(collections::PLAYER), 1);
    assert_eq!(lc.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_duplicate_account_after_eviction_still_fails() {
    let (lc, store) = setup(1);
    lc.create(aid(1), "ash").await.unwrap();
    sleep_secs(2).await;
    assert!(lc.cache().is_empty());

    let err = lc.create(aid(1), "ash").await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyExists(_)));
    assert_eq!(store.len(collections::PLAYER), 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_with_store_down_creates_nothing() {
    let (lc, store) = setup(30);
    store.set_unavailable(true);

    let err = lc.create(aid(1), "ash").await.unwrap_err();

    assert!(matches!(err, SessionError::Store(_)));
    assert!(lc.cache().is_empty());
    store.set_unavailable(false);
    assert!(store.is_empty(collections::PLAYER));
}

#[tokio::test(start_paused = true)]
async fn test_create_writes_every_module_record() {
    let (lc, store) = setup(30);
    let handle = lc.create(aid(1), "ash").await.unwrap();
    let id = handle.player_id().0;
    for collection in [
        collections::MAIL,
        collections::FRIEND,
        collections::CHAT,
        collections::BATTLE,
    ] {
        assert!(store.get(collection, id).is_some(), "{collection}");
    }
}

// =========================================================================
// login()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_unknown_player_not_found() {
    let (lc, _store) = setup(30);
    let err = lc.login(LoginKey::Account(aid(404))).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(LoginKey::Account(_))));
    let err = lc.login(LoginKey::Player(PlayerId(404))).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(LoginKey::Player(_))));
}

#[tokio::test(start_paused = true)]
async fn test_login_duplicate_session_returns_same_entity() {
    let (lc, _store) = setup(30);
    let id = online(&lc, 1, "ash").await;
    let handle = lc.cache().lookup(id).unwrap();
    handle.enter().await.tick_idle();

    let again = lc.login(LoginKey::Player(id)).await.unwrap();

    assert!(again.same_entity(&handle));
    assert_eq!(again.enter().await.idle_ticks(), 0);
    assert_eq!(lc.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_relogin_within_grace_reuses_entity_without_store() {
    let (lc, store) = setup(30);
    let id = online(&lc, 1, "ash").await;
    let before = lc.cache().lookup(id).unwrap();
    lc.logout(id).await.unwrap();
    assert!(!before.is_online());

    // Any storage access during the reclaim would fail.
    store.set_unavailable(true);
    sleep_secs(10).await;
    let after = lc.login(LoginKey::Player(id)).await.unwrap();
    store.set_unavailable(false);

    assert!(after.same_entity(&before));
    assert!(after.is_online());
    let player = after.enter().await;
    assert_eq!(player.state(), SessionState::Online);
    assert_eq!(player.idle_ticks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_after_eviction_loads_saved_state() {
    let (lc, _store) = setup(1);
    let id = online(&lc, 1, "ash").await;
    let first = lc.cache().lookup(id).unwrap();
    first
        .enter()
        .await
        .module_mut::<BattleModule>()
        .unwrap()
        .record(true);
    lc.logout(id).await.unwrap();
    sleep_secs(2).await;
    assert!(lc.cache().lookup(id).is_none());
    assert_eq!(first.enter().await.state(), SessionState::Evicted);

    let second = lc.login(LoginKey::Player(id)).await.unwrap();

    assert!(!second.same_entity(&first));
    assert_eq!(second.enter().await.module::<BattleModule>().unwrap().wins(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_from_store_with_store_down_fails_and_caches_nothing() {
    let (lc, store) = setup(1);
    let id = online(&lc, 1, "ash").await;
    lc.logout(id).await.unwrap();
    sleep_secs(2).await;
    assert!(lc.cache().is_empty());

    store.set_unavailable(true);
    let err = lc.login(LoginKey::Player(id)).await.unwrap_err();

    assert!(matches!(err, SessionError::Store(_)));
    assert!(lc.cache().is_empty());
    store.set_unavailable(false);
    assert!(lc.login(LoginKey::Player(id)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_login_with_one_module_unreadable_fails_and_keeps_record() {
    let (lc, store) = setup(1);
    let id = online(&lc, 1, "ash").await;
    {
        let handle = lc.cache().lookup(id).unwrap();
        let mut player = handle.enter().await;
        for _ in 0..5 {
            player.module_mut::<BattleModule>().unwrap().record(true);
        }
    }
    lc.logout(id).await.unwrap();
    sleep_secs(2).await;
    assert!(lc.cache().is_empty());

    store.fail_reads_from(collections::BATTLE);
    let err = lc.login(LoginKey::Account(aid(1))).await.unwrap_err();
    assert!(matches!(err, SessionError::Store(_)));
    assert!(lc.cache().is_empty());
    assert_eq!(store.get(collections::BATTLE, id.0).unwrap()["wins"], 5);

    store.clear_failures();
    let handle = lc.login(LoginKey::Account(aid(1))).await.unwrap();
    assert_eq!(handle.enter().await.module::<BattleModule>().unwrap().wins(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_login_during_create_is_contended_then_succeeds() {
    let store = MemoryStore::new();
    let gate = Arc::new(Semaphore::new(0));
    let lc = SessionLifecycle::new(
        Arc::new(GatedStore {
            inner: store.clone(),
            gate: Arc::clone(&gate),
        }),
        PlayerCache::new(),
        PersistenceScheduler::new(),
        SessionConfig::default(),
    );
    let creating = tokio::spawn({
        let lc = lc.clone();
        async move { lc.create(aid(1), "ash").await }
    });
    while store.is_empty(collections::PLAYER) {
        tokio::task::yield_now().await;
    }

    let err = lc.login(LoginKey::Account(aid(1))).await.unwrap_err();
    assert!(matches!(err, SessionError::Contended(_)));
    assert!(lc.cache().is_empty());

    gate.add_permits(1);
    let created = creating.await.unwrap().unwrap();
    let logged_in = lc.login(LoginKey::Account(aid(1))).await.unwrap();
    assert!(created.same_entity(&logged_in));
    assert!(logged_in.is_online());
}

// =========================================================================
// logout() and eviction
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_unknown_or_offline_player_fails() {
    let (lc, _store) = setup(30);
    assert!(matches!(
        lc.logout(PlayerId(1)).await,
        Err(SessionError::NotFound(_))
    ));

    let created = lc.create(aid(1), "ash").await.unwrap();
    assert!(matches!(
        lc.logout(created.player_id()).await,
        Err(SessionError::NotOnline(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_logout_unregisters_and_enters_grace() {
    let (lc, _store) = setup(30);
    let id = online(&lc, 1, "ash").await;

    lc.logout(id).await.unwrap();

    assert!(!lc.persistence().is_registered(id));
    let handle = lc.cache().lookup(id).unwrap();
    assert_eq!(handle.enter().await.state(), SessionState::GracePeriod);
}

#[tokio::test(start_paused = true)]
async fn test_grace_elapsed_evicts_with_exactly_one_flush() {
    let (lc, store) = setup(30);
    let id = online(&lc, 1, "ash").await;
    lc.logout(id).await.unwrap();
    let base_writes = store.write_count(collections::PLAYER, id.0);

    sleep_secs(29).await;
    assert!(lc.cache().lookup(id).is_some());

    sleep_secs(2).await;
    assert!(lc.cache().lookup(id).is_none());
    assert_eq!(store.write_count(collections::PLAYER, id.0), base_writes + 1);

    sleep_secs(60).await;
    assert_eq!(store.write_count(collections::PLAYER, id.0), base_writes + 1);
}

#[tokio::test(start_paused = true)]
async fn test_only_latest_logout_timer_evicts() {
    let (lc, _store) = setup(30);
    let id = online(&lc, 1, "ash").await;

    lc.logout(id).await.unwrap(); // timer due at t=30
    sleep_secs(20).await;
    lc.login(LoginKey::Player(id)).await.unwrap();
    lc.logout(id).await.unwrap(); // timer due at t=50

    sleep_secs(15).await; // t=35
    assert!(lc.cache().lookup(id).is_some(), "stale timer must not evict");

    sleep_secs(20).await; // t=55
    assert!(lc.cache().lookup(id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_eviction_flush_keeps_player_and_retries() {
    let (lc, store) = setup(5);
    let id = online(&lc, 1, "ash").await;
    lc.logout(id).await.unwrap();
    store.fail_writes_for(collections::PLAYER, id.0);

    sleep_secs(6).await;
    let handle = lc.cache().lookup(id).unwrap();
    assert_eq!(handle.enter().await.state(), SessionState::GracePeriod);

    store.clear_failures();
    sleep_secs(6).await;
    assert!(lc.cache().lookup(id).is_none());
}

// =========================================================================
// idle_tick()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_past_threshold_forces_logout() {
    let (lc, _store) = setup(30);
    let id = online(&lc, 1, "ash").await;

    for _ in 0..10 {
        assert!(lc.idle_tick().await.is_empty());
    }
    assert_eq!(lc.idle_tick().await, vec![id]);

    let handle = lc.cache().lookup(id).unwrap();
    assert!(!handle.is_online());
    assert!(!lc.persistence().is_registered(id));
}

#[tokio::test(start_paused = true)]
async fn test_notified_operation_resets_idle_counter() {
    let (lc, _store) = setup(30);
    let id = online(&lc, 1, "ash").await;
    let messenger = Messenger::new(lc.cache().clone());

    for _ in 0..8 {
        lc.idle_tick().await;
    }
    let delivery = messenger.notify(id, |p: &mut Player| {
        p.module_mut::<BattleModule>().unwrap().record(false);
    });
    assert_eq!(delivery, Delivery::Queued);

    // This tick drains the operation (activity) before counting.
    lc.idle_tick().await;
    let handle = lc.cache().lookup(id).unwrap();
    assert_eq!(handle.enter().await.idle_ticks(), 1);
    assert_eq!(handle.enter().await.module::<BattleModule>().unwrap().losses(), 1);

    for _ in 0..9 {
        assert!(lc.idle_tick().await.is_empty());
    }
    assert_eq!(lc.idle_tick().await, vec![id]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_tick_skips_offline_players() {
    let (lc, _store) = setup(30);
    lc.create(aid(1), "ash").await.unwrap();
    for _ in 0..20 {
        assert!(lc.idle_tick().await.is_empty());
    }
}

// =========================================================================
// shutdown()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_and_evicts_everyone() {
    let (lc, store) = setup(30);
    let a = online(&lc, 1, "ash").await;
    let b = online(&lc, 2, "bo").await;
    lc.logout(b).await.unwrap();
    lc.create(aid(3), "cy").await.unwrap();

    let report = lc.shutdown().await;

    assert_eq!(report.logged_out, 1);
    assert_eq!(report.evicted, 3);
    assert_eq!(report.failed, 0);
    assert!(lc.cache().is_empty());
    assert_eq!(lc.online_count(), 0);
    assert!(store.get(collections::PLAYER, a.0).unwrap()["logout_time"].as_i64() > Some(0));
}
