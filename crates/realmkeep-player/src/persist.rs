//! The periodic full-write sweep.

use std::sync::Arc;

use dashmap::DashMap;
use realmkeep_protocol::PlayerId;
use realmkeep_store::DocumentStore;

use crate::PlayerHandle;

/// Outcome of one [`PersistenceScheduler::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub flushed: usize,
    pub failed: usize,
    /// Registered at the start of the sweep but gone or offline by the time
    /// their turn came.
    pub skipped: usize,
}

/// The set of entities the periodic sweep writes.
///
/// Online players are registered at login and unregistered at logout. The
/// sweep is the safety net against a crash; logout and eviction write on
/// their own.
#[derive(Clone, Default)]
pub struct PersistenceScheduler {
    registered: Arc<DashMap<PlayerId, PlayerHandle>>,
}

impl PersistenceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: &PlayerHandle) {
        self.registered.insert(handle.player_id(), handle.clone());
    }

    pub fn unregister(&self, player_id: PlayerId) {
        self.registered.remove(&player_id);
    }

    pub fn is_registered(&self, player_id: PlayerId) -> bool {
        self.registered.contains_key(&player_id)
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Flushes every registered entity in full.
    ///
    /// Works from a snapshot of the set; an entity unregistered or taken
    /// offline mid-sweep is skipped. One entity failing does not stop the
    /// others, and a failed entity stays registered for the next sweep.
    pub async fn sweep<S: DocumentStore>(&self, store: &S) -> SweepReport {
        let snapshot: Vec<PlayerHandle> =
            self.registered.iter().map(|e| e.value().clone()).collect();
        let mut report = SweepReport::default();

        for handle in snapshot {
            let player_id = handle.player_id();
            if !self.is_registered(player_id) {
                report.skipped += 1;
                continue;
            }
            let player = handle.enter().await;
            if !player.is_online() {
                report.skipped += 1;
                continue;
            }
            match player.flush(store).await {
                Ok(()) => report.flushed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(%player_id, error = %e, "periodic flush failed, retrying next sweep");
                }
            }
        }

        tracing::info!(
            flushed = report.flushed,
            failed = report.failed,
            skipped = report.skipped,
            "persistence sweep finished"
        );
        report
    }
}
