//! Cross-player mutation through mailboxes.
//!
//! Code running for player A must never change player B's state directly.
//! It calls [`Messenger::notify`] with a closure instead, and B runs that
//! closure inside its own context the next time it drains its mailbox.
//! Mutation of any one entity is therefore serialised without A ever
//! taking B's lock.
//!
//! `notify` never waits:
//!
//! | target | result |
//! |---|---|
//! | online, mailbox has room | [`Delivery::Queued`] |
//! | online, mailbox full | [`Delivery::Dropped`] + warning |
//! | offline or not cached | [`Delivery::Offline`], operation discarded |
//!
//! Reads are not mediated: A may read B's identity through the cache at any
//! time, and will only see B's queued changes after B drains them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use realmkeep_protocol::PlayerId;

use crate::mailbox::PushError;
use crate::{Player, PlayerCache};

/// What happened to a notified operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// In the target's mailbox; it will run at the target's next drain.
    Queued,
    /// The target is offline or unknown; the operation was discarded.
    Offline,
    /// The target's mailbox was full; the operation was discarded.
    Dropped,
}

/// Snapshot of the messenger's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessengerStats {
    pub queued: u64,
    pub offline: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    offline: AtomicU64,
    dropped: AtomicU64,
}

/// Routes operations to player mailboxes. Cheap to clone.
#[derive(Clone)]
pub struct Messenger {
    cache: PlayerCache,
    counters: Arc<Counters>,
}

impl Messenger {
    pub fn new(cache: PlayerCache) -> Self {
        Self {
            cache,
            counters: Arc::default(),
        }
    }

    /// Queues `op` for `target` without blocking.
    pub fn notify<F>(&self, target: PlayerId, op: F) -> Delivery
    where
        F: FnOnce(&mut Player) + Send + 'static,
    {
        let handle = match self.cache.lookup(target) {
            Some(h) if h.is_online() => h,
            _ => {
                self.counters.offline.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%target, "notify target offline, operation discarded");
                return Delivery::Offline;
            }
        };

        match handle.mailbox().try_push(Box::new(op)) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%target, "operation queued");
                Delivery::Queued
            }
            Err(PushError::Full) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    %target,
                    capacity = handle.mailbox().capacity(),
                    "mailbox full, operation dropped"
                );
                Delivery::Dropped
            }
            Err(PushError::Closed) => {
                self.counters.offline.fetch_add(1, Ordering::Relaxed);
                Delivery::Offline
            }
        }
    }

    pub fn stats(&self) -> MessengerStats {
        MessengerStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            offline: self.counters.offline.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn cache(&self) -> &PlayerCache {
        &self.cache
    }
}
