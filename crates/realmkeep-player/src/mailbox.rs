//! The bounded per-player queue of deferred operations.

use tokio::sync::mpsc;

use crate::Player;

/// A unit of work bound to one player, run inside that player's own context.
pub type Operation = Box<dyn FnOnce(&mut Player) + Send + 'static>;

/// Why an operation could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The mailbox is at capacity.
    Full,
    /// The owning entity is gone.
    Closed,
}

/// The producer side of a player's mailbox. Cloned freely; pushing never
/// waits.
#[derive(Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<Operation>,
}

impl MailboxSender {
    /// Appends `op` if there is room. Never blocks.
    pub fn try_push(&self, op: Operation) -> Result<(), PushError> {
        self.tx.try_send(op).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Total capacity of the mailbox.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// The consumer side, owned by the [`Player`] itself.
pub(crate) struct Mailbox {
    rx: mpsc::Receiver<Operation>,
}

impl Mailbox {
    /// Operations queued right now.
    pub(crate) fn pending(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn try_pop(&mut self) -> Option<Operation> {
        self.rx.try_recv().ok()
    }
}

/// Creates a mailbox holding at most `capacity` operations (at least 1).
pub(crate) fn mailbox(capacity: usize) -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailboxSender { tx }, Mailbox { rx })
}
