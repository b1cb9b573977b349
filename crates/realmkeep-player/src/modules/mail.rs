//! Player mail.
//!
//! Mail is the one module that can be written while its owner is not
//! online. Delivery to an online player goes through the mailbox like any
//! other foreign write. Delivery to anyone else is appended to the
//! recipient's record in [`collections::MAIL_PENDING`] with a detached
//! upsert and never touches a live entity. The owner absorbs those entries
//! the next time it is loaded from storage.
//!
//! The owner counts every pending entry it has absorbed (`pending_seen`).
//! Once that count is stored with the mail record, the absorbed entries are
//! trimmed off the front of the pending record, which counts its trimmed
//! entries in `dropped`. Entry `i` of the pending array is therefore entry
//! `dropped + i` overall.

use std::sync::atomic::{AtomicUsize, Ordering};

use realmkeep_protocol::{MailAttachment, PlayerId};
use realmkeep_store::{
    collections, to_document, DocumentStore, Filter, Patch, StoreError,
};
use serde::{Deserialize, Serialize};

use crate::module::{load_record, module_record, record_id};
use crate::{Module, ModuleKind, PlayerError, PlayerModule};

/// Oldest mail is discarded past this many.
pub const INBOX_LIMIT: usize = 100;

/// One piece of mail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Assigned by the recipient on arrival; 0 until then.
    #[serde(default)]
    pub id: u32,
    pub from: PlayerId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub attachment: Option<MailAttachment>,
    #[serde(default)]
    pub read: bool,
    pub sent_at: i64,
}

impl Mail {
    /// A new, unread, unnumbered mail stamped with the current time.
    pub fn new(
        from: PlayerId,
        title: impl Into<String>,
        content: impl Into<String>,
        attachment: Option<MailAttachment>,
    ) -> Self {
        Self {
            id: 0,
            from,
            title: title.into(),
            content: content.into(),
            attachment,
            read: false,
            sent_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MailModule {
    #[serde(default)]
    inbox: Vec<Mail>,
    #[serde(default)]
    next_mail_id: u32,
    /// Pending entries ever absorbed into `inbox`.
    #[serde(default)]
    pending_seen: usize,
    /// Pending entries known to be trimmed from the stored record.
    #[serde(skip)]
    pending_dropped: AtomicUsize,
}

/// Shape of a [`collections::MAIL_PENDING`] record.
#[derive(Deserialize)]
struct PendingMail {
    #[serde(default)]
    mails: Vec<Mail>,
    #[serde(default)]
    dropped: usize,
}

impl MailModule {
    /// Files `mail` in the inbox and returns its new ID.
    pub fn receive(&mut self, mut mail: Mail) -> u32 {
        self.next_mail_id += 1;
        mail.id = self.next_mail_id;
        self.inbox.push(mail);
        if self.inbox.len() > INBOX_LIMIT {
            let overflow = self.inbox.len() - INBOX_LIMIT;
            self.inbox.drain(..overflow);
        }
        self.next_mail_id
    }

    pub fn inbox(&self) -> &[Mail] {
        &self.inbox
    }

    pub fn unread(&self) -> usize {
        self.inbox.iter().filter(|m| !m.read).count()
    }

    pub fn read(&mut self, id: u32) -> Result<&Mail, PlayerError> {
        let mail = self.find_mut(id)?;
        mail.read = true;
        Ok(mail)
    }

    pub fn delete(&mut self, id: u32) -> Result<Mail, PlayerError> {
        let pos = self
            .inbox
            .iter()
            .position(|m| m.id == id)
            .ok_or(PlayerError::MailNotFound(id))?;
        Ok(self.inbox.remove(pos))
    }

    /// Removes and returns the attachment. Taking it twice yields `None`
    /// the second time.
    pub fn take_attachment(&mut self, id: u32) -> Result<Option<MailAttachment>, PlayerError> {
        let mail = self.find_mut(id)?;
        mail.read = true;
        Ok(mail.attachment.take())
    }

    /// Appends `mail` to `target`'s pending record without loading it,
    /// creating the record if it doesn't exist yet.
    ///
    /// Fire-and-forget: only a local encoding failure is reported.
    pub fn deliver_offline<S: DocumentStore>(
        store: &S,
        target: PlayerId,
        mail: &Mail,
    ) -> Result<(), StoreError> {
        let value = to_document(mail)?;
        store.upsert_detached(
            collections::MAIL_PENDING,
            &record_id(target),
            Patch::Push {
                field: "mails".into(),
                value,
            },
        );
        Ok(())
    }

    /// Pending entries ever absorbed.
    pub fn pending_seen(&self) -> usize {
        self.pending_seen
    }

    fn find_mut(&mut self, id: u32) -> Result<&mut Mail, PlayerError> {
        self.inbox
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(PlayerError::MailNotFound(id))
    }

    fn absorb(&mut self, pending: PendingMail) -> usize {
        let start = self.pending_seen.max(pending.dropped);
        let fresh: Vec<Mail> = pending
            .mails
            .into_iter()
            .skip(start - pending.dropped)
            .collect();
        let count = fresh.len();
        for mail in fresh {
            self.receive(mail);
        }
        self.pending_seen = start + count;
        *self.pending_dropped.get_mut() = pending.dropped;
        count
    }
}

impl PlayerModule for MailModule {
    const KIND: ModuleKind = ModuleKind::Mail;
    const COLLECTION: &'static str = collections::MAIL;

    async fn load_from_db<S: DocumentStore>(owner: PlayerId, store: &S) -> Result<Self, StoreError> {
        let mut module: Self = load_record(Self::COLLECTION, owner, store)
            .await?
            .unwrap_or_default();
        if let Some(pending) =
            load_record::<PendingMail, S>(collections::MAIL_PENDING, owner, store).await?
        {
            let absorbed = module.absorb(pending);
            if absorbed > 0 {
                tracing::debug!(%owner, absorbed, "offline mail absorbed");
            }
        }
        Ok(module)
    }

    /// Writes the mail record, then trims pending entries it now covers.
    async fn write_to_db<S: DocumentStore>(&self, owner: PlayerId, store: &S) -> Result<(), StoreError> {
        let record = module_record(self, owner)?;
        store
            .update_sync(Self::COLLECTION, &record_id(owner), record)
            .await?;
        let seen = self.pending_seen;
        if self.pending_dropped.swap(seen, Ordering::Relaxed) < seen {
            store.update_detached(
                collections::MAIL_PENDING,
                Filter::ById(record_id(owner)),
                Patch::DropFront {
                    field: "mails".into(),
                    counter: "dropped".into(),
                    upto: seen as u64,
                },
            );
        }
        Ok(())
    }

    fn project(module: &Module) -> Option<&Self> {
        match module {
            Module::Mail(m) => Some(m),
            _ => None,
        }
    }

    fn project_mut(module: &mut Module) -> Option<&mut Self> {
        match module {
            Module::Mail(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use realmkeep_protocol::AccountId;
    use realmkeep_store::MemoryStore;

    use super::*;
    use crate::PlayerBase;

    fn mail(title: &str) -> Mail {
        Mail::new(PlayerId(1), title, "body", None)
    }

    fn owner() -> PlayerBase {
        PlayerBase::new(PlayerId(7), AccountId(70), "owner")
    }

    #[test]
    fn test_receive_assigns_increasing_ids() {
        let mut m = MailModule::default();
        assert_eq!(m.receive(mail("a")), 1);
        assert_eq!(m.receive(mail("b")), 2);
        assert_eq!(m.unread(), 2);
    }

    #[test]
    fn test_receive_over_limit_drops_oldest() {
        let mut m = MailModule::default();
        for i in 0..=INBOX_LIMIT {
            m.receive(mail(&i.to_string()));
        }
        assert_eq!(m.inbox().len(), INBOX_LIMIT);
        assert_eq!(m.inbox()[0].id, 2);
    }

    #[test]
    fn test_take_attachment_only_once() {
        let mut m = MailModule::default();
        let id = m.receive(Mail::new(
            PlayerId(1),
            "gift",
            "",
            Some(MailAttachment { item_id: 3, count: 2 }),
        ));

        let first = m.take_attachment(id).unwrap();
        assert_eq!(first, Some(MailAttachment { item_id: 3, count: 2 }));
        assert_eq!(m.take_attachment(id).unwrap(), None);
        assert_eq!(m.unread(), 0);
    }

    #[test]
    fn test_delete_unknown_mail_fails() {
        let mut m = MailModule::default();
        assert!(matches!(m.delete(9), Err(PlayerError::MailNotFound(9))));
    }

    #[tokio::test]
    async fn test_offline_delivery_absorbed_once_on_load() {
        let store = MemoryStore::new();
        let mut m = MailModule::default();
        m.init_and_insert(&owner(), &store).await.unwrap();

        MailModule::deliver_offline(&store, PlayerId(7), &mail("while away")).unwrap();
        let loaded = MailModule::load_from_db(PlayerId(7), &store).await.unwrap();
        assert_eq!(loaded.inbox().len(), 1);
        assert_eq!(loaded.inbox()[0].title, "while away");

        // Persist the cursor, reload: the same entry is not absorbed again.
        loaded.write_to_db(PlayerId(7), &store).await.unwrap();
        let reloaded = MailModule::load_from_db(PlayerId(7), &store).await.unwrap();
        assert_eq!(reloaded.inbox().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_delivery_without_pending_record_creates_it() {
        let store = MemoryStore::new();
        let mut m = MailModule::default();
        m.init_and_insert(&owner(), &store).await.unwrap();
        assert!(store.get(collections::MAIL_PENDING, 7).is_none());

        MailModule::deliver_offline(&store, PlayerId(7), &mail("first")).unwrap();

        let loaded = MailModule::load_from_db(PlayerId(7), &store).await.unwrap();
        assert_eq!(loaded.inbox().len(), 1);
        assert_eq!(loaded.inbox()[0].title, "first");
    }

    #[tokio::test]
    async fn test_write_after_absorb_trims_pending_record() {
        let store = MemoryStore::new();
        MailModule::deliver_offline(&store, PlayerId(7), &mail("a")).unwrap();
        MailModule::deliver_offline(&store, PlayerId(7), &mail("b")).unwrap();

        let loaded = MailModule::load_from_db(PlayerId(7), &store).await.unwrap();
        loaded.write_to_db(PlayerId(7), &store).await.unwrap();

        let pending = store.get(collections::MAIL_PENDING, 7).unwrap();
        assert_eq!(pending["mails"], serde_json::json!([]));
        assert_eq!(pending["dropped"], 2);

        // Mail arriving after the trim is still picked up exactly once.
        MailModule::deliver_offline(&store, PlayerId(7), &mail("c")).unwrap();
        let reloaded = MailModule::load_from_db(PlayerId(7), &store).await.unwrap();
        let titles: Vec<&str> = reloaded.inbox().iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["a", "b", "c"]);
        assert_eq!(reloaded.pending_seen(), 3);
    }

    #[tokio::test]
    async fn test_failed_mail_write_keeps_pending_entries() {
        let store = MemoryStore::new();
        MailModule::deliver_offline(&store, PlayerId(7), &mail("a")).unwrap();
        let loaded = MailModule::load_from_db(PlayerId(7), &store).await.unwrap();
        store.fail_writes_for(collections::MAIL, 7);

        assert!(loaded.write_to_db(PlayerId(7), &store).await.is_err());

        let pending = store.get(collections::MAIL_PENDING, 7).unwrap();
        assert_eq!(pending["mails"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_without_records_is_default() {
        let store = MemoryStore::new();
        let loaded = MailModule::load_from_db(PlayerId(7), &store).await.unwrap();
        assert!(loaded.inbox().is_empty());
    }

    #[tokio::test]
    async fn test_load_with_pending_unreachable_fails() {
        let store = MemoryStore::new();
        store.fail_reads_from(collections::MAIL_PENDING);

        let result = MailModule::load_from_db(PlayerId(7), &store).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
