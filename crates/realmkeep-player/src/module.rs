//! The module lifecycle contract and the closed set of player modules.
//!
//! A module is a self-contained data block (mail, friends, ...) owned by
//! exactly one player. The core drives every module through the same five
//! hooks, in a fixed order, and never looks inside one:
//!
//! | hook | when | must |
//! |---|---|---|
//! | `init_and_insert` | once, at creation | persist its initial record |
//! | `load_from_db` | once, at login from storage | restore state, default if the record is missing |
//! | `write_to_db` | every flush and at logout | be safe to repeat |
//! | `on_login` | each time the player goes online | only touch its own state |
//! | `on_logout` | each time the player goes offline | only touch its own state |

use std::fmt;
use std::future::Future;

use realmkeep_protocol::PlayerId;
use realmkeep_store::{from_document, to_document, Document, DocumentStore, StoreError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::modules::{BattleModule, ChatModule, FriendModule, MailModule};
use crate::PlayerBase;

// ---------------------------------------------------------------------------
// ModuleKind
// ---------------------------------------------------------------------------

/// Which block a [`Module`] is. Also its position in a player's module set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Mail,
    Friend,
    Chat,
    Battle,
}

impl ModuleKind {
    /// Registration order. Hooks run in this order.
    pub const ALL: [ModuleKind; 4] = [Self::Mail, Self::Friend, Self::Chat, Self::Battle];

    /// Position in the module set.
    pub const fn index(self) -> usize {
        match self {
            Self::Mail => 0,
            Self::Friend => 1,
            Self::Chat => 2,
            Self::Battle => 3,
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mail => "mail",
            Self::Friend => "friend",
            Self::Chat => "chat",
            Self::Battle => "battle",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// PlayerModule
// ---------------------------------------------------------------------------

/// The lifecycle contract every player data block implements.
///
/// The persistence hooks have default bodies that store the module's serde
/// form in [`COLLECTION`](Self::COLLECTION), keyed by the owner's player ID.
/// Most modules only override `on_login`/`on_logout`, if anything.
///
/// The store-facing hooks are generic over the store and return `Send`
/// futures, so the trait is used through the closed [`Module`] enum rather
/// than as a trait object.
pub trait PlayerModule: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// This module's slot in the set.
    const KIND: ModuleKind;
    /// The collection its records live in.
    const COLLECTION: &'static str;

    /// Sets up a brand-new module before its first insert.
    fn init(&mut self, _owner: &PlayerBase) {}

    /// Initialises the module for a new player and inserts its record.
    fn init_and_insert<S: DocumentStore>(
        &mut self,
        owner: &PlayerBase,
        store: &S,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.init(owner);
        let record = module_record(self, owner.player_id);
        async move { store.insert_sync(Self::COLLECTION, record?).await }
    }

    /// Restores the module from storage.
    ///
    /// A missing or unreadable record yields `Self::default()`. A store
    /// failure is returned: loading a default over a record that exists
    /// would overwrite it on the next flush.
    fn load_from_db<S: DocumentStore>(
        owner: PlayerId,
        store: &S,
    ) -> impl Future<Output = Result<Self, StoreError>> + Send {
        async move {
            Ok(load_record(Self::COLLECTION, owner, store)
                .await?
                .unwrap_or_default())
        }
    }

    /// Writes the module's full state. Upserts, so repeating it is harmless.
    fn write_to_db<S: DocumentStore>(
        &self,
        owner: PlayerId,
        store: &S,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let record = module_record(self, owner);
        async move {
            let id = record_id(owner);
            store.update_sync(Self::COLLECTION, &id, record?).await
        }
    }

    fn on_login(&mut self, _owner: &PlayerBase) {}

    fn on_logout(&mut self, _owner: &PlayerBase) {}

    /// Borrows this module out of a [`Module`] if the variant matches.
    fn project(module: &Module) -> Option<&Self>;

    /// Mutable counterpart of [`project`](Self::project).
    fn project_mut(module: &mut Module) -> Option<&mut Self>;
}

/// The `_id` used by every record belonging to `owner`.
pub(crate) fn record_id(owner: PlayerId) -> Value {
    Value::from(owner.0)
}

/// A module's serde form with `_id` set to the owner.
pub(crate) fn module_record<M: Serialize>(module: &M, owner: PlayerId) -> Result<Document, StoreError> {
    let mut doc = to_document(module)?;
    match doc.as_object_mut() {
        Some(fields) => {
            fields.insert("_id".into(), record_id(owner));
            Ok(doc)
        }
        None => Err(StoreError::Malformed(format!(
            "module record for {owner} is not an object"
        ))),
    }
}

/// Reads and decodes `owner`'s record from `collection`.
///
/// `Ok(None)` if the record is missing or can't be decoded (logged).
pub(crate) async fn load_record<M: DeserializeOwned, S: DocumentStore>(
    collection: &'static str,
    owner: PlayerId,
    store: &S,
) -> Result<Option<M>, StoreError> {
    let Some(doc) = store.find_one(collection, "_id", &record_id(owner)).await? else {
        return Ok(None);
    };
    match from_document(doc) {
        Ok(module) => Ok(Some(module)),
        Err(e) => {
            tracing::warn!(%owner, collection, error = %e, "unreadable module record, using default");
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Module (closed set)
// ---------------------------------------------------------------------------

/// One of the blocks a player carries.
#[derive(Debug)]
pub enum Module {
    Mail(MailModule),
    Friend(FriendModule),
    Chat(ChatModule),
    Battle(BattleModule),
}

/// Runs `$body` with `$m` bound to whichever module `$module` holds.
macro_rules! each_module {
    ($module:expr, $m:ident => $body:expr) => {
        match $module {
            Module::Mail($m) => $body,
            Module::Friend($m) => $body,
            Module::Chat($m) => $body,
            Module::Battle($m) => $body,
        }
    };
}

impl Module {
    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::Mail(_) => ModuleKind::Mail,
            Self::Friend(_) => ModuleKind::Friend,
            Self::Chat(_) => ModuleKind::Chat,
            Self::Battle(_) => ModuleKind::Battle,
        }
    }

    /// A default-initialised set in registration order.
    pub fn fresh_set() -> [Module; 4] {
        [
            Self::Mail(MailModule::default()),
            Self::Friend(FriendModule::default()),
            Self::Chat(ChatModule::default()),
            Self::Battle(BattleModule::default()),
        ]
    }

    /// Loads every module for `owner`, in registration order. Fails on the
    /// first module the store can't serve.
    pub async fn load_set<S: DocumentStore>(
        owner: PlayerId,
        store: &S,
    ) -> Result<[Module; 4], StoreError> {
        Ok([
            Self::Mail(MailModule::load_from_db(owner, store).await?),
            Self::Friend(FriendModule::load_from_db(owner, store).await?),
            Self::Chat(ChatModule::load_from_db(owner, store).await?),
            Self::Battle(BattleModule::load_from_db(owner, store).await?),
        ])
    }

    pub async fn init_and_insert<S: DocumentStore>(
        &mut self,
        owner: &PlayerBase,
        store: &S,
    ) -> Result<(), StoreError> {
        each_module!(self, m => m.init_and_insert(owner, store).await)
    }

    pub async fn write_to_db<S: DocumentStore>(
        &self,
        owner: PlayerId,
        store: &S,
    ) -> Result<(), StoreError> {
        each_module!(self, m => m.write_to_db(owner, store).await)
    }

    pub fn on_login(&mut self, owner: &PlayerBase) {
        each_module!(self, m => m.on_login(owner))
    }

    pub fn on_logout(&mut self, owner: &PlayerBase) {
        each_module!(self, m => m.on_logout(owner))
    }
}
