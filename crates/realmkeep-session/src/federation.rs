//! The account-federation boundary.
//!
//! Accounts live outside any one world. Logging in is a two-hop handoff:
//!
//! ```text
//! client ──login(name, pw, world)──→ AccountCenter
//!                                        │ check account, mint token
//!                                        ├──push_login_token(account, token)──→ world
//!                                        ▼
//! client ←──(account, address, token)────┘
//! client ──Login{account, token}──────────────────────────────────────────→ world
//! ```
//!
//! The world side of that handoff is the [`WorldLink`] trait: anything that
//! can deliver a token to a world. [`AccountCenter`] is a small reference
//! account service over a [`DocumentStore`]; production deployments are
//! expected to bring their own credential handling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use realmkeep_protocol::{AccountId, LoginToken, WorldId};
use realmkeep_store::{
    collections, from_document, to_document, DocumentStore, Filter, Patch, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FederationError;

// ---------------------------------------------------------------------------
// WorldLink
// ---------------------------------------------------------------------------

/// A route from the account center to one game world.
///
/// # Example
///
/// ```rust
/// use realmkeep_protocol::{AccountId, LoginToken, WorldId};
/// use realmkeep_session::{FederationError, WorldLink};
///
/// /// A world that accepts every push and forgets it.
/// struct NullWorld;
///
/// impl WorldLink for NullWorld {
///     fn world_id(&self) -> WorldId {
///         WorldId(1)
///     }
///
///     fn address(&self) -> &str {
///         "127.0.0.1:7000"
///     }
///
///     async fn push_login_token(
///         &self,
///         _account_id: AccountId,
///         _token: LoginToken,
///     ) -> Result<(), FederationError> {
///         Ok(())
///     }
/// }
/// ```
pub trait WorldLink: Send + Sync + 'static {
    fn world_id(&self) -> WorldId;

    /// Where clients should connect to reach this world.
    fn address(&self) -> &str;

    /// Delivers a single-use login token. Must complete before the client
    /// is told the world's address.
    fn push_login_token(
        &self,
        account_id: AccountId,
        token: LoginToken,
    ) -> impl Future<Output = Result<(), FederationError>> + Send;
}

// ---------------------------------------------------------------------------
// Account records
// ---------------------------------------------------------------------------

/// An account as stored in [`collections::ACCOUNT`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "_id")]
    pub account_id: AccountId,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub forbidden: bool,
    #[serde(default)]
    pub login_count: u64,
    #[serde(default)]
    pub last_login: i64,
    #[serde(default)]
    pub last_world: Option<WorldId>,
}

/// What a successful account-center login hands back to the client.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub account_id: AccountId,
    pub world_id: WorldId,
    pub address: String,
    pub token: LoginToken,
}

// ---------------------------------------------------------------------------
// AccountCenter
// ---------------------------------------------------------------------------

/// Reference account service: registration, password changes, and the
/// token handoff to registered worlds.
pub struct AccountCenter<S, W> {
    store: Arc<S>,
    worlds: HashMap<WorldId, W>,
    next_account_id: AtomicU64,
}

impl<S: DocumentStore, W: WorldLink> AccountCenter<S, W> {
    /// Creates an account center handing out account IDs from 1.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_first_account_id(store, 1)
    }

    pub fn with_first_account_id(store: Arc<S>, first: u64) -> Self {
        Self {
            store,
            worlds: HashMap::new(),
            next_account_id: AtomicU64::new(first),
        }
    }

    /// Makes a world reachable for logins. Replaces any link with the same ID.
    pub fn add_world(&mut self, link: W) {
        tracing::info!(world_id = %link.world_id(), address = link.address(), "world registered");
        self.worlds.insert(link.world_id(), link);
    }

    pub fn world(&self, world_id: WorldId) -> Option<&W> {
        self.worlds.get(&world_id)
    }

    /// Creates an account.
    ///
    /// # Errors
    /// - [`FederationError::NameTaken`] if the name is in use
    /// - [`FederationError::Store`] if the store call fails
    pub async fn register(&self, name: &str, password: &str) -> Result<AccountId, FederationError> {
        if self.find_by_name(name).await?.is_some() {
            return Err(FederationError::NameTaken(name.to_string()));
        }
        let account_id = AccountId(self.next_account_id.fetch_add(1, Ordering::Relaxed));
        let record = AccountRecord {
            account_id,
            name: name.to_string(),
            password: password.to_string(),
            forbidden: false,
            login_count: 0,
            last_login: 0,
            last_world: None,
        };
        self.store
            .insert_sync(collections::ACCOUNT, to_document(&record)?)
            .await?;
        tracing::info!(%account_id, name, "account registered");
        Ok(account_id)
    }

    /// Replaces an account's password after checking the old one.
    pub async fn change_password(
        &self,
        name: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), FederationError> {
        let mut record = self.authenticate(name, old_password).await?;
        record.password = new_password.to_string();
        self.save(&record).await?;
        tracing::info!(account_id = %record.account_id, "password changed");
        Ok(())
    }

    /// Enables or disables logins for an account.
    pub async fn set_forbidden(&self, name: &str, forbidden: bool) -> Result<(), FederationError> {
        let mut record = self
            .find_by_name(name)
            .await?
            .ok_or_else(|| FederationError::AccountNotFound(name.to_string()))?;
        record.forbidden = forbidden;
        self.save(&record).await?;
        tracing::info!(account_id = %record.account_id, forbidden, "account access changed");
        Ok(())
    }

    /// Authenticates, mints a single-use token, pushes it to the chosen
    /// world, and returns where to connect.
    ///
    /// Checks run in this order, first failure wins: account exists, not
    /// forbidden, password matches, world is known.
    pub async fn login(
        &self,
        name: &str,
        password: &str,
        world_id: WorldId,
    ) -> Result<LoginGrant, FederationError> {
        let record = self.authenticate(name, password).await?;
        let world = self
            .worlds
            .get(&world_id)
            .ok_or(FederationError::InvalidWorld(world_id))?;

        let token = generate_token();
        world
            .push_login_token(record.account_id, token.clone())
            .await?;

        tracing::info!(account_id = %record.account_id, %world_id, "login token issued");
        Ok(LoginGrant {
            account_id: record.account_id,
            world_id,
            address: world.address().to_string(),
            token,
        })
    }

    /// Records a completed world login: last login time and world, plus one
    /// on the login counter. Detached; the caller does not wait.
    pub fn login_succeeded(&self, account_id: AccountId, world_id: WorldId) {
        let patch = Patch::All(vec![
            Patch::set("last_login", chrono::Utc::now().timestamp()),
            Patch::set("last_world", world_id.0),
            Patch::Inc {
                field: "login_count".into(),
                by: 1,
            },
        ]);
        self.store.update_detached(
            collections::ACCOUNT,
            Filter::ById(Value::from(account_id.0)),
            patch,
        );
    }

    pub async fn account(&self, name: &str) -> Result<Option<AccountRecord>, FederationError> {
        self.find_by_name(name).await
    }

    // -- helpers ------------------------------------------------------------

    async fn authenticate(&self, name: &str, password: &str) -> Result<AccountRecord, FederationError> {
        let record = self
            .find_by_name(name)
            .await?
            .ok_or_else(|| FederationError::AccountNotFound(name.to_string()))?;
        if record.forbidden {
            return Err(FederationError::Forbidden(name.to_string()));
        }
        if record.password != password {
            tracing::debug!(account_id = %record.account_id, "password mismatch");
            return Err(FederationError::InvalidPassword);
        }
        Ok(record)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<AccountRecord>, FederationError> {
        let found = self
            .store
            .find_one(collections::ACCOUNT, "name", &Value::from(name))
            .await?;
        Ok(found.map(from_document).transpose()?)
    }

    async fn save(&self, record: &AccountRecord) -> Result<(), StoreError> {
        self.store
            .update_sync(
                collections::ACCOUNT,
                &Value::from(record.account_id.0),
                to_document(record)?,
            )
            .await
    }
}

/// A random 32-character hex token (128 bits).
fn generate_token() -> LoginToken {
    let bytes: [u8; 16] = rand::rng().random();
    LoginToken::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}
