//! The world-side half of the login-token handoff.
//!
//! The account center pushes `(account, token)` to a world before telling
//! the client where to connect. The world keeps the pairing for a short
//! window and the client's login must present the same token.
//!
//! ```text
//! accept(account, token) ──→ verify(account, token) ──→ consume(account, token)
//!                                   │                        (on success only)
//!                                   ▼
//!                      expired / mismatched / missing
//!                          → InvalidCredential
//! ```
//!
//! A token is consumed only by a successful login. A login answering "not
//! found" and the creation request that follows it both leave the token
//! usable for the final login.

use std::time::Duration;

use dashmap::DashMap;
use realmkeep_protocol::{AccountId, LoginToken};
use tokio::time::Instant;

use crate::SessionError;

struct Pending {
    token: LoginToken,
    expires_at: Instant,
}

/// Tokens pushed to this world, at most one per account.
pub struct LoginTokens {
    ttl: Duration,
    pending: DashMap<AccountId, Pending>,
}

impl LoginTokens {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: DashMap::new(),
        }
    }

    /// Records a pushed token, replacing any earlier one for the account.
    pub fn accept(&self, account_id: AccountId, token: LoginToken) {
        self.pending.insert(
            account_id,
            Pending {
                token,
                expires_at: Instant::now() + self.ttl,
            },
        );
        tracing::debug!(%account_id, "login token accepted");
    }

    /// Checks that `token` is the live token for the account.
    ///
    /// An expired token is removed on the spot.
    pub fn verify(&self, account_id: AccountId, token: &LoginToken) -> Result<(), SessionError> {
        let expired = match self.pending.get(&account_id) {
            None => return Err(SessionError::InvalidCredential(account_id)),
            Some(p) if p.expires_at <= Instant::now() => true,
            Some(p) if p.token != *token => {
                tracing::warn!(%account_id, "login token mismatch");
                return Err(SessionError::InvalidCredential(account_id));
            }
            Some(_) => false,
        };
        if expired {
            self.pending.remove(&account_id);
            tracing::debug!(%account_id, "login token expired");
            return Err(SessionError::InvalidCredential(account_id));
        }
        Ok(())
    }

    /// Removes the account's token if it is still `token`.
    pub fn consume(&self, account_id: AccountId, token: &LoginToken) {
        self.pending
            .remove_if(&account_id, |_, p| p.token == *token);
    }

    /// Drops every expired token. Returns how many went.
    pub fn expire_stale(&self) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending.retain(|_, p| p.expires_at > now);
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
