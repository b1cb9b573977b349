//! The game-world facade: request dispatch and background maintenance.
//!
//! This is the entry point for running a Realmkeep world. It ties together
//! all the layers: protocol → session → player → store.
//!
//! ```text
//!   frame ──decode──→ Request ──dispatch──→ own context of player_id
//!                                              │ drain mailbox, touch
//!                                              │ apply own change
//!                                              └─notify(target)──→ target mailbox
//!   frame ←─encode─── Response ←───────────────┘
//! ```
//!
//! Requests naming a `player_id` run inside that player's own context.
//! Anything they do to a second player goes through [`Messenger::notify`].

use std::future::Future;
use std::sync::Arc;

use realmkeep_player::{
    BattleModule, ChatModule, Delivery, FriendModule, Mail, MailModule, Messenger,
    PersistenceScheduler, Player, PlayerCache, PlayerError,
};
use realmkeep_protocol::{
    AccountId, Codec, JsonCodec, LoginToken, MailAttachment, NackCode, PlayerId, ProtocolError,
    Request, Response, WorldId,
};
use realmkeep_session::{
    FederationError, LoginKey, LoginTokens, SessionError, SessionLifecycle, ShutdownReport,
    WorldLink,
};
use realmkeep_store::{collections, DocumentStore};
use realmkeep_tick::TickScheduler;
use serde_json::Value;

use crate::{RealmError, WorldConfig};

/// Longest display name accepted at creation, in characters.
pub const MAX_NAME_CHARS: usize = 32;

/// Called after every successful world login.
pub type LoginListener = Arc<dyn Fn(AccountId, WorldId) + Send + Sync>;

/// One game-world instance.
///
/// Owns the player cache (through the session lifecycle), the messenger,
/// and the login-token registry. Share it behind an `Arc`; every method
/// takes `&self`.
pub struct GameWorld<S, C = JsonCodec> {
    world_id: WorldId,
    address: String,
    store: Arc<S>,
    codec: C,
    sessions: SessionLifecycle<S>,
    messenger: Messenger,
    tokens: LoginTokens,
    login_listener: Option<LoginListener>,
}

impl<S: DocumentStore, C: Codec> GameWorld<S, C> {
    pub fn new(config: WorldConfig, store: Arc<S>, codec: C) -> Self {
        let cache = PlayerCache::new();
        let sessions = SessionLifecycle::new(
            Arc::clone(&store),
            cache.clone(),
            PersistenceScheduler::new(),
            config.session.clone(),
        );
        tracing::info!(world_id = %config.world_id, address = %config.address, "world created");
        Self {
            world_id: config.world_id,
            address: config.address,
            store,
            codec,
            sessions,
            messenger: Messenger::new(cache),
            tokens: LoginTokens::new(config.session.token_ttl()),
            login_listener: None,
        }
    }

    /// Registers a callback run after each successful login, typically
    /// wired to the account center's login counters.
    pub fn with_login_listener(
        mut self,
        listener: impl Fn(AccountId, WorldId) + Send + Sync + 'static,
    ) -> Self {
        self.login_listener = Some(Arc::new(listener));
        self
    }

    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn sessions(&self) -> &SessionLifecycle<S> {
        &self.sessions
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    pub fn tokens(&self) -> &LoginTokens {
        &self.tokens
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Decodes a request frame, handles it, and encodes the response.
    ///
    /// An undecodable frame is answered with `InvalidRequest`. Only a
    /// failure to encode the response itself yields an empty frame.
    pub async fn handle_frame(&self, frame: &[u8]) -> Vec<u8> {
        let response = match self.codec.decode::<Request>(frame) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode request frame");
                Response::nack(NackCode::InvalidRequest)
            }
        };
        match self.codec.encode(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                Vec::new()
            }
        }
    }

    /// Handles one request. Errors become negative acknowledgements.
    pub async fn handle(&self, request: Request) -> Response {
        let kind = request_kind(&request);
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                let code = e.nack_code();
                tracing::debug!(request = kind, %code, error = %e, "request refused");
                Response::nack(code)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, RealmError> {
        match request {
            Request::PushLoginToken { account_id, token } => {
                self.tokens.accept(account_id, token);
                Ok(Response::Ok)
            }
            Request::Login { account_id, token } => self.login(account_id, token).await,
            Request::Create {
                account_id,
                token,
                name,
            } => self.create(account_id, &token, &name).await,
            Request::Logout { player_id } => {
                self.sessions.logout(player_id).await?;
                Ok(Response::Ok)
            }
            Request::Heartbeat { player_id } => self.in_context(player_id, |_| Ok(Response::Ok)).await,

            Request::FriendApply {
                player_id,
                target_id,
            } => self.friend_apply(player_id, target_id).await,
            Request::FriendAgree {
                player_id,
                applicant_id,
            } => self.friend_agree(player_id, applicant_id).await,
            Request::FriendRefuse {
                player_id,
                applicant_id,
            } => {
                self.in_context(player_id, |player| {
                    player.module_mut::<FriendModule>()?.refuse(applicant_id)?;
                    Ok(Response::Ok)
                })
                .await
            }
            Request::FriendDelete {
                player_id,
                friend_id,
            } => self.friend_delete(player_id, friend_id).await,
            Request::FriendList { player_id } => {
                self.in_context(player_id, |player| {
                    Ok(Response::Friends {
                        friends: player.module::<FriendModule>()?.list(),
                    })
                })
                .await
            }

            Request::SendMail {
                player_id,
                target_id,
                title,
                content,
                attachment,
            } => {
                self.send_mail(player_id, target_id, title, content, attachment)
                    .await
            }
            Request::ReadMail { player_id, mail_id } => {
                self.in_context(player_id, |player| {
                    player.module_mut::<MailModule>()?.read(mail_id)?;
                    Ok(Response::Ok)
                })
                .await
            }
            Request::DeleteMail { player_id, mail_id } => {
                self.in_context(player_id, |player| {
                    player.module_mut::<MailModule>()?.delete(mail_id)?;
                    Ok(Response::Ok)
                })
                .await
            }
            Request::TakeMailAttachment { player_id, mail_id } => {
                self.in_context(player_id, |player| {
                    let attachment = player.module_mut::<MailModule>()?.take_attachment(mail_id)?;
                    Ok(Response::AttachmentTaken { attachment })
                })
                .await
            }

            Request::Whisper {
                player_id,
                target_id,
                text,
            } => self.whisper(player_id, target_id, text).await,

            Request::BattleReport {
                player_id,
                opponent_id,
                won,
            } => self.battle_report(player_id, opponent_id, won).await,
        }
    }

    // -----------------------------------------------------------------------
    // Own context
    // -----------------------------------------------------------------------

    /// Runs `f` inside `player_id`'s own context.
    ///
    /// The player must be online. Its mailbox is drained first and the
    /// request counts as activity.
    async fn in_context<T>(
        &self,
        player_id: PlayerId,
        f: impl FnOnce(&mut Player) -> Result<T, RealmError>,
    ) -> Result<T, RealmError> {
        let handle = self
            .sessions
            .cache()
            .lookup(player_id)
            .ok_or(SessionError::NotOnline(player_id))?;
        let mut player = handle.enter().await;
        if !player.is_online() {
            return Err(SessionError::NotOnline(player_id).into());
        }
        player.drain_mailbox();
        player.touch();
        f(&mut *player)
    }

    fn is_online(&self, player_id: PlayerId) -> bool {
        self.sessions
            .cache()
            .lookup(player_id)
            .is_some_and(|h| h.is_online())
    }

    // -----------------------------------------------------------------------
    // Session requests
    // -----------------------------------------------------------------------

    async fn login(&self, account_id: AccountId, token: LoginToken) -> Result<Response, RealmError> {
        self.tokens.verify(account_id, &token)?;
        let handle = self.sessions.login(LoginKey::Account(account_id)).await?;
        self.tokens.consume(account_id, &token);
        if let Some(listener) = &self.login_listener {
            listener(account_id, self.world_id);
        }
        Ok(Response::LoggedIn {
            player_id: handle.player_id(),
            name: handle.name().to_string(),
        })
    }

    async fn create(
        &self,
        account_id: AccountId,
        token: &LoginToken,
        name: &str,
    ) -> Result<Response, RealmError> {
        self.tokens.verify(account_id, token)?;
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
            return Err(invalid(format!(
                "player name must be 1 to {MAX_NAME_CHARS} characters"
            )));
        }
        let handle = self.sessions.create(account_id, name).await?;
        Ok(Response::Created {
            player_id: handle.player_id(),
        })
    }

    // -----------------------------------------------------------------------
    // Cross-player requests
    // -----------------------------------------------------------------------

    async fn friend_apply(&self, player_id: PlayerId, target_id: PlayerId) -> Result<Response, RealmError> {
        self.in_context(player_id, |player| {
            reject_self(player_id, target_id)?;
            if player.module::<FriendModule>()?.is_friend(target_id) {
                return Err(invalid(format!("{target_id} is already a friend")));
            }
            let name = player.base().name.clone();
            let delivery = self.messenger.notify(target_id, move |target: &mut Player| {
                if let Ok(friends) = target.module_mut::<FriendModule>() {
                    friends.receive_application(player_id, name);
                }
            });
            require_reachable(target_id, delivery)
        })
        .await
    }

    /// Both sides must be online: the applicant's half of the friendship
    /// is only ever written through its mailbox.
    async fn friend_agree(&self, player_id: PlayerId, applicant_id: PlayerId) -> Result<Response, RealmError> {
        self.in_context(player_id, |player| {
            if !self.is_online(applicant_id) {
                return Err(SessionError::NotOnline(applicant_id).into());
            }
            player.module_mut::<FriendModule>()?.agree(applicant_id)?;
            let name = player.base().name.clone();
            let delivery = self.messenger.notify(applicant_id, move |applicant: &mut Player| {
                if let Ok(friends) = applicant.module_mut::<FriendModule>() {
                    friends.add_friend(player_id, name);
                }
            });
            if delivery != Delivery::Queued {
                tracing::warn!(%player_id, %applicant_id, ?delivery, "friendship recorded on one side only");
            }
            Ok(Response::Ok)
        })
        .await
    }

    async fn friend_delete(&self, player_id: PlayerId, friend_id: PlayerId) -> Result<Response, RealmError> {
        self.in_context(player_id, |player| {
            if !player.module_mut::<FriendModule>()?.remove_friend(friend_id) {
                return Err(PlayerError::NotFriends(friend_id).into());
            }
            let delivery = self.messenger.notify(friend_id, move |friend: &mut Player| {
                if let Ok(friends) = friend.module_mut::<FriendModule>() {
                    friends.remove_friend(player_id);
                }
            });
            if delivery != Delivery::Queued {
                tracing::debug!(%player_id, %friend_id, ?delivery, "friend removal not mirrored");
            }
            Ok(Response::Ok)
        })
        .await
    }

    /// Live delivery through the target's mailbox when it is online and has
    /// room. Otherwise the mail goes to the target's pending record in the
    /// store, picked up the next time the target is loaded.
    async fn send_mail(
        &self,
        player_id: PlayerId,
        target_id: PlayerId,
        title: String,
        content: String,
        attachment: Option<MailAttachment>,
    ) -> Result<Response, RealmError> {
        let mail = Mail::new(player_id, title, content, attachment);
        let live = mail.clone();
        let delivery = self
            .in_context(player_id, |_| {
                reject_self(player_id, target_id)?;
                Ok(self.messenger.notify(target_id, move |target: &mut Player| {
                    if let Ok(inbox) = target.module_mut::<MailModule>() {
                        inbox.receive(live);
                    }
                }))
            })
            .await?;
        if delivery == Delivery::Queued {
            return Ok(Response::Ok);
        }

        let known = self
            .store
            .find_one(collections::PLAYER, "_id", &Value::from(target_id.0))
            .await?
            .is_some();
        if !known {
            return Err(SessionError::NotFound(LoginKey::Player(target_id)).into());
        }
        MailModule::deliver_offline(self.store.as_ref(), target_id, &mail)?;
        tracing::debug!(%player_id, %target_id, ?delivery, "mail stored for later pickup");
        Ok(Response::Ok)
    }

    async fn whisper(&self, player_id: PlayerId, target_id: PlayerId, text: String) -> Result<Response, RealmError> {
        if text.trim().is_empty() {
            return Err(invalid("empty whisper"));
        }
        self.in_context(player_id, |player| {
            reject_self(player_id, target_id)?;
            let delivery = self.messenger.notify(target_id, move |target: &mut Player| {
                if let Ok(chat) = target.module_mut::<ChatModule>() {
                    chat.receive(player_id, text);
                }
            });
            let response = require_reachable(target_id, delivery)?;
            player.module_mut::<ChatModule>()?.record_sent();
            Ok(response)
        })
        .await
    }

    /// Records the result for the reporting player and mirrors the opposite
    /// result onto the opponent.
    async fn battle_report(&self, player_id: PlayerId, opponent_id: PlayerId, won: bool) -> Result<Response, RealmError> {
        self.in_context(player_id, |player| {
            reject_self(player_id, opponent_id)?;
            player.module_mut::<BattleModule>()?.record(won);
            let delivery = self.messenger.notify(opponent_id, move |opponent: &mut Player| {
                if let Ok(battle) = opponent.module_mut::<BattleModule>() {
                    battle.record(!won);
                }
            });
            if delivery != Delivery::Queued {
                tracing::debug!(%player_id, %opponent_id, ?delivery, "battle result not mirrored");
            }
            Ok(Response::Ok)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Runs the idle sweep (plus token purge) and the persistence sweep
    /// until `shutdown` resolves.
    ///
    /// Both sweeps share this one task, so they never overlap each other.
    pub async fn run_maintenance(&self, shutdown: impl Future<Output = ()>) {
        let config = self.sessions.config();
        let mut idle = TickScheduler::every("idle", config.idle_tick());
        let mut flush = TickScheduler::every("flush", config.flush_interval());
        tokio::pin!(shutdown);

        tracing::info!(
            world_id = %self.world_id,
            idle_ms = idle.period().as_millis() as u64,
            flush_secs = flush.period().as_secs(),
            "maintenance loop running"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = idle.wait_for_tick() => {
                    let forced = self.sessions.idle_tick().await;
                    let expired = self.tokens.expire_stale();
                    if !forced.is_empty() || expired > 0 {
                        tracing::debug!(forced = forced.len(), expired, "idle sweep");
                    }
                    idle.record_tick_end();
                }
                _ = flush.wait_for_tick() => {
                    self.sessions.persistence().sweep(self.store.as_ref()).await;
                    flush.record_tick_end();
                }
            }
        }

        tracing::info!(world_id = %self.world_id, "maintenance loop stopped");
    }

    /// Logs every online player out and flushes and evicts every cached
    /// player. Call after the maintenance loop has stopped.
    pub async fn shutdown(&self) -> ShutdownReport {
        tracing::info!(world_id = %self.world_id, "world shutting down");
        self.sessions.shutdown().await
    }
}

// ---------------------------------------------------------------------------
// In-process world link
// ---------------------------------------------------------------------------

/// A [`WorldLink`] to a world running in the same process.
pub struct LocalWorldLink<S, C = JsonCodec> {
    world: Arc<GameWorld<S, C>>,
}

impl<S, C> LocalWorldLink<S, C> {
    pub fn new(world: Arc<GameWorld<S, C>>) -> Self {
        Self { world }
    }
}

impl<S: DocumentStore, C: Codec> WorldLink for LocalWorldLink<S, C> {
    fn world_id(&self) -> WorldId {
        self.world.world_id()
    }

    fn address(&self) -> &str {
        self.world.address()
    }

    async fn push_login_token(
        &self,
        account_id: AccountId,
        token: LoginToken,
    ) -> Result<(), FederationError> {
        self.world.tokens().accept(account_id, token);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn invalid(reason: impl Into<String>) -> RealmError {
    ProtocolError::InvalidMessage(reason.into()).into()
}

fn reject_self(player_id: PlayerId, target_id: PlayerId) -> Result<(), RealmError> {
    if player_id == target_id {
        return Err(invalid("a player cannot target itself"));
    }
    Ok(())
}

/// `Ok` when the target is online. A full mailbox still answers `Ok`: the
/// drop is logged and counted by the messenger, not reported to the sender.
fn require_reachable(target_id: PlayerId, delivery: Delivery) -> Result<Response, RealmError> {
    match delivery {
        Delivery::Queued | Delivery::Dropped => Ok(Response::Ok),
        Delivery::Offline => Err(SessionError::NotOnline(target_id).into()),
    }
}

fn request_kind(request: &Request) -> &'static str {
    match request {
        Request::PushLoginToken { .. } => "push_login_token",
        Request::Login { .. } => "login",
        Request::Create { .. } => "create",
        Request::Logout { .. } => "logout",
        Request::Heartbeat { .. } => "heartbeat",
        Request::FriendApply { .. } => "friend_apply",
        Request::FriendAgree { .. } => "friend_agree",
        Request::FriendRefuse { .. } => "friend_refuse",
        Request::FriendDelete { .. } => "friend_delete",
        Request::FriendList { .. } => "friend_list",
        Request::SendMail { .. } => "send_mail",
        Request::ReadMail { .. } => "read_mail",
        Request::DeleteMail { .. } => "delete_mail",
        Request::TakeMailAttachment { .. } => "take_mail_attachment",
        Request::Whisper { .. } => "whisper",
        Request::BattleReport { .. } => "battle_report",
    }
}
