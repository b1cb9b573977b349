//! Integration tests for the game-world facade: request dispatch, token
//! handoff, cross-player routing, and the maintenance loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use realmkeep::prelude::*;
use realmkeep_player::{BattleModule, ChatModule, FriendModule, MailModule};
use realmkeep_store::collections;

// =========================================================================
// Helpers
// =========================================================================

type World = GameWorld<MemoryStore>;

fn config(session: SessionConfig) -> WorldConfig {
    WorldConfig {
        world_id: WorldId(1),
        address: "127.0.0.1:7001".into(),
        session,
    }
}

fn world_with(session: SessionConfig) -> (Arc<World>, MemoryStore) {
    let store = MemoryStore::new();
    let world = GameWorld::new(config(session), Arc::new(store.clone()), JsonCodec);
    (Arc::new(world), store)
}

fn world() -> (Arc<World>, MemoryStore) {
    world_with(SessionConfig::default())
}

fn token(account: u64) -> LoginToken {
    LoginToken::new(format!("token-{account}"))
}

async fn push_token(world: &World, account: u64) {
    let response = world
        .handle(Request::PushLoginToken {
            account_id: AccountId(account),
            token: token(account),
        })
        .await;
    assert_eq!(response, Response::Ok);
}

async fn login(world: &World, account: u64) -> Response {
    world
        .handle(Request::Login {
            account_id: AccountId(account),
            token: token(account),
        })
        .await
}

/// Runs the full first-visit sequence: token push, login (not found),
/// create, login. Returns the new player's ID.
async fn enter(world: &World, account: u64, name: &str) -> PlayerId {
    push_token(world, account).await;
    assert_eq!(login(world, account).await, Response::nack(NackCode::NotFound));

    let created = world
        .handle(Request::Create {
            account_id: AccountId(account),
            token: token(account),
            name: name.into(),
        })
        .await;
    let Response::Created { player_id } = created else {
        panic!("expected Created, got {created:?}");
    };

    assert_eq!(
        login(world, account).await,
        Response::LoggedIn {
            player_id,
            name: name.into(),
        }
    );
    player_id
}

async fn friends_of(world: &World, player_id: PlayerId) -> Vec<PlayerId> {
    match world.handle(Request::FriendList { player_id }).await {
        Response::Friends { friends } => friends.into_iter().map(|f| f.player_id).collect(),
        other => panic!("expected Friends, got {other:?}"),
    }
}

// =========================================================================
// Session requests
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_without_pushed_token_rejected() {
    let (world, _) = world();
    assert_eq!(
        login(&world, 1).await,
        Response::nack(NackCode::InvalidCredential)
    );
}

#[tokio::test(start_paused = true)]
async fn test_login_with_wrong_token_rejected() {
    let (world, _) = world();
    push_token(&world, 1).await;
    let response = world
        .handle(Request::Login {
            account_id: AccountId(1),
            token: LoginToken::new("forged"),
        })
        .await;
    assert_eq!(response, Response::nack(NackCode::InvalidCredential));
}

#[tokio::test(start_paused = true)]
async fn test_first_visit_sequence_logs_in_and_consumes_token() {
    let (world, store) = world();

    let player_id = enter(&world, 1, "ayla").await;

    assert_eq!(player_id, PlayerId(10_000));
    assert!(store.get(collections::PLAYER, player_id.0).is_some());
    assert!(world.tokens().is_empty());
    assert_eq!(
        login(&world, 1).await,
        Response::nack(NackCode::InvalidCredential)
    );
}

#[tokio::test(start_paused = true)]
async fn test_login_token_expires() {
    let (world, _) = world();
    push_token(&world, 1).await;
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(
        login(&world, 1).await,
        Response::nack(NackCode::InvalidCredential)
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_blank_name_invalid_request() {
    let (world, _) = world();
    push_token(&world, 1).await;
    let response = world
        .handle(Request::Create {
            account_id: AccountId(1),
            token: token(1),
            name: "   ".into(),
        })
        .await;
    assert_eq!(response, Response::nack(NackCode::InvalidRequest));
}

#[tokio::test(start_paused = true)]
async fn test_create_twice_duplicate_key() {
    let (world, _) = world();
    enter(&world, 1, "ayla").await;
    push_token(&world, 1).await;

    let response = world
        .handle(Request::Create {
            account_id: AccountId(1),
            token: token(1),
            name: "again".into(),
        })
        .await;

    assert_eq!(response, Response::nack(NackCode::DuplicateKey));
}

#[tokio::test(start_paused = true)]
async fn test_create_with_store_down_store_unavailable() {
    let (world, store) = world();
    push_token(&world, 1).await;
    store.set_unavailable(true);

    let response = world
        .handle(Request::Create {
            account_id: AccountId(1),
            token: token(1),
            name: "ayla".into(),
        })
        .await;

    assert_eq!(response, Response::nack(NackCode::StoreUnavailable));
    assert!(world.sessions().cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_logout_then_heartbeat_not_online() {
    let (world, _) = world();
    let id = enter(&world, 1, "ayla").await;

    assert_eq!(world.handle(Request::Logout { player_id: id }).await, Response::Ok);
    assert_eq!(
        world.handle(Request::Heartbeat { player_id: id }).await,
        Response::nack(NackCode::NotOnline)
    );
    assert_eq!(
        world.handle(Request::Logout { player_id: id }).await,
        Response::nack(NackCode::NotOnline)
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_resets_idle_counter() {
    let (world, _) = world();
    let id = enter(&world, 1, "ayla").await;
    for _ in 0..9 {
        world.sessions().idle_tick().await;
    }

    assert_eq!(world.handle(Request::Heartbeat { player_id: id }).await, Response::Ok);

    let handle = world.sessions().cache().lookup(id).unwrap();
    assert_eq!(handle.enter().await.idle_ticks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_listener_sees_each_login() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let store = MemoryStore::new();
    let world = {
        let seen = Arc::clone(&seen);
        GameWorld::new(config(SessionConfig::default()), Arc::new(store), JsonCodec)
            .with_login_listener(move |account, world| seen.lock().unwrap().push((account, world)))
    };

    enter(&world, 4, "dax").await;

    assert_eq!(*seen.lock().unwrap(), vec![(AccountId(4), WorldId(1))]);
}

// =========================================================================
// Friends
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_friend_apply_and_agree_adds_both_sides() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;

    let apply = Request::FriendApply {
        player_id: a,
        target_id: b,
    };
    assert_eq!(world.handle(apply).await, Response::Ok);

    // B drains the application on its next own request.
    assert!(friends_of(&world, b).await.is_empty());
    {
        let handle = world.sessions().cache().lookup(b).unwrap();
        let player = handle.enter().await;
        assert_eq!(player.module::<FriendModule>().unwrap().applications().len(), 1);
    }

    let agree = Request::FriendAgree {
        player_id: b,
        applicant_id: a,
    };
    assert_eq!(world.handle(agree).await, Response::Ok);

    assert_eq!(friends_of(&world, b).await, vec![a]);
    assert_eq!(friends_of(&world, a).await, vec![b]);
}

#[tokio::test(start_paused = true)]
async fn test_friend_apply_offline_target_not_online() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;
    world.handle(Request::Logout { player_id: b }).await;

    let response = world
        .handle(Request::FriendApply {
            player_id: a,
            target_id: b,
        })
        .await;

    assert_eq!(response, Response::nack(NackCode::NotOnline));
    assert_eq!(world.messenger().stats().offline, 1);
}

#[tokio::test(start_paused = true)]
async fn test_friend_agree_without_application_not_found() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;
    let response = world
        .handle(Request::FriendAgree {
            player_id: b,
            applicant_id: a,
        })
        .await;
    assert_eq!(response, Response::nack(NackCode::NotFound));
}

#[tokio::test(start_paused = true)]
async fn test_friend_delete_removes_both_sides() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;
    world
        .handle(Request::FriendApply {
            player_id: a,
            target_id: b,
        })
        .await;
    world
        .handle(Request::FriendAgree {
            player_id: b,
            applicant_id: a,
        })
        .await;
    assert_eq!(friends_of(&world, a).await, vec![b]);

    let delete = Request::FriendDelete {
        player_id: a,
        friend_id: b,
    };
    assert_eq!(world.handle(delete.clone()).await, Response::Ok);

    assert!(friends_of(&world, b).await.is_empty());
    assert_eq!(world.handle(delete).await, Response::nack(NackCode::NotFound));
}

#[tokio::test(start_paused = true)]
async fn test_friend_refuse_clears_application() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;
    world
        .handle(Request::FriendApply {
            player_id: a,
            target_id: b,
        })
        .await;

    let refuse = Request::FriendRefuse {
        player_id: b,
        applicant_id: a,
    };
    assert_eq!(world.handle(refuse.clone()).await, Response::Ok);
    assert_eq!(world.handle(refuse).await, Response::nack(NackCode::NotFound));
}

#[tokio::test(start_paused = true)]
async fn test_cross_player_request_to_self_invalid() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let response = world
        .handle(Request::FriendApply {
            player_id: a,
            target_id: a,
        })
        .await;
    assert_eq!(response, Response::nack(NackCode::InvalidRequest));
}

// =========================================================================
// Mail
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_send_mail_online_target_then_take_attachment() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;
    let gift = MailAttachment {
        item_id: 7,
        count: 3,
    };

    let send = Request::SendMail {
        player_id: a,
        target_id: b,
        title: "hi".into(),
        content: "a gift".into(),
        attachment: Some(gift),
    };
    assert_eq!(world.handle(send).await, Response::Ok);

    let take = Request::TakeMailAttachment {
        player_id: b,
        mail_id: 1,
    };
    assert_eq!(
        world.handle(take.clone()).await,
        Response::AttachmentTaken {
            attachment: Some(gift)
        }
    );
    assert_eq!(
        world.handle(take).await,
        Response::AttachmentTaken { attachment: None }
    );
    assert_eq!(
        world
            .handle(Request::DeleteMail {
                player_id: b,
                mail_id: 1
            })
            .await,
        Response::Ok
    );
    assert_eq!(
        world
            .handle(Request::ReadMail {
                player_id: b,
                mail_id: 1
            })
            .await,
        Response::nack(NackCode::NotFound)
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_mail_evicted_target_delivered_on_next_login() {
    let (world, store) = world_with(SessionConfig {
        reconnect_grace_secs: 1,
        ..SessionConfig::default()
    });
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;
    world.handle(Request::Logout { player_id: b }).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(world.sessions().cache().lookup(b).is_none());

    let send = Request::SendMail {
        player_id: a,
        target_id: b,
        title: "while you were out".into(),
        content: "".into(),
        attachment: None,
    };
    assert_eq!(world.handle(send).await, Response::Ok);
    assert_eq!(
        store.get(collections::MAIL_PENDING, b.0).unwrap()["mails"]
            .as_array()
            .map(Vec::len),
        Some(1)
    );

    push_token(&world, 2).await;
    assert!(matches!(login(&world, 2).await, Response::LoggedIn { .. }));

    let handle = world.sessions().cache().lookup(b).unwrap();
    let player = handle.enter().await;
    let inbox = player.module::<MailModule>().unwrap().inbox();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].from, a);
}

#[tokio::test(start_paused = true)]
async fn test_send_mail_unknown_target_not_found() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let response = world
        .handle(Request::SendMail {
            player_id: a,
            target_id: PlayerId(99),
            title: "?".into(),
            content: "?".into(),
            attachment: None,
        })
        .await;
    assert_eq!(response, Response::nack(NackCode::NotFound));
}

// =========================================================================
// Chat and battle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_whisper_delivered_through_mailbox() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;

    let whisper = Request::Whisper {
        player_id: a,
        target_id: b,
        text: "psst".into(),
    };
    assert_eq!(world.handle(whisper).await, Response::Ok);

    // Queued, not yet applied.
    let b_handle = world.sessions().cache().lookup(b).unwrap();
    assert_eq!(b_handle.enter().await.pending_operations(), 1);

    world.handle(Request::Heartbeat { player_id: b }).await;
    let player = b_handle.enter().await;
    let chat = player.module::<ChatModule>().unwrap();
    assert_eq!(chat.unread(), 1);
    assert_eq!(chat.history().next().map(|l| l.text.as_str()), Some("psst"));

    let a_handle = world.sessions().cache().lookup(a).unwrap();
    assert_eq!(a_handle.enter().await.module::<ChatModule>().unwrap().sent(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_whisper_empty_text_invalid_request() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;
    let response = world
        .handle(Request::Whisper {
            player_id: a,
            target_id: b,
            text: " ".into(),
        })
        .await;
    assert_eq!(response, Response::nack(NackCode::InvalidRequest));
}

#[tokio::test(start_paused = true)]
async fn test_battle_report_mirrors_result_on_opponent() {
    let (world, _) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;

    let report = Request::BattleReport {
        player_id: a,
        opponent_id: b,
        won: true,
    };
    assert_eq!(world.handle(report).await, Response::Ok);
    world.handle(Request::Heartbeat { player_id: b }).await;

    let a_handle = world.sessions().cache().lookup(a).unwrap();
    let b_handle = world.sessions().cache().lookup(b).unwrap();
    assert_eq!(a_handle.enter().await.module::<BattleModule>().unwrap().wins(), 1);
    assert_eq!(b_handle.enter().await.module::<BattleModule>().unwrap().losses(), 1);
}

// =========================================================================
// Frames
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_handle_frame_decodes_and_encodes() {
    let (world, _) = world();
    let frame = JsonCodec
        .encode(&Request::PushLoginToken {
            account_id: AccountId(1),
            token: token(1),
        })
        .unwrap();

    let reply: Response = JsonCodec.decode(&world.handle_frame(&frame).await).unwrap();

    assert_eq!(reply, Response::Ok);
    assert_eq!(world.tokens().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_frame_garbage_invalid_request() {
    let (world, _) = world();
    let reply: Response = JsonCodec
        .decode(&world.handle_frame(b"{not json").await)
        .unwrap();
    assert_eq!(reply, Response::nack(NackCode::InvalidRequest));
}

// =========================================================================
// Maintenance loop and shutdown
// =========================================================================

fn spawn_maintenance(world: &Arc<World>) -> (tokio::sync::oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let world = Arc::clone(world);
    let task = tokio::spawn(async move {
        world
            .run_maintenance(async {
                let _ = stop_rx.await;
            })
            .await;
    });
    (stop_tx, task)
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_forces_idle_player_offline() {
    let (world, _) = world();
    let id = enter(&world, 1, "ayla").await;
    let (stop, task) = spawn_maintenance(&world);

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert!(world.sessions().cache().lookup(id).unwrap().is_online());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!world.sessions().cache().lookup(id).unwrap().is_online());

    stop.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_heartbeats_keep_player_online() {
    let (world, _) = world();
    let id = enter(&world, 1, "ayla").await;
    let (stop, task) = spawn_maintenance(&world);

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(world.handle(Request::Heartbeat { player_id: id }).await, Response::Ok);
    }

    stop.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_flush_sweep_writes_online_players() {
    let (world, store) = world_with(SessionConfig {
        idle_threshold: 1_000,
        flush_interval_secs: 60,
        ..SessionConfig::default()
    });
    let id = enter(&world, 1, "ayla").await;
    let before = store.write_count(collections::PLAYER, id.0);
    let (stop, task) = spawn_maintenance(&world);

    tokio::time::sleep(Duration::from_millis(60_500)).await;
    assert_eq!(store.write_count(collections::PLAYER, id.0), before + 1);

    stop.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_purges_expired_tokens() {
    let (world, _) = world();
    push_token(&world, 1).await;
    let (stop, task) = spawn_maintenance(&world);

    tokio::time::sleep(Duration::from_millis(61_500)).await;
    assert!(world.tokens().is_empty());

    stop.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_every_player() {
    let (world, store) = world();
    let a = enter(&world, 1, "ayla").await;
    let b = enter(&world, 2, "bren").await;
    let before = store.write_count(collections::PLAYER, a.0);

    let report = world.shutdown().await;

    assert_eq!(report.logged_out, 2);
    assert_eq!(report.evicted, 2);
    assert!(world.sessions().cache().is_empty());
    assert_eq!(store.write_count(collections::PLAYER, a.0), before + 1);
    assert!(store.get(collections::PLAYER, b.0).is_some());
}

// =========================================================================
// Account center handoff
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_account_center_grant_admits_client() {
    let (world, store) = world();
    let mut center = AccountCenter::new(Arc::new(store.clone()));
    center.add_world(LocalWorldLink::new(Arc::clone(&world)));
    let account = center.register("ayla", "pw").await.unwrap();

    let grant = center.login("ayla", "pw", WorldId(1)).await.unwrap();
    assert_eq!(grant.address, world.address());

    let login = Request::Login {
        account_id: account,
        token: grant.token.clone(),
    };
    assert_eq!(world.handle(login.clone()).await, Response::nack(NackCode::NotFound));
    let created = world
        .handle(Request::Create {
            account_id: account,
            token: grant.token.clone(),
            name: "ayla".into(),
        })
        .await;
    assert!(matches!(created, Response::Created { .. }));
    assert!(matches!(world.handle(login).await, Response::LoggedIn { .. }));
}
