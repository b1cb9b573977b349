//! One account center and one game world in a single process, driven by a
//! scripted pair of clients.
//!
//! Usage: `world-sim [world.json]`. Without a config file the world runs on
//! defaults with a short reconnect grace so the eviction is visible.

use std::sync::Arc;
use std::time::Duration;

use realmkeep::prelude::*;

type World = GameWorld<MemoryStore>;
type Center = AccountCenter<MemoryStore, LocalWorldLink<MemoryStore>>;

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Sends one request through the frame entry point, the way a transport
/// would.
async fn call(world: &World, request: &Request) -> Result<Response, ProtocolError> {
    let frame = JsonCodec.encode(request)?;
    JsonCodec.decode(&world.handle_frame(&frame).await)
}

/// Account-center login, then the world-side login or first-visit creation.
async fn connect(
    world: &World,
    center: &Center,
    name: &str,
) -> Result<PlayerId, Box<dyn std::error::Error>> {
    let grant = center.login(name, "secret", world.world_id()).await?;
    let login = Request::Login {
        account_id: grant.account_id,
        token: grant.token.clone(),
    };

    if call(world, &login).await? == Response::nack(NackCode::NotFound) {
        let create = Request::Create {
            account_id: grant.account_id,
            token: grant.token.clone(),
            name: name.to_string(),
        };
        let created = call(world, &create).await?;
        tracing::info!(name, ?created, "player created");
    }

    match call(world, &login).await? {
        Response::LoggedIn { player_id, .. } => Ok(player_id),
        other => Err(format!("login for {name} refused: {other:?}").into()),
    }
}

/// Friends, mail, whispers and a battle between two online players.
async fn exchange(world: &World, a: PlayerId, b: PlayerId) -> Result<(), ProtocolError> {
    let script = [
        Request::FriendApply {
            player_id: a,
            target_id: b,
        },
        Request::FriendAgree {
            player_id: b,
            applicant_id: a,
        },
        Request::SendMail {
            player_id: a,
            target_id: b,
            title: "welcome".into(),
            content: "a starter kit".into(),
            attachment: Some(MailAttachment {
                item_id: 1001,
                count: 5,
            }),
        },
        Request::TakeMailAttachment {
            player_id: b,
            mail_id: 1,
        },
        Request::Whisper {
            player_id: b,
            target_id: a,
            text: "thanks!".into(),
        },
        Request::BattleReport {
            player_id: a,
            opponent_id: b,
            won: true,
        },
        Request::FriendList { player_id: a },
    ];
    for request in &script {
        let response = call(world, request).await?;
        tracing::info!(?request, ?response, "client call");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn load_config() -> Result<WorldConfig, RealmError> {
    match std::env::args().nth(1) {
        Some(path) => WorldConfig::load(path),
        None => {
            let mut config = WorldConfig::new(WorldId(1), "127.0.0.1:7001");
            config.session.reconnect_grace_secs = 3;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    realmkeep::init_tracing();

    let config = load_config()?;
    let grace = config.session.grace();
    let store = Arc::new(MemoryStore::new());

    // World logins feed the account center's counters.
    let (login_tx, mut login_rx) = tokio::sync::mpsc::unbounded_channel();
    let world = Arc::new(
        GameWorld::new(config, Arc::clone(&store), JsonCodec).with_login_listener(
            move |account, world| {
                let _ = login_tx.send((account, world));
            },
        ),
    );

    let mut center = AccountCenter::new(Arc::clone(&store));
    center.add_world(LocalWorldLink::new(Arc::clone(&world)));
    let center = Arc::new(center);
    {
        let center = Arc::clone(&center);
        tokio::spawn(async move {
            while let Some((account, world)) = login_rx.recv().await {
                center.login_succeeded(account, world);
            }
        });
    }

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let maintenance = {
        let world = Arc::clone(&world);
        tokio::spawn(async move {
            world
                .run_maintenance(async {
                    let _ = stop_rx.await;
                })
                .await;
        })
    };

    center.register("ayla", "secret").await?;
    center.register("bren", "secret").await?;
    let a = connect(&world, &center, "ayla").await?;
    let b = connect(&world, &center, "bren").await?;
    exchange(&world, a, b).await?;

    call(&world, &Request::Logout { player_id: b }).await?;
    tokio::time::sleep(grace + Duration::from_secs(1)).await;
    tracing::info!(
        cached = world.sessions().cache().len(),
        online = world.sessions().online_count(),
        "after reconnect grace"
    );

    // Mail to an evicted player waits in the store for the next login.
    let late_mail = Request::SendMail {
        player_id: a,
        target_id: b,
        title: "missed you".into(),
        content: String::new(),
        attachment: None,
    };
    call(&world, &late_mail).await?;
    connect(&world, &center, "bren").await?;

    let _ = stop_tx.send(());
    maintenance.await?;
    let report = world.shutdown().await;
    let stats = world.messenger().stats();
    let account = center.account("ayla").await?;
    tracing::info!(
        ?report,
        queued = stats.queued,
        offline = stats.offline,
        dropped = stats.dropped,
        logins = account.map(|a| a.login_count),
        "simulation finished"
    );
    Ok(())
}
