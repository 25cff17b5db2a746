//! RPG game server.
//!
//! JSON-RPC 2.0 over HTTP at `/rpc` with a WebSocket sibling at `/rpc/ws`
//! for the same traffic plus server push. Startup: load config, open the
//! store, restore the last snapshot, spawn the background loops, serve.
//! Shutdown: stop accepting, cancel loops, force a final save, exit 0.

mod broadcast;
mod config;
mod error;
mod handlers;
mod persist;
mod resilience;
mod rpc;
mod session;
mod state;
mod ws;

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{ConnectInfo, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rpg_engine::game::Game;

use crate::broadcast::{Broadcaster, EventBus};
use crate::config::ServerConfig;
use crate::persist::Store;
use crate::resilience::{CircuitBreaker, RateLimiter};
use crate::rpc::CallerInfo;
use crate::session::SessionManager;
use crate::state::{AppState, SharedState};

fn load_or_create_game(config: &ServerConfig, store: Option<&Store>) -> anyhow::Result<Game> {
    let now = Utc::now();
    if let Some(store) = store {
        if let Some(mut game) = store
            .load::<Game>("gamestate")
            .context("gamestate snapshot is unreadable")?
        {
            game.after_load(now);
            info!(objects = game.world.object_count(), "loaded gamestate snapshot");
            return Ok(game);
        }
    }
    info!(
        width = config.world_width,
        height = config.world_height,
        "starting fresh world"
    );
    Ok(Game::new(
        config.world_width,
        config.world_height,
        config.world_seed,
        now,
    ))
}

async fn http_rpc(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: String,
) -> impl IntoResponse {
    let caller = CallerInfo {
        transport_identity: addr.ip().to_string(),
        bound_session: None,
    };
    let reply = rpc::handle_request(&state, &body, &caller).await;
    (
        [(header::CONTENT_TYPE, "application/json")],
        reply.response,
    )
}

async fn health() -> &'static str {
    "rpg-server ok"
}

fn spawn_background_tasks(state: SharedState) {
    // Auto-save loop.
    {
        let state = Arc::clone(&state);
        let mut shutdown = state.shutdown.subscribe();
        let interval = state.config.auto_save_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => state.auto_save_once().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    // Session sweep loop (also prunes idle rate-limit buckets).
    {
        let state = Arc::clone(&state);
        let mut shutdown = state.shutdown.subscribe();
        let interval = state.config.session_cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        state.sessions.sweep(Utc::now());
                        state.limiter.prune();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    // Game tick loop: drives real-time effect expiry and scheduled events.
    {
        let state = Arc::clone(&state);
        let mut shutdown = state.shutdown.subscribe();
        let interval = state.config.tick_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let events = state.game.write().tick(Utc::now());
                        state.publish_caused(None, events).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    // Broadcaster fanout task.
    tokio::spawn(Arc::clone(&state.broadcaster).run(
        Arc::clone(&state.bus),
        state.shutdown.subscribe(),
    ));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env().context("configuration error")?;
    info!(?config, "configuration loaded");

    let store = if config.enable_persistence {
        Some(Store::open(&config.data_dir).context("data directory is unusable")?)
    } else {
        warn!("persistence disabled; state lives in memory only");
        None
    };

    let game = load_or_create_game(&config, store.as_ref())?;
    let (shutdown_tx, _) = watch::channel(false);

    let state: SharedState = Arc::new(AppState {
        sessions: SessionManager::new(
            config.session_timeout,
            config.dev_mode,
            config.allowed_origins.clone(),
        ),
        game: parking_lot::RwLock::new(game),
        bus: Arc::new(EventBus::new(1024)),
        broadcaster: Arc::new(Broadcaster::new()),
        limiter: RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst),
        save_breaker: CircuitBreaker::new(5, std::time::Duration::from_secs(60)),
        persistence_degraded: AtomicBool::new(false),
        shutdown: shutdown_tx,
        store,
        config,
    });

    spawn_background_tasks(Arc::clone(&state));

    let app = Router::new()
        .route("/health", get(health))
        .route("/rpc", post(http_rpc))
        .route("/rpc/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "rpg-server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        // Signal the watch before serve() starts draining, so open
        // WebSocket loops unwind and the drain can finish.
        let state = Arc::clone(&state);
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = state.shutdown.send(true);
        }
    })
    .await
    .context("server error")?;

    // Connections are drained and the loops cancelled; force a final save.
    if let Err(e) = state.save_now() {
        warn!(error = %e, "final save failed");
    } else {
        info!("final save complete");
    }
    Ok(())
}
