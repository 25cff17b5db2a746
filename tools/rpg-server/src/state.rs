//! Shared server state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{error, info, warn};

use rpg_engine::game::Game;
use rpg_types::event::GameEvent;
use rpg_types::ids::SessionId;

use crate::broadcast::{frame_json, Broadcaster, BusEnvelope, EventBus};
use crate::config::ServerConfig;
use crate::persist::Store;
use crate::resilience::{CircuitBreaker, RateLimiter};
use crate::session::SessionManager;

/// Everything a request handler can reach.
pub struct AppState {
    pub config: ServerConfig,
    /// The per-request server lock: mutating handlers hold `write()` for
    /// their entire body, read-only handlers hold `read()`.
    pub game: RwLock<Game>,
    pub sessions: SessionManager,
    pub bus: Arc<EventBus>,
    pub broadcaster: Arc<Broadcaster>,
    /// `None` when persistence is disabled by configuration.
    pub store: Option<Store>,
    pub limiter: RateLimiter,
    /// Breaker around persistence writes.
    pub save_breaker: CircuitBreaker,
    /// Set when repeated save failures degraded the server to
    /// in-memory-only operation.
    pub persistence_degraded: AtomicBool,
    pub shutdown: watch::Sender<bool>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Publish the events a request caused. The caller's own client (if
    /// any) receives them inline first, so they are queued ahead of the
    /// response; the bus fanout skips that client.
    pub async fn publish_caused(&self, caller: Option<SessionId>, events: Vec<GameEvent>) {
        for event in events {
            if let Some(session_id) = caller {
                self.broadcaster
                    .deliver_to(&session_id, frame_json(&event))
                    .await;
            }
            self.bus.publish(BusEnvelope {
                event,
                exclude: caller,
            });
        }
    }

    /// Snapshot the world and sessions to disk. Used by the auto-save
    /// loop and the final shutdown save.
    pub fn save_now(&self) -> Result<(), crate::persist::PersistError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        {
            let game = self.game.read();
            store.save("gamestate", &*game)?;
        }
        for snapshot in self.sessions.snapshots() {
            store.save(&format!("sessions/{}", snapshot.id), &snapshot)?;
        }
        Ok(())
    }

    /// One auto-save attempt behind the circuit breaker, with degrade
    /// bookkeeping.
    pub async fn auto_save_once(&self) {
        if self.store.is_none() {
            return;
        }
        if !self.save_breaker.allow() {
            warn!("auto-save skipped: circuit open");
            return;
        }
        let result = crate::resilience::retry_with_backoff(
            "auto_save",
            3,
            std::time::Duration::from_millis(200),
            || async { self.save_now() },
        )
        .await;
        match result {
            Ok(()) => {
                self.save_breaker.record_success();
                if self.persistence_degraded.swap(false, Ordering::AcqRel) {
                    info!("persistence recovered; leaving in-memory-only mode");
                }
                metrics::counter!("auto_save_total").increment(1);
            }
            Err(e) => {
                self.save_breaker.record_failure();
                metrics::counter!("auto_save_failures_total").increment(1);
                if !self.persistence_degraded.swap(true, Ordering::AcqRel) {
                    error!(error = %e, "auto-save failing; degrading to in-memory only");
                }
            }
        }
    }
}
