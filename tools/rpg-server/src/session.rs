//! Session manager — reference-counted sessions, expiry sweep, origin
//! validation.
//!
//! A session binds a client to a player identity. Lookups hand out a
//! `SessionGuard` that bumps the refcount (under the table lock) and
//! releases it lock-free on drop. The sweep only collects sessions that
//! are both idle past the timeout and unreferenced, so an in-flight
//! request can never lose its session mid-handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use rpg_types::ids::{EntityId, SessionId};

/// One live session.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub player_id: EntityId,
    pub player_name: String,
    pub created_at: DateTime<Utc>,
    /// Millisecond timestamp of the last successful RPC.
    last_active_ms: AtomicI64,
    /// Whether a WebSocket is currently attached.
    connected: AtomicBool,
    refcount: AtomicI64,
}

/// Snapshot written to `sessions/<id>.yaml` at save time.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub player_id: EntityId,
    pub player_name: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub connected: bool,
}

impl Session {
    pub fn last_active(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_active_ms.load(Ordering::Acquire))
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn touch(&self, now: DateTime<Utc>) {
        self.last_active_ms
            .store(now.timestamp_millis(), Ordering::Release);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn refcount(&self) -> i64 {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            player_id: self.player_id.clone(),
            player_name: self.player_name.clone(),
            created_at: self.created_at,
            last_active: self.last_active(),
            connected: self.is_connected(),
        }
    }
}

/// RAII refcount hold on a session. Dropping releases with a lock-free
/// atomic decrement.
#[derive(Debug)]
pub struct SessionGuard {
    session: Arc<Session>,
}

impl SessionGuard {
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl std::ops::Deref for SessionGuard {
    type Target = Session;
    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.refcount.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The session table.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    timeout: Duration,
    dev_mode: bool,
    allowed_origins: Vec<String>,
}

impl SessionManager {
    pub fn new(timeout: Duration, dev_mode: bool, allowed_origins: Vec<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout,
            dev_mode,
            allowed_origins,
        }
    }

    /// Create a session for a player. The fresh id is reserved under the
    /// table write lock, so uniqueness is atomic with generation.
    pub fn join(
        &self,
        player_id: EntityId,
        player_name: String,
        now: DateTime<Utc>,
    ) -> Arc<Session> {
        let mut table = self.sessions.write();
        let id = loop {
            let candidate = SessionId::generate();
            if !table.contains_key(&candidate) {
                break candidate;
            }
        };
        let session = Arc::new(Session {
            id,
            player_id,
            player_name,
            created_at: now,
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
            connected: AtomicBool::new(false),
            refcount: AtomicI64::new(0),
        });
        table.insert(id, Arc::clone(&session));
        info!(session_id = %id, player = %session.player_name, "session created");
        session
    }

    /// Look up a session, bumping its refcount and refreshing activity.
    /// Expired sessions are invisible even before the sweep collects them.
    pub fn get(&self, id: &SessionId, now: DateTime<Utc>) -> Option<SessionGuard> {
        let table = self.sessions.read();
        let session = table.get(id)?;
        if now - session.last_active() > chrono::Duration::from_std(self.timeout).ok()? {
            return None;
        }
        // Increment while the table lock pins the entry.
        session.refcount.fetch_add(1, Ordering::AcqRel);
        session.touch(now);
        Some(SessionGuard {
            session: Arc::clone(session),
        })
    }

    /// Borrow a session without touching refcount or activity. For
    /// connection bookkeeping (marking connected flags), not for request
    /// handling — handlers must use `get`.
    pub fn peek(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Explicit logout. The session disappears immediately; in-flight
    /// guards keep their Arc until they drop.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            info!(session_id = %id, "session removed");
        }
        removed
    }

    /// Collect sessions that are idle past the timeout AND unreferenced.
    /// Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let timeout = match chrono::Duration::from_std(self.timeout) {
            Ok(t) => t,
            Err(_) => return 0,
        };
        let mut table = self.sessions.write();
        let before = table.len();
        table.retain(|id, session| {
            let idle = now - session.last_active() > timeout;
            let keep = !idle || session.refcount() > 0;
            if !keep {
                debug!(session_id = %id, "sweeping expired session");
            }
            keep
        });
        let removed = before - table.len();
        if removed > 0 {
            info!(removed, remaining = table.len(), "session sweep");
            metrics::counter!("sessions_swept_total").increment(removed as u64);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every live session for persistence.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions.read().values().map(|s| s.snapshot()).collect()
    }

    /// Origin validation for WebSocket upgrades. Dev mode admits
    /// everything; production demands a case-sensitive exact match, and an
    /// absent or empty origin is rejected.
    pub fn validate_origin(&self, origin: Option<&str>) -> bool {
        if self.dev_mode {
            return true;
        }
        match origin {
            Some(o) if !o.is_empty() => self.allowed_origins.iter().any(|allowed| allowed == o),
            _ => false,
        }
    }
}
