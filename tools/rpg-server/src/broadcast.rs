//! Event bus and WebSocket fanout.
//!
//! Handlers publish `BusEnvelope`s; the broadcaster task subscribes once
//! and fans each event out to every registered client queue. A client
//! queue is a bounded mpsc: on overflow or send timeout the frame is
//! dropped and counted, and two consecutive timeouts close the
//! connection.
//!
//! The request path can also deliver its own events directly to the
//! caller's queue before writing the response (marking them `exclude` so
//! the fanout does not duplicate them) — that is what guarantees a client
//! sees the events a request caused before the request's response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use rpg_types::event::{EventType, GameEvent};
use rpg_types::ids::{EntityId, SessionId};

/// Outbound queue capacity per client.
pub const CLIENT_QUEUE_CAPACITY: usize = 500;
/// How long a queue send may block before the frame is dropped.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(50);
/// Consecutive send timeouts before the connection is closed.
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 2;

// =============================================================================
// Bus
// =============================================================================

/// An event plus fanout metadata.
#[derive(Debug, Clone)]
pub struct BusEnvelope {
    pub event: GameEvent,
    /// Client that already received this event inline on its own request
    /// path; the fanout skips it.
    pub exclude: Option<SessionId>,
}

/// Typed publish/subscribe bus over a tokio broadcast channel.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<BusEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Ordering is the bus's send order; subscribers see
    /// events from one publisher in emission order.
    pub fn publish(&self, envelope: BusEnvelope) {
        metrics::counter!("events_published_total").increment(1);
        // No receivers is fine — nobody is connected.
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEnvelope> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Push frames
// =============================================================================

/// The wire shape of a server push.
#[derive(Debug, Serialize)]
pub struct PushFrame<'a> {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub event: EventType,
    pub source: Option<&'a EntityId>,
    pub target: Option<&'a EntityId>,
    pub data: &'a Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Wrap an event in its push frame and serialize it.
pub fn frame_json(event: &GameEvent) -> String {
    let frame = PushFrame {
        frame_type: "game_event",
        event: event.event_type,
        source: event.source.as_ref(),
        target: event.target.as_ref(),
        data: &event.data,
        timestamp: event.timestamp,
    };
    serde_json::to_string(&frame).expect("push frames always serialize")
}

// =============================================================================
// Client registry & fanout
// =============================================================================

#[derive(Debug)]
struct ClientHandle {
    tx: mpsc::Sender<String>,
    consecutive_timeouts: AtomicU32,
}

/// The set of connected WebSocket clients, keyed by session.
#[derive(Debug, Default)]
pub struct Broadcaster {
    clients: RwLock<HashMap<SessionId, Arc<ClientHandle>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a client queue for a session. Replaces any previous
    /// connection for the same session.
    pub fn register(&self, session_id: SessionId, tx: mpsc::Sender<String>) {
        let handle = Arc::new(ClientHandle {
            tx,
            consecutive_timeouts: AtomicU32::new(0),
        });
        if self.clients.write().insert(session_id, handle).is_some() {
            debug!(%session_id, "replaced existing client registration");
        }
        metrics::gauge!("ws_clients").increment(1.0);
    }

    pub fn unregister(&self, session_id: &SessionId) {
        if self.clients.write().remove(session_id).is_some() {
            metrics::gauge!("ws_clients").decrement(1.0);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Deliver one frame to one client, honoring the send timeout. On the
    /// second consecutive timeout the client is dropped, which closes its
    /// connection.
    pub async fn deliver_to(&self, session_id: &SessionId, frame: String) {
        let handle = {
            let clients = self.clients.read();
            match clients.get(session_id) {
                Some(h) => Arc::clone(h),
                None => return,
            }
        };
        match tokio::time::timeout(SEND_TIMEOUT, handle.tx.send(frame)).await {
            Ok(Ok(())) => {
                handle.consecutive_timeouts.store(0, Ordering::Release);
            }
            Ok(Err(_closed)) => {
                self.unregister(session_id);
            }
            Err(_timeout) => {
                metrics::counter!("ws_frames_dropped_total").increment(1);
                let misses = handle.consecutive_timeouts.fetch_add(1, Ordering::AcqRel) + 1;
                if misses >= MAX_CONSECUTIVE_TIMEOUTS {
                    warn!(%session_id, "closing slow client after consecutive send timeouts");
                    self.unregister(session_id);
                }
            }
        }
    }

    /// Fan one envelope out to every registered client except the
    /// excluded one.
    pub async fn fanout(&self, envelope: &BusEnvelope) {
        let frame = frame_json(&envelope.event);
        let targets: Vec<SessionId> = {
            let clients = self.clients.read();
            clients
                .keys()
                .filter(|sid| Some(**sid) != envelope.exclude)
                .copied()
                .collect()
        };
        for session_id in targets {
            self.deliver_to(&session_id, frame.clone()).await;
        }
    }

    /// The broadcaster task: subscribe once, fan out forever.
    pub async fn run(
        self: Arc<Self>,
        bus: Arc<EventBus>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut rx = bus.subscribe();
        info!("broadcaster started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = rx.recv() => match received {
                    Ok(envelope) => self.fanout(&envelope).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "broadcaster lagged; events skipped");
                        metrics::counter!("bus_lagged_total").increment(missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!("broadcaster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> GameEvent {
        GameEvent::new(EventType::Movement)
            .source(&EntityId::from("p1"))
            .with("new", serde_json::json!({"x": 5, "y": 4, "level": 0}))
    }

    #[test]
    fn frame_has_game_event_type_tag() {
        let json = frame_json(&event());
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "game_event");
        assert_eq!(v["event"], "movement");
        assert_eq!(v["source"], "p1");
        assert_eq!(v["data"]["new"]["y"], 4);
    }

    #[tokio::test]
    async fn fanout_skips_excluded_session() {
        let broadcaster = Broadcaster::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let sid_a = SessionId::generate();
        let sid_b = SessionId::generate();
        broadcaster.register(sid_a, tx_a);
        broadcaster.register(sid_b, tx_b);

        broadcaster
            .fanout(&BusEnvelope {
                event: event(),
                exclude: Some(sid_a),
            })
            .await;

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn slow_client_dropped_after_two_timeouts() {
        let broadcaster = Broadcaster::new();
        // Capacity-1 queue that nobody drains: the second send times out.
        let (tx, _rx) = mpsc::channel(1);
        // Keep _rx alive so sends time out instead of erroring closed.
        let sid = SessionId::generate();
        broadcaster.register(sid, tx);

        broadcaster.deliver_to(&sid, "one".into()).await; // fills queue
        assert_eq!(broadcaster.client_count(), 1);
        broadcaster.deliver_to(&sid, "two".into()).await; // timeout 1
        assert_eq!(broadcaster.client_count(), 1);
        broadcaster.deliver_to(&sid, "three".into()).await; // timeout 2 → drop
        assert_eq!(broadcaster.client_count(), 0);
    }

    #[tokio::test]
    async fn closed_client_is_unregistered() {
        let broadcaster = Broadcaster::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sid = SessionId::generate();
        broadcaster.register(sid, tx);
        broadcaster.deliver_to(&sid, "frame".into()).await;
        assert_eq!(broadcaster.client_count(), 0);
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(BusEnvelope {
            event: event(),
            exclude: None,
        });
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.event_type, EventType::Movement);
    }
}
