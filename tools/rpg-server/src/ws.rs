//! WebSocket transport — request/response traffic plus server push.
//!
//! One reader and one writer task per connection. Everything outbound
//! (push frames and RPC responses) funnels through the connection's
//! bounded queue, so a response can never overtake the events its request
//! caused.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rpg_types::ids::SessionId;

use crate::broadcast::CLIENT_QUEUE_CAPACITY;
use crate::rpc::{self, CallerInfo};
use crate::state::SharedState;

/// GET /rpc/ws — upgrade subject to origin validation. A `session_id`
/// query parameter binds the connection immediately; otherwise the first
/// successful `joinGame` over the socket binds it.
pub async fn ws_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !state.sessions.validate_origin(origin) {
        warn!(?origin, "websocket upgrade rejected: origin");
        metrics::counter!("ws_origin_rejected_total").increment(1);
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let initial = query
        .get("session_id")
        .and_then(|raw| SessionId::parse(raw))
        .filter(|sid| state.sessions.peek(sid).is_some());

    ws.on_upgrade(move |socket| handle_socket(state, socket, initial))
}

async fn handle_socket(state: SharedState, socket: WebSocket, initial: Option<SessionId>) {
    let conn_id = Uuid::new_v4().as_hyphenated().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_QUEUE_CAPACITY);

    // Writer: drain the queue onto the wire; closing the queue closes the
    // socket with a normal closure.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut bound: Option<SessionId> = None;
    if let Some(sid) = initial {
        bind(&state, sid, &tx, &mut bound);
    }
    info!(conn_id, bound = ?bound, "websocket connected");

    let mut shutdown = state.shutdown.subscribe();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(conn_id, "websocket closing for shutdown");
                    break;
                }
            }
            incoming = stream.next() => {
                let Some(Ok(message)) = incoming else {
                    break; // client gone or transport error
                };
                match message {
                    Message::Text(text) => {
                        let caller = CallerInfo {
                            transport_identity: format!("ws-{conn_id}"),
                            bound_session: bound,
                        };
                        let reply = rpc::handle_request(&state, &text, &caller).await;
                        if let Some(sid) = reply.bound_session {
                            bind(&state, sid, &tx, &mut bound);
                        }
                        if tx.send(reply.response).await.is_err() {
                            break; // writer gone
                        }
                    }
                    Message::Close(_) => break,
                    // Binary frames are not part of the protocol; pings are
                    // answered by axum automatically.
                    _ => {}
                }
            }
        }
    }

    // Teardown: closing the queue ends the writer, which sends the close
    // frame.
    drop(tx);
    let _ = writer.await;
    if let Some(sid) = bound {
        state.broadcaster.unregister(&sid);
        if let Some(session) = state.sessions.peek(&sid) {
            session.set_connected(false);
        }
    }
    info!(conn_id, "websocket disconnected");
}

fn bind(
    state: &SharedState,
    sid: SessionId,
    tx: &mpsc::Sender<String>,
    bound: &mut Option<SessionId>,
) {
    if let Some(previous) = bound.replace(sid) {
        if previous != sid {
            state.broadcaster.unregister(&previous);
        }
    }
    state.broadcaster.register(sid, tx.clone());
    if let Some(session) = state.sessions.peek(&sid) {
        session.set_connected(true);
    }
    debug!(%sid, "websocket bound to session");
}
