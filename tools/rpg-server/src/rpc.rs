//! JSON-RPC 2.0 dispatch.
//!
//! One entry point for both transports: HTTP POST bodies and WebSocket
//! text frames land in `handle_request`. The per-request algorithm:
//!
//! 1. parse the envelope (`-32700` on malformed JSON)
//! 2. validate it (`-32600`)
//! 3. route the method (`-32601`)
//! 4. rate-limit the caller identity
//! 5. resolve the session from `params.session_id` (all methods except
//!    `joinGame`), holding a refcount guard for the handler's duration
//! 6. run the handler under the server state lock (write for mutations,
//!    read for queries), with panics contained to an `InternalError`
//! 7. flush caused events to the caller's queue, then build the response
//!
//! The session token rides inside `params` — a deliberate deviation from
//! strict JSON-RPC 2.0, which reserves no framing slot for auth.

use std::panic::AssertUnwindSafe;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{error, info_span, warn, Instrument};

use rpg_types::event::GameEvent;
use rpg_types::ids::SessionId;

use crate::error::RpcError;
use crate::handlers;
use crate::session::SessionGuard;
use crate::state::SharedState;

/// Transport-level caller facts.
pub struct CallerInfo {
    /// Identity used for rate limiting before a session exists (peer
    /// address for HTTP, connection id for WS).
    pub transport_identity: String,
    /// Session already bound to this transport (WS connections); its
    /// queue receives caused events ahead of the response.
    pub bound_session: Option<SessionId>,
}

/// Outcome of one request: the serialized response plus the session the
/// transport should consider bound afterwards (set by `joinGame`).
pub struct Reply {
    pub response: String,
    pub bound_session: Option<SessionId>,
}

pub async fn handle_request(state: &SharedState, raw: &str, caller: &CallerInfo) -> Reply {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            return Reply {
                response: error_response(Value::Null, RpcError::parse_error()),
                bound_session: None,
            };
        }
    };

    let (id, method, params) = match validate_envelope(&parsed) {
        Ok(parts) => parts,
        Err(err) => {
            return Reply {
                response: error_response(request_id(&parsed), err),
                bound_session: None,
            };
        }
    };

    let correlation_id = crate::resilience::correlation_id();
    let span = info_span!("rpc", method = %method, correlation_id = %correlation_id);
    process(state, caller, id, &method, &params, &correlation_id)
        .instrument(span)
        .await
}

/// The per-request algorithm after envelope validation, inside the
/// correlation span.
async fn process(
    state: &SharedState,
    caller: &CallerInfo,
    id: Value,
    method: &str,
    params: &Map<String, Value>,
    correlation_id: &str,
) -> Reply {
    metrics::counter!("rpc_requests_total").increment(1);

    // Rate limit on the strongest identity we have.
    let identity = params
        .get("session_id")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| caller.transport_identity.clone());
    if !state.limiter.check(&identity) {
        return Reply {
            response: error_response(id, RpcError::rate_limited(correlation_id)),
            bound_session: None,
        };
    }

    // Session resolution — every method but joinGame.
    let session: Option<SessionGuard> = if method == "joinGame" {
        None
    } else {
        match resolve_session(state, params, correlation_id) {
            Ok(guard) => Some(guard),
            Err(err) => {
                return Reply {
                    response: error_response(id, err),
                    bound_session: None,
                };
            }
        }
    };

    let outcome = call_handler(state, method, params, session.as_ref(), correlation_id);

    let (response, bound) = match outcome {
        Ok((mut result, events)) => {
            // Events the request caused reach the caller's queue before
            // the response is written.
            let caller_session = session
                .as_ref()
                .map(|g| g.id)
                .or(caller.bound_session)
                .or_else(|| bound_session_from(&result));
            state.publish_caused(caller_session, events).await;

            if let Value::Object(map) = &mut result {
                map.insert("correlation_id".into(), json!(correlation_id));
            }
            let bound = if method == "joinGame" {
                bound_session_from(&result)
            } else {
                None
            };
            (success_response(id, result), bound)
        }
        Err(err) => (error_response(id, err), None),
    };

    Reply {
        response,
        bound_session: bound,
    }
}

fn bound_session_from(result: &Value) -> Option<SessionId> {
    result
        .get("session_id")
        .and_then(Value::as_str)
        .and_then(SessionId::parse)
}

/// Envelope validation per JSON-RPC 2.0 (plus this server's requirement
/// that every request carries an id — notifications are not supported).
fn validate_envelope(v: &Value) -> Result<(Value, String, Map<String, Value>), RpcError> {
    let obj = v
        .as_object()
        .ok_or_else(|| RpcError::invalid_request("not an object"))?;
    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some("2.0") => {}
        _ => return Err(RpcError::invalid_request("jsonrpc must be \"2.0\"")),
    }
    let id = match obj.get("id") {
        Some(id @ (Value::Number(_) | Value::String(_))) => id.clone(),
        Some(_) => return Err(RpcError::invalid_request("id must be a number or string")),
        None => return Err(RpcError::invalid_request("id is required")),
    };
    let method = match obj.get("method") {
        Some(Value::String(m)) => m.clone(),
        _ => return Err(RpcError::invalid_request("method must be a string")),
    };
    let params = match obj.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(RpcError::invalid_request("params must be an object")),
    };
    Ok((id, method, params))
}

fn request_id(v: &Value) -> Value {
    v.get("id").cloned().unwrap_or(Value::Null)
}

fn resolve_session(
    state: &SharedState,
    params: &Map<String, Value>,
    correlation_id: &str,
) -> Result<SessionGuard, RpcError> {
    let token = params
        .get("session_id")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("session_id is required", correlation_id))?;
    let session_id =
        SessionId::parse(token).ok_or_else(|| RpcError::invalid_session(correlation_id))?;
    state
        .sessions
        .get(&session_id, Utc::now())
        .ok_or_else(|| RpcError::invalid_session(correlation_id))
}

/// Route to a handler, containing panics. Handlers are synchronous once
/// they hold the state lock; parking_lot guards release on unwind, so a
/// panicking handler cannot wedge the server.
fn call_handler(
    state: &SharedState,
    method: &str,
    params: &Map<String, Value>,
    session: Option<&SessionGuard>,
    correlation_id: &str,
) -> Result<(Value, Vec<GameEvent>), RpcError> {
    let ctx = handlers::RequestCtx {
        state,
        session,
        correlation_id,
        now: Utc::now(),
    };
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        handlers::route(&ctx, method, params)
    }));
    match result {
        Ok(outcome) => outcome,
        Err(panic) => {
            let detail = panic_message(&panic);
            error!(method, detail, "handler panicked");
            metrics::counter!("handler_panics_total").increment(1);
            Err(RpcError::internal("handler panicked", correlation_id))
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

fn success_response(id: Value, result: Value) -> String {
    serde_json::to_string(&json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    }))
    .unwrap_or_else(|e| {
        warn!(error = %e, "response serialization failed");
        r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"response serialization failed"},"id":null}"#.to_string()
    })
}

fn error_response(id: Value, err: RpcError) -> String {
    metrics::counter!("rpc_errors_total").increment(1);
    serde_json::to_string(&json!({
        "jsonrpc": "2.0",
        "error": err,
        "id": id,
    }))
    .expect("error responses always serialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_rejects_missing_id() {
        let v: Value = serde_json::from_str(r#"{"jsonrpc":"2.0","method":"move"}"#).unwrap();
        assert!(validate_envelope(&v).is_err());
    }

    #[test]
    fn envelope_rejects_wrong_version() {
        let v: Value =
            serde_json::from_str(r#"{"jsonrpc":"1.0","method":"move","id":1}"#).unwrap();
        assert!(validate_envelope(&v).is_err());
    }

    #[test]
    fn envelope_rejects_non_string_method() {
        let v: Value = serde_json::from_str(r#"{"jsonrpc":"2.0","method":5,"id":1}"#).unwrap();
        assert!(validate_envelope(&v).is_err());
    }

    #[test]
    fn envelope_accepts_string_and_number_ids() {
        for id in [r#""abc""#, "7"] {
            let raw = format!(r#"{{"jsonrpc":"2.0","method":"move","id":{id}}}"#);
            let v: Value = serde_json::from_str(&raw).unwrap();
            let (parsed_id, method, _) = validate_envelope(&v).unwrap();
            assert_eq!(method, "move");
            assert!(!parsed_id.is_null());
        }
    }

    #[test]
    fn envelope_defaults_params_to_empty() {
        let v: Value = serde_json::from_str(r#"{"jsonrpc":"2.0","method":"move","id":1}"#).unwrap();
        let (_, _, params) = validate_envelope(&v).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn error_response_is_valid_json_rpc() {
        let raw = error_response(json!(3), RpcError::method_not_found("fly"));
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["error"]["code"], -32601);
        assert_eq!(v["id"], 3);
        assert!(v.get("result").is_none());
    }
}
