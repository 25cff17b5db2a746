//! JSON-RPC error mapping.
//!
//! Engine errors carry a machine-readable kind; this module decides the
//! wire code and payload. Parameter-shaped failures map to `-32602`,
//! everything else domain-shaped to `-32603` with a typed `data.kind`.

use serde::Serialize;
use serde_json::{json, Value};

use rpg_engine::error::GameError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// A wire-ready RPC error.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach the typed payload: kind + correlation id + optional context.
    pub fn with_kind(mut self, kind: &str, correlation_id: &str) -> Self {
        self.data = Some(json!({
            "kind": kind,
            "correlation_id": correlation_id,
        }));
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        if let Some(Value::Object(map)) = self.data.as_mut() {
            map.insert("context".into(), context);
        }
        self
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(detail: &str) -> Self {
        Self::new(INVALID_REQUEST, format!("Invalid request: {detail}"))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(detail: impl std::fmt::Display, correlation_id: &str) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {detail}"))
            .with_kind("InvalidParams", correlation_id)
    }

    pub fn invalid_session(correlation_id: &str) -> Self {
        Self::new(INTERNAL_ERROR, "Unknown or expired session")
            .with_kind("InvalidSession", correlation_id)
    }

    pub fn rate_limited(correlation_id: &str) -> Self {
        Self::new(INTERNAL_ERROR, "Too many requests").with_kind("RateLimited", correlation_id)
    }

    pub fn internal(detail: impl std::fmt::Display, correlation_id: &str) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {detail}"))
            .with_kind("InternalError", correlation_id)
    }

    /// Map an engine error onto the wire. Parameter-shaped kinds take the
    /// `-32602` code; the kind string always rides in `data`.
    pub fn from_game_error(err: &GameError, correlation_id: &str) -> Self {
        let kind = err.kind();
        let code = match kind {
            "InvalidParams" | "InvalidInitiative" => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        };
        Self::new(code, err.to_string()).with_kind(kind, correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_initiative_maps_to_invalid_params_code() {
        let err = GameError::InvalidInitiative {
            reason: "duplicate id p1 in initiative".into(),
        };
        let rpc = RpcError::from_game_error(&err, "corr-1");
        assert_eq!(rpc.code, INVALID_PARAMS);
        assert_eq!(rpc.data.as_ref().unwrap()["kind"], "InvalidInitiative");
        assert_eq!(rpc.data.as_ref().unwrap()["correlation_id"], "corr-1");
    }

    #[test]
    fn domain_errors_map_to_internal_code_with_kind() {
        let err = GameError::NotInCombat;
        let rpc = RpcError::from_game_error(&err, "corr-2");
        assert_eq!(rpc.code, INTERNAL_ERROR);
        assert_eq!(rpc.data.as_ref().unwrap()["kind"], "NotInCombat");
    }

    #[test]
    fn insufficient_resources_keeps_kind() {
        let err = GameError::InsufficientResources {
            resource: "action points",
            needed: 2,
            available: 0,
        };
        let rpc = RpcError::from_game_error(&err, "c");
        assert_eq!(rpc.data.unwrap()["kind"], "InsufficientResources");
    }
}
