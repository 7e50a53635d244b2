//! JSON-RPC messages exchanged with a worker process.
//!
//! The server sends `lint`, `resolve`, and `shutdown` requests. The worker
//! answers each with a result (`null` when no linter installation applies)
//! or an error, and may emit `log` notifications at any time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) const METHOD_LINT: &str = "lint";
pub(crate) const METHOD_RESOLVE: &str = "resolve";
pub(crate) const METHOD_SHUTDOWN: &str = "shutdown";
const METHOD_LOG: &str = "log";

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub(crate) struct RpcError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

/// A reply to a known request is never dropped, so a loosely shaped error
/// keeps its raw text instead.
fn rpc_error(error: &Value) -> RpcError {
    RpcError::deserialize(error).unwrap_or_else(|_| RpcError {
        code: 0,
        message: match error {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        },
    })
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

#[derive(Debug, Deserialize)]
struct LogParams {
    level: LogLevel,
    message: String,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Incoming {
    Response {
        id: u64,
        outcome: Result<Value, RpcError>,
    },
    Log {
        level: LogLevel,
        message: String,
    },
}

/// Classify a frame from the worker. `None` for anything we do not understand.
pub(crate) fn parse_incoming(frame: Value) -> Option<Incoming> {
    let Value::Object(mut object) = frame else {
        return None;
    };

    if let Some(id) = object.get("id").and_then(Value::as_u64) {
        let outcome = match object.remove("error") {
            Some(error) if !error.is_null() => Err(rpc_error(&error)),
            _ => Ok(object.remove("result").unwrap_or(Value::Null)),
        };
        return Some(Incoming::Response { id, outcome });
    }

    if object.get("method").and_then(Value::as_str) == Some(METHOD_LOG) {
        let params: LogParams = serde_json::from_value(object.remove("params")?).ok()?;
        return Some(Incoming::Log {
            level: params.level,
            message: params.message,
        });
    }

    None
}
