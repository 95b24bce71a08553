//! Error types for the cmake-server client.

use std::io;

use serde::Deserialize;

use crate::types::ConnectionState;

/// Failure while reading or writing protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("cmake server stream error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed JSON in cmake server frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("buffered {len} bytes without a complete frame (limit {limit})")]
    Oversized { len: usize, limit: usize },
}

/// A message that violates the protocol. These end the receive loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("message has no `type` field")]
    MissingType,
    #[error("`{kind}` message has no cookie")]
    MissingCookie { kind: String },
    #[error("reply for unknown cookie `{0}`")]
    UnknownCookie(String),
    #[error("malformed `{kind}` message: {reason}")]
    Malformed { kind: String, reason: String },
}

/// An `error` reply to a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("cmake server rejected `{in_reply_to}`: {error_message}")]
pub struct ServerError {
    #[serde(default)]
    pub error_message: String,
    pub cookie: String,
    #[serde(default)]
    pub in_reply_to: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("connection to cmake server closed")]
    Disconnected,
    #[error("client is shutting down")]
    ShuttingDown,
    #[error("`{request}` is not allowed while {state:?}")]
    InvalidState {
        request: String,
        state: ConnectionState,
    },
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("cmake server exited during startup (code {code:?})")]
    Startup { code: Option<i32> },
    #[error("no usable CMake generator found")]
    NoGenerator,
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON for `{request}`: {source}")]
    Json {
        request: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Whether the server answered the request with an `error` message.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}
