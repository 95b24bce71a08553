//! Message types for the cmake-server JSON protocol.
//!
//! Requests carry a `type` and a `cookie`; the server answers each with a
//! `reply` or `error` echoing the cookie, optionally preceded by `progress`
//! and `message` notifications for the same cookie. `hello` and `signal`
//! messages are unsolicited.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ServerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    #[serde(default)]
    pub is_experimental: bool,
}

/// First message the server sends after a client connects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub supported_protocol_versions: Vec<ProtocolVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParams {
    pub protocol_version: ProtocolVersion,
    pub source_directory: String,
    pub build_directory: String,
    pub generator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_generator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub in_reply_to: String,
    pub cookie: String,
    #[serde(default)]
    pub progress_message: String,
    pub progress_minimum: i64,
    pub progress_maximum: i64,
    pub progress_current: i64,
}

impl Progress {
    /// Completion in `[0, 1]`, or `None` for an empty range.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        let span = self.progress_maximum - self.progress_minimum;
        if span <= 0 {
            return None;
        }
        let done = (self.progress_current - self.progress_minimum) as f64 / span as f64;
        Some(done.clamp(0.0, 1.0))
    }
}

/// Output the server produced while handling a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    #[serde(default)]
    pub in_reply_to: String,
    #[serde(default)]
    pub cookie: String,
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Signal {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureParams {
    pub cache_arguments: Vec<String>,
}

/// Settings accepted by `setGlobalSettings`. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_output: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_trace: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_trace_expand: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_uninitialized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_unused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_unused_cli: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_system_vars: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,
}

/// Reply to `globalSettings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    pub source_directory: String,
    pub build_directory: String,
    pub generator: String,
    pub extra_generator: String,
    pub debug_output: bool,
    pub debug_trace: bool,
    pub debug_trace_expand: bool,
    pub warn_uninitialized: bool,
    pub warn_unused: bool,
    pub warn_unused_cli: bool,
    pub check_system_vars: bool,
    pub trace: bool,
}

/// One entry of a `cache` reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheReplyEntry {
    pub key: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub value: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Reply to `cache`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CacheContent {
    #[serde(default)]
    pub cache: Vec<CacheReplyEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFiles {
    #[serde(default)]
    pub is_cmake: bool,
    #[serde(default)]
    pub is_temporary: bool,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Reply to `cmakeInputs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CmakeInputs {
    pub build_files: Vec<BuildFiles>,
    pub cmake_root_directory: String,
    pub source_directory: String,
}

/// Reply to `fileSystemWatchers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSystemWatchers {
    pub watched_files: Vec<String>,
    pub watched_directories: Vec<String>,
}

/// A decoded incoming message.
#[derive(Debug)]
pub(crate) enum Incoming {
    Hello(Hello),
    Reply { cookie: String, body: Value },
    Error(ServerError),
    Progress(Progress),
    Message(LogMessage),
    Signal(Signal),
    Unknown(String),
}

fn decode<T: for<'de> Deserialize<'de>>(kind: &str, frame: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(frame).map_err(|e| ProtocolError::Malformed {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// Classify a frame by its `type` field.
pub(crate) fn parse_incoming(frame: Value) -> Result<Incoming, ProtocolError> {
    let kind = frame
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    match kind.as_str() {
        "reply" => {
            let cookie = frame
                .get("cookie")
                .and_then(Value::as_str)
                .ok_or_else(|| ProtocolError::MissingCookie { kind: kind.clone() })?
                .to_string();
            Ok(Incoming::Reply {
                cookie,
                body: frame,
            })
        }
        "error" => {
            if frame.get("cookie").and_then(Value::as_str).is_none() {
                return Err(ProtocolError::MissingCookie { kind });
            }
            decode(&kind, frame).map(Incoming::Error)
        }
        "hello" => decode(&kind, frame).map(Incoming::Hello),
        "progress" => decode(&kind, frame).map(Incoming::Progress),
        "message" => decode(&kind, frame).map(Incoming::Message),
        "signal" => decode(&kind, frame).map(Incoming::Signal),
        _ => Ok(Incoming::Unknown(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hello() {
        let frame = serde_json::json!({
            "type": "hello",
            "supportedProtocolVersions": [
                {"isExperimental": true, "major": 1, "minor": 0}
            ]
        });
        let Ok(Incoming::Hello(hello)) = parse_incoming(frame) else {
            panic!("expected hello");
        };
        assert_eq!(hello.supported_protocol_versions[0].major, 1);
        assert!(hello.supported_protocol_versions[0].is_experimental);
    }

    #[test]
    fn test_reply_without_cookie_is_rejected() {
        let frame = serde_json::json!({"type": "reply", "inReplyTo": "compute"});
        assert_eq!(
            parse_incoming(frame).unwrap_err(),
            ProtocolError::MissingCookie {
                kind: "reply".to_string()
            }
        );
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let frame = serde_json::json!({"cookie": "x"});
        assert_eq!(parse_incoming(frame).unwrap_err(), ProtocolError::MissingType);
    }

    #[test]
    fn test_unknown_type_is_classified() {
        let frame = serde_json::json!({"type": "somethingNew"});
        assert!(matches!(
            parse_incoming(frame),
            Ok(Incoming::Unknown(kind)) if kind == "somethingNew"
        ));
    }

    #[test]
    fn test_progress_fraction() {
        let frame = serde_json::json!({
            "type": "progress",
            "cookie": "c",
            "inReplyTo": "configure",
            "progressMessage": "Configuring",
            "progressMinimum": 0,
            "progressMaximum": 1000,
            "progressCurrent": 250
        });
        let Ok(Incoming::Progress(progress)) = parse_incoming(frame) else {
            panic!("expected progress");
        };
        assert_eq!(progress.fraction(), Some(0.25));

        let empty = Progress {
            progress_maximum: 0,
            ..progress
        };
        assert!(empty.fraction().is_none());
    }

    #[test]
    fn test_file_change_signal() {
        let frame = serde_json::json!({
            "type": "signal",
            "name": "fileChange",
            "path": "/src/CMakeLists.txt",
            "properties": ["change"]
        });
        let Ok(Incoming::Signal(signal)) = parse_incoming(frame) else {
            panic!("expected signal");
        };
        assert_eq!(signal.path.as_deref(), Some("/src/CMakeLists.txt"));
        assert_eq!(signal.properties, vec!["change"]);
    }

    #[test]
    fn test_handshake_params_serialization() {
        let params = HandshakeParams {
            protocol_version: ProtocolVersion {
                major: 1,
                minor: 0,
                is_experimental: true,
            },
            source_directory: "/src".to_string(),
            build_directory: "/src/build".to_string(),
            generator: "Ninja".to_string(),
            extra_generator: None,
            toolset: None,
            platform: Some("x64".to_string()),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["protocolVersion"]["major"], 1);
        assert_eq!(json["sourceDirectory"], "/src");
        assert_eq!(json["platform"], "x64");
        assert!(json.get("toolset").is_none(), "unset fields must be omitted");
    }
}
