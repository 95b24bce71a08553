//! Public types shared by the client, the server process and the drivers.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::protocol::{LogMessage, Progress};

/// Lifecycle of a connection to a cmake server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Stream open, no `hello` yet.
    Connecting,
    /// `hello` received, waiting for the handshake reply.
    Handshaking,
    Ready,
    ShuttingDown,
}

/// An event emitted by the client or a driver, delivered in arrival order.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Progress(Progress),
    Message(LogMessage),
    /// The server's view of the project is stale; reconfigure before use.
    Dirty,
    FileChange {
        path: String,
        properties: Vec<String>,
    },
    /// A signal this client does not interpret.
    Signal(String),
    /// One line of output from a cmake or build tool subprocess.
    Output(String),
    /// The server process exited unexpectedly.
    Crashed {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// The server violated the protocol; the connection is no longer usable.
    ProtocolFault(String),
}

/// Everything needed to start a cmake server.
#[derive(Debug, Clone)]
pub struct ServerParams {
    pub cmake_path: PathBuf,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    /// Explicit generator; when unset the first available of
    /// `preferred_generators` is used.
    pub generator: Option<String>,
    pub preferred_generators: Vec<String>,
    pub toolset: Option<String>,
    pub platform: Option<String>,
    pub environment: HashMap<String, String>,
}
