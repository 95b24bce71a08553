//! CMake project integration.
//!
//! Talks to `cmake -E server` over its framed JSON protocol, or falls back
//! to invoking `cmake` directly when the server is unavailable.
//!
//! # Architecture
//!
//! - [`codec`]: sentinel-delimited JSON frames
//! - [`connection`]: cookie-correlated requests, handshake state machine
//! - [`process`]: server process startup, monitoring and shutdown
//! - [`driver`]: configure/build/targets over either backend
//!
//! Events (progress, messages, signals, subprocess output, crashes) are
//! delivered in order through one `mpsc` channel supplied by the caller.

pub mod cache;
pub mod codec;
pub mod codemodel;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod process;
pub mod protocol;
pub mod subprocess;
pub mod types;

pub use cache::{CacheEntry, CacheEntryType, CmakeCache};
pub use codemodel::{BuildTarget, CodeModel, CompilationInfo, CompilerId};
pub use config::{CmakeConfig, CmakeContext, CmakeSettings, Platform, SettingValue};
pub use connection::Connection;
pub use driver::{CmakeDriver, CmakeVersion, LegacyDriver, ServerDriver};
pub use error::{ClientError, FrameError, ProtocolError, ServerError};
pub use process::CmakeServer;
pub use protocol::{GlobalSettings, GlobalSettingsUpdate, Hello, LogMessage, Progress, ProtocolVersion};
pub use types::{ConnectionState, ServerEvent, ServerParams};
