//! Cookie-correlated request/reply client over one cmake-server stream.
//!
//! A [`Connection`] owns two tasks: a writer fed through a channel and a
//! reader that dispatches every incoming frame in arrival order. Pending
//! requests live in a shared map keyed by cookie, so replies may arrive in
//! any order. When the reader stops, for any reason, every pending request
//! fails with [`ClientError::Disconnected`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::codec::{FrameReader, FrameWriter};
use crate::codemodel::CodeModel;
use crate::error::{ClientError, ProtocolError, ServerError};
use crate::protocol::{
    CacheContent, CmakeInputs, ConfigureParams, FileSystemWatchers, GlobalSettings,
    GlobalSettingsUpdate, HandshakeParams, Hello, Incoming, parse_incoming,
};
use crate::types::{ConnectionState, ServerEvent};

const WRITER_CHANNEL_CAPACITY: usize = 64;

enum WriterCommand {
    Send(Value),
    Shutdown,
}

type ReplySender = oneshot::Sender<Result<Value, ServerError>>;

#[derive(Default)]
struct PendingRequests {
    /// Set once the reader has stopped; no new request can be answered.
    closed: bool,
    waiting: HashMap<String, ReplySender>,
}

type SharedPending = Arc<Mutex<PendingRequests>>;

/// Fresh request cookie.
#[must_use]
pub fn new_cookie() -> String {
    format!("cookie-{}", Uuid::new_v4())
}

fn params_of<T: Serialize>(request: &str, value: &T) -> Result<Map<String, Value>, ClientError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Ok(Map::new()),
        Err(source) => Err(ClientError::Json {
            request: request.to_string(),
            source,
        }),
    }
}

fn decode_reply<T: DeserializeOwned>(request: &str, body: Value) -> Result<T, ClientError> {
    serde_json::from_value(body).map_err(|source| ClientError::Json {
        request: request.to_string(),
        source,
    })
}

pub struct Connection {
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: SharedPending,
    state: Arc<watch::Sender<ConnectionState>>,
    handshake_sent: AtomicBool,
    hello_rx: Option<oneshot::Receiver<Hello>>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl Connection {
    /// Start the reader and writer tasks over an already-open stream.
    pub fn new<R, W>(reader: R, writer: W, event_tx: mpsc::Sender<ServerEvent>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: SharedPending = Arc::new(Mutex::new(PendingRequests::default()));
        let state = Arc::new(watch::Sender::new(ConnectionState::Connecting));
        let (hello_tx, hello_rx) = oneshot::channel();

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(writer);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("cmake server write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => {
                        if let Err(e) = writer.shutdown().await {
                            tracing::debug!("closing cmake server stream: {e}");
                        }
                        break;
                    }
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_state = state.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(reader);
            let mut hello_tx = Some(hello_tx);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        if let Err(e) = Self::dispatch_frame(
                            frame,
                            &reader_pending,
                            &event_tx,
                            &mut hello_tx,
                            &reader_state,
                        )
                        .await
                        {
                            tracing::warn!("cmake server protocol fault: {e}");
                            let _ = event_tx.send(ServerEvent::ProtocolFault(e.to_string())).await;
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("cmake server closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("cmake server read error: {e}");
                        let _ = event_tx.send(ServerEvent::ProtocolFault(e.to_string())).await;
                        break;
                    }
                }
            }
            Self::fail_pending(&reader_pending).await;
        });

        Self {
            writer_tx,
            pending,
            state,
            handshake_sent: AtomicBool::new(false),
            hello_rx: Some(hello_rx),
            reader_handle,
            writer_handle,
        }
    }

    async fn fail_pending(pending: &Mutex<PendingRequests>) {
        let mut pending = pending.lock().await;
        pending.closed = true;
        if !pending.waiting.is_empty() {
            tracing::debug!(
                count = pending.waiting.len(),
                "failing pending cmake server requests"
            );
        }
        // Dropping the senders wakes every waiter with a closed channel.
        pending.waiting.clear();
    }

    async fn dispatch_frame(
        frame: Value,
        pending: &Mutex<PendingRequests>,
        event_tx: &mpsc::Sender<ServerEvent>,
        hello_tx: &mut Option<oneshot::Sender<Hello>>,
        state: &watch::Sender<ConnectionState>,
    ) -> Result<(), ProtocolError> {
        let incoming = match parse_incoming(frame) {
            Ok(incoming) => incoming,
            // Only a malformed reply or error is fatal.
            Err(ProtocolError::Malformed { kind, reason })
                if kind != "reply" && kind != "error" =>
            {
                tracing::warn!("dropping malformed `{kind}` message: {reason}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match incoming {
            Incoming::Reply { cookie, body } => {
                tracing::debug!(cookie = %cookie, "cmake server reply");
                Self::resolve(pending, cookie, Ok(body)).await?;
            }
            Incoming::Error(err) => {
                tracing::debug!(cookie = %err.cookie, "cmake server error: {}", err.error_message);
                Self::resolve(pending, err.cookie.clone(), Err(err)).await?;
            }
            Incoming::Progress(progress) => {
                let _ = event_tx.send(ServerEvent::Progress(progress)).await;
            }
            Incoming::Message(message) => {
                tracing::debug!("cmake: {}", message.message);
                let _ = event_tx.send(ServerEvent::Message(message)).await;
            }
            Incoming::Signal(signal) => {
                let event = match signal.name.as_str() {
                    "dirty" => ServerEvent::Dirty,
                    "fileChange" => ServerEvent::FileChange {
                        path: signal.path.unwrap_or_default(),
                        properties: signal.properties,
                    },
                    _ => ServerEvent::Signal(signal.name),
                };
                let _ = event_tx.send(event).await;
            }
            Incoming::Hello(hello) => match hello_tx.take() {
                Some(tx) => {
                    state.send_if_modified(|current| {
                        let connecting = *current == ConnectionState::Connecting;
                        if connecting {
                            *current = ConnectionState::Handshaking;
                        }
                        connecting
                    });
                    let _ = tx.send(hello);
                }
                None => tracing::debug!("ignoring repeated hello from cmake server"),
            },
            Incoming::Unknown(kind) => {
                tracing::debug!("ignoring cmake server message of type `{kind}`");
            }
        }
        Ok(())
    }

    async fn resolve(
        pending: &Mutex<PendingRequests>,
        cookie: String,
        result: Result<Value, ServerError>,
    ) -> Result<(), ProtocolError> {
        let sender = pending.lock().await.waiting.remove(&cookie);
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
                Ok(())
            }
            None => Err(ProtocolError::UnknownCookie(cookie)),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait for the server's `hello`. Can only be awaited once.
    pub async fn wait_hello(&mut self, timeout: Duration) -> Result<Hello, ClientError> {
        let Some(rx) = self.hello_rx.take() else {
            return Err(ClientError::InvalidState {
                request: "hello".to_string(),
                state: self.state(),
            });
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(hello)) => Ok(hello),
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => Err(ClientError::Timeout("cmake server hello")),
        }
    }

    fn check_state(&self, request: &str) -> Result<(), ClientError> {
        let state = self.state();
        let allowed = match state {
            ConnectionState::ShuttingDown => return Err(ClientError::ShuttingDown),
            ConnectionState::Connecting => false,
            ConnectionState::Handshaking => request == "handshake",
            ConnectionState::Ready => request != "handshake",
        };
        if allowed {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                request: request.to_string(),
                state,
            })
        }
    }

    /// Send a request and wait for its reply.
    ///
    /// `params` is copied into the message alongside `type` and a fresh
    /// cookie. An `error` reply becomes [`ClientError::Server`].
    pub async fn send_request(
        &self,
        kind: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ClientError> {
        self.check_state(kind)?;

        let cookie = new_cookie();
        let mut message = params.clone();
        message.insert("type".to_string(), Value::String(kind.to_string()));
        message.insert("cookie".to_string(), Value::String(cookie.clone()));

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(ClientError::Disconnected);
            }
            pending.waiting.insert(cookie.clone(), tx);
        }

        tracing::debug!(request = kind, cookie = %cookie, "sending cmake server request");
        if self
            .writer_tx
            .send(WriterCommand::Send(Value::Object(message)))
            .await
            .is_err()
        {
            self.pending.lock().await.waiting.remove(&cookie);
            return Err(ClientError::Disconnected);
        }

        match rx.await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(err)) => Err(ClientError::Server(err)),
            Err(_) => Err(ClientError::Disconnected),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        kind: &str,
        params: &Map<String, Value>,
    ) -> Result<T, ClientError> {
        let body = self.send_request(kind, params).await?;
        decode_reply(kind, body)
    }

    /// Send the handshake. Only one is ever sent per connection, even if
    /// the server rejects it.
    pub async fn handshake(&self, params: &HandshakeParams) -> Result<(), ClientError> {
        self.check_state("handshake")?;
        if self.handshake_sent.swap(true, Ordering::SeqCst) {
            return Err(ClientError::InvalidState {
                request: "handshake".to_string(),
                state: self.state(),
            });
        }
        self.send_request("handshake", &params_of("handshake", params)?)
            .await?;
        self.state.send_replace(ConnectionState::Ready);
        tracing::debug!("cmake server handshake complete");
        Ok(())
    }

    pub async fn global_settings(&self) -> Result<GlobalSettings, ClientError> {
        self.request("globalSettings", &Map::new()).await
    }

    pub async fn set_global_settings(
        &self,
        settings: &GlobalSettingsUpdate,
    ) -> Result<(), ClientError> {
        let params = params_of("setGlobalSettings", settings)?;
        self.send_request("setGlobalSettings", &params).await?;
        Ok(())
    }

    pub async fn configure(&self, cache_arguments: Vec<String>) -> Result<(), ClientError> {
        let params = params_of("configure", &ConfigureParams { cache_arguments })?;
        self.send_request("configure", &params).await?;
        Ok(())
    }

    pub async fn compute(&self) -> Result<(), ClientError> {
        self.send_request("compute", &Map::new()).await?;
        Ok(())
    }

    pub async fn codemodel(&self) -> Result<CodeModel, ClientError> {
        self.request("codemodel", &Map::new()).await
    }

    pub async fn cache(&self) -> Result<CacheContent, ClientError> {
        self.request("cache", &Map::new()).await
    }

    pub async fn cmake_inputs(&self) -> Result<CmakeInputs, ClientError> {
        self.request("cmakeInputs", &Map::new()).await
    }

    pub async fn file_system_watchers(&self) -> Result<FileSystemWatchers, ClientError> {
        self.request("fileSystemWatchers", &Map::new()).await
    }

    /// Close the write half and wait for the server to close its end.
    ///
    /// Requests made after this fail with [`ClientError::ShuttingDown`].
    pub async fn shutdown(self) {
        self.state.send_replace(ConnectionState::ShuttingDown);
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
        let _ = self.writer_handle.await;
        let _ = self.reader_handle.await;
    }
}
