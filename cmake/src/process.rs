//! Owns a `cmake -E server` child process and its connection.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cache::CmakeCache;
use crate::codemodel::normalize_path;
use crate::connection::Connection;
use crate::error::{ClientError, ProtocolError};
use crate::protocol::HandshakeParams;
use crate::types::{ServerEvent, ServerParams};

const CONNECT_TIMEOUT_SECS: u64 = 10;

const CONNECT_RETRY_MILLIS: u64 = 50;

const HELLO_TIMEOUT_SECS: u64 = 10;

const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

/// Generators that need a build tool on `PATH`. Others are assumed present.
const GENERATOR_TOOLS: &[(&str, &str)] = &[
    ("Ninja", "ninja"),
    ("Unix Makefiles", "make"),
    ("MinGW Makefiles", "mingw32-make"),
    ("NMake Makefiles", "nmake"),
];

#[cfg(unix)]
type PipeStream = tokio::net::UnixStream;

#[cfg(windows)]
type PipeStream = tokio::net::windows::named_pipe::NamedPipeClient;

#[cfg(unix)]
fn pipe_path(build_dir: &Path) -> PathBuf {
    build_dir.join(format!(".cmserver.{}", std::process::id()))
}

#[cfg(windows)]
fn pipe_path(_build_dir: &Path) -> PathBuf {
    PathBuf::from(format!(r"\\.\pipe\codelens-cmserver-{}", std::process::id()))
}

#[cfg(unix)]
async fn connect_pipe(pipe: &Path) -> io::Result<PipeStream> {
    PipeStream::connect(pipe).await
}

#[cfg(windows)]
async fn connect_pipe(pipe: &Path) -> io::Result<PipeStream> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(pipe)
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// The explicit generator, else the first preferred one whose build tool
/// `available` reports present.
pub fn pick_generator(
    explicit: Option<&str>,
    preferred: &[String],
    available: impl Fn(&str) -> bool,
) -> Option<String> {
    if let Some(generator) = explicit {
        return Some(generator.to_string());
    }
    preferred
        .iter()
        .find(|name| {
            GENERATOR_TOOLS
                .iter()
                .find(|(generator, _)| *generator == name.as_str())
                .is_none_or(|(_, tool)| available(tool))
        })
        .cloned()
}

pub(crate) fn tool_on_path(tool: &str) -> bool {
    which::which(tool).is_ok()
}

/// Source directory to send in the handshake.
///
/// CMake compares the handshake value with the cache's
/// `CMAKE_HOME_DIRECTORY` textually, so an equivalent spelling in the cache
/// is sent back verbatim.
async fn handshake_source_dir(source_dir: &Path, build_dir: &Path) -> String {
    let cache_path = build_dir.join("CMakeCache.txt");
    let cache = match CmakeCache::from_path(&cache_path).await {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!("reading {}: {e}", cache_path.display());
            CmakeCache::default()
        }
    };
    if let Some(home) = cache.get("CMAKE_HOME_DIRECTORY")
        && normalize_path(Path::new(&home.value)) == normalize_path(source_dir)
    {
        return home.value.clone();
    }
    source_dir.display().to_string()
}

fn log_lines<R>(stream: R, stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if stderr {
                tracing::warn!("cmake server: {line}");
            } else {
                tracing::debug!("cmake server: {line}");
            }
        }
    });
}

/// A running, handshaken cmake server.
pub struct CmakeServer {
    connection: Connection,
    generator: String,
    pipe: PathBuf,
    shutting_down: Arc<AtomicBool>,
    kill_tx: oneshot::Sender<()>,
    exit_rx: oneshot::Receiver<Option<i32>>,
    monitor: JoinHandle<()>,
}

impl CmakeServer {
    pub async fn start(
        params: ServerParams,
        event_tx: mpsc::Sender<ServerEvent>,
    ) -> Result<Self, ClientError> {
        tokio::fs::create_dir_all(&params.build_dir).await?;

        let command = params.cmake_path.display().to_string();
        let resolved = which::which(&params.cmake_path).map_err(|e| ClientError::Spawn {
            command: command.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, e),
        })?;

        let pipe = pipe_path(&params.build_dir);
        remove_pipe(&pipe).await;

        let mut cmd = Command::new(&resolved);
        cmd.arg("-E")
            .arg("server")
            .arg("--experimental")
            .arg(format!("--pipe={}", pipe.display()))
            .envs(&params.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ClientError::Spawn {
            command: command.clone(),
            source,
        })?;
        tracing::debug!(pipe = %pipe.display(), "started {command} -E server");

        if let Some(stdout) = child.stdout.take() {
            log_lines(stdout, false);
        }
        if let Some(stderr) = child.stderr.take() {
            log_lines(stderr, true);
        }

        let stream = Self::connect(&mut child, &pipe).await?;
        let (read_half, write_half) = tokio::io::split(stream);
        let mut connection = Connection::new(read_half, write_half, event_tx.clone());

        let shutting_down = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let monitor = Self::monitor(child, kill_rx, exit_tx, shutting_down.clone(), event_tx);

        let hello = connection
            .wait_hello(Duration::from_secs(HELLO_TIMEOUT_SECS))
            .await?;
        let protocol_version = hello.supported_protocol_versions.first().copied().ok_or_else(|| {
            ProtocolError::Malformed {
                kind: "hello".to_string(),
                reason: "no supported protocol versions".to_string(),
            }
        })?;

        let generator = pick_generator(
            params.generator.as_deref(),
            &params.preferred_generators,
            tool_on_path,
        )
        .ok_or(ClientError::NoGenerator)?;
        tracing::debug!("using generator {generator}");

        let handshake = HandshakeParams {
            protocol_version,
            source_directory: handshake_source_dir(&params.source_dir, &params.build_dir).await,
            build_directory: params.build_dir.display().to_string(),
            generator: generator.clone(),
            extra_generator: None,
            toolset: params.toolset.clone(),
            platform: params.platform.clone(),
        };
        connection.handshake(&handshake).await?;

        Ok(Self {
            connection,
            generator,
            pipe,
            shutting_down,
            kill_tx,
            exit_rx,
            monitor,
        })
    }

    async fn connect(child: &mut Child, pipe: &Path) -> Result<PipeStream, ClientError> {
        let deadline = Instant::now() + Duration::from_secs(CONNECT_TIMEOUT_SECS);
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(ClientError::Startup {
                    code: status.code(),
                });
            }
            match connect_pipe(pipe).await {
                Ok(stream) => return Ok(stream),
                Err(e) if Instant::now() < deadline => {
                    tracing::trace!("cmake server pipe not ready: {e}");
                    tokio::time::sleep(Duration::from_millis(CONNECT_RETRY_MILLIS)).await;
                }
                Err(e) => {
                    tracing::warn!("giving up on {}: {e}", pipe.display());
                    return Err(ClientError::Timeout("cmake server pipe"));
                }
            }
        }
    }

    /// Wait for the child to exit, or kill it once `kill_rx` resolves. A
    /// non-zero exit nobody asked for is reported once as
    /// [`ServerEvent::Crashed`].
    fn monitor(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        exit_tx: oneshot::Sender<Option<i32>>,
        shutting_down: Arc<AtomicBool>,
        event_tx: mpsc::Sender<ServerEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            // A dropped sender kills the child too, so a failed startup
            // does not leak the process.
            let (status, killed) = tokio::select! {
                status = child.wait() => (status, false),
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!("killing cmake server: {e}");
                    }
                    (child.wait().await, true)
                }
            };
            match status {
                Ok(status) => {
                    let expected = killed || shutting_down.load(Ordering::SeqCst);
                    if !status.success() && !expected {
                        tracing::warn!("cmake server exited unexpectedly: {status}");
                        let _ = event_tx
                            .send(ServerEvent::Crashed {
                                code: status.code(),
                                signal: exit_signal(&status),
                            })
                            .await;
                    } else {
                        tracing::debug!("cmake server exited: {status}");
                    }
                    let _ = exit_tx.send(status.code());
                }
                Err(e) => tracing::warn!("waiting for cmake server: {e}"),
            }
        })
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[must_use]
    pub fn generator(&self) -> &str {
        &self.generator
    }

    /// Close the connection and wait for the process to exit, killing it
    /// if it takes longer than the shutdown timeout.
    pub async fn shutdown(self) {
        let Self {
            connection,
            pipe,
            shutting_down,
            kill_tx,
            exit_rx,
            monitor,
            ..
        } = self;
        shutting_down.store(true, Ordering::SeqCst);

        let graceful = tokio::time::timeout(
            Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
            async move { tokio::join!(connection.shutdown(), exit_rx) },
        )
        .await;

        if graceful.is_err() {
            tracing::debug!("cmake server didn't exit in time, killing");
        }
        // Dropping the sender kills the child if it is still running.
        drop(kill_tx);
        let _ = monitor.await;
        remove_pipe(&pipe).await;
    }
}

#[cfg(unix)]
async fn remove_pipe(pipe: &Path) {
    if let Err(e) = tokio::fs::remove_file(pipe).await
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::debug!("removing pipe {}: {e}", pipe.display());
    }
}

#[cfg(not(unix))]
async fn remove_pipe(_pipe: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_explicit_generator_wins() {
        let picked = pick_generator(Some("Xcode"), &names(&["Ninja"]), |_| true);
        assert_eq!(picked.as_deref(), Some("Xcode"));
    }

    #[test]
    fn test_first_available_preferred_generator() {
        let preferred = names(&["Ninja", "Unix Makefiles"]);
        let picked = pick_generator(None, &preferred, |tool| tool == "make");
        assert_eq!(picked.as_deref(), Some("Unix Makefiles"));
    }

    #[test]
    fn test_unknown_generators_are_assumed_available() {
        let preferred = names(&["Ninja", "Visual Studio 15 2017"]);
        let picked = pick_generator(None, &preferred, |_| false);
        assert_eq!(picked.as_deref(), Some("Visual Studio 15 2017"));
    }

    #[test]
    fn test_no_generator_available() {
        assert!(pick_generator(None, &names(&["Ninja"]), |_| false).is_none());
        assert!(pick_generator(None, &[], |_| true).is_none());
    }

    #[tokio::test]
    async fn test_handshake_source_dir_uses_cache_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        let build = dir.path().join("build");
        fs::create_dir_all(&build).unwrap();

        // No cache: the configured directory is sent.
        assert_eq!(
            handshake_source_dir(&source, &build).await,
            source.display().to_string()
        );

        let spelled = format!("{}/./src", dir.path().display());
        fs::write(
            build.join("CMakeCache.txt"),
            format!("CMAKE_HOME_DIRECTORY:INTERNAL={spelled}\n"),
        )
        .unwrap();
        assert_eq!(handshake_source_dir(&source, &build).await, spelled);

        fs::write(
            build.join("CMakeCache.txt"),
            "CMAKE_HOME_DIRECTORY:INTERNAL=/somewhere/else\n",
        )
        .unwrap();
        assert_eq!(
            handshake_source_dir(&source, &build).await,
            source.display().to_string()
        );
    }

    #[tokio::test]
    async fn test_start_with_missing_cmake_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let params = ServerParams {
            cmake_path: PathBuf::from("codelens-no-such-cmake"),
            source_dir: dir.path().to_path_buf(),
            build_dir: dir.path().join("build"),
            generator: None,
            preferred_generators: Vec::new(),
            toolset: None,
            platform: None,
            environment: HashMap::new(),
        };
        let (event_tx, _event_rx) = mpsc::channel(8);
        let result = CmakeServer::start(params, event_tx).await;
        assert!(matches!(result, Err(ClientError::Spawn { .. })));
        assert!(dir.path().join("build").is_dir());
    }

    #[cfg(unix)]
    fn shell(script: &str) -> Child {
        Command::new("sh").arg("-c").arg(script).spawn().unwrap()
    }

    #[cfg(unix)]
    async fn watch_exit(
        child: Child,
        shutting_down: bool,
        kill: bool,
    ) -> (Vec<ServerEvent>, Option<i32>) {
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let flag = Arc::new(AtomicBool::new(shutting_down));
        let monitor = CmakeServer::monitor(child, kill_rx, exit_tx, flag, event_tx);
        if kill {
            kill_tx.send(()).unwrap();
            monitor.await.unwrap();
        } else {
            monitor.await.unwrap();
            drop(kill_tx);
        }

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        (events, exit_rx.await.unwrap())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unexpected_exit_is_reported_once() {
        let (events, code) = watch_exit(shell("exit 3"), false, false).await;
        assert_eq!(code, Some(3));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ServerEvent::Crashed {
                code: Some(3),
                signal: None
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_during_shutdown_is_quiet() {
        let (events, code) = watch_exit(shell("exit 3"), true, false).await;
        assert_eq!(code, Some(3));
        assert!(events.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_server_is_not_a_crash() {
        let (events, code) = watch_exit(shell("sleep 30"), false, true).await;
        assert_eq!(code, None);
        assert!(events.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_is_quiet() {
        let (events, code) = watch_exit(shell("exit 0"), false, false).await;
        assert_eq!(code, Some(0));
        assert!(events.is_empty());
    }
}
