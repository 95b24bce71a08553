//! Running cmake and build-tool commands to completion.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ClientError;
use crate::types::ServerEvent;

/// Exit code reported when a process was terminated by a signal.
pub const SIGNALED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub code: i32,
    pub stdout: String,
}

/// A command line plus its environment and working directory.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl AsRef<Path>, args: Vec<String>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args,
            env: HashMap::new(),
            cwd: None,
        }
    }

    #[must_use]
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Shell-like rendering for logs.
    #[must_use]
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Run to completion. Every output line is sent as
    /// [`ServerEvent::Output`] when `event_tx` is given; stdout is also
    /// collected.
    pub async fn run(
        &self,
        event_tx: Option<&mpsc::Sender<ServerEvent>>,
    ) -> Result<ProcessOutput, ClientError> {
        let command = self.program.display().to_string();
        let resolved = which::which(&self.program).map_err(|e| ClientError::Spawn {
            command: command.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, e),
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        tracing::debug!("running {}", self.display());
        let mut child = cmd
            .spawn()
            .map_err(|source| ClientError::Spawn { command, source })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| forward_lines(out, event_tx.cloned(), true));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| forward_lines(err, event_tx.cloned(), false));

        let status = child.wait().await?;
        let stdout = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let code = status.code().unwrap_or(SIGNALED_EXIT_CODE);
        tracing::debug!("{} exited with {code}", self.program.display());
        Ok(ProcessOutput { code, stdout })
    }
}

fn forward_lines<R>(
    stream: R,
    event_tx: Option<mpsc::Sender<ServerEvent>>,
    collect: bool,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut collected = String::new();
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if collect {
                collected.push_str(&line);
                collected.push('\n');
            } else {
                tracing::trace!("stderr: {line}");
            }
            if let Some(tx) = &event_tx {
                let _ = tx.send(ServerEvent::Output(line)).await;
            }
        }
        collected
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_whitespace() {
        let inv = Invocation::new(
            "cmake",
            vec!["--build".to_string(), "/my build".to_string()],
        );
        assert_eq!(inv.display(), "cmake --build \"/my build\"");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let inv = Invocation::new("codelens-definitely-missing", Vec::new());
        assert!(matches!(inv.run(None).await, Err(ClientError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_collects_stdout_and_streams_lines() {
        let (tx, mut rx) = mpsc::channel(16);
        let inv = Invocation::new(
            "sh",
            vec!["-c".to_string(), "echo one; echo two >&2; exit 3".to_string()],
        );
        let out = inv.run(Some(&tx)).await.unwrap();
        assert_eq!(out.code, 3);
        assert_eq!(out.stdout, "one\n");

        let mut lines = Vec::new();
        while let Ok(ServerEvent::Output(line)) = rx.try_recv() {
            lines.push(line);
        }
        lines.sort();
        assert_eq!(lines, vec!["one", "two"]);
    }
}
