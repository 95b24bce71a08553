//! `codelens cmake ...`: drive the project described by `[cmake]`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use codelens_cmake::{CmakeContext, CmakeDriver, ServerEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Subcommand)]
pub enum CmakeCommand {
    /// Configure the build directory
    Configure {
        /// Extra arguments passed to cmake after `--`
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Build a target (default: all)
    Build {
        #[arg(long)]
        target: Option<String>,
    },
    /// List buildable targets as JSON
    Targets,
    /// Print the cache entries as JSON
    Cache,
    /// Print compile flags, defines and include paths for a source file
    CompileInfo { file: PathBuf },
}

/// What a command produced: JSON for stdout, or an exit code to return.
#[derive(Debug)]
pub enum Outcome {
    Json(Value),
    Exit(i32),
}

/// Human-readable line for an event, or `None` for events only logged.
#[must_use]
pub fn render_event(event: &ServerEvent) -> Option<String> {
    match event {
        ServerEvent::Output(line) => Some(line.clone()),
        ServerEvent::Message(message) => Some(match &message.title {
            Some(title) => format!("[{title}] {}", message.message),
            None => message.message.clone(),
        }),
        ServerEvent::Progress(progress) => {
            let percent = progress.fraction().map_or(0.0, |f| f * 100.0);
            Some(format!("[{percent:3.0}%] {}", progress.progress_message))
        }
        ServerEvent::Crashed { code, signal } => Some(format!(
            "cmake server crashed (code {code:?}, signal {signal:?})"
        )),
        ServerEvent::ProtocolFault(message) => Some(format!("cmake server protocol error: {message}")),
        ServerEvent::Dirty => {
            tracing::info!("project needs to be reconfigured");
            None
        }
        ServerEvent::FileChange { path, .. } => {
            tracing::debug!("changed: {path}");
            None
        }
        ServerEvent::Signal(name) => {
            tracing::debug!("signal {name}");
            None
        }
    }
}

fn spawn_event_printer(mut event_rx: mpsc::Receiver<ServerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Some(line) = render_event(&event) {
                eprintln!("{line}");
            }
        }
    })
}

impl CmakeCommand {
    pub async fn run(self, ctx: CmakeContext) -> Result<Outcome> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let printer = spawn_event_printer(event_rx);

        let mut driver = CmakeDriver::start(ctx, event_tx).await?;
        let outcome = self.run_with(&mut driver).await;
        driver.shutdown().await;
        // The printer ends once every sender is gone.
        let _ = printer.await;
        outcome
    }

    async fn run_with(self, driver: &mut CmakeDriver) -> Result<Outcome> {
        Ok(match self {
            Self::Configure { args } => Outcome::Exit(driver.configure(&args).await?),
            Self::Build { target } => Outcome::Exit(driver.build(target.as_deref()).await?),
            Self::Targets => Outcome::Json(serde_json::to_value(driver.targets().await?)?),
            Self::Cache => Outcome::Json(serde_json::to_value(driver.cache_entries().await?)?),
            Self::CompileInfo { file } => {
                let info = driver.compilation_info(&file).await?;
                let compiler = driver.compiler_id().await?;
                Outcome::Json(serde_json::json!({
                    "compiler": compiler,
                    "compilationInfo": info,
                }))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codelens_cmake::{LogMessage, Progress};

    #[test]
    fn test_render_progress_and_message() {
        let progress = Progress {
            in_reply_to: "configure".to_string(),
            cookie: "c".to_string(),
            progress_message: "Configuring".to_string(),
            progress_minimum: 0,
            progress_maximum: 4,
            progress_current: 1,
        };
        assert_eq!(
            render_event(&ServerEvent::Progress(progress)).as_deref(),
            Some("[ 25%] Configuring")
        );

        let message = LogMessage {
            in_reply_to: "configure".to_string(),
            cookie: "c".to_string(),
            message: "CMake Warning".to_string(),
            title: Some("Warning".to_string()),
        };
        assert_eq!(
            render_event(&ServerEvent::Message(message)).as_deref(),
            Some("[Warning] CMake Warning")
        );
    }

    #[test]
    fn test_signals_are_not_printed() {
        assert!(render_event(&ServerEvent::Dirty).is_none());
        assert!(render_event(&ServerEvent::Signal("x".to_string())).is_none());
        assert_eq!(
            render_event(&ServerEvent::Output("[1/2] Building".to_string())).as_deref(),
            Some("[1/2] Building")
        );
    }

    #[tokio::test]
    async fn test_targets_of_unconfigured_project_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CmakeContext::from_settings(dir.path(), codelens_cmake::CmakeSettings::default());
        let outcome = CmakeCommand::Targets.run(ctx).await.unwrap();
        match outcome {
            Outcome::Json(value) => assert_eq!(value, serde_json::json!([])),
            Outcome::Exit(code) => panic!("unexpected exit {code}"),
        }
    }
}
