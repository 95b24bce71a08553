//! codelens - git output parsers and CMake project driver.
//!
//! ```text
//! git <cmd> ... | codelens git <diff|blame|log|status|stash|branches|remotes> [...]
//! codelens cmake <configure|build|targets|cache|compile-info>
//! ```
//!
//! Results are printed to stdout as JSON. Logs go to stderr, filtered by
//! `RUST_LOG` (default `info`).

mod cmake;
mod config;
mod git;

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codelens_cmake::CmakeContext;
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cmake::{CmakeCommand, Outcome};
use crate::config::AppConfig;
use crate::git::GitCommand;

#[derive(Parser)]
#[command(name = "codelens", version)]
#[command(about = "Parse git output and drive CMake projects")]
struct Cli {
    /// Path to the configuration file (TOML). Defaults to `./codelens.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse git output read from stdin
    #[command(subcommand)]
    Git(GitCommand),
    /// Configure, build and inspect the CMake project
    #[command(subcommand)]
    Cmake(CmakeCommand),
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let root = config
        .workspace_root()
        .context("resolving workspace root")?;

    match cli.command {
        Commands::Git(cmd) => {
            let mut input = String::new();
            if !cmd.prints_args() {
                io::stdin()
                    .read_to_string(&mut input)
                    .context("reading git output from stdin")?;
            }
            let default_repo = config
                .git
                .repo_path
                .clone()
                .unwrap_or_else(|| root.display().to_string());
            print_json(&cmd.run(&input, &default_repo)?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cmake(cmd) => {
            let ctx = CmakeContext::new(&root, &config.cmake);
            tracing::debug!(build_dir = %ctx.build_dir.display(), "cmake project");
            match cmd.run(ctx).await? {
                Outcome::Json(value) => {
                    print_json(&value)?;
                    Ok(ExitCode::SUCCESS)
                }
                Outcome::Exit(code) => Ok(exit_code(code)),
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_git_and_cmake_commands() {
        let cli = Cli::try_parse_from([
            "codelens",
            "--config",
            "x.toml",
            "git",
            "blame",
            "src/lib.rs",
            "--range",
            "2,4",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Git(GitCommand::Blame { .. })));

        let cli = Cli::try_parse_from(["codelens", "cmake", "configure", "--", "-DFOO=1"]).unwrap();
        match cli.command {
            Commands::Cmake(CmakeCommand::Configure { args }) => assert_eq!(args, vec!["-DFOO=1"]),
            _ => panic!("expected cmake configure"),
        }
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(0), ExitCode::SUCCESS);
        assert_eq!(exit_code(2), ExitCode::from(2));
        assert_eq!(exit_code(-1), ExitCode::FAILURE);
    }
}
