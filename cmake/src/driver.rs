//! Build drivers: the cmake-server backed driver and the command-line one.
//!
//! [`CmakeDriver::start`] picks one once, based on configuration and the
//! installed cmake version. Both expose the same operations; exit codes are
//! returned as values and only infrastructure failures are errors.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{CacheEntry, CmakeCache};
use crate::codemodel::{
    BuildTarget, CodeModel, CompilationInfo, CompilerId, IncludePath, compiler_id,
    normalize_path, parse_compile_definition, split_command_line,
};
use crate::config::CmakeContext;
use crate::error::ClientError;
use crate::process::{CmakeServer, pick_generator, tool_on_path};
use crate::subprocess::Invocation;
use crate::types::ServerEvent;

const EVENT_CHANNEL_CAPACITY: usize = 256;

static VERSION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"cmake version (.*?)\r?\n").expect("valid version regex"));

/// Generators whose `help` target lists the buildable targets.
static TARGET_LISTING_GENERATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Unix|MinGW|NMake) Makefiles|Ninja").expect("valid generator regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CmakeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl CmakeVersion {
    /// Last release without a usable server mode.
    const PRE_SERVER: Self = Self {
        major: 3,
        minor: 7,
        patch: 1,
    };

    /// Parse `cmake --version` output. Suffixes such as `-rc1` are ignored.
    #[must_use]
    pub fn parse(output: &str) -> Option<Self> {
        let caps = VERSION_LINE.captures(output)?;
        let mut parts = caps[1].split('.').map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        });
        Some(Self {
            major: parts.next()??,
            minor: parts.next().flatten().unwrap_or(0),
            patch: parts.next().flatten().unwrap_or(0),
        })
    }

    #[must_use]
    pub fn supports_server(self) -> bool {
        self > Self::PRE_SERVER
    }
}

impl fmt::Display for CmakeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub async fn cmake_version(cmake_path: &Path) -> Result<CmakeVersion> {
    let output = Invocation::new(cmake_path, vec!["--version".to_string()])
        .run(None)
        .await
        .with_context(|| format!("running {} --version", cmake_path.display()))?;
    CmakeVersion::parse(&output.stdout)
        .with_context(|| format!("unrecognized cmake version output: {:?}", output.stdout))
}

#[must_use]
pub fn supports_target_listing(generator: &str) -> bool {
    TARGET_LISTING_GENERATOR.is_match(generator)
}

/// Parse the output of `cmake --build <dir> --target help`.
///
/// Makefile generators list targets as `... name`; Ninja prints
/// `name: phony`. `all` is always present.
#[must_use]
pub fn parse_target_list(output: &str, generator: &str) -> Vec<BuildTarget> {
    let makefiles = generator.ends_with("Makefiles");
    let mut names = vec!["all".to_string()];
    for line in output.lines() {
        if line.contains("All primary targets") {
            continue;
        }
        let candidate = if makefiles {
            line.strip_prefix("... ")
        } else if line.contains(": ") {
            Some(line)
        } else {
            None
        };
        let Some(name) = candidate
            .and_then(|c| c.split_whitespace().next())
            .map(|token| token.trim_end_matches(':'))
            .filter(|name| !name.is_empty())
        else {
            continue;
        };
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names.into_iter().map(BuildTarget::named).collect()
}

/// Arguments for `cmake --build`.
#[must_use]
pub fn build_args(ctx: &CmakeContext, generator: Option<&str>, target: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--build".to_string(),
        ctx.build_dir.display().to_string(),
        "--config".to_string(),
        ctx.build_type.clone(),
    ];
    if let Some(target) = target {
        args.extend(["--target".to_string(), target.to_string()]);
    }
    args.extend(ctx.build_args.iter().cloned());

    let mut tool_args = Vec::new();
    if generator.is_some_and(supports_target_listing) {
        tool_args.extend(["-j".to_string(), ctx.parallel_jobs.to_string()]);
    }
    tool_args.extend(ctx.build_tool_args.iter().cloned());
    if !tool_args.is_empty() {
        args.push("--".to_string());
        args.extend(tool_args);
    }
    args
}

/// Arguments for a command-line configure. `generator` is passed only for
/// the first configure of a build directory.
#[must_use]
pub fn configure_args(
    ctx: &CmakeContext,
    generator: Option<&str>,
    extra_args: &[String],
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(generator) = generator {
        args.push(format!("-G{generator}"));
        if let Some(toolset) = &ctx.toolset {
            args.push(format!("-T{toolset}"));
        }
        if let Some(platform) = &ctx.platform {
            args.push(format!("-A{platform}"));
        }
    }
    args.extend(ctx.cache_arguments());
    args.extend(extra_args.iter().cloned());
    args.push(format!("-H{}", ctx.source_dir.display()));
    args.push(format!("-B{}", ctx.build_dir.display()));
    args
}

async fn run_build(
    ctx: &CmakeContext,
    generator: Option<&str>,
    target: Option<&str>,
    event_tx: &mpsc::Sender<ServerEvent>,
) -> Result<i32> {
    let output = Invocation::new(&ctx.cmake_path, build_args(ctx, generator, target))
        .env(ctx.build_env())
        .cwd(&ctx.build_dir)
        .run(Some(event_tx))
        .await
        .context("running cmake --build")?;
    Ok(output.code)
}

/// One entry of `compile_commands.json`.
#[derive(Debug, Clone, Deserialize)]
struct CompileCommand {
    directory: String,
    file: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

fn compilation_info_from_commands(
    commands: &[CompileCommand],
    file: &Path,
    source_dir: &Path,
) -> Option<CompilationInfo> {
    let wanted = normalize_path(&source_dir.join(file));
    let entry = commands
        .iter()
        .find(|c| normalize_path(&Path::new(&c.directory).join(&c.file)) == wanted)?;

    let argv = match (&entry.arguments, &entry.command) {
        (Some(arguments), _) => arguments.clone(),
        (None, Some(command)) => split_command_line(command),
        (None, None) => Vec::new(),
    };

    let mut info = CompilationInfo {
        file: wanted.display().to_string(),
        compile_definitions: BTreeMap::new(),
        compile_flags: Vec::new(),
        include_directories: Vec::new(),
    };
    let mut args = argv.into_iter().skip(1);
    while let Some(arg) = args.next() {
        let mut value_of = |flag: &str| -> Option<String> {
            match arg.strip_prefix(flag) {
                Some("") => args.next(),
                Some(inline) => Some(inline.to_string()),
                None => None,
            }
        };
        if let Some(define) = value_of("-D") {
            info.compile_definitions.extend([parse_compile_definition(&define)]);
        } else if let Some(path) = value_of("-isystem") {
            info.include_directories.push(IncludePath { path, is_system: true });
        } else if let Some(path) = value_of("-I") {
            info.include_directories.push(IncludePath { path, is_system: false });
        } else if arg == "-o" {
            args.next();
        } else if arg != "-c" && arg != entry.file {
            info.compile_flags.push(arg);
        }
    }
    Some(info)
}

/// Driver backed by a long-running cmake server.
pub struct ServerDriver {
    ctx: CmakeContext,
    server: CmakeServer,
    dirty: Arc<AtomicBool>,
    code_model: Option<CodeModel>,
    cache: CmakeCache,
    event_tx: mpsc::Sender<ServerEvent>,
    forwarder: JoinHandle<()>,
}

impl ServerDriver {
    pub async fn start(ctx: CmakeContext, event_tx: mpsc::Sender<ServerEvent>) -> Result<Self> {
        let dirty = Arc::new(AtomicBool::new(false));
        let (inner_tx, mut inner_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let forward_dirty = dirty.clone();
        let forward_tx = event_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = inner_rx.recv().await {
                if matches!(event, ServerEvent::Dirty) {
                    forward_dirty.store(true, Ordering::SeqCst);
                }
                let _ = forward_tx.send(event).await;
            }
        });

        let server = CmakeServer::start(ctx.server_params(), inner_tx)
            .await
            .context("starting cmake server")?;

        let mut driver = Self {
            ctx,
            server,
            dirty,
            code_model: None,
            cache: CmakeCache::default(),
            event_tx,
            forwarder,
        };
        driver.refresh().await;
        Ok(driver)
    }

    /// Re-read the cache and code model. An unconfigured build directory
    /// has neither, which is not an error.
    async fn refresh(&mut self) {
        let connection = self.server.connection();
        match connection.cache().await {
            Ok(content) => self.cache = CmakeCache::from_reply(content),
            Err(e) => tracing::debug!("no cmake cache yet: {e}"),
        }
        match connection.codemodel().await {
            Ok(model) => self.code_model = Some(model),
            Err(e) => tracing::debug!("no code model yet: {e}"),
        }
    }

    pub async fn configure(&mut self, extra_args: &[String]) -> Result<i32> {
        let mut args = self.ctx.cache_arguments();
        args.extend(extra_args.iter().cloned());

        let connection = self.server.connection();
        let result = async {
            connection.configure(args).await?;
            connection.compute().await
        }
        .await;
        match result {
            Ok(()) => {}
            Err(ClientError::Server(e)) => {
                tracing::warn!("{e}");
                return Ok(1);
            }
            Err(e) => return Err(e).context("configuring through cmake server"),
        }

        self.dirty.store(false, Ordering::SeqCst);
        self.refresh().await;
        Ok(0)
    }

    pub async fn build(&mut self, target: Option<&str>) -> Result<i32> {
        if self.needs_reconfigure() {
            let code = self.configure(&[]).await?;
            if code != 0 {
                return Ok(code);
            }
        }
        run_build(&self.ctx, Some(self.server.generator()), target, &self.event_tx).await
    }

    #[must_use]
    pub fn targets(&self) -> Vec<BuildTarget> {
        self.code_model
            .as_ref()
            .map(|model| model.targets(&self.ctx.build_type))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn cache_entries(&self) -> Vec<CacheEntry> {
        self.cache.entries().to_vec()
    }

    #[must_use]
    pub fn needs_reconfigure(&self) -> bool {
        self.dirty.load(Ordering::SeqCst) || self.code_model.is_none()
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn compilation_info(&self, file: &Path) -> Option<CompilationInfo> {
        self.code_model.as_ref()?.compilation_info(
            file,
            &self.ctx.source_dir,
            &self.ctx.build_type,
        )
    }

    #[must_use]
    pub fn compiler_id(&self) -> Option<CompilerId> {
        compiler_id(&self.cache)
    }

    pub async fn shutdown(self) {
        self.server.shutdown().await;
        self.forwarder.abort();
    }
}

/// Driver that shells out to `cmake` for every operation.
pub struct LegacyDriver {
    ctx: CmakeContext,
    dirty: AtomicBool,
    event_tx: mpsc::Sender<ServerEvent>,
}

impl LegacyDriver {
    #[must_use]
    pub fn new(ctx: CmakeContext, event_tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            ctx,
            dirty: AtomicBool::new(false),
            event_tx,
        }
    }

    async fn cache(&self) -> Result<CmakeCache> {
        let path = self.ctx.cache_path();
        CmakeCache::from_path(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }

    /// The generator recorded in the cache, else the configured one.
    async fn generator(&self) -> Result<Option<String>> {
        let cache = self.cache().await?;
        Ok(cache
            .get("CMAKE_GENERATOR")
            .map(|entry| entry.value.clone())
            .or_else(|| self.ctx.generator.clone()))
    }

    pub async fn configure(&mut self, extra_args: &[String]) -> Result<i32> {
        let first_configure = !self.cache().await?.exists();
        let generator = if first_configure {
            let picked = pick_generator(
                self.ctx.generator.as_deref(),
                &self.ctx.preferred_generators,
                tool_on_path,
            )
            .ok_or(ClientError::NoGenerator)?;
            Some(picked)
        } else {
            None
        };

        let args = configure_args(&self.ctx, generator.as_deref(), extra_args);
        let output = Invocation::new(&self.ctx.cmake_path, args)
            .env(self.ctx.configure_env())
            .cwd(&self.ctx.source_dir)
            .run(Some(&self.event_tx))
            .await
            .context("running cmake configure")?;
        if output.code == 0 {
            self.dirty.store(false, Ordering::SeqCst);
        }
        Ok(output.code)
    }

    pub async fn build(&mut self, target: Option<&str>) -> Result<i32> {
        if self.needs_reconfigure().await? {
            let code = self.configure(&[]).await?;
            if code != 0 {
                return Ok(code);
            }
        }
        let generator = self.generator().await?;
        run_build(&self.ctx, generator.as_deref(), target, &self.event_tx).await
    }

    pub async fn targets(&self) -> Result<Vec<BuildTarget>> {
        let Some(generator) = self.generator().await? else {
            tracing::debug!("build directory is not configured; no targets");
            return Ok(Vec::new());
        };
        if !supports_target_listing(&generator) {
            tracing::debug!("cannot list targets for generator {generator}");
            return Ok(Vec::new());
        }

        let args = vec![
            "--build".to_string(),
            self.ctx.build_dir.display().to_string(),
            "--target".to_string(),
            "help".to_string(),
        ];
        let output = Invocation::new(&self.ctx.cmake_path, args)
            .env(self.ctx.build_env())
            .run(None)
            .await
            .context("listing build targets")?;
        if output.code != 0 {
            tracing::warn!("listing targets exited with {}", output.code);
            return Ok(Vec::new());
        }
        Ok(parse_target_list(&output.stdout, &generator))
    }

    pub async fn cache_entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.cache().await?.entries().to_vec())
    }

    pub async fn needs_reconfigure(&self) -> Result<bool> {
        if self.dirty.load(Ordering::SeqCst) {
            return Ok(true);
        }
        Ok(!self.cache().await?.exists())
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Look `file` up in `compile_commands.json`. A missing database means
    /// no information.
    pub async fn compilation_info(&self, file: &Path) -> Result<Option<CompilationInfo>> {
        let path = self.ctx.build_dir.join("compile_commands.json");
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let commands: Vec<CompileCommand> = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(compilation_info_from_commands(
            &commands,
            file,
            &self.ctx.source_dir,
        ))
    }

    pub async fn compiler_id(&self) -> Result<Option<CompilerId>> {
        Ok(compiler_id(&self.cache().await?))
    }
}

/// The driver chosen for a project.
pub enum CmakeDriver {
    Server(ServerDriver),
    Legacy(LegacyDriver),
}

impl CmakeDriver {
    /// Use the server driver when it is enabled and cmake is newer than
    /// 3.7.1; otherwise fall back to the command-line driver.
    pub async fn start(ctx: CmakeContext, event_tx: mpsc::Sender<ServerEvent>) -> Result<Self> {
        if ctx.use_cmake_server {
            let version = cmake_version(&ctx.cmake_path).await?;
            if version.supports_server() {
                tracing::info!("using cmake server (cmake {version})");
                return Ok(Self::Server(ServerDriver::start(ctx, event_tx).await?));
            }
            tracing::info!("cmake {version} has no server mode; using the command line");
        }
        Ok(Self::Legacy(LegacyDriver::new(ctx, event_tx)))
    }

    #[must_use]
    pub fn context(&self) -> &CmakeContext {
        match self {
            Self::Server(d) => &d.ctx,
            Self::Legacy(d) => &d.ctx,
        }
    }

    /// Configure the project. Returns the exit code.
    pub async fn configure(&mut self, extra_args: &[String]) -> Result<i32> {
        match self {
            Self::Server(d) => d.configure(extra_args).await,
            Self::Legacy(d) => d.configure(extra_args).await,
        }
    }

    /// Build `target`, or the default target. Reconfigures first when needed.
    pub async fn build(&mut self, target: Option<&str>) -> Result<i32> {
        match self {
            Self::Server(d) => d.build(target).await,
            Self::Legacy(d) => d.build(target).await,
        }
    }

    pub async fn targets(&self) -> Result<Vec<BuildTarget>> {
        match self {
            Self::Server(d) => Ok(d.targets()),
            Self::Legacy(d) => d.targets().await,
        }
    }

    pub async fn cache_entries(&self) -> Result<Vec<CacheEntry>> {
        match self {
            Self::Server(d) => Ok(d.cache_entries()),
            Self::Legacy(d) => d.cache_entries().await,
        }
    }

    pub async fn needs_reconfigure(&self) -> Result<bool> {
        match self {
            Self::Server(d) => Ok(d.needs_reconfigure()),
            Self::Legacy(d) => d.needs_reconfigure().await,
        }
    }

    pub fn mark_dirty(&self) {
        match self {
            Self::Server(d) => d.mark_dirty(),
            Self::Legacy(d) => d.mark_dirty(),
        }
    }

    pub async fn compilation_info(&self, file: &Path) -> Result<Option<CompilationInfo>> {
        match self {
            Self::Server(d) => Ok(d.compilation_info(file)),
            Self::Legacy(d) => d.compilation_info(file).await,
        }
    }

    pub async fn compiler_id(&self) -> Result<Option<CompilerId>> {
        match self {
            Self::Server(d) => Ok(d.compiler_id()),
            Self::Legacy(d) => d.compiler_id().await,
        }
    }

    pub async fn shutdown(self) {
        match self {
            Self::Server(d) => d.shutdown().await,
            Self::Legacy(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::config::CmakeSettings;

    fn context(root: &Path) -> CmakeContext {
        let mut ctx = CmakeContext::from_settings(root, CmakeSettings::default());
        ctx.parallel_jobs = 4;
        ctx
    }

    #[test]
    fn test_version_parse() {
        let v = CmakeVersion::parse("cmake version 3.10.2\n\nCMake suite maintained by Kitware").unwrap();
        assert_eq!(v.to_string(), "3.10.2");
        assert!(v.supports_server());

        let rc = CmakeVersion::parse("cmake version 3.8.0-rc1\r\n").unwrap();
        assert_eq!((rc.major, rc.minor, rc.patch), (3, 8, 0));

        assert!(!CmakeVersion::parse("cmake version 3.7.1\n").unwrap().supports_server());
        assert!(CmakeVersion::parse("cmake version 3.7.2\n").unwrap().supports_server());
        assert!(CmakeVersion::parse("not cmake").is_none());
    }

    #[test]
    fn test_parse_makefile_target_list() {
        let output = "\
The following are some of the valid targets for this Makefile:
... all (the default if no target is provided)
... clean
... depend
... app
... app.o
";
        let names: Vec<_> = parse_target_list(output, "Unix Makefiles")
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["all", "clean", "depend", "app", "app.o"]);
    }

    #[test]
    fn test_parse_ninja_target_list() {
        let output = "\
[1/1] All primary targets available:
app: phony
rebuild_cache: phony
all: phony
clean: phony
";
        let names: Vec<_> = parse_target_list(output, "Ninja")
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["all", "app", "rebuild_cache", "clean"]);
    }

    #[test]
    fn test_target_listing_generators() {
        assert!(supports_target_listing("Unix Makefiles"));
        assert!(supports_target_listing("NMake Makefiles"));
        assert!(supports_target_listing("Ninja"));
        assert!(!supports_target_listing("Visual Studio 15 2017"));
        assert!(!supports_target_listing("Xcode"));
    }

    #[test]
    fn test_build_args() {
        let mut ctx = context(Path::new("/p"));
        assert_eq!(
            build_args(&ctx, Some("Ninja"), Some("app")),
            vec!["--build", "/p/build", "--config", "Debug", "--target", "app", "--", "-j", "4"]
        );

        ctx.build_tool_args = vec!["/m".to_string()];
        assert_eq!(
            build_args(&ctx, Some("Visual Studio 15 2017"), None),
            vec!["--build", "/p/build", "--config", "Debug", "--", "/m"]
        );

        ctx.build_tool_args.clear();
        assert_eq!(
            build_args(&ctx, None, None),
            vec!["--build", "/p/build", "--config", "Debug"]
        );
    }

    #[test]
    fn test_configure_args() {
        let mut ctx = context(Path::new("/p"));
        ctx.toolset = Some("v141".to_string());
        let first = configure_args(&ctx, Some("Ninja"), &["-Wno-dev".to_string()]);
        assert_eq!(
            first,
            vec![
                "-GNinja",
                "-Tv141",
                "-DCMAKE_BUILD_TYPE:STRING=Debug",
                "-Wno-dev",
                "-H/p",
                "-B/p/build",
            ]
        );

        let again = configure_args(&ctx, None, &[]);
        assert_eq!(again, vec!["-DCMAKE_BUILD_TYPE:STRING=Debug", "-H/p", "-B/p/build"]);
    }

    #[test]
    fn test_compilation_info_from_compile_commands() {
        let commands: Vec<CompileCommand> = serde_json::from_value(serde_json::json!([
            {
                "directory": "/p/build",
                "file": "/p/src/main.cpp",
                "command": "/usr/bin/c++ -DDEBUG -D LEVEL=2 -I/p/include -isystem /opt/inc -O2 -o main.o -c /p/src/main.cpp"
            },
            {
                "directory": "/p/build",
                "file": "../src/other.cpp",
                "arguments": ["cc", "-I", "/p/other", "-c", "../src/other.cpp"]
            }
        ]))
        .unwrap();

        let info = compilation_info_from_commands(&commands, Path::new("src/main.cpp"), Path::new("/p")).unwrap();
        assert_eq!(info.file, "/p/src/main.cpp");
        assert_eq!(info.compile_definitions.get("DEBUG"), Some(&None));
        assert_eq!(info.compile_definitions.get("LEVEL"), Some(&Some("2".to_string())));
        assert_eq!(
            info.include_directories,
            vec![
                IncludePath { path: "/p/include".to_string(), is_system: false },
                IncludePath { path: "/opt/inc".to_string(), is_system: true },
            ]
        );
        assert_eq!(info.compile_flags, vec!["-O2"]);

        let other = compilation_info_from_commands(&commands, Path::new("/p/src/other.cpp"), Path::new("/p")).unwrap();
        assert_eq!(other.include_directories[0].path, "/p/other");
        assert!(other.compile_flags.is_empty());

        assert!(compilation_info_from_commands(&commands, Path::new("nope.cpp"), Path::new("/p")).is_none());
    }

    #[tokio::test]
    async fn test_start_without_server_uses_legacy_driver() {
        let dir = tempfile::tempdir().unwrap();
        let (event_tx, _event_rx) = mpsc::channel(8);
        let driver = CmakeDriver::start(context(dir.path()), event_tx).await.unwrap();
        assert!(matches!(driver, CmakeDriver::Legacy(_)));
        assert_eq!(driver.context().source_dir, dir.path());
    }

    #[tokio::test]
    async fn test_legacy_state_follows_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let (event_tx, _event_rx) = mpsc::channel(8);
        let driver = CmakeDriver::start(context(dir.path()), event_tx).await.unwrap();

        assert!(driver.needs_reconfigure().await.unwrap());
        assert!(driver.targets().await.unwrap().is_empty());
        assert!(driver.cache_entries().await.unwrap().is_empty());
        assert_eq!(driver.compiler_id().await.unwrap(), None);
        assert!(driver.compilation_info(Path::new("a.c")).await.unwrap().is_none());

        let build = dir.path().join("build");
        fs::create_dir_all(&build).unwrap();
        fs::write(
            build.join("CMakeCache.txt"),
            "CMAKE_GENERATOR:INTERNAL=Xcode\nCMAKE_C_COMPILER:FILEPATH=/usr/bin/gcc\n",
        )
        .unwrap();

        assert!(!driver.needs_reconfigure().await.unwrap());
        assert_eq!(driver.cache_entries().await.unwrap().len(), 2);
        assert_eq!(driver.compiler_id().await.unwrap(), Some(CompilerId::Gnu));
        // Xcode cannot list targets through `help`.
        assert!(driver.targets().await.unwrap().is_empty());

        driver.mark_dirty();
        assert!(driver.needs_reconfigure().await.unwrap());
        driver.shutdown().await;
    }
}
