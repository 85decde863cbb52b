//! Run orchestration
//!
//! One run discovers candidate functions across the configured source
//! directories, then builds and packages each function as an independent
//! concurrent task behind a bounded worker pool. Function-scoped failures
//! are collected and reported alongside successful results; run-scoped
//! failures abort before any function task is spawned.

use crate::archive::ArchiveFormat;
use crate::bundlers::BundlerRegistry;
use crate::config::{ConfigMap, FeatureFlags};
use crate::error::{FunctionError, FunctionErrorKind, RunError};
use crate::fs::FsCache;
use crate::function::{ArchiveDescriptor, FunctionSource};
use crate::runtimes::{RuntimeDispatcher, RuntimeRegistry};
use crate::toolchain::{SystemToolRunner, ToolRunner, ToolchainInstaller};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Caller-facing options for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root directories containing candidate function paths
    pub dirs: Vec<PathBuf>,
    /// Where archives are written
    pub dest_dir: PathBuf,
    pub format: ArchiveFormat,
    /// Glob-pattern-keyed per-function configuration
    pub config: ConfigMap,
    pub flags: FeatureFlags,
    /// Key results by function name (first match wins) instead of by path
    pub dedupe: bool,
    /// Worker pool size; defaults to available parallelism
    pub concurrency: Option<usize>,
}

impl RunOptions {
    pub fn new(dirs: Vec<PathBuf>, dest_dir: PathBuf) -> Self {
        Self {
            dirs,
            dest_dir,
            format: ArchiveFormat::Zip,
            config: ConfigMap::new(),
            flags: FeatureFlags::default(),
            dedupe: true,
            concurrency: None,
        }
    }
}

/// Shared services for everything in one run
pub struct RunContext {
    pub fs: FsCache,
    pub runner: Arc<dyn ToolRunner>,
    pub installer: ToolchainInstaller,
    pub config: ConfigMap,
    pub flags: FeatureFlags,
    pub format: ArchiveFormat,
    pub dest_dir: PathBuf,
    pub bundlers: BundlerRegistry,
}

impl RunContext {
    pub fn new(options: &RunOptions, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            fs: FsCache::new(),
            installer: ToolchainInstaller::new(Arc::clone(&runner)),
            runner,
            config: options.config.clone(),
            flags: options.flags,
            format: options.format,
            dest_dir: options.dest_dir.clone(),
            bundlers: BundlerRegistry::with_defaults(),
        }
    }
}

/// Outcome of a run: partial results plus per-function failures
#[derive(Debug, Default)]
pub struct RunResult {
    pub archives: Vec<ArchiveDescriptor>,
    pub errors: Vec<FunctionError>,
    /// Non-fatal discovery warnings (e.g. incompatible binaries)
    pub warnings: Vec<String>,
}

/// Discovers, builds and packages every function under the configured
/// directories.
pub async fn pack_functions(options: RunOptions) -> Result<RunResult, RunError> {
    pack_functions_with_runner(options, Arc::new(SystemToolRunner)).await
}

/// As [`pack_functions`], with an injected tool runner.
pub async fn pack_functions_with_runner(
    options: RunOptions,
    runner: Arc<dyn ToolRunner>,
) -> Result<RunResult, RunError> {
    let start = Instant::now();
    let ctx = Arc::new(RunContext::new(&options, runner));
    let registry = Arc::new(RuntimeRegistry::with_defaults());

    let candidates = collect_candidates(&options.dirs, &ctx).await?;
    tokio::fs::create_dir_all(&options.dest_dir).await?;

    let dispatcher = RuntimeDispatcher::new(&registry, options.dedupe);
    let discovery = dispatcher.find_functions_in_paths(&candidates, &ctx).await;
    for warning in &discovery.warnings {
        warn!("{}", warning);
    }
    info!(
        functions = discovery.functions.len(),
        dirs = options.dirs.len(),
        "Discovery complete"
    );

    let concurrency = options
        .concurrency
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
        .max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));

    let mut tasks: JoinSet<Result<ArchiveDescriptor, FunctionError>> = JoinSet::new();
    for function in discovery.functions {
        let ctx = Arc::clone(&ctx);
        let registry = Arc::clone(&registry);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("run semaphore closed");
            let runtime = registry.get(function.runtime);
            debug!(name = %function.name, runtime = %function.runtime, "Building function");
            runtime.zip_function(&function, &ctx).await
        });
    }

    let mut result = RunResult {
        warnings: discovery.warnings,
        ..Default::default()
    };
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(descriptor)) => result.archives.push(descriptor),
            Ok(Err(err)) => {
                warn!(error = %err, "Function build failed");
                result.errors.push(err);
            }
            Err(join_err) if join_err.is_panic() => {
                // A panicked build task is a defect, not a user error;
                // surface it and stop handing out new work
                tasks.abort_all();
                result.errors.push(FunctionError::new(
                    "<unknown>",
                    FunctionErrorKind::Bundling,
                    anyhow::anyhow!("build task panicked: {}", join_err),
                ));
            }
            Err(_) => {}
        }
    }

    result.archives.sort_by(|a, b| a.name.cmp(&b.name));
    info!(
        archives = result.archives.len(),
        errors = result.errors.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Run complete"
    );
    Ok(result)
}

/// Discovers functions without building anything.
pub async fn list_functions(
    dirs: &[PathBuf],
    config: ConfigMap,
    dedupe: bool,
) -> Result<Vec<FunctionSource>, RunError> {
    let options = RunOptions {
        config,
        dedupe,
        ..RunOptions::new(dirs.to_vec(), PathBuf::new())
    };
    let ctx = Arc::new(RunContext::new(&options, Arc::new(SystemToolRunner)));
    let registry = RuntimeRegistry::with_defaults();

    let candidates = collect_candidates(dirs, &ctx).await?;
    let dispatcher = RuntimeDispatcher::new(&registry, dedupe);
    Ok(dispatcher.find_functions_in_paths(&candidates, &ctx).await.functions)
}

/// Lists the immediate children of every existing source directory.
/// Missing directories are tolerated unless all of them are missing.
async fn collect_candidates(
    dirs: &[PathBuf],
    ctx: &RunContext,
) -> Result<Vec<PathBuf>, RunError> {
    let mut existing = Vec::new();
    let mut missing = Vec::new();
    for dir in dirs {
        if ctx.fs.is_dir(dir).await {
            existing.push(dir.clone());
        } else {
            missing.push(dir.clone());
        }
    }
    if existing.is_empty() {
        return Err(RunError::NoSourceDirectories { missing });
    }
    for dir in &missing {
        warn!(dir = %dir.display(), "Skipping missing function directory");
    }

    let mut candidates = Vec::new();
    for dir in &existing {
        if let Some(entries) = ctx.fs.read_dir(dir).await {
            candidates.extend(entries.iter().map(|entry| entry.path.clone()));
        }
    }
    Ok(candidates)
}

/// Serialized run manifest
#[derive(Debug, Serialize)]
struct Manifest<'a> {
    schema_version: u32,
    timestamp: u64,
    functions: &'a [ArchiveDescriptor],
}

/// Writes the run manifest: every produced archive descriptor, with a
/// schema version and timestamp.
pub async fn write_manifest(path: &Path, result: &RunResult) -> std::io::Result<()> {
    let manifest = Manifest {
        schema_version: 1,
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        functions: &result.archives,
    };
    let json = serde_json::to_string_pretty(&manifest).expect("manifest serializes");
    tokio::fs::write(path, json).await
}
