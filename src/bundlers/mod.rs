//! Node bundler subsystem
//!
//! Four interchangeable strategies compute a function's file closure and
//! optional module transform behind one contract. Strategy selection is a
//! pure function of the entry extension, feature configuration and the
//! detected module format; the registry resolves the chosen id to an
//! implementation built at startup.

pub mod esbuild;
pub mod format;
pub mod includes;
pub mod manifest;
pub mod native;
pub mod none;
pub mod resolve;
pub mod trace;
pub mod transpile;

pub use format::ModuleFormat;
pub use native::NativeModuleInfo;

use crate::config::FeatureFlags;
use crate::define_id_enum;
use crate::function::FunctionSource;
use crate::pipeline::RunContext;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

define_id_enum! {
    /// Pluggable algorithm computing a Node function's file closure
    BundlerId {
        /// Single-file bundle through the esbuild engine
        Esbuild => "esbuild" : "esbuild",
        /// Static module-graph dependency tracing
        Trace => "trace" : "trace" | "nft",
        /// Entry transpilation without tracing
        Transpile => "transpile" : "transpile",
        /// Entry plus explicitly included files, untouched
        None => "none" : "none",
    }
}

/// Extensions that are ES modules by definition and force the trace
/// strategy.
const ESM_ONLY_EXTENSIONS: &[&str] = &["mjs", "mts"];

/// First Node major version with ES module support.
pub const ESM_MIN_NODE_VERSION: u32 = 14;

/// The minimal set of files a function needs at runtime, plus the
/// transforms to apply while archiving. Computed fresh per function and
/// discarded after archiving.
#[derive(Debug, Default)]
pub struct DependencyClosure {
    /// Ordered, deduplicated absolute file paths
    pub src_files: Vec<PathBuf>,
    /// Longest common ancestor of all file directories
    pub base_path: PathBuf,
    pub module_format: ModuleFormat,
    /// On-disk path -> archive-internal path remapping
    pub aliases: HashMap<PathBuf, PathBuf>,
    /// On-disk path -> replacement content
    pub rewrites: HashMap<PathBuf, String>,
    /// Files added through included-files globs
    pub included_files: Vec<PathBuf>,
    pub warnings: Vec<String>,
    /// Detected native modules: name -> resolved install path and version
    pub native_modules: BTreeMap<String, NativeModuleInfo>,
    /// Scratch directory kept alive until the archive is written
    pub scratch: Option<tempfile::TempDir>,
}

impl DependencyClosure {
    /// Deduplicates while preserving first-seen order, then recomputes the
    /// base path from the final file set. Aliased files count under their
    /// archive-internal path, so scratch outputs never widen the base.
    pub fn finish(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.src_files.retain(|path| seen.insert(path.clone()));
        if self.base_path.as_os_str().is_empty() {
            let effective: Vec<PathBuf> = self
                .src_files
                .iter()
                .map(|file| self.aliases.get(file).unwrap_or(file).clone())
                .collect();
            self.base_path = common_base_path(&effective);
        }
        self
    }
}

/// A named capability set: closure computation and module transform
#[async_trait]
pub trait BundlerStrategy: Send + Sync {
    fn id(&self) -> BundlerId;

    /// Computes the function's dependency closure.
    async fn bundle(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> anyhow::Result<DependencyClosure>;

    /// Lists the files feeding the closure without transforming anything.
    async fn get_src_files(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> anyhow::Result<Vec<PathBuf>> {
        Ok(self.bundle(function, ctx).await?.src_files)
    }
}

/// Dispatch table over the closed set of bundler strategies.
pub struct BundlerRegistry {
    strategies: Vec<Arc<dyn BundlerStrategy>>,
}

impl BundlerRegistry {
    pub fn with_defaults() -> Self {
        let strategies: Vec<Arc<dyn BundlerStrategy>> = BundlerId::all_variants()
            .iter()
            .map(|id| -> Arc<dyn BundlerStrategy> {
                match id {
                    BundlerId::Esbuild => Arc::new(esbuild::EsbuildStrategy),
                    BundlerId::Trace => Arc::new(trace::TraceStrategy),
                    BundlerId::Transpile => Arc::new(transpile::TranspileStrategy),
                    BundlerId::None => Arc::new(none::NoneStrategy),
                }
            })
            .collect();
        Self { strategies }
    }

    pub fn get(&self, id: BundlerId) -> &dyn BundlerStrategy {
        self.strategies
            .iter()
            .find(|strategy| strategy.id() == id)
            .map(|strategy| strategy.as_ref())
            .expect("all bundler strategies are registered")
    }
}

impl Default for BundlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Pure strategy selection: explicit override, then ESM-only extensions,
/// then feature flags, then the detected module format - ES module entries
/// trace, CommonJS entries fall back to the legacy bundling default.
pub fn select_bundler(
    function: &FunctionSource,
    flags: &FeatureFlags,
    entry_is_es_module: bool,
) -> BundlerId {
    if let Some(bundler) = function.config.bundler {
        return bundler;
    }
    if ESM_ONLY_EXTENSIONS.contains(&function.extension.as_str()) {
        return BundlerId::Trace;
    }
    if flags.force_trace_bundler {
        return BundlerId::Trace;
    }
    if entry_is_es_module {
        BundlerId::Trace
    } else {
        BundlerId::Esbuild
    }
}

/// Longest common ancestor directory of a set of files.
pub fn common_base_path(files: &[PathBuf]) -> PathBuf {
    let mut dirs = files
        .iter()
        .map(|file| file.parent().unwrap_or(Path::new("/")));
    let Some(first) = dirs.next() else {
        return PathBuf::from("/");
    };
    let mut common: Vec<std::path::Component> = first.components().collect();
    for dir in dirs {
        let components: Vec<_> = dir.components().collect();
        let shared = common
            .iter()
            .zip(components.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }
    if common.is_empty() {
        PathBuf::from("/")
    } else {
        common.iter().collect()
    }
}
