//! Runtime classification
//!
//! Each runtime is a named capability set: discover functions among
//! candidate paths, and package one discovered function. The three
//! variants are registered in a fixed-priority table built at startup;
//! dispatch never branches on strings.

pub mod dispatch;
pub mod go;
pub mod node;
pub mod rust;

pub use dispatch::{DiscoveryOutcome, RuntimeDispatcher};

use crate::define_id_enum;
use crate::error::FunctionError;
use crate::function::{ArchiveDescriptor, FunctionSource};
use crate::pipeline::RunContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

define_id_enum! {
    /// Target execution environment for a function
    RuntimeId {
        Node => "js" : "js" | "node",
        Go => "go" : "go" | "golang",
        Rust => "rs" : "rs" | "rust",
    }
}

impl RuntimeId {
    /// Fixed classification priority. A path consumed by an earlier runtime
    /// is never re-evaluated by a later one.
    pub fn priority_order() -> &'static [RuntimeId] {
        &[RuntimeId::Node, RuntimeId::Go, RuntimeId::Rust]
    }
}

/// Archive entry name expected by the platform's custom-runtime convention.
pub const CUSTOM_RUNTIME_ENTRY: &str = "bootstrap";

/// Functions claimed by one classifier, plus non-fatal discovery warnings
#[derive(Debug, Default)]
pub struct RuntimeMatches {
    pub functions: Vec<FunctionSource>,
    pub warnings: Vec<String>,
}

/// A named capability set: classification and packaging for one runtime
#[async_trait]
pub trait Runtime: Send + Sync {
    fn id(&self) -> RuntimeId;

    /// Classifies candidate paths, consuming a subset. Unreadable or
    /// non-matching paths are left for lower-priority runtimes - never an
    /// error.
    async fn find_functions_in_paths(&self, paths: &[PathBuf], ctx: &RunContext)
        -> RuntimeMatches;

    /// Classifies a single path.
    async fn find_function_in_path(
        &self,
        path: &Path,
        ctx: &RunContext,
    ) -> Option<FunctionSource> {
        let matches = self
            .find_functions_in_paths(std::slice::from_ref(&path.to_path_buf()), ctx)
            .await;
        matches.functions.into_iter().next()
    }

    /// Builds and packages one function into its archive.
    async fn zip_function(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> Result<ArchiveDescriptor, FunctionError>;
}

/// Dispatch table over the closed set of runtimes, in priority order.
pub struct RuntimeRegistry {
    runtimes: Vec<Arc<dyn Runtime>>,
}

impl RuntimeRegistry {
    pub fn with_defaults() -> Self {
        let runtimes: Vec<Arc<dyn Runtime>> = RuntimeId::priority_order()
            .iter()
            .map(|id| -> Arc<dyn Runtime> {
                match id {
                    RuntimeId::Node => Arc::new(node::NodeRuntime),
                    RuntimeId::Go => Arc::new(go::GoRuntime),
                    RuntimeId::Rust => Arc::new(rust::RustRuntime),
                }
            })
            .collect();
        Self { runtimes }
    }

    pub fn get(&self, id: RuntimeId) -> &dyn Runtime {
        self.runtimes
            .iter()
            .find(|rt| rt.id() == id)
            .map(|rt| rt.as_ref())
            .expect("all runtimes are registered")
    }

    pub fn in_priority_order(&self) -> impl Iterator<Item = &Arc<dyn Runtime>> {
        self.runtimes.iter()
    }
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Packages one function binary, shared by the Go and Rust runtimes: zip
/// output renames the binary to the platform's expected entry name, flat
/// output copies it unmodified.
pub(crate) async fn archive_binary(
    function_name: &str,
    binary: &Path,
    entry_name: &str,
    ctx: &RunContext,
) -> anyhow::Result<(PathBuf, Option<u64>)> {
    use crate::archive::{self, ArchiveFormat};
    use crate::bundlers::DependencyClosure;

    match ctx.format {
        ArchiveFormat::Zip => {
            let base_path = binary
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("/"));
            let mut closure = DependencyClosure {
                src_files: vec![binary.to_path_buf()],
                base_path: base_path.clone(),
                ..Default::default()
            };
            closure
                .aliases
                .insert(binary.to_path_buf(), base_path.join(entry_name));
            let dest = ctx.dest_dir.join(format!("{}.zip", function_name));
            let size = archive::write_zip(&dest, &closure).await?;
            Ok((dest, Some(size)))
        }
        ArchiveFormat::None => {
            let dest = ctx.dest_dir.join(function_name);
            tokio::fs::copy(binary, &dest).await?;
            Ok((dest, None))
        }
    }
}
