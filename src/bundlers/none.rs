//! No-op strategy
//!
//! The archive contains the entry file and explicitly included files,
//! untouched. ES module syntax is rejected when the target runtime version
//! predates ESM support - that is a user-facing configuration error, not a
//! build failure.

use super::format::resolve_module_format;
use super::transpile::entry_and_includes;
use super::{BundlerId, BundlerStrategy, DependencyClosure, ModuleFormat, ESM_MIN_NODE_VERSION};
use crate::function::FunctionSource;
use crate::pipeline::RunContext;
use anyhow::anyhow;
use async_trait::async_trait;
use std::path::PathBuf;

pub struct NoneStrategy;

#[async_trait]
impl BundlerStrategy for NoneStrategy {
    fn id(&self) -> BundlerId {
        BundlerId::None
    }

    async fn bundle(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> anyhow::Result<DependencyClosure> {
        let mut closure = entry_and_includes(function).await?;
        closure.module_format = resolve_module_format(&function.main_file, &ctx.fs).await;

        if closure.module_format == ModuleFormat::EsModule {
            if let Some(major) = function.config.node_major_version() {
                if major < ESM_MIN_NODE_VERSION {
                    return Err(anyhow!(
                        "function '{}' uses ES module syntax but targets Node {}, which \
                         predates ES module support; set node_version to {} or later, or \
                         pick a transpiling bundler",
                        function.name,
                        major,
                        ESM_MIN_NODE_VERSION
                    ));
                }
            }
        }

        Ok(closure.finish())
    }

    async fn get_src_files(
        &self,
        function: &FunctionSource,
        _ctx: &RunContext,
    ) -> anyhow::Result<Vec<PathBuf>> {
        Ok(entry_and_includes(function).await?.finish().src_files)
    }
}
