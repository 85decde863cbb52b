//! Node runtime
//!
//! Classifies script and archive files (or directories with a recognized
//! entry file), selects a bundler strategy, runs the static-analysis
//! passes, and packages the resulting closure.

use super::{Runtime, RuntimeId, RuntimeMatches};
use crate::analysis::{extract_in_source_config, summarize};
use crate::archive::{self, ArchiveFormat};
use crate::bundlers::select_bundler;
use crate::config::resolve_config;
use crate::error::{FunctionError, FunctionErrorKind};
use crate::function::{ArchiveDescriptor, FunctionSource};
use crate::pipeline::RunContext;
use crate::routes::{compile_route, Route};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Recognized script and archive extensions.
pub const NODE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "mts", "cts", "zip"];

/// Entry candidates for directory functions, tried in order.
const ENTRY_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "mts", "cts"];

pub struct NodeRuntime;

#[async_trait]
impl Runtime for NodeRuntime {
    fn id(&self) -> RuntimeId {
        RuntimeId::Node
    }

    async fn find_functions_in_paths(
        &self,
        paths: &[PathBuf],
        ctx: &RunContext,
    ) -> RuntimeMatches {
        let mut matches = RuntimeMatches::default();
        for path in paths {
            let Some(stat) = ctx.fs.stat(path).await else {
                continue;
            };
            let function = if stat.is_file() {
                self.classify_file(path, ctx).await
            } else if stat.is_dir() {
                self.classify_directory(path, ctx).await
            } else {
                None
            };
            if let Some(function) = function {
                matches.functions.push(function);
            }
        }
        matches
    }

    async fn zip_function(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> Result<ArchiveDescriptor, FunctionError> {
        let tag_config = |source: anyhow::Error| {
            FunctionError::new(function.name.clone(), FunctionErrorKind::InvalidConfig, source)
                .with_runtime(RuntimeId::Node)
        };

        // Route and rate-limit validation happens before any build attempt
        let routes = compile_routes(function).map_err(tag_config)?;
        if let Some(rate_limit) = &function.config.rate_limit {
            rate_limit.validate().map_err(|err| tag_config(err.into()))?;
        }

        // Pre-archived functions are passed through untouched
        if function.extension == "zip" {
            return self.pass_through_archive(function, routes, ctx).await;
        }

        let entry_text = ctx
            .fs
            .read_to_string(&function.main_file)
            .await
            .map_err(|err| {
                FunctionError::new(
                    function.name.clone(),
                    FunctionErrorKind::Bundling,
                    anyhow::Error::new(err).context("could not read function entry file"),
                )
                .with_runtime(RuntimeId::Node)
            })?;
        let summary = summarize(&entry_text);

        // In-source configuration loses to explicitly configured values
        let in_source = extract_in_source_config(&summary);
        let schedule = function
            .config
            .schedule
            .clone()
            .or(in_source.schedule);

        let bundler = select_bundler(function, &ctx.flags, summary.has_esm_syntax);
        debug!(name = %function.name, bundler = %bundler, "Selected bundler");
        let strategy = ctx.bundlers.get(bundler);
        let closure = strategy.bundle(function, ctx).await.map_err(|source| {
            FunctionError::new(function.name.clone(), FunctionErrorKind::Bundling, source)
                .with_runtime(RuntimeId::Node)
                .with_bundler(bundler)
        })?;

        let tag_archive = |source: anyhow::Error| {
            FunctionError::new(function.name.clone(), FunctionErrorKind::Archiving, source)
                .with_runtime(RuntimeId::Node)
                .with_bundler(bundler)
        };
        let (path, size) = match ctx.format {
            ArchiveFormat::Zip => {
                let dest = ctx.dest_dir.join(format!("{}.zip", function.name));
                let size = archive::write_zip(&dest, &closure)
                    .await
                    .map_err(tag_archive)?;
                (dest, Some(size))
            }
            ArchiveFormat::None => {
                let dest = ctx.dest_dir.join(&function.name);
                archive::flat_copy(&dest, &closure)
                    .await
                    .map_err(tag_archive)?;
                (dest, None)
            }
        };

        Ok(ArchiveDescriptor {
            name: function.name.clone(),
            path,
            size,
            runtime: RuntimeId::Node,
            bundler: Some(bundler),
            src_files: closure.src_files.clone(),
            native_modules: closure.native_modules.clone(),
            schedule,
            routes,
            warnings: closure.warnings.clone(),
        })
    }
}

impl NodeRuntime {
    async fn classify_file(&self, path: &Path, ctx: &RunContext) -> Option<FunctionSource> {
        let extension = path.extension()?.to_str()?;
        if !NODE_EXTENSIONS.contains(&extension) {
            return None;
        }
        let stat = ctx.fs.stat(path).await?;
        let name = FunctionSource::name_for_path(path);
        Some(FunctionSource {
            config: resolve_config(&name, &ctx.config),
            name,
            src_path: path.to_path_buf(),
            src_dir: path.parent()?.to_path_buf(),
            main_file: path.to_path_buf(),
            extension: extension.to_string(),
            filename: path.file_name()?.to_string_lossy().into_owned(),
            stat,
            runtime: RuntimeId::Node,
        })
    }

    async fn classify_directory(&self, dir: &Path, ctx: &RunContext) -> Option<FunctionSource> {
        let dirname = dir.file_name()?.to_str()?;
        let mut candidates = Vec::new();
        for ext in ENTRY_EXTENSIONS {
            candidates.push(dir.join(format!("{}.{}", dirname, ext)));
        }
        for ext in ENTRY_EXTENSIONS {
            candidates.push(dir.join(format!("index.{}", ext)));
        }
        for candidate in candidates {
            if !ctx.fs.is_file(&candidate).await {
                continue;
            }
            let stat = ctx.fs.stat(dir).await?;
            let extension = candidate
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Some(FunctionSource {
                config: resolve_config(dirname, &ctx.config),
                name: dirname.to_string(),
                src_path: dir.to_path_buf(),
                src_dir: dir.to_path_buf(),
                main_file: candidate,
                extension,
                filename: dirname.to_string(),
                stat,
                runtime: RuntimeId::Node,
            });
        }
        None
    }

    async fn pass_through_archive(
        &self,
        function: &FunctionSource,
        routes: Vec<Route>,
        ctx: &RunContext,
    ) -> Result<ArchiveDescriptor, FunctionError> {
        let dest = ctx.dest_dir.join(&function.filename);
        let size = tokio::fs::copy(&function.src_path, &dest)
            .await
            .map_err(|err| {
                FunctionError::new(
                    function.name.clone(),
                    FunctionErrorKind::Archiving,
                    anyhow::Error::new(err).context("could not copy pre-built archive"),
                )
                .with_runtime(RuntimeId::Node)
            })?;
        Ok(ArchiveDescriptor {
            name: function.name.clone(),
            path: dest,
            size: Some(size),
            runtime: RuntimeId::Node,
            bundler: None,
            src_files: vec![function.src_path.clone()],
            native_modules: Default::default(),
            schedule: function.config.schedule.clone(),
            routes,
            warnings: vec![],
        })
    }
}

fn compile_routes(function: &FunctionSource) -> anyhow::Result<Vec<Route>> {
    function
        .config
        .routes
        .iter()
        .map(|declaration| {
            compile_route(declaration.path(), declaration.methods()).map_err(anyhow::Error::new)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundlers::BundlerId;
    use crate::config::{FunctionConfig, RouteDeclaration};
    use crate::pipeline::testing::test_context;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_classify_recognized_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a.js"), "");
        write(&dir.path().join("b.mts"), "");
        write(&dir.path().join("c.go"), "");
        write(&dir.path().join("noext"), "");

        let ctx = test_context();
        let paths = vec![
            dir.path().join("a.js"),
            dir.path().join("b.mts"),
            dir.path().join("c.go"),
            dir.path().join("noext"),
        ];
        let matches = NodeRuntime.find_functions_in_paths(&paths, &ctx).await;
        let names: Vec<_> = matches.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_classify_directory_function() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("billing/billing.js"), "");
        write(&dir.path().join("mailer/index.ts"), "");
        write(&dir.path().join("empty/readme.md"), "");

        let ctx = test_context();
        let paths = vec![
            dir.path().join("billing"),
            dir.path().join("mailer"),
            dir.path().join("empty"),
        ];
        let matches = NodeRuntime.find_functions_in_paths(&paths, &ctx).await;
        let mut names: Vec<_> = matches.functions.iter().map(|f| f.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["billing", "mailer"]);

        let mailer = matches
            .functions
            .iter()
            .find(|f| f.name == "mailer")
            .unwrap();
        assert_eq!(mailer.main_file, dir.path().join("mailer/index.ts"));
        assert_eq!(mailer.extension, "ts");
    }

    #[tokio::test]
    async fn test_invalid_route_fails_before_build() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("fn.js"), "module.exports.handler = () => {}");

        let ctx = test_context();
        let path = dir.path().join("fn.js");
        let mut function = NodeRuntime
            .find_function_in_path(&path, &ctx)
            .await
            .unwrap();
        function.config = FunctionConfig {
            bundler: Some(BundlerId::None),
            routes: vec![RouteDeclaration::Path("products".to_string())],
            ..Default::default()
        };

        let err = NodeRuntime.zip_function(&function, &ctx).await.unwrap_err();
        assert_eq!(err.kind, FunctionErrorKind::InvalidConfig);
        assert_eq!(err.function_name, "fn");
    }
}
