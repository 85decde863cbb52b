//! Transpile-only strategy
//!
//! No tracing: the file set is the entry plus explicitly included files.
//! TypeScript and ES module entries are transpiled to CommonJS through the
//! esbuild engine so the target runtime can load them.

use super::format::resolve_module_format;
use super::includes::expand_included_files;
use super::{BundlerId, BundlerStrategy, DependencyClosure, ModuleFormat};
use crate::function::FunctionSource;
use crate::pipeline::RunContext;
use crate::toolchain::{ToolError, ToolInvocation};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::path::PathBuf;

const TYPESCRIPT_EXTENSIONS: &[&str] = &["ts", "mts", "cts"];

pub struct TranspileStrategy;

#[async_trait]
impl BundlerStrategy for TranspileStrategy {
    fn id(&self) -> BundlerId {
        BundlerId::Transpile
    }

    async fn bundle(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> anyhow::Result<DependencyClosure> {
        let mut closure = entry_and_includes(function).await?;
        closure.module_format = resolve_module_format(&function.main_file, &ctx.fs).await;

        let is_typescript = TYPESCRIPT_EXTENSIONS.contains(&function.extension.as_str());
        if is_typescript || closure.module_format == ModuleFormat::EsModule {
            let output = ctx
                .runner
                .run(
                    ToolInvocation::new(
                        "esbuild",
                        &[
                            function.main_file.to_string_lossy().as_ref(),
                            "--format=cjs",
                            "--platform=node",
                        ],
                    )
                    .current_dir(&function.src_dir),
                )
                .await
                .map_err(|err| match err {
                    ToolError::NotFound { .. } => anyhow!(
                        "'esbuild' is required to transpile '{}' but is not installed; \
                         install it with 'npm install -g esbuild'",
                        function.main_file.display()
                    ),
                    other => anyhow!(other),
                })?;
            if !output.success {
                return Err(anyhow!("{}", output.stderr.trim().to_string()))
                    .with_context(|| {
                        format!("could not transpile '{}'", function.main_file.display())
                    });
            }
            closure
                .rewrites
                .insert(function.main_file.clone(), output.stdout);
            if is_typescript {
                closure.aliases.insert(
                    function.main_file.clone(),
                    function.main_file.with_extension("js"),
                );
            }
            closure.module_format = ModuleFormat::CommonJs;
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

/// Shared by the transpile and none strategies: entry file plus explicitly
/// included files, nothing traced.
pub(super) async fn entry_and_includes(
    function: &FunctionSource,
) -> anyhow::Result<DependencyClosure> {
    let mut closure = DependencyClosure {
        src_files: vec![function.main_file.clone()],
        ..Default::default()
    };
    let includes_base = function
        .config
        .included_files_base_path
        .clone()
        .unwrap_or_else(|| function.src_dir.clone());
    let expanded = expand_included_files(&function.config.included_files, &includes_base);
    closure.warnings.extend(expanded.warnings);
    for file in expanded.files {
        closure.included_files.push(file.clone());
        closure.src_files.push(file);
    }
    Ok(closure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FunctionConfig;
    use crate::fs::{FileStat, FileType};
    use crate::pipeline::testing::test_context;
    use crate::runtimes::RuntimeId;
    use std::path::Path;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn node_function(main_file: PathBuf, config: FunctionConfig) -> FunctionSource {
        let src_dir = main_file.parent().unwrap().to_path_buf();
        FunctionSource {
            name: main_file
                .file_stem()
                .unwrap()
                .to_string_lossy()
                .into_owned(),
            src_path: main_file.clone(),
            src_dir,
            filename: main_file
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned(),
            extension: main_file
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            main_file,
            stat: FileStat {
                size: 1,
                mtime: None,
                file_type: FileType::File,
            },
            runtime: RuntimeId::Node,
            config,
        }
    }

    #[tokio::test]
    async fn test_cjs_entry_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("fn.js"), "module.exports.handler = () => {}");

        let ctx = test_context();
        let function = node_function(dir.path().join("fn.js"), FunctionConfig::default());
        let closure = TranspileStrategy.bundle(&function, &ctx).await.unwrap();
        assert_eq!(closure.src_files, vec![dir.path().join("fn.js")]);
        assert!(closure.rewrites.is_empty());
    }

    #[tokio::test]
    async fn test_typescript_entry_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("fn.ts"), "export const handler = () => {}");

        let ctx = test_context();
        let function = node_function(dir.path().join("fn.ts"), FunctionConfig::default());
        let closure = TranspileStrategy.bundle(&function, &ctx).await.unwrap();
        assert!(closure.rewrites.contains_key(&dir.path().join("fn.ts")));
        assert_eq!(
            closure.aliases.get(&dir.path().join("fn.ts")),
            Some(&dir.path().join("fn.js"))
        );
        assert_eq!(closure.module_format, ModuleFormat::CommonJs);
    }
}
