//! esbuild bundling strategy
//!
//! Produces one bundled output file through the external esbuild engine,
//! externalizing detected native modules and explicitly ignored modules.
//! The bundle is written to a scratch directory and aliased to the
//! function's directory inside the archive.

use super::format::{nearest_manifest, resolve_module_format};
use super::includes::expand_included_files;
use super::manifest::PackageJson;
use super::native::{is_native_module, NativeModuleInfo};
use super::resolve::{NodeResolver, Resolved};
use super::trace::package_files;
use super::{BundlerId, BundlerStrategy, DependencyClosure};
use crate::analysis::{resolve_dynamic_import, summarize, Specifier};
use crate::function::FunctionSource;
use crate::pipeline::RunContext;
use crate::toolchain::{ToolError, ToolInvocation};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

pub struct EsbuildStrategy;

#[async_trait]
impl BundlerStrategy for EsbuildStrategy {
    fn id(&self) -> BundlerId {
        BundlerId::Esbuild
    }

    async fn bundle(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> anyhow::Result<DependencyClosure> {
        let mut closure = DependencyClosure {
            module_format: resolve_module_format(&function.main_file, &ctx.fs).await,
            ..Default::default()
        };

        let entry_text = ctx
            .fs
            .read_to_string(&function.main_file)
            .await
            .context("could not read function entry file")?;
        let summary = summarize(&entry_text);

        let natives = detect_native_dependencies(function, ctx).await;
        for info in natives.values() {
            closure.src_files.extend(package_files(&info.path));
        }
        closure.native_modules = natives;

        // Externalized modules: detected natives plus explicit config,
        // deduplicated
        let mut externals: Vec<String> = closure.native_modules.keys().cloned().collect();
        externals.extend(function.config.external_node_modules.iter().cloned());
        externals.extend(function.config.ignored_node_modules.iter().cloned());
        externals.sort();
        externals.dedup();

        let scratch = tempfile::tempdir().context("could not create bundling scratch dir")?;
        let outfile = scratch.path().join(format!("{}.js", function.name));

        let mut args: Vec<String> = vec![
            function.main_file.to_string_lossy().into_owned(),
            "--bundle".to_string(),
            "--platform=node".to_string(),
            "--format=cjs".to_string(),
            format!("--outfile={}", outfile.display()),
        ];
        if let Some(major) = function.config.node_major_version() {
            args.push(format!("--target=node{}", major));
        }
        if function.config.node_sourcemap.unwrap_or(false) {
            args.push("--sourcemap".to_string());
        }
        for external in &externals {
            args.push(format!("--external:{}", external));
        }

        debug!(entry = %function.main_file.display(), "Bundling with esbuild");
        let invocation = ToolInvocation {
            tool: "esbuild".to_string(),
            args,
            cwd: Some(function.src_dir.clone()),
            env: Vec::new(),
        };
        let output = ctx.runner.run(invocation).await.map_err(|err| match err {
            ToolError::NotFound { .. } => anyhow!(
                "'esbuild' is not installed; install it with 'npm install -g esbuild' \
                 or pick another bundler"
            ),
            other => anyhow!(other),
        })?;
        if !output.success {
            return Err(anyhow!("{}", output.stderr.trim().to_string()).context("esbuild failed"));
        }

        // The bundle lands in the archive next to where the entry lived
        let archived_entry = function.src_dir.join(format!("{}.js", function.name));
        closure.src_files.push(outfile.clone());
        closure.aliases.insert(outfile.clone(), archived_entry.clone());
        let map_file = PathBuf::from(format!("{}.map", outfile.display()));
        if map_file.is_file() {
            closure.src_files.push(map_file.clone());
            closure.aliases.insert(
                map_file,
                function.src_dir.join(format!("{}.js.map", function.name)),
            );
        }

        // Dynamic imports survive bundling as computed requires; capture
        // their files and point the bundled code at the flattened layout
        let mut bundled_text: Option<String> = None;
        for record in &summary.imports {
            let Specifier::Dynamic(expr) = &record.specifier else {
                continue;
            };
            match resolve_dynamic_import(expr, &function.src_dir, &function.src_dir) {
                Some(resolved) => {
                    let expanded = expand_included_files(
                        &[resolved.glob.clone()],
                        &function.src_dir,
                    );
                    closure.warnings.extend(expanded.warnings);
                    for matched in expanded.files {
                        closure.included_files.push(matched.clone());
                        closure.src_files.push(matched);
                    }
                    if resolved.original_head != resolved.rewritten_head {
                        let text = match bundled_text.take() {
                            Some(text) => text,
                            None => std::fs::read_to_string(&outfile)
                                .context("could not read bundled output")?,
                        };
                        bundled_text =
                            Some(rewrite_import_heads(&text, &resolved.original_head, &resolved.rewritten_head));
                    }
                }
                None => {
                    closure.warnings.push(format!(
                        "could not statically analyze dynamic import in '{}'",
                        function.name
                    ));
                }
            }
        }
        if let Some(text) = bundled_text {
            closure.rewrites.insert(outfile, text);
        }

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

        closure.scratch = Some(scratch);
        Ok(closure.finish())
    }

    async fn get_src_files(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = vec![function.main_file.clone()];
        for (_, info) in detect_native_dependencies(function, ctx).await {
            files.extend(package_files(&info.path));
        }
        let includes_base = function
            .config
            .included_files_base_path
            .clone()
            .unwrap_or_else(|| function.src_dir.clone());
        files.extend(expand_included_files(&function.config.included_files, &includes_base).files);
        files.dedup();
        Ok(files)
    }
}

/// Native modules among the function package's direct dependencies.
async fn detect_native_dependencies(
    function: &FunctionSource,
    ctx: &RunContext,
) -> BTreeMap<String, NativeModuleInfo> {
    let mut natives = BTreeMap::new();
    let Some((_, manifest)) = nearest_manifest(&function.src_dir, &ctx.fs).await else {
        return natives;
    };
    let resolver = NodeResolver::new(&ctx.fs);
    for name in manifest.dependencies.keys() {
        let Some(Resolved::Module { package_dir, .. }) =
            resolver.resolve(name, &function.src_dir).await
        else {
            continue;
        };
        let manifest_path = package_dir.join("package.json");
        let package_manifest = match ctx.fs.read_to_string(&manifest_path).await {
            Ok(text) => PackageJson::parse(&text, &manifest_path),
            Err(_) => continue,
        };
        if is_native_module(&package_manifest) {
            natives.insert(
                name.clone(),
                NativeModuleInfo {
                    path: package_dir,
                    version: package_manifest.version,
                },
            );
        }
    }
    natives
}

/// Replaces the static head of a dynamic import inside bundled output, for
/// every quote style.
fn rewrite_import_heads(text: &str, original: &str, rewritten: &str) -> String {
    let mut result = text.to_string();
    for quote in ['\'', '"', '`'] {
        let from = format!("{}{}", quote, original);
        let to = format!("{}{}", quote, rewritten);
        result = result.replace(&from, &to);
    }
    result
}
