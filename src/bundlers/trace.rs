//! Dependency-trace strategy
//!
//! Static module-graph analysis from the entry file: local files are read,
//! their import specifiers extracted and resolved with Node resolution
//! rules, and the walk continues until the closure is complete. Packages
//! reached through bare specifiers are included whole (minus nested
//! node_modules) and their declared dependencies followed. Nothing is
//! executed.

use super::format::resolve_module_format;
use super::includes::expand_included_files;
use super::manifest::PackageJson;
use super::native::{is_native_module, NativeModuleInfo};
use super::resolve::{package_name_from_path, NodeResolver, Resolved};
use super::{BundlerId, BundlerStrategy, DependencyClosure, ModuleFormat, ESM_MIN_NODE_VERSION};
use crate::analysis::{resolve_dynamic_import, summarize, Specifier};
use crate::function::FunctionSource;
use crate::pipeline::RunContext;
use crate::toolchain::{ToolError, ToolInvocation};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use ignore::WalkBuilder;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions whose content is parsed for further imports.
const TRACEABLE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "mts", "cts"];

/// TypeScript sources always transpile before archiving.
const TYPESCRIPT_EXTENSIONS: &[&str] = &["ts", "mts", "cts"];

pub struct TraceStrategy;

#[async_trait]
impl BundlerStrategy for TraceStrategy {
    fn id(&self) -> BundlerId {
        BundlerId::Trace
    }

    async fn bundle(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> anyhow::Result<DependencyClosure> {
        let mut closure = trace_closure(function, ctx).await?;
        transpile_for_target(function, ctx, &mut closure).await?;
        Ok(closure.finish())
    }

    async fn get_src_files(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> anyhow::Result<Vec<PathBuf>> {
        Ok(trace_closure(function, ctx).await?.finish().src_files)
    }
}

async fn trace_closure(
    function: &FunctionSource,
    ctx: &RunContext,
) -> anyhow::Result<DependencyClosure> {
    let mut closure = DependencyClosure {
        module_format: resolve_module_format(&function.main_file, &ctx.fs).await,
        ..Default::default()
    };
    let resolver = NodeResolver::new(&ctx.fs);

    let mut file_queue: VecDeque<PathBuf> = VecDeque::new();
    let mut package_queue: VecDeque<(PathBuf, String)> = VecDeque::new();
    let mut visited_files: HashSet<PathBuf> = HashSet::new();
    let mut visited_packages: HashSet<PathBuf> = HashSet::new();

    file_queue.push_back(function.main_file.clone());
    let function_manifest = function.src_dir.join("package.json");
    if ctx.fs.is_file(&function_manifest).await {
        file_queue.push_back(function_manifest);
    }

    while let Some(file) = file_queue.pop_front() {
        if !visited_files.insert(file.clone()) {
            continue;
        }
        closure.src_files.push(file.clone());

        let extension = file
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if !TRACEABLE_EXTENSIONS.contains(&extension) {
            continue;
        }

        let text = match ctx.fs.read_to_string(&file).await {
            Ok(text) => text,
            Err(err) => {
                if file == function.main_file {
                    return Err(anyhow!(err).context("could not read function entry file"));
                }
                closure.warnings.push(format!("could not read '{}'", file.display()));
                continue;
            }
        };
        let summary = summarize(&text);
        let from_dir = file.parent().unwrap_or(Path::new("/")).to_path_buf();

        for record in &summary.imports {
            match &record.specifier {
                Specifier::Literal(specifier) => {
                    match resolver.resolve(specifier, &from_dir).await {
                        Some(Resolved::File(resolved)) => file_queue.push_back(resolved),
                        Some(Resolved::Module {
                            package_dir, name, ..
                        }) => package_queue.push_back((package_dir, name)),
                        None if is_relative(specifier) => {
                            closure.warnings.push(format!(
                                "could not resolve '{}' imported from '{}'",
                                specifier,
                                file.display()
                            ));
                        }
                        None => {}
                    }
                }
                Specifier::Dynamic(expr) => {
                    match resolve_dynamic_import(expr, &from_dir, &function.src_dir) {
                        Some(resolved) => {
                            debug!(glob = %resolved.glob, "Captured dynamic import");
                            let expanded =
                                expand_included_files(&[resolved.glob], &function.src_dir);
                            closure.warnings.extend(expanded.warnings);
                            for matched in expanded.files {
                                closure.included_files.push(matched.clone());
                                file_queue.push_back(matched);
                            }
                        }
                        None => {
                            let owner = package_name_from_path(&file)
                                .unwrap_or_else(|| function.name.clone());
                            closure.warnings.push(format!(
                                "could not statically analyze dynamic import in '{}'",
                                owner
                            ));
                        }
                    }
                }
            }
        }
    }

    while let Some((package_dir, name)) = package_queue.pop_front() {
        if !visited_packages.insert(package_dir.clone()) {
            continue;
        }
        if function.config.ignored_node_modules.contains(&name) {
            continue;
        }
        let manifest_path = package_dir.join("package.json");
        let manifest = match ctx.fs.read_to_string(&manifest_path).await {
            Ok(text) => PackageJson::parse(&text, &manifest_path),
            Err(_) => PackageJson::default(),
        };

        if is_native_module(&manifest) {
            closure.native_modules.insert(
                name.clone(),
                NativeModuleInfo {
                    path: package_dir.clone(),
                    version: manifest.version.clone(),
                },
            );
        }

        closure.src_files.extend(package_files(&package_dir));

        for dependency in manifest.dependencies.keys() {
            if let Some(Resolved::Module {
                package_dir: dep_dir,
                name: dep_name,
                ..
            }) = resolver.resolve(dependency, &package_dir).await
            {
                package_queue.push_back((dep_dir, dep_name));
            }
        }
    }

    // Explicitly included files ride along with the traced set
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

/// All files of a package except nested node_modules trees.
pub(super) fn package_files(package_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(package_dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .build()
        .flatten()
    {
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    files
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Transpiles local TypeScript (always) and ES module sources (when the
/// target Node version predates ESM support) to CommonJS through the
/// esbuild engine, recording the results as content rewrites.
async fn transpile_for_target(
    function: &FunctionSource,
    ctx: &RunContext,
    closure: &mut DependencyClosure,
) -> anyhow::Result<()> {
    let needs_esm_downlevel = closure.module_format == ModuleFormat::EsModule
        && function
            .config
            .node_major_version()
            .map(|major| major < ESM_MIN_NODE_VERSION)
            .unwrap_or(false);

    let local_sources: Vec<PathBuf> = closure
        .src_files
        .iter()
        .filter(|file| !file.components().any(|c| c.as_os_str() == "node_modules"))
        .filter(|file| {
            let extension = file
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or_default();
            TYPESCRIPT_EXTENSIONS.contains(&extension)
                || (needs_esm_downlevel && TRACEABLE_EXTENSIONS.contains(&extension))
        })
        .cloned()
        .collect();

    for file in local_sources {
        let output = ctx
            .runner
            .run(
                ToolInvocation::new(
                    "esbuild",
                    &[
                        file.to_string_lossy().as_ref(),
                        "--format=cjs",
                        "--platform=node",
                        "--loader:.ts=ts",
                    ],
                )
                .current_dir(&function.src_dir),
            )
            .await
            .map_err(|err| match err {
                ToolError::NotFound { .. } => anyhow!(
                    "'esbuild' is required to transpile '{}' but is not installed; \
                     install it with 'npm install -g esbuild'",
                    file.display()
                ),
                other => anyhow!(other),
            })?;
        if !output.success {
            return Err(anyhow!("{}", output.stderr.trim().to_string()))
                .with_context(|| format!("could not transpile '{}'", file.display()));
        }
        closure.rewrites.insert(file.clone(), output.stdout);

        // TypeScript entries are archived under their JavaScript name
        let extension = file
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if TYPESCRIPT_EXTENSIONS.contains(&extension) {
            closure.aliases.insert(file.clone(), file.with_extension("js"));
        }
    }
    Ok(())
}
