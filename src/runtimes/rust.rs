//! Rust runtime
//!
//! Claims pre-built Rust binaries (by executable-header sniffing) and
//! Cargo source directories, cross-compiles sources with the external
//! Cargo toolchain, and packages the binary under the custom-runtime entry
//! name.

use super::go::{binary_function, sniff_toolchain, SniffedBinary};
use super::{archive_binary, Runtime, RuntimeId, RuntimeMatches, CUSTOM_RUNTIME_ENTRY};
use crate::config::resolve_config;
use crate::error::{FunctionError, FunctionErrorKind};
use crate::function::{ArchiveDescriptor, FunctionSource};
use crate::pipeline::RunContext;
use crate::sniff::BinaryToolchain;
use crate::toolchain::{ToolError, ToolInvocation, RUST_TARGET};
use anyhow::anyhow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

const RUST_INSTALL_HINT: &str =
    "the Rust toolchain is required to build Rust functions; install it from https://rustup.rs/";

pub struct RustRuntime;

#[async_trait]
impl Runtime for RustRuntime {
    fn id(&self) -> RuntimeId {
        RuntimeId::Rust
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
            if stat.is_file() {
                match sniff_toolchain(path, ctx).await {
                    SniffedBinary::Claimed(BinaryToolchain::Rust) => {
                        if let Some(function) = binary_function(path, ctx, RuntimeId::Rust).await {
                            matches.functions.push(function);
                        }
                    }
                    SniffedBinary::Incompatible(warning) => matches.warnings.push(warning),
                    _ => {}
                }
            } else if stat.is_dir() {
                if let Some(function) = self.classify_directory(path, ctx).await {
                    matches.functions.push(function);
                }
            }
        }
        matches
    }

    async fn zip_function(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> Result<ArchiveDescriptor, FunctionError> {
        let tag = |kind: FunctionErrorKind, source: anyhow::Error| {
            FunctionError::new(function.name.clone(), kind, source).with_runtime(RuntimeId::Rust)
        };

        let binary = if function.stat.is_file() && function.extension.is_empty() {
            function.src_path.clone()
        } else {
            self.build(function, ctx).await?
        };

        let stat = tokio::fs::metadata(&binary)
            .await
            .map_err(|err| tag(FunctionErrorKind::Compilation, anyhow::Error::new(err)))?;
        info!(binary = %binary.display(), size = stat.len(), "Packaging Rust binary");

        // Custom-runtime convention: the entry is always renamed
        let (path, size) = archive_binary(&function.name, &binary, CUSTOM_RUNTIME_ENTRY, ctx)
            .await
            .map_err(|source| tag(FunctionErrorKind::Archiving, source))?;

        Ok(ArchiveDescriptor {
            name: function.name.clone(),
            path,
            size,
            runtime: RuntimeId::Rust,
            bundler: None,
            src_files: vec![function.src_path.clone()],
            native_modules: Default::default(),
            schedule: function.config.schedule.clone(),
            routes: vec![],
            warnings: vec![],
        })
    }
}

impl RustRuntime {
    /// A directory with a Cargo manifest and `src/main.rs` is a Rust
    /// function.
    async fn classify_directory(&self, dir: &Path, ctx: &RunContext) -> Option<FunctionSource> {
        let dirname = dir.file_name()?.to_str()?;
        let manifest = dir.join("Cargo.toml");
        let main = dir.join("src/main.rs");
        if !ctx.fs.is_file(&manifest).await || !ctx.fs.is_file(&main).await {
            return None;
        }
        let stat = ctx.fs.stat(dir).await?;
        Some(FunctionSource {
            config: resolve_config(dirname, &ctx.config),
            name: dirname.to_string(),
            src_path: dir.to_path_buf(),
            src_dir: dir.to_path_buf(),
            main_file: main,
            extension: "rs".to_string(),
            filename: dirname.to_string(),
            stat,
            runtime: RuntimeId::Rust,
        })
    }

    async fn build(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
    ) -> Result<PathBuf, FunctionError> {
        let tag = |kind: FunctionErrorKind, source: anyhow::Error| {
            FunctionError::new(function.name.clone(), kind, source).with_runtime(RuntimeId::Rust)
        };

        ctx.installer
            .ensure_installed(RuntimeId::Rust)
            .await
            .map_err(|err| match err.as_ref() {
                ToolError::NotFound { .. } => {
                    tag(FunctionErrorKind::ToolchainMissing, anyhow!(RUST_INSTALL_HINT))
                }
                other => tag(FunctionErrorKind::ToolchainMissing, anyhow!(other.clone())),
            })?;

        let target_dir = self.target_directory(function);
        let invocation = ToolInvocation::new(
            "cargo",
            &["build", "--release", "--target", RUST_TARGET],
        )
        .current_dir(&function.src_dir)
        .env("CARGO_TARGET_DIR", target_dir.to_string_lossy());

        info!(name = %function.name, "Compiling Rust function");
        let output = ctx.runner.run(invocation).await.map_err(|err| match err {
            ToolError::NotFound { .. } => {
                tag(FunctionErrorKind::ToolchainMissing, anyhow!(RUST_INSTALL_HINT))
            }
            other => tag(FunctionErrorKind::Compilation, anyhow!(other)),
        })?;
        if !output.success {
            return Err(tag(
                FunctionErrorKind::Compilation,
                anyhow!("{}", output.stderr.trim().to_string()),
            ));
        }

        let crate_name = self
            .crate_name(function, ctx)
            .await
            .unwrap_or_else(|| function.name.clone());
        Ok(target_dir
            .join(RUST_TARGET)
            .join("release")
            .join(crate_name))
    }

    /// Cargo target directory, honoring the configured override with its
    /// `[name]` placeholder.
    fn target_directory(&self, function: &FunctionSource) -> PathBuf {
        match &function.config.rust_target_directory {
            Some(template) => PathBuf::from(template.replace("[name]", &function.name)),
            None => function.src_dir.join("target"),
        }
    }

    /// Binary name as declared in the Cargo manifest.
    async fn crate_name(&self, function: &FunctionSource, ctx: &RunContext) -> Option<String> {
        let manifest_path = function.src_dir.join("Cargo.toml");
        let text = ctx.fs.read_to_string(&manifest_path).await.ok()?;
        let manifest: toml::Value = toml::from_str(&text).ok()?;
        manifest
            .get("package")?
            .get("name")?
            .as_str()
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{test_context, test_context_with_runner};
    use crate::toolchain::testing::MockToolRunner;
    use std::sync::Arc;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn rust_source_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        write(
            &dir.join("Cargo.toml"),
            "[package]\nname = \"handler\"\nversion = \"0.1.0\"\n",
        );
        write(&dir.join("src/main.rs"), "fn main() {}");
        dir
    }

    #[tokio::test]
    async fn test_claims_cargo_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = rust_source_dir(root.path(), "metrics");
        write(&root.path().join("not-rust/readme.md"), "");

        let ctx = test_context();
        let paths = vec![dir.clone(), root.path().join("not-rust")];
        let matches = RustRuntime.find_functions_in_paths(&paths, &ctx).await;
        assert_eq!(matches.functions.len(), 1);
        assert_eq!(matches.functions[0].name, "metrics");
        assert_eq!(matches.functions[0].main_file, dir.join("src/main.rs"));
    }

    #[tokio::test]
    async fn test_claims_rust_binary() {
        let root = tempfile::tempdir().unwrap();
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(b"\x7fELF");
        bytes[4] = 2;
        bytes[5] = 1;
        bytes[18] = 62;
        bytes.extend_from_slice(b"rustc version 1.74.0");
        std::fs::write(root.path().join("metrics"), &bytes).unwrap();

        let ctx = test_context();
        let matches = RustRuntime
            .find_functions_in_paths(&[root.path().join("metrics")], &ctx)
            .await;
        assert_eq!(matches.functions.len(), 1);
        assert_eq!(matches.functions[0].runtime, RuntimeId::Rust);
    }

    #[tokio::test]
    async fn test_target_directory_placeholder() {
        let root = tempfile::tempdir().unwrap();
        let dir = rust_source_dir(root.path(), "metrics");

        let ctx = test_context();
        let mut function = RustRuntime
            .find_function_in_path(&dir, &ctx)
            .await
            .unwrap();
        function.config.rust_target_directory = Some("/tmp/targets/[name]".to_string());
        assert_eq!(
            RustRuntime.target_directory(&function),
            PathBuf::from("/tmp/targets/metrics")
        );
    }

    #[tokio::test]
    async fn test_install_runs_before_build() {
        let root = tempfile::tempdir().unwrap();
        let dir = rust_source_dir(root.path(), "metrics");

        let runner = Arc::new(MockToolRunner::new());
        let ctx = test_context_with_runner(runner.clone());
        let function = RustRuntime
            .find_function_in_path(&dir, &ctx)
            .await
            .unwrap();

        // Build fails later (no actual binary produced), but the memoized
        // target installation must have run exactly once
        let _ = RustRuntime.zip_function(&function, &ctx).await;
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].tool, "rustup");
        assert_eq!(calls[1].tool, "cargo");
    }

    #[tokio::test]
    async fn test_missing_rustup_gets_install_hint() {
        let root = tempfile::tempdir().unwrap();
        let dir = rust_source_dir(root.path(), "metrics");

        let runner = Arc::new(MockToolRunner::new());
        runner.respond(
            "rustup",
            Err(ToolError::NotFound {
                tool: "rustup".to_string(),
            }),
        );
        let ctx = test_context_with_runner(runner);
        let function = RustRuntime
            .find_function_in_path(&dir, &ctx)
            .await
            .unwrap();

        let err = RustRuntime.zip_function(&function, &ctx).await.unwrap_err();
        assert_eq!(err.kind, FunctionErrorKind::ToolchainMissing);
        assert!(err.source.to_string().contains("rustup.rs"));
    }
}
