//! Go runtime
//!
//! Claims pre-built Go binaries (by executable-header sniffing) and Go
//! source directories, compiles sources with the external Go toolchain,
//! and packages the resulting binary.

use super::{archive_binary, Runtime, RuntimeId, RuntimeMatches, CUSTOM_RUNTIME_ENTRY};
use crate::config::resolve_config;
use crate::error::{FunctionError, FunctionErrorKind};
use crate::function::{ArchiveDescriptor, FunctionSource};
use crate::pipeline::RunContext;
use crate::sniff::{sniff, BinaryToolchain, Sniff};
use crate::toolchain::{ToolError, ToolInvocation};
use anyhow::anyhow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const GO_INSTALL_HINT: &str =
    "the Go toolchain is required to build Go functions; install it from https://go.dev/dl/";

pub struct GoRuntime;

#[async_trait]
impl Runtime for GoRuntime {
    fn id(&self) -> RuntimeId {
        RuntimeId::Go
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
                    SniffedBinary::Claimed(BinaryToolchain::Go) => {
                        if let Some(function) = binary_function(path, ctx, RuntimeId::Go).await {
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
            FunctionError::new(function.name.clone(), kind, source).with_runtime(RuntimeId::Go)
        };

        // Pre-built binaries skip compilation entirely
        let (binary, _build_dir) = if function.stat.is_file() && function.extension.is_empty() {
            (function.src_path.clone(), None)
        } else {
            let build_dir = tempfile::tempdir().map_err(|err| {
                tag(FunctionErrorKind::Compilation, anyhow::Error::new(err))
            })?;
            let binary = self.build(function, ctx, build_dir.path()).await?;
            (binary, Some(build_dir))
        };

        // Stat flows into archiving exactly as for a pre-existing binary
        let stat = tokio::fs::metadata(&binary)
            .await
            .map_err(|err| tag(FunctionErrorKind::Compilation, anyhow::Error::new(err)))?;
        debug!(binary = %binary.display(), size = stat.len(), "Packaging Go binary");

        let entry_name = if function.config.zip_go.unwrap_or(false) {
            CUSTOM_RUNTIME_ENTRY
        } else {
            function.name.as_str()
        };
        let (path, size) = archive_binary(&function.name, &binary, entry_name, ctx)
            .await
            .map_err(|source| tag(FunctionErrorKind::Archiving, source))?;

        Ok(ArchiveDescriptor {
            name: function.name.clone(),
            path,
            size,
            runtime: RuntimeId::Go,
            bundler: None,
            src_files: vec![function.src_path.clone()],
            native_modules: Default::default(),
            schedule: function.config.schedule.clone(),
            routes: vec![],
            warnings: vec![],
        })
    }
}

impl GoRuntime {
    /// A directory containing `main.go` or `<dirname>.go` is a Go function.
    async fn classify_directory(&self, dir: &Path, ctx: &RunContext) -> Option<FunctionSource> {
        let dirname = dir.file_name()?.to_str()?;
        let candidates = [dir.join("main.go"), dir.join(format!("{}.go", dirname))];
        for candidate in candidates {
            if !ctx.fs.is_file(&candidate).await {
                continue;
            }
            let stat = ctx.fs.stat(dir).await?;
            return Some(FunctionSource {
                config: resolve_config(dirname, &ctx.config),
                name: dirname.to_string(),
                src_path: dir.to_path_buf(),
                src_dir: dir.to_path_buf(),
                main_file: candidate,
                extension: "go".to_string(),
                filename: dirname.to_string(),
                stat,
                runtime: RuntimeId::Go,
            });
        }
        None
    }

    async fn build(
        &self,
        function: &FunctionSource,
        ctx: &RunContext,
        build_dir: &Path,
    ) -> Result<PathBuf, FunctionError> {
        let tag = |kind: FunctionErrorKind, source: anyhow::Error| {
            FunctionError::new(function.name.clone(), kind, source).with_runtime(RuntimeId::Go)
        };
        ctx.installer
            .ensure_installed(RuntimeId::Go)
            .await
            .map_err(|err| tag(FunctionErrorKind::ToolchainMissing, anyhow!(err)))?;

        let binary = build_dir.join(&function.name);
        let invocation = ToolInvocation::new(
            "go",
            &["build", "-o", binary.to_string_lossy().as_ref(), "."],
        )
        .current_dir(&function.src_dir)
        .env("GOOS", "linux")
        .env("GOARCH", "amd64")
        .env("CGO_ENABLED", "0");

        info!(name = %function.name, "Compiling Go function");
        let output = ctx.runner.run(invocation).await.map_err(|err| match err {
            ToolError::NotFound { .. } => {
                tag(FunctionErrorKind::ToolchainMissing, anyhow!(GO_INSTALL_HINT))
            }
            other => tag(FunctionErrorKind::Compilation, anyhow!(other)),
        })?;
        if !output.success {
            // Original tool output preserved
            return Err(tag(
                FunctionErrorKind::Compilation,
                anyhow!("{}", output.stderr.trim().to_string()),
            ));
        }
        Ok(binary)
    }
}

/// Shared sniffing outcome for binary classifiers.
pub(super) enum SniffedBinary {
    Claimed(BinaryToolchain),
    Incompatible(String),
    Unknown,
}

pub(super) async fn sniff_toolchain(path: &Path, ctx: &RunContext) -> SniffedBinary {
    let Some(head) = ctx.fs.head(path).await else {
        return SniffedBinary::Unknown;
    };
    match sniff(&head) {
        Sniff::Toolchain(toolchain) => SniffedBinary::Claimed(toolchain),
        Sniff::Incompatible { platform, arch } => SniffedBinary::Incompatible(format!(
            "function binary '{}' targets {}/{}, which is not a supported function platform; \
             only linux/amd64 binaries can be deployed",
            path.display(),
            platform,
            arch
        )),
        Sniff::Unknown => SniffedBinary::Unknown,
    }
}

pub(super) async fn binary_function(
    path: &Path,
    ctx: &RunContext,
    runtime: RuntimeId,
) -> Option<FunctionSource> {
    let stat = ctx.fs.stat(path).await?;
    let name = FunctionSource::name_for_path(path);
    Some(FunctionSource {
        config: resolve_config(&name, &ctx.config),
        name,
        src_path: path.to_path_buf(),
        src_dir: path.parent()?.to_path_buf(),
        main_file: path.to_path_buf(),
        extension: String::new(),
        filename: path.file_name()?.to_string_lossy().into_owned(),
        stat,
        runtime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{test_context, test_context_with_runner};
    use crate::toolchain::testing::MockToolRunner;
    use std::sync::Arc;

    fn write(path: &Path, content: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn go_binary_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(b"\x7fELF");
        bytes[4] = 2; // 64-bit
        bytes[5] = 1; // little-endian
        bytes[6] = 1;
        bytes[18] = 62; // EM_X86_64
        bytes.extend_from_slice(b".note.go.buildid");
        bytes
    }

    #[tokio::test]
    async fn test_claims_go_binary() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("hello"), &go_binary_bytes());

        let ctx = test_context();
        let matches = GoRuntime
            .find_functions_in_paths(&[dir.path().join("hello")], &ctx)
            .await;
        assert_eq!(matches.functions.len(), 1);
        assert_eq!(matches.functions[0].name, "hello");
        assert_eq!(matches.functions[0].runtime, RuntimeId::Go);
        assert!(matches.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_incompatible_binary_warns_and_skips() {
        let mut bytes = go_binary_bytes();
        bytes[18] = 183; // arm64
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("hello"), &bytes);

        let ctx = test_context();
        let matches = GoRuntime
            .find_functions_in_paths(&[dir.path().join("hello")], &ctx)
            .await;
        assert!(matches.functions.is_empty());
        assert_eq!(matches.warnings.len(), 1);
        assert!(matches.warnings[0].contains("linux/amd64"));
    }

    #[tokio::test]
    async fn test_claims_source_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("api/main.go"), b"package main");
        write(&dir.path().join("worker/worker.go"), b"package main");
        write(&dir.path().join("other/lib.go"), b"package lib");

        let ctx = test_context();
        let paths = vec![
            dir.path().join("api"),
            dir.path().join("worker"),
            dir.path().join("other"),
        ];
        let matches = GoRuntime.find_functions_in_paths(&paths, &ctx).await;
        let mut names: Vec<_> = matches.functions.iter().map(|f| f.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["api", "worker"]);
    }

    #[tokio::test]
    async fn test_missing_toolchain_gets_install_hint() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("api/main.go"), b"package main");

        let runner = Arc::new(MockToolRunner::new());
        runner.respond(
            "go",
            Err(ToolError::NotFound {
                tool: "go".to_string(),
            }),
        );
        let ctx = test_context_with_runner(runner);
        let function = GoRuntime
            .find_function_in_path(&dir.path().join("api"), &ctx)
            .await
            .unwrap();

        let err = GoRuntime.zip_function(&function, &ctx).await.unwrap_err();
        assert_eq!(err.kind, FunctionErrorKind::ToolchainMissing);
        assert!(err.source.to_string().contains("https://go.dev/dl/"));
        assert_eq!(err.runtime, Some(RuntimeId::Go));
    }

    #[tokio::test]
    async fn test_compilation_failure_preserves_tool_output() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("api/main.go"), b"package main\nbroken");

        let runner = Arc::new(MockToolRunner::failing());
        let ctx = test_context_with_runner(runner);
        let function = GoRuntime
            .find_function_in_path(&dir.path().join("api"), &ctx)
            .await
            .unwrap();

        let err = GoRuntime.zip_function(&function, &ctx).await.unwrap_err();
        assert_eq!(err.kind, FunctionErrorKind::Compilation);
        assert!(err.source.to_string().contains("scripted failure"));
    }
}
