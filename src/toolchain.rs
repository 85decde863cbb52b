//! External toolchain invocation
//!
//! Compilers and bundler engines are external collaborators: the pipeline
//! only needs "run command, get output, get exit code". That capability is
//! the [`ToolRunner`] trait; the system implementation spawns child
//! processes with their own working directory and environment. Per-runtime
//! toolchain installation is a memoized asynchronous singleton for the
//! lifetime of a run - concurrent builds await the same installation.

use crate::runtimes::RuntimeId;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// One external command invocation
#[derive(Debug, Clone, Default)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: &[&str]) -> Self {
        Self {
            tool: tool.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured output of a finished tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The tool binary does not exist on this machine
    #[error("'{tool}' is not installed")]
    NotFound { tool: String },

    #[error("failed to run '{tool}': {message}")]
    Spawn { tool: String, message: String },
}

/// Opaque "run command" capability
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError>;

    /// Cheap presence probe, used to build installation hints
    fn is_available(&self, tool: &str) -> bool;
}

/// Spawns real child processes
pub struct SystemToolRunner;

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        debug!(tool = %invocation.tool, args = ?invocation.args, "Running external tool");
        let mut command = tokio::process::Command::new(&invocation.tool);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        let output = command.output().await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound {
                    tool: invocation.tool.clone(),
                }
            } else {
                ToolError::Spawn {
                    tool: invocation.tool.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn is_available(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }
}

type InstallResult = Result<(), Arc<ToolError>>;

/// Per-run memoized toolchain installation.
///
/// The cache stores the pending installation future itself, keyed by
/// runtime, so concurrent requesters await one underlying execution.
pub struct ToolchainInstaller {
    runner: Arc<dyn ToolRunner>,
    installs: Mutex<HashMap<RuntimeId, Shared<BoxFuture<'static, InstallResult>>>>,
}

impl ToolchainInstaller {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            installs: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the runtime's one-time installation step, at most once per run.
    pub async fn ensure_installed(&self, runtime: RuntimeId) -> InstallResult {
        let op = {
            let mut installs = self.installs.lock().expect("installer lock poisoned");
            if let Some(op) = installs.get(&runtime) {
                op.clone()
            } else {
                let runner = Arc::clone(&self.runner);
                let op = async move {
                    match install_invocation(runtime) {
                        Some(invocation) => {
                            let output =
                                runner.run(invocation).await.map_err(Arc::new)?;
                            if output.success {
                                Ok(())
                            } else {
                                Err(Arc::new(ToolError::Spawn {
                                    tool: "rustup".to_string(),
                                    message: output.stderr,
                                }))
                            }
                        }
                        None => Ok(()),
                    }
                }
                .boxed()
                .shared();
                installs.insert(runtime, op.clone());
                op
            }
        };
        op.await
    }
}

/// Target used for cross-compiled Rust function binaries.
pub const RUST_TARGET: &str = "x86_64-unknown-linux-musl";

fn install_invocation(runtime: RuntimeId) -> Option<ToolInvocation> {
    match runtime {
        RuntimeId::Rust => Some(ToolInvocation::new(
            "rustup",
            &["target", "add", RUST_TARGET],
        )),
        RuntimeId::Go | RuntimeId::Node => None,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MockToolRunner;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_install_runs_once_per_runtime() {
        let runner = Arc::new(MockToolRunner::new());
        let installer = ToolchainInstaller::new(runner.clone());

        let (a, b, c) = tokio::join!(
            installer.ensure_installed(RuntimeId::Rust),
            installer.ensure_installed(RuntimeId::Rust),
            installer.ensure_installed(RuntimeId::Rust),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(runner.run_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_go_install_is_a_no_op() {
        let runner = Arc::new(MockToolRunner::new());
        let installer = ToolchainInstaller::new(runner.clone());
        installer.ensure_installed(RuntimeId::Go).await.unwrap();
        assert_eq!(runner.run_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_install_is_shared() {
        let runner = Arc::new(MockToolRunner::failing());
        let installer = ToolchainInstaller::new(runner.clone());
        let first = installer.ensure_installed(RuntimeId::Rust).await;
        let second = installer.ensure_installed(RuntimeId::Rust).await;
        assert!(first.is_err());
        assert!(second.is_err());
        assert_eq!(runner.run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invocation_builder() {
        let invocation = ToolInvocation::new("go", &["build", "-o", "out"])
            .current_dir("/tmp/build")
            .env("GOOS", "linux");
        assert_eq!(invocation.tool, "go");
        assert_eq!(invocation.args, vec!["build", "-o", "out"]);
        assert_eq!(invocation.cwd.as_deref(), Some(std::path::Path::new("/tmp/build")));
        assert_eq!(invocation.env, vec![("GOOS".to_string(), "linux".to_string())]);
    }
}
