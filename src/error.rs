//! Error types for the packaging pipeline
//!
//! Function-scoped failures carry the owning function's name, runtime and
//! bundler so they can be reported alongside successful results without
//! aborting the run. Run-scoped failures abort before any function is
//! processed.

use crate::bundlers::BundlerId;
use crate::runtimes::RuntimeId;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What went wrong for one function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionErrorKind {
    /// External toolchain is not installed
    ToolchainMissing,
    /// External toolchain ran and failed
    Compilation,
    /// Bundling or dependency tracing failed
    Bundling,
    /// User-facing configuration error (routes, rate limits, bundler choice)
    InvalidConfig,
    /// Archive assembly failed
    Archiving,
}

/// A failure scoped to a single function. Never aborts the run.
#[derive(Debug)]
pub struct FunctionError {
    pub function_name: String,
    pub runtime: Option<RuntimeId>,
    pub bundler: Option<BundlerId>,
    pub kind: FunctionErrorKind,
    pub source: anyhow::Error,
}

impl std::error::Error for FunctionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + Send + Sync + 'static) = self.source.as_ref();
        Some(source)
    }
}

impl FunctionError {
    pub fn new(
        function_name: impl Into<String>,
        kind: FunctionErrorKind,
        source: anyhow::Error,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            runtime: None,
            bundler: None,
            kind,
            source,
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeId) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_bundler(mut self, bundler: BundlerId) -> Self {
        self.bundler = Some(bundler);
        self
    }
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}", self.function_name)?;
        if let Some(runtime) = self.runtime {
            write!(f, " (runtime {})", runtime)?;
        }
        if let Some(bundler) = self.bundler {
            write!(f, " (bundler {})", bundler)?;
        }
        write!(f, ": {}", self.source)
    }
}

/// A failure scoped to the whole run. Raised before any function task is
/// spawned.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("none of the configured function directories exist: {missing:?}")]
    NoSourceDirectories { missing: Vec<PathBuf> },

    #[error("destination directory could not be created: {0}")]
    Destination(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_error_display_includes_tags() {
        let err = FunctionError::new(
            "my-func",
            FunctionErrorKind::Compilation,
            anyhow::anyhow!("exit status 1"),
        )
        .with_runtime(RuntimeId::Go);
        let rendered = err.to_string();
        assert!(rendered.contains("my-func"));
        assert!(rendered.contains("go"));
        assert!(rendered.contains("exit status 1"));
    }

    #[test]
    fn test_run_error_display() {
        let err = RunError::NoSourceDirectories {
            missing: vec![PathBuf::from("/missing")],
        };
        assert!(err.to_string().contains("/missing"));
    }
}
