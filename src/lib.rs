//! fnpack - packages serverless function sources into deployable archives
//!
//! fnpack turns a tree of function sources (Node/TypeScript, Go, Rust)
//! into per-function deployable archives. For every candidate path it
//! classifies which toolchain produced it, computes the minimal set of
//! files the function needs at runtime, transforms that set into the
//! target format, and packages it with metadata: routes, schedules and
//! native-module information.
//!
//! # Core Concepts
//!
//! - **Runtimes**: classifiers turning candidate paths into function
//!   descriptors, tried in fixed priority order (Node, Go, Rust)
//! - **Bundler strategies**: interchangeable backends computing a Node
//!   function's file closure behind one contract
//! - **Static analysis**: AST walks over program text resolving dynamic
//!   imports to globs and extracting in-source configuration
//! - **Archive assembly**: zip or flat-copy output with alias remapping
//!   and content rewrites
//!
//! # Example Usage
//!
//! ```no_run
//! use fnpack::pipeline::{pack_functions, RunOptions};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = RunOptions::new(
//!     vec![PathBuf::from("./functions")],
//!     PathBuf::from("./dist"),
//! );
//! let result = pack_functions(options).await?;
//! for archive in &result.archives {
//!     println!("packaged {} -> {}", archive.name, archive.path.display());
//! }
//! for error in &result.errors {
//!     eprintln!("failed: {}", error);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod archive;
pub mod bundlers;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod function;
mod id_enum;
pub mod pipeline;
pub mod routes;
pub mod runtimes;
pub mod sniff;
pub mod toolchain;
pub mod util;

// Re-export key types for convenient access
pub use archive::ArchiveFormat;
pub use bundlers::{BundlerId, DependencyClosure, ModuleFormat};
pub use config::{ConfigMap, FeatureFlags, FunctionConfig};
pub use error::{FunctionError, FunctionErrorKind, RunError};
pub use function::{ArchiveDescriptor, FunctionSource};
pub use pipeline::{pack_functions, RunOptions, RunResult};
pub use routes::Route;
pub use runtimes::RuntimeId;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
