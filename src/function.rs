//! Function descriptors
//!
//! A [`FunctionSource`] is created once per discovered function, is
//! immutable after classification, and is consumed by exactly one build
//! call. An [`ArchiveDescriptor`] is the per-function output of a run.

use crate::bundlers::{BundlerId, NativeModuleInfo};
use crate::config::FunctionConfig;
use crate::fs::FileStat;
use crate::routes::Route;
use crate::runtimes::RuntimeId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One discovered function
#[derive(Debug, Clone)]
pub struct FunctionSource {
    /// Function name, derived from the file stem or directory name
    pub name: String,
    /// The classified path (file or directory)
    pub src_path: PathBuf,
    /// Directory containing the function
    pub src_dir: PathBuf,
    /// Entry file; equals `src_path` for single-file functions
    pub main_file: PathBuf,
    /// Entry extension without the dot; empty for binaries
    pub extension: String,
    /// File name of `src_path`
    pub filename: String,
    /// Stat captured at classification time
    pub stat: FileStat,
    /// Runtime that claimed the path
    pub runtime: RuntimeId,
    /// Effective configuration for this function
    pub config: FunctionConfig,
}

impl FunctionSource {
    /// Name a path would be registered under, used for dedupe keying
    /// before a full descriptor exists.
    pub fn name_for_path(path: &Path) -> String {
        let stem = path.file_stem().and_then(|s| s.to_str());
        match stem {
            Some(stem) => stem.to_string(),
            None => path.to_string_lossy().into_owned(),
        }
    }
}

/// Per-function output of a run, serialized with empty fields stripped.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveDescriptor {
    pub name: String,

    /// Destination of the archive (zip file) or flat copy
    pub path: PathBuf,

    /// Final byte size; archives only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    pub runtime: RuntimeId,

    /// Bundler used; Node functions only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundler: Option<BundlerId>,

    /// Input files that fed the archive
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub src_files: Vec<PathBuf>,

    /// Native modules externalized from the bundle: name -> resolved
    /// install path and version
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub native_modules: BTreeMap<String, NativeModuleInfo>,

    /// Cron schedule from config or in-source declaration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Compiled routes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
