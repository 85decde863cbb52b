//! Native-module detection
//!
//! A package is native if its manifest declares a binary/native-build
//! field, or if it depends - dev or runtime - on any of a fixed set of
//! marker packages. Native packages are externalized: left as real on-disk
//! dependencies instead of being inlined into a bundle, with their resolved
//! install path and version recorded.

use super::manifest::PackageJson;
use serde::Serialize;
use std::path::PathBuf;

/// Resolved install location and version of an externalized native module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeModuleInfo {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Packages whose presence in a dependency table marks the dependent as
/// native.
pub const NATIVE_MODULE_MARKERS: &[&str] = &[
    "bindings",
    "nan",
    "node-gyp",
    "node-gyp-build",
    "node-pre-gyp",
    "@mapbox/node-pre-gyp",
    "prebuild",
    "prebuild-install",
];

/// Classifies one package manifest.
pub fn is_native_module(manifest: &PackageJson) -> bool {
    if manifest.binary.is_some() || manifest.gypfile {
        return true;
    }
    manifest
        .dependencies
        .keys()
        .chain(manifest.dev_dependencies.keys())
        .any(|name| NATIVE_MODULE_MARKERS.contains(&name.as_str()))
}
