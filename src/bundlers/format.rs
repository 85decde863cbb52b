//! Module-format resolution
//!
//! Extensions with an unambiguous format decide immediately; otherwise the
//! nearest ancestor package.json's `type` field decides, defaulting to
//! CommonJS when absent.

use super::manifest::PackageJson;
use crate::fs::FsCache;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    #[default]
    #[serde(rename = "cjs")]
    CommonJs,
    #[serde(rename = "esm")]
    EsModule,
}

const ESM_EXTENSIONS: &[&str] = &["mjs", "mts"];
const CJS_EXTENSIONS: &[&str] = &["cjs", "cts"];

/// Resolves the module format of a file from its extension, then from the
/// nearest manifest.
pub async fn resolve_module_format(file: &Path, fs: &FsCache) -> ModuleFormat {
    let extension = file
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if ESM_EXTENSIONS.contains(&extension) {
        return ModuleFormat::EsModule;
    }
    if CJS_EXTENSIONS.contains(&extension) {
        return ModuleFormat::CommonJs;
    }

    let start = file.parent().unwrap_or(Path::new("/"));
    match nearest_manifest(start, fs).await {
        Some((_, manifest)) if manifest.declares_module_type() => ModuleFormat::EsModule,
        _ => ModuleFormat::CommonJs,
    }
}

/// Walks up from `dir` to the nearest package.json.
pub async fn nearest_manifest(dir: &Path, fs: &FsCache) -> Option<(PathBuf, PackageJson)> {
    let mut current = Some(dir);
    while let Some(dir) = current {
        let candidate = dir.join("package.json");
        if let Ok(text) = fs.read_to_string(&candidate).await {
            return Some((candidate.clone(), PackageJson::parse(&text, &candidate)));
        }
        current = dir.parent();
    }
    None
}
