//! Node-style module resolution
//!
//! Static resolution of import specifiers without executing anything:
//! relative specifiers try extension and index candidates, bare specifiers
//! walk up through node_modules directories. Builtins resolve to nothing.

use super::format::nearest_manifest;
use super::manifest::PackageJson;
use crate::fs::FsCache;
use futures_util::future::{BoxFuture, FutureExt};
use std::path::{Component, Path, PathBuf};

/// Extension candidates, in resolution order.
const EXTENSION_CANDIDATES: &[&str] = &["js", "json", "mjs", "cjs", "ts", "mts", "cts", "node"];

/// Node builtin modules (the subset that matters for tracing; anything
/// with a `node:` prefix is treated as builtin regardless).
const BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "console", "constants", "crypto", "dgram",
    "dns", "domain", "events", "fs", "http", "http2", "https", "module", "net", "os", "path",
    "perf_hooks", "process", "punycode", "querystring", "readline", "repl", "stream",
    "string_decoder", "timers", "tls", "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
];

/// A resolved specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Relative or absolute specifier resolved to a file
    File(PathBuf),
    /// Bare specifier resolved inside a node_modules package
    Module {
        entry: PathBuf,
        package_dir: PathBuf,
        name: String,
    },
}

pub struct NodeResolver<'a> {
    fs: &'a FsCache,
}

impl<'a> NodeResolver<'a> {
    pub fn new(fs: &'a FsCache) -> Self {
        Self { fs }
    }

    /// Resolves `specifier` as imported from `from_dir`. Builtins and
    /// unresolvable specifiers return `None`.
    pub async fn resolve(&self, specifier: &str, from_dir: &Path) -> Option<Resolved> {
        if specifier.starts_with("node:") || BUILTINS.contains(&specifier) {
            return None;
        }
        if specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
        {
            let joined = normalize(&from_dir.join(specifier));
            return self.resolve_as_file_or_dir(&joined).await.map(Resolved::File);
        }
        self.resolve_bare(specifier, from_dir).await
    }

    /// Exact path, extension candidates, then directory entry points.
    /// Boxed because directory resolution recurses through package.json
    /// `main` entries.
    fn resolve_as_file_or_dir<'s>(&'s self, path: &'s Path) -> BoxFuture<'s, Option<PathBuf>> {
        async move {
            if self.fs.is_file(path).await {
                return Some(path.to_path_buf());
            }
            for ext in EXTENSION_CANDIDATES {
                let candidate = PathBuf::from(format!("{}.{}", path.display(), ext));
                if self.fs.is_file(&candidate).await {
                    return Some(candidate);
                }
            }
            if self.fs.is_dir(path).await {
                return self.resolve_directory(path).await;
            }
            None
        }
        .boxed()
    }

    /// package.json `main`, then index candidates.
    async fn resolve_directory(&self, dir: &Path) -> Option<PathBuf> {
        let manifest_path = dir.join("package.json");
        if let Ok(text) = self.fs.read_to_string(&manifest_path).await {
            let manifest = PackageJson::parse(&text, &manifest_path);
            if let Some(main) = manifest.main {
                let main_path = normalize(&dir.join(main.trim_start_matches("./")));
                if let Some(resolved) = self.resolve_as_file_or_dir(&main_path).await {
                    return Some(resolved);
                }
            }
        }
        for ext in EXTENSION_CANDIDATES {
            let candidate = dir.join(format!("index.{}", ext));
            if self.fs.is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    /// Walks up from `from_dir` looking for `node_modules/<name>`.
    async fn resolve_bare(&self, specifier: &str, from_dir: &Path) -> Option<Resolved> {
        let (name, subpath) = split_package_specifier(specifier)?;
        let mut current = Some(from_dir);
        while let Some(dir) = current {
            let package_dir = dir.join("node_modules").join(&name);
            if self.fs.is_dir(&package_dir).await {
                let target = match &subpath {
                    Some(subpath) => normalize(&package_dir.join(subpath)),
                    None => package_dir.clone(),
                };
                if let Some(entry) = self.resolve_as_file_or_dir(&target).await {
                    return Some(Resolved::Module {
                        entry,
                        package_dir,
                        name,
                    });
                }
                return None;
            }
            current = dir.parent();
        }
        None
    }

    /// The manifest governing a file, for version reporting.
    pub async fn manifest_for(&self, file: &Path) -> Option<(PathBuf, PackageJson)> {
        nearest_manifest(file.parent()?, self.fs).await
    }
}

/// Splits a bare specifier into package name and optional subpath,
/// handling scoped packages.
pub fn split_package_specifier(specifier: &str) -> Option<(String, Option<String>)> {
    if specifier.is_empty() {
        return None;
    }
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name = if specifier.starts_with('@') {
        let scope = parts.next()?;
        let package = parts.next()?;
        format!("{}/{}", scope, package)
    } else {
        parts.next()?.to_string()
    };
    let subpath = parts.next().map(str::to_string);
    Some((name, subpath))
}

/// The package name owning a path under node_modules, for "could not
/// statically analyze" warnings: the segment after the last node_modules
/// boundary, two segments for scoped packages.
pub fn package_name_from_path(path: &Path) -> Option<String> {
    let components: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let boundary = components.iter().rposition(|part| part == "node_modules")?;
    let first = components.get(boundary + 1)?;
    if first.starts_with('@') {
        let second = components.get(boundary + 2)?;
        Some(format!("{}/{}", first, second))
    } else {
        Some(first.clone())
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
