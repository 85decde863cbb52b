//! Archive assembly
//!
//! Packages a dependency closure into a deflate-compressed zip or a flat
//! copy. Alias remapping (on-disk path -> archive path) and content
//! rewrites (path -> replacement text) are applied before writing; entry
//! renaming for custom-runtime conventions is expressed through aliases by
//! the runtime that owns the function.

use crate::bundlers::DependencyClosure;
use crate::define_id_enum;
use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

define_id_enum! {
    /// Output format of the per-function deployable unit
    ArchiveFormat {
        /// Deflate-compressed zip archive
        Zip => "zip" : "zip",
        /// Flat file copy preserving relative structure
        None => "none" : "none",
    }
}

/// One planned archive entry
#[derive(Debug, Clone)]
struct EntrySpec {
    source: PathBuf,
    /// Forward-slash path inside the archive
    archived: String,
    rewrite: Option<String>,
    executable: bool,
}

/// Applies aliases and the base-path invariant to the closure's file set.
fn plan_entries(closure: &DependencyClosure) -> Result<Vec<EntrySpec>> {
    let mut entries = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for source in &closure.src_files {
        let target = closure.aliases.get(source).unwrap_or(source);
        let relative = target.strip_prefix(&closure.base_path).map_err(|_| {
            anyhow!(
                "file '{}' escapes the closure base path '{}'",
                target.display(),
                closure.base_path.display()
            )
        })?;
        let archived = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !seen.insert(archived.clone()) {
            warn!(entry = %archived, "Skipping duplicate archive entry");
            continue;
        }
        entries.push(EntrySpec {
            source: source.clone(),
            archived,
            rewrite: closure.rewrites.get(source).cloned(),
            executable: is_executable(source),
        });
    }
    Ok(entries)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

/// Writes the closure as a zip archive, returning the final byte size.
pub async fn write_zip(dest: &Path, closure: &DependencyClosure) -> Result<u64> {
    let entries = plan_entries(closure)?;
    let dest = dest.to_path_buf();
    debug!(dest = %dest.display(), entries = entries.len(), "Writing archive");

    tokio::task::spawn_blocking(move || write_zip_blocking(&dest, &entries))
        .await
        .context("archive task aborted")?
}

fn write_zip_blocking(dest: &Path, entries: &[EntrySpec]) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(dest)
        .with_context(|| format!("could not create archive '{}'", dest.display()))?;
    let mut writer = ZipWriter::new(file);

    for entry in entries {
        let mode = if entry.executable { 0o755 } else { 0o644 };
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode);
        writer.start_file(entry.archived.as_str(), options)?;
        match &entry.rewrite {
            Some(content) => writer.write_all(content.as_bytes())?,
            None => {
                let bytes = std::fs::read(&entry.source).with_context(|| {
                    format!("could not read '{}'", entry.source.display())
                })?;
                writer.write_all(&bytes)?;
            }
        }
    }

    writer.finish()?;
    let size = std::fs::metadata(dest)?.len();
    Ok(size)
}

/// Copies the closure's files into `dest_dir`, preserving structure
/// relative to the base path. Returns the copied paths.
pub async fn flat_copy(dest_dir: &Path, closure: &DependencyClosure) -> Result<Vec<PathBuf>> {
    let entries = plan_entries(closure)?;
    let dest_dir = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut copied = Vec::new();
        for entry in &entries {
            let target = dest_dir.join(&entry.archived);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match &entry.rewrite {
                Some(content) => std::fs::write(&target, content)?,
                None => {
                    std::fs::copy(&entry.source, &target).with_context(|| {
                        format!("could not copy '{}'", entry.source.display())
                    })?;
                }
            }
            copied.push(target);
        }
        Ok(copied)
    })
    .await
    .context("copy task aborted")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Read;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn closure_fixture(base: &Path) -> DependencyClosure {
        DependencyClosure {
            src_files: vec![base.join("fn.js"), base.join("lib/a.js")],
            base_path: base.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_zip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("fn.js"), "module.exports = 1");
        write(&dir.path().join("lib/a.js"), "module.exports = 2");

        let closure = closure_fixture(dir.path());
        let dest = dir.path().join("out/fn.zip");
        let size = write_zip(&dest, &closure).await.unwrap();
        assert!(size > 0);
        assert_eq!(size, std::fs::metadata(&dest).unwrap().len());

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&dest).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["fn.js", "lib/a.js"]);

        let mut content = String::new();
        archive
            .by_name("fn.js")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "module.exports = 1");
    }

    #[tokio::test]
    async fn test_zip_applies_aliases_and_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("fn.ts"), "export const handler = 1");

        let mut aliases = HashMap::new();
        aliases.insert(dir.path().join("fn.ts"), dir.path().join("fn.js"));
        let mut rewrites = HashMap::new();
        rewrites.insert(
            dir.path().join("fn.ts"),
            "exports.handler = 1".to_string(),
        );
        let closure = DependencyClosure {
            src_files: vec![dir.path().join("fn.ts")],
            base_path: dir.path().to_path_buf(),
            aliases,
            rewrites,
            ..Default::default()
        };

        let dest = dir.path().join("fn.zip");
        write_zip(&dest, &closure).await.unwrap();

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&dest).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("fn.js")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "exports.handler = 1");
    }

    #[tokio::test]
    async fn test_file_outside_base_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("fn.js"), "");
        let closure = DependencyClosure {
            src_files: vec![dir.path().join("fn.js")],
            base_path: dir.path().join("elsewhere"),
            ..Default::default()
        };
        assert!(write_zip(&dir.path().join("fn.zip"), &closure).await.is_err());
    }

    #[tokio::test]
    async fn test_flat_copy_preserves_structure() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/fn.js"), "1");
        write(&dir.path().join("src/lib/a.js"), "2");

        let closure = DependencyClosure {
            src_files: vec![dir.path().join("src/fn.js"), dir.path().join("src/lib/a.js")],
            base_path: dir.path().join("src"),
            ..Default::default()
        };
        let dest = dir.path().join("out");
        let copied = flat_copy(&dest, &closure).await.unwrap();
        assert_eq!(copied.len(), 2);
        assert_eq!(std::fs::read_to_string(dest.join("fn.js")).unwrap(), "1");
        assert_eq!(std::fs::read_to_string(dest.join("lib/a.js")).unwrap(), "2");
    }

    #[test]
    fn test_archive_format_serde() {
        assert_eq!(serde_json::to_string(&ArchiveFormat::Zip).unwrap(), "\"zip\"");
        let parsed: ArchiveFormat = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, ArchiveFormat::None);
    }
}
