//! Included-files expansion
//!
//! Config-provided globs (and globs produced by dynamic-import analysis)
//! are expanded against the filesystem. Patterns prefixed with `!` exclude
//! previously matched files.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Default)]
pub struct IncludedFiles {
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Expands globs relative to `base`. Invalid patterns are downgraded to
/// warnings; matching is against the path relative to the base directory.
pub fn expand_included_files(patterns: &[String], base: &Path) -> IncludedFiles {
    let mut result = IncludedFiles::default();
    if patterns.is_empty() {
        return result;
    }

    let mut includes = GlobSetBuilder::new();
    let mut excludes = GlobSetBuilder::new();
    let mut any_include = false;
    for pattern in patterns {
        let (negated, raw) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern.as_str()),
        };
        let raw = raw.trim_start_matches("./");
        match GlobBuilder::new(raw).literal_separator(false).build() {
            Ok(glob) => {
                if negated {
                    excludes.add(glob);
                } else {
                    includes.add(glob);
                    any_include = true;
                }
            }
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "Skipping invalid included-files pattern");
                result
                    .warnings
                    .push(format!("invalid included files pattern '{}'", pattern));
            }
        }
    }
    if !any_include {
        return result;
    }
    let includes = match includes.build() {
        Ok(set) => set,
        Err(err) => {
            result
                .warnings
                .push(format!("could not compile included files patterns: {}", err));
            return result;
        }
    };
    let excludes = excludes.build().unwrap_or_else(|_| GlobSet::empty());

    for entry in WalkBuilder::new(base)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build()
        .flatten()
    {
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Ok(relative) = path.strip_prefix(base) else {
            continue;
        };
        if includes.is_match(relative) && !excludes.is_match(relative) {
            result.files.push(path.to_path_buf());
        }
    }
    result.files.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_expand_simple_glob() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("data/en.json"));
        write(&dir.path().join("data/fr.json"));
        write(&dir.path().join("data/readme.md"));

        let result =
            expand_included_files(&["data/*.json".to_string()], dir.path());
        assert_eq!(result.files.len(), 2);
        assert!(result.files.iter().all(|f| f.extension().unwrap() == "json"));
    }

    #[test]
    fn test_leading_dot_slash_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("files/de.json"));

        let result = expand_included_files(&["./files/*.json".to_string()], dir.path());
        assert_eq!(result.files, vec![dir.path().join("files/de.json")]);
    }

    #[test]
    fn test_negated_pattern_excludes() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("data/en.json"));
        write(&dir.path().join("data/secrets.json"));

        let result = expand_included_files(
            &[
                "data/*.json".to_string(),
                "!data/secrets.json".to_string(),
            ],
            dir.path(),
        );
        assert_eq!(result.files, vec![dir.path().join("data/en.json")]);
    }

    #[test]
    fn test_invalid_pattern_warns() {
        let dir = tempfile::tempdir().unwrap();
        let result = expand_included_files(&["data/[".to_string()], dir.path());
        assert!(result.files.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_star_crosses_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("files/nested/deep.json"));

        let result = expand_included_files(&["files/*.json".to_string()], dir.path());
        // literal_separator(false): `*` spans path separators, matching the
        // permissive capture dynamic imports need
        assert_eq!(result.files, vec![dir.path().join("files/nested/deep.json")]);
    }
}
