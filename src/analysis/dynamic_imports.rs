//! Dynamic-import-to-glob resolution
//!
//! When source code calls `require` or dynamic `import` with a computed
//! argument, the argument expression is reduced to an ordered list of glob
//! segments: literal pieces are kept verbatim, any identifier,
//! sub-expression or call becomes a wildcard token. A valid segment list is
//! joined into one glob pattern anchored at the importing file's directory
//! and made relative to the function's base path. Invalid lists leave the
//! import unresolved - the caller downgrades that to a warning, never an
//! error.

use super::ast::ExprKind;
use std::path::{Component, Path, PathBuf};

/// One piece of a reduced import argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Wildcard,
    /// A literal that is not a string (number, array, ...). Poisons the list.
    NonString,
}

/// A statically resolved dynamic import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicImport {
    /// Glob matching every file the import may reference, relative to the
    /// function's base path
    pub glob: String,
    /// The original static head of the import argument
    pub original_head: String,
    /// The head rewritten to be correct relative to the base path, for
    /// bundles whose entry is flattened to the archive root
    pub rewritten_head: String,
}

/// Depth-first reduction of an import argument expression.
pub fn reduce(expr: &ExprKind) -> Vec<Segment> {
    match expr {
        ExprKind::Str(value) => vec![Segment::Literal(value.clone())],
        ExprKind::Num(_) | ExprKind::Array(_) => vec![Segment::NonString],
        ExprKind::Binary { op, left, right } if op == "+" => {
            let mut segments = reduce(left);
            segments.extend(reduce(right));
            segments
        }
        ExprKind::Tpl { quasis, exprs } => {
            let mut segments = Vec::new();
            for (i, quasi) in quasis.iter().enumerate() {
                if !quasi.is_empty() {
                    segments.push(Segment::Literal(quasi.clone()));
                }
                if let Some(expr) = exprs.get(i) {
                    segments.extend(reduce(expr));
                }
            }
            if segments.is_empty() {
                segments.push(Segment::Literal(String::new()));
            }
            segments
        }
        // Identifiers, calls, members, other operators, opaque nodes: any
        // value could flow through here
        _ => vec![Segment::Wildcard],
    }
}

/// Joins a segment list into a glob, or `None` when the list is invalid:
/// a glob must consist of string pieces and have a static head.
pub fn glob_from_segments(segments: &[Segment]) -> Option<String> {
    if segments.iter().any(|s| *s == Segment::NonString) {
        return None;
    }
    let Some(Segment::Literal(head)) = segments.first() else {
        return None;
    };
    if head.is_empty() {
        return None;
    }
    let mut glob = String::new();
    let mut last_was_wildcard = false;
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                glob.push_str(text);
                last_was_wildcard = false;
            }
            Segment::Wildcard => {
                if !last_was_wildcard {
                    glob.push('*');
                }
                last_was_wildcard = true;
            }
            Segment::NonString => unreachable!("checked above"),
        }
    }
    Some(glob)
}

/// Resolves a dynamic import argument into a glob relative to `base_path`,
/// anchored at the importing file's directory.
///
/// Only relative imports (`./`, `../`) can be captured; bare module
/// specifiers resolve to `None`.
pub fn resolve_dynamic_import(
    expr: &ExprKind,
    importing_dir: &Path,
    base_path: &Path,
) -> Option<DynamicImport> {
    let segments = reduce(expr);
    let glob = glob_from_segments(&segments)?;
    if !glob.starts_with("./") && !glob.starts_with("../") {
        return None;
    }

    // Split the static directory part from the first wildcard so path
    // normalization never touches wildcard characters.
    let (static_head, dynamic_tail) = match glob.find('*') {
        Some(pos) => glob.split_at(pos),
        None => (glob.as_str(), ""),
    };

    // Lexical normalization drops a trailing slash; keep it by hand so the
    // glob still separates its static head from the wildcard tail.
    let head_ends_with_slash = static_head.ends_with('/');
    let anchored = normalize(&importing_dir.join(static_head));
    let relative = relative_to(&anchored, base_path)?;

    let mut rewritten_head = String::from("./");
    rewritten_head.push_str(&relative);
    if head_ends_with_slash && !relative.is_empty() {
        rewritten_head.push('/');
    }

    let mut resolved = rewritten_head.clone();
    resolved.push_str(dynamic_tail);

    Some(DynamicImport {
        glob: resolved,
        original_head: static_head.to_string(),
        rewritten_head,
    })
}

/// Lexical normalization: resolves `.` and `..` components without touching
/// the filesystem. A trailing slash in the input is preserved semantically
/// by the caller keeping head/tail split.
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

/// The path of `path` relative to `base`, as a forward-slash string.
/// `None` when `path` is not a descendant of `base`.
fn relative_to(path: &Path, base: &Path) -> Option<String> {
    let base = normalize(base);
    let stripped = path.strip_prefix(&base).ok()?;
    let mut out = String::new();
    for component in stripped.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::parser::parse_expression;

    fn resolve(src: &str) -> Option<DynamicImport> {
        let expr = parse_expression(src);
        resolve_dynamic_import(&expr, Path::new("/proj/fn"), Path::new("/proj/fn"))
    }

    #[test]
    fn test_concat_reduces_to_glob() {
        let resolved = resolve("'./files/' + lang + '.json'").unwrap();
        assert_eq!(resolved.glob, "./files/*.json");
    }

    #[test]
    fn test_concat_is_idempotent() {
        let first = resolve("'./files/' + lang + '.json'").unwrap();
        let second = resolve("'./files/' + lang + '.json'").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_template_reduces_to_glob() {
        let resolved = resolve("`./locale/${lang}/messages.json`").unwrap();
        assert_eq!(resolved.glob, "./locale/*/messages.json");
    }

    #[test]
    fn test_call_becomes_wildcard() {
        let resolved = resolve("'./data/' + getName()").unwrap();
        assert_eq!(resolved.glob, "./data/*");
    }

    #[test]
    fn test_consecutive_wildcards_collapse() {
        let resolved = resolve("'./data/' + a + b").unwrap();
        assert_eq!(resolved.glob, "./data/*");
    }

    #[test]
    fn test_wildcard_head_is_invalid() {
        assert_eq!(resolve("lang + '.json'"), None);
    }

    #[test]
    fn test_numeric_piece_is_invalid() {
        assert_eq!(resolve("'./files/' + 42"), None);
    }

    #[test]
    fn test_bare_specifier_is_not_captured() {
        assert_eq!(resolve("'lodash/' + method"), None);
    }

    #[test]
    fn test_anchoring_below_base_path() {
        let expr = parse_expression("'./files/' + lang + '.json'");
        let resolved =
            resolve_dynamic_import(&expr, Path::new("/proj/fn/lib"), Path::new("/proj/fn"))
                .unwrap();
        assert_eq!(resolved.glob, "./lib/files/*.json");
        assert_eq!(resolved.original_head, "./files/");
        assert_eq!(resolved.rewritten_head, "./lib/files/");
    }

    #[test]
    fn test_parent_traversal_outside_base_is_invalid() {
        let expr = parse_expression("'../../outside/' + x");
        assert_eq!(
            resolve_dynamic_import(&expr, Path::new("/proj/fn"), Path::new("/proj/fn")),
            None
        );
    }
}
