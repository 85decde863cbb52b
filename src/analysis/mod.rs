//! Static analysis over program text
//!
//! A small ECMAScript-subset lexer and parser feed two independent
//! tree-walks: dynamic-import-to-glob resolution and in-source
//! configuration extraction. The passes are pure - no filesystem access -
//! and downgrade anything they cannot model to an explicit "unanalyzable"
//! signal instead of failing.

pub mod ast;
pub mod dynamic_imports;
pub mod in_source_config;
pub mod lexer;
pub mod module;
pub mod parser;

pub use ast::{Expr, ExprKind};
pub use dynamic_imports::{resolve_dynamic_import, DynamicImport};
pub use in_source_config::{extract as extract_in_source_config, InSourceConfig, MAIN_EXPORT};
pub use module::{summarize, ImportKind, ImportRecord, ModuleSummary, Specifier};

/// True when the source uses ES module syntax (top-level import/export
/// declarations).
pub fn detect_es_module(src: &str) -> bool {
    summarize(src).has_esm_syntax
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_es_module() {
        assert!(detect_es_module("export const handler = () => {}"));
        assert!(detect_es_module("import x from 'y'\nconsole.log(x)"));
        assert!(!detect_es_module("module.exports.handler = () => {}"));
        assert!(!detect_es_module("const x = require('y')"));
    }
}
