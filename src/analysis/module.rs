//! Module-level summary of one source file
//!
//! A single scan over the token stream collects everything the bundlers and
//! the configuration extractor need: import/require records (static and
//! dynamic), import bindings, top-level constant initializers, exported
//! expressions, and whether the file uses ES module syntax.

use super::ast::{Expr, ExprKind};
use super::lexer::{lex, Token};
use super::parser::Parser;
use std::collections::HashMap;

/// How a module reference appears in source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Require,
    Import,
    DynamicImport,
    ExportFrom,
}

/// The argument of a module reference
#[derive(Debug, Clone, PartialEq)]
pub enum Specifier {
    /// String-literal specifier
    Literal(String),
    /// Computed specifier, kept as an expression for glob reduction
    Dynamic(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub kind: ImportKind,
    pub specifier: Specifier,
}

/// A local name introduced by an import or a whole-module require
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub module: String,
    /// Imported name; `"*"` for namespace/whole-module, `"default"` for
    /// default imports
    pub imported: String,
}

#[derive(Debug, Default)]
pub struct ModuleSummary {
    pub imports: Vec<ImportRecord>,
    pub bindings: HashMap<String, Binding>,
    pub has_esm_syntax: bool,
    consts: HashMap<String, Expr>,
    cjs_exports: HashMap<String, Expr>,
    esm_exports: HashMap<String, Expr>,
    /// `export { local as exported }` pairs: (exported, local)
    export_aliases: Vec<(String, String)>,
}

impl ModuleSummary {
    /// The expression bound to an exported name, resolving `export { name }`
    /// through top-level constant initializers.
    pub fn export_expr(&self, name: &str) -> Option<&Expr> {
        if let Some(expr) = self.cjs_exports.get(name) {
            return Some(expr);
        }
        if let Some(expr) = self.esm_exports.get(name) {
            return Some(expr);
        }
        self.export_aliases
            .iter()
            .find(|(exported, _)| exported == name)
            .and_then(|(_, local)| self.consts.get(local))
    }

    /// Literal specifiers of every static or dynamic module reference.
    pub fn literal_specifiers(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().filter_map(|record| match &record.specifier {
            Specifier::Literal(s) => Some(s.as_str()),
            Specifier::Dynamic(_) => None,
        })
    }
}

/// Summarizes one source file. Never fails: unsupported syntax simply
/// contributes nothing to the summary.
pub fn summarize(src: &str) -> ModuleSummary {
    let tokens = lex(src);
    let mut summary = ModuleSummary::default();
    let mut i = 0;
    while i < tokens.len() {
        let after_dot = i > 0 && tokens[i - 1].is_punct(".");
        let consumed = if after_dot {
            0
        } else {
            match &tokens[i] {
                Token::Ident(name) if name == "import" => scan_import(&tokens[i..], &mut summary),
                Token::Ident(name) if name == "export" => scan_export(&tokens[i..], &mut summary),
                Token::Ident(name) if name == "require" => scan_require(&tokens[i..], &mut summary),
                Token::Ident(name) if name == "const" || name == "let" || name == "var" => {
                    scan_declaration(&tokens[i..], &mut summary)
                }
                Token::Ident(name) if name == "module" => {
                    scan_cjs_export(&tokens[i..], &mut summary, true)
                }
                Token::Ident(name) if name == "exports" => {
                    scan_cjs_export(&tokens[i..], &mut summary, false)
                }
                _ => 0,
            }
        };
        // Declarations and export scans deliberately return 0 or a partial
        // consumption so nested require calls are still visited.
        i += consumed.max(1);
    }
    summary
}

/// `import ...` - static declaration or dynamic `import(...)` call.
/// Returns tokens consumed.
fn scan_import(tokens: &[Token], summary: &mut ModuleSummary) -> usize {
    match tokens.get(1) {
        // Dynamic import call
        Some(t) if t.is_punct("(") => {
            let mut parser = Parser::new(&tokens[2..]);
            let args = parser.parse_call_args();
            if let Some(first) = args.into_iter().next() {
                summary.imports.push(ImportRecord {
                    kind: ImportKind::DynamicImport,
                    specifier: specifier_from_expr(first),
                });
            }
            2 + parser.consumed()
        }
        // import.meta
        Some(t) if t.is_punct(".") => 0,
        // Side-effect import: import 'module'
        Some(Token::Str(module)) => {
            summary.has_esm_syntax = true;
            summary.imports.push(ImportRecord {
                kind: ImportKind::Import,
                specifier: Specifier::Literal(module.clone()),
            });
            2
        }
        // Full import clause
        _ => {
            summary.has_esm_syntax = true;
            let mut bindings: Vec<(String, String)> = Vec::new();
            let mut j = 1;
            while j < tokens.len() {
                match &tokens[j] {
                    Token::Ident(name) if name == "from" => {
                        if let Some(Token::Str(module)) = tokens.get(j + 1) {
                            for (local, imported) in bindings {
                                summary.bindings.insert(
                                    local,
                                    Binding {
                                        module: module.clone(),
                                        imported,
                                    },
                                );
                            }
                            summary.imports.push(ImportRecord {
                                kind: ImportKind::Import,
                                specifier: Specifier::Literal(module.clone()),
                            });
                            return j + 2;
                        }
                        return j + 1;
                    }
                    Token::Punct(";") => return j + 1,
                    Token::Punct("{") => {
                        let (named, consumed) = scan_named_list(&tokens[j..]);
                        bindings.extend(named);
                        j += consumed;
                    }
                    Token::Punct("*") => {
                        // * as ns
                        if let (Some(as_tok), Some(Token::Ident(local))) =
                            (tokens.get(j + 1), tokens.get(j + 2))
                        {
                            if as_tok.is_ident("as") {
                                bindings.push((local.clone(), "*".to_string()));
                                j += 3;
                                continue;
                            }
                        }
                        j += 1;
                    }
                    Token::Ident(local) => {
                        bindings.push((local.clone(), "default".to_string()));
                        j += 1;
                    }
                    _ => j += 1,
                }
            }
            j
        }
    }
}

/// `{ a, b as c, d: e }` - returns (local, imported) pairs and tokens
/// consumed including both braces. Accepts both `as` (import clauses) and
/// `:` (destructuring) renames.
fn scan_named_list(tokens: &[Token]) -> (Vec<(String, String)>, usize) {
    let mut names = Vec::new();
    let mut j = 1;
    while j < tokens.len() {
        match &tokens[j] {
            Token::Punct("}") => return (names, j + 1),
            Token::Ident(imported) => {
                let rename = match (tokens.get(j + 1), tokens.get(j + 2)) {
                    (Some(as_tok), Some(Token::Ident(local)))
                        if as_tok.is_ident("as") || as_tok.is_punct(":") =>
                    {
                        Some(local.clone())
                    }
                    _ => None,
                };
                match rename {
                    Some(local) => {
                        names.push((local, imported.clone()));
                        j += 3;
                    }
                    None => {
                        names.push((imported.clone(), imported.clone()));
                        j += 1;
                    }
                }
            }
            _ => j += 1,
        }
    }
    (names, j)
}

/// `export ...` - named/default exports and re-exports.
fn scan_export(tokens: &[Token], summary: &mut ModuleSummary) -> usize {
    summary.has_esm_syntax = true;
    match tokens.get(1) {
        Some(Token::Punct("{")) => {
            let (named, consumed) = scan_named_list(&tokens[1..]);
            // `export { x } from 'module'` is a re-export, not a local alias
            if let (Some(from_tok), Some(Token::Str(module))) =
                (tokens.get(1 + consumed), tokens.get(2 + consumed))
            {
                if from_tok.is_ident("from") {
                    summary.imports.push(ImportRecord {
                        kind: ImportKind::ExportFrom,
                        specifier: Specifier::Literal(module.clone()),
                    });
                    return 3 + consumed;
                }
            }
            for (renamed, ident) in named {
                summary.export_aliases.push((renamed, ident));
            }
            1 + consumed
        }
        Some(Token::Punct("*")) => {
            let mut j = 2;
            // export * [as ns] from 'module'
            while j < tokens.len() && !tokens[j].is_ident("from") {
                j += 1;
            }
            if let Some(Token::Str(module)) = tokens.get(j + 1) {
                summary.imports.push(ImportRecord {
                    kind: ImportKind::ExportFrom,
                    specifier: Specifier::Literal(module.clone()),
                });
                return j + 2;
            }
            j
        }
        Some(Token::Ident(kw)) if kw == "default" => {
            let mut parser = Parser::new(&tokens[2..]);
            let expr = parser.parse_expr();
            summary.esm_exports.insert("default".to_string(), expr);
            2 + parser.consumed()
        }
        Some(Token::Ident(kw)) if kw == "const" || kw == "let" || kw == "var" => {
            if let (Some(Token::Ident(name)), Some(eq)) = (tokens.get(2), tokens.get(3)) {
                if eq.is_punct("=") {
                    let expr = Parser::new(&tokens[4..]).parse_expr();
                    summary.esm_exports.insert(name.clone(), expr);
                }
            }
            // Leave the initializer tokens to the main scan
            2
        }
        _ => 1,
    }
}

/// `require(...)` call.
fn scan_require(tokens: &[Token], summary: &mut ModuleSummary) -> usize {
    let Some(open) = tokens.get(1) else { return 0 };
    if !open.is_punct("(") {
        return 0;
    }
    let mut parser = Parser::new(&tokens[2..]);
    let args = parser.parse_call_args();
    if let Some(first) = args.into_iter().next() {
        summary.imports.push(ImportRecord {
            kind: ImportKind::Require,
            specifier: specifier_from_expr(first),
        });
    }
    2 + parser.consumed()
}

/// `const name = expr` / `const { a, b } = require('module')`.
/// Records bindings and initializers without consuming the initializer, so
/// require calls inside it are still scanned.
fn scan_declaration(tokens: &[Token], summary: &mut ModuleSummary) -> usize {
    match tokens.get(1) {
        Some(Token::Ident(name)) => {
            if tokens.get(2).map(|t| t.is_punct("=")).unwrap_or(false) {
                let expr = Parser::new(&tokens[3..]).parse_expr();
                if let ExprKind::Call { callee, args } = expr.as_ref() {
                    if let (ExprKind::Ident(callee_name), Some(module)) =
                        (callee.as_ref(), args.first().and_then(|a| a.as_str()))
                    {
                        if callee_name == "require" {
                            summary.bindings.insert(
                                name.clone(),
                                Binding {
                                    module: module.to_string(),
                                    imported: "*".to_string(),
                                },
                            );
                        }
                    }
                }
                summary.consts.insert(name.clone(), expr);
            }
            1
        }
        Some(Token::Punct("{")) => {
            let (named, consumed) = scan_named_list(&tokens[1..]);
            let rest = &tokens[1 + consumed..];
            if rest.first().map(|t| t.is_punct("=")).unwrap_or(false)
                && rest.get(1).map(|t| t.is_ident("require")).unwrap_or(false)
                && rest.get(2).map(|t| t.is_punct("(")).unwrap_or(false)
            {
                if let Some(Token::Str(module)) = rest.get(3) {
                    for (local, imported) in named {
                        summary.bindings.insert(
                            local,
                            Binding {
                                module: module.clone(),
                                imported,
                            },
                        );
                    }
                }
            }
            1
        }
        _ => 1,
    }
}

/// `module.exports.name = expr` / `exports.name = expr`.
fn scan_cjs_export(tokens: &[Token], summary: &mut ModuleSummary, qualified: bool) -> usize {
    let mut j = 1;
    if qualified {
        if !(tokens.get(1).map(|t| t.is_punct(".")).unwrap_or(false)
            && tokens.get(2).map(|t| t.is_ident("exports")).unwrap_or(false))
        {
            return 0;
        }
        j = 3;
    }
    let (Some(dot), Some(Token::Ident(name)), Some(eq)) =
        (tokens.get(j), tokens.get(j + 1), tokens.get(j + 2))
    else {
        return 0;
    };
    if !dot.is_punct(".") || !eq.is_punct("=") {
        return 0;
    }
    let expr = Parser::new(&tokens[j + 3..]).parse_expr();
    summary.cjs_exports.insert(name.clone(), expr);
    // Initializer tokens stay visible to the main scan
    j + 3
}

fn specifier_from_expr(expr: Expr) -> Specifier {
    match *expr {
        ExprKind::Str(value) => Specifier::Literal(value),
        other => Specifier::Dynamic(Box::new(other)),
    }
}
