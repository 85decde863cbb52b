//! Expression tree for analyzed program text
//!
//! The tree is deliberately small: only the node kinds the two analysis
//! passes (dynamic-import reduction, in-source configuration extraction)
//! can act on are represented. Everything else parses to [`ExprKind::Opaque`],
//! the explicit "unanalyzable" signal - unsupported syntax is never an error.

/// Boxed expression node
pub type Expr = Box<ExprKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// String literal with escapes decoded
    Str(String),
    /// Numeric literal, kept as source text
    Num(String),
    /// Identifier reference
    Ident(String),
    /// Template literal: n+1 quasis interleaved with n embedded expressions
    Tpl { quasis: Vec<String>, exprs: Vec<Expr> },
    /// Array literal
    Array(Vec<Expr>),
    /// Member access; computed members carry an empty property name
    Member {
        object: Expr,
        property: String,
        computed: bool,
    },
    /// Call expression
    Call { callee: Expr, args: Vec<Expr> },
    /// Binary operator expression
    Binary { op: String, left: Expr, right: Expr },
    /// Anything the parser does not model
    Opaque,
}

impl ExprKind {
    pub fn str(value: impl Into<String>) -> Expr {
        Box::new(ExprKind::Str(value.into()))
    }

    pub fn ident(name: impl Into<String>) -> Expr {
        Box::new(ExprKind::Ident(name.into()))
    }

    pub fn opaque() -> Expr {
        Box::new(ExprKind::Opaque)
    }

    /// The literal string value, if this node is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExprKind::Str(value) => Some(value),
            _ => None,
        }
    }
}
