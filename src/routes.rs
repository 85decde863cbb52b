//! Route compilation
//!
//! A path declaration without pattern syntax compiles to a literal route
//! matched by exact string comparison. Anything else is translated from
//! URL-pattern syntax into an anchored regular expression, with an optional
//! trailing slash always permitted. Bad declarations are user-facing
//! configuration errors tagged with the owning function's name by the
//! caller.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Characters that make a declaration a pattern rather than a literal:
/// wildcards, named parameters, parentheses, brackets, optional markers.
const PATTERN_SYNTAX: &[char] = &['*', ':', '(', ')', '[', ']', '?'];

const KNOWN_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route path must be a string starting with '/': '{path}'")]
    MissingSlash { path: String },

    #[error("could not compile route pattern '{path}': {message}")]
    InvalidPattern { path: String, message: String },

    #[error("invalid HTTP method '{method}' for route '{path}'")]
    InvalidMethod { path: String, method: String },
}

/// A compiled route
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Route {
    /// The original declaration
    pub pattern: String,

    /// Exact-match path, for declarations without pattern syntax
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,

    /// Anchored regular expression, for pattern declarations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// HTTP methods served; empty means all
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

impl Route {
    /// Whether a request path matches this route. Pattern routes always
    /// permit one trailing slash.
    pub fn is_match(&self, path: &str) -> bool {
        if let Some(literal) = &self.literal {
            return literal == path;
        }
        match &self.expression {
            Some(expression) => Regex::new(expression)
                .map(|re| re.is_match(path))
                .unwrap_or(false),
            None => false,
        }
    }
}

/// Compiles one route declaration.
pub fn compile_route(path: &str, methods: &[String]) -> Result<Route, RouteError> {
    if !path.starts_with('/') {
        return Err(RouteError::MissingSlash {
            path: path.to_string(),
        });
    }
    let methods = validate_methods(path, methods)?;

    if !path.contains(PATTERN_SYNTAX) {
        return Ok(Route {
            pattern: path.to_string(),
            literal: Some(path.to_string()),
            expression: None,
            methods,
        });
    }

    let expression = pattern_to_expression(path);
    if let Err(err) = Regex::new(&expression) {
        return Err(RouteError::InvalidPattern {
            path: path.to_string(),
            message: err.to_string(),
        });
    }
    Ok(Route {
        pattern: path.to_string(),
        literal: None,
        expression: Some(expression),
        methods,
    })
}

fn validate_methods(path: &str, methods: &[String]) -> Result<Vec<String>, RouteError> {
    methods
        .iter()
        .map(|method| {
            let upper = method.to_ascii_uppercase();
            if KNOWN_METHODS.contains(&upper.as_str()) {
                Ok(upper)
            } else {
                Err(RouteError::InvalidMethod {
                    path: path.to_string(),
                    method: method.clone(),
                })
            }
        })
        .collect()
}

/// Translates URL-pattern syntax into an anchored regular expression:
/// `:name` segments become single-segment captures, `*` a greedy capture,
/// parenthesized and bracketed groups are kept verbatim, everything else is
/// escaped. A trailing slash is always optional.
fn pattern_to_expression(path: &str) -> String {
    let mut expression = String::from("^");
    let chars: Vec<char> = path.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            ':' => {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                expression.push_str("([^/]+)");
            }
            '*' => {
                expression.push_str("(.*)");
                i += 1;
            }
            '(' => {
                let mut depth = 0;
                while i < chars.len() {
                    let c = chars[i];
                    expression.push(c);
                    i += 1;
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            '[' => {
                while i < chars.len() {
                    let c = chars[i];
                    expression.push(c);
                    i += 1;
                    if c == ']' {
                        break;
                    }
                }
            }
            c => {
                let escaped = regex::escape(&c.to_string());
                expression.push_str(&escaped);
                i += 1;
            }
        }
    }
    expression.push_str("/?$");
    expression
}
