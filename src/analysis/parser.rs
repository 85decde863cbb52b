//! Expression parser over the lexed token stream
//!
//! Precedence-climbing parser for the expression subset the analysis passes
//! understand. Anything outside that subset parses to `ExprKind::Opaque`
//! while still consuming a balanced run of tokens, so the surrounding
//! expression keeps its shape.

use super::ast::{Expr, ExprKind};
use super::lexer::Token;

pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Number of tokens consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if matches!(self.peek(), Some(t) if t.is_punct(p)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Parses one expression. Always makes progress when tokens remain.
    pub fn parse_expr(&mut self) -> Expr {
        self.parse_binary(0)
    }

    /// Parses a parenthesized argument list, assuming the opening `(` is
    /// already consumed. Stops at the matching `)`.
    pub fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(t) if t.is_punct(")") => {
                    self.pos += 1;
                    break;
                }
                Some(t) if t.is_punct(",") => {
                    self.pos += 1;
                }
                _ => args.push(self.parse_expr()),
            }
        }
        args
    }

    fn parse_binary(&mut self, min_prec: u8) -> Expr {
        let mut left = self.parse_postfix();
        while let Some(prec) = self.peek_binary_prec() {
            if prec < min_prec {
                break;
            }
            let op = match self.bump() {
                Some(Token::Punct(p)) => p.to_string(),
                _ => break,
            };
            let right = self.parse_binary(prec + 1);
            left = Box::new(ExprKind::Binary { op, left, right });
        }
        // Ternary: reduce to opaque, consuming both branches
        if self.eat_punct("?") {
            self.parse_expr();
            if self.eat_punct(":") {
                self.parse_expr();
            }
            return ExprKind::opaque();
        }
        left
    }

    fn peek_binary_prec(&self) -> Option<u8> {
        let Some(Token::Punct(p)) = self.peek() else {
            return None;
        };
        let prec = match *p {
            "**" => 14,
            "*" | "/" | "%" => 13,
            "+" | "-" => 12,
            "<" | ">" | "<=" | ">=" => 10,
            "==" | "!=" | "===" | "!==" => 9,
            "&" => 8,
            "^" => 7,
            "|" => 6,
            "&&" => 5,
            "||" | "??" => 4,
            "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "**=" => 2,
            _ => return None,
        };
        Some(prec)
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match self.peek() {
                Some(t) if t.is_punct(".") || t.is_punct("?.") => {
                    self.pos += 1;
                    let property = match self.peek() {
                        Some(Token::Ident(name)) => {
                            let name = name.clone();
                            self.pos += 1;
                            name
                        }
                        _ => String::new(),
                    };
                    expr = Box::new(ExprKind::Member {
                        object: expr,
                        property,
                        computed: false,
                    });
                }
                Some(t) if t.is_punct("[") => {
                    self.pos += 1;
                    self.parse_expr();
                    self.eat_punct("]");
                    expr = Box::new(ExprKind::Member {
                        object: expr,
                        property: String::new(),
                        computed: true,
                    });
                }
                Some(t) if t.is_punct("(") => {
                    self.pos += 1;
                    let args = self.parse_call_args();
                    expr = Box::new(ExprKind::Call { callee: expr, args });
                }
                Some(Token::Template { .. }) => {
                    // Tagged template
                    self.pos += 1;
                    expr = ExprKind::opaque();
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        let Some(token) = self.peek().cloned() else {
            return ExprKind::opaque();
        };
        match token {
            Token::Str(value) => {
                self.pos += 1;
                ExprKind::str(value)
            }
            Token::Num(value) => {
                self.pos += 1;
                Box::new(ExprKind::Num(value))
            }
            Token::Regex(_) => {
                self.pos += 1;
                ExprKind::opaque()
            }
            Token::Template { quasis, exprs } => {
                self.pos += 1;
                let exprs = exprs
                    .iter()
                    .map(|tokens| Parser::new(tokens).parse_expr())
                    .collect();
                Box::new(ExprKind::Tpl { quasis, exprs })
            }
            Token::Punct("(") => {
                self.pos += 1;
                let inner = self.parse_expr();
                self.eat_punct(")");
                if self.peek().map(|t| t.is_punct("=>")).unwrap_or(false) {
                    // Arrow function parameters; consume the body
                    self.pos += 1;
                    self.parse_arrow_body();
                    return ExprKind::opaque();
                }
                inner
            }
            Token::Punct("[") => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        None => break,
                        Some(t) if t.is_punct("]") => {
                            self.pos += 1;
                            break;
                        }
                        Some(t) if t.is_punct(",") => {
                            self.pos += 1;
                        }
                        _ => items.push(self.parse_expr()),
                    }
                }
                Box::new(ExprKind::Array(items))
            }
            Token::Punct("{") => {
                self.consume_balanced_braces();
                ExprKind::opaque()
            }
            Token::Punct("!") | Token::Punct("-") | Token::Punct("+") | Token::Punct("~")
            | Token::Punct("...") | Token::Punct("++") | Token::Punct("--") => {
                self.pos += 1;
                self.parse_postfix();
                ExprKind::opaque()
            }
            Token::Ident(name) => match name.as_str() {
                "function" | "class" => {
                    self.pos += 1;
                    // Optional name and parameter list, then balanced body
                    while let Some(t) = self.peek() {
                        if t.is_punct("{") {
                            break;
                        }
                        self.pos += 1;
                    }
                    self.consume_balanced_braces();
                    ExprKind::opaque()
                }
                "async" => {
                    self.pos += 1;
                    self.parse_primary()
                }
                "new" | "typeof" | "void" | "delete" | "await" => {
                    self.pos += 1;
                    self.parse_postfix();
                    ExprKind::opaque()
                }
                _ => {
                    self.pos += 1;
                    if self.peek().map(|t| t.is_punct("=>")).unwrap_or(false) {
                        // Single-parameter arrow function
                        self.pos += 1;
                        self.parse_arrow_body();
                        return ExprKind::opaque();
                    }
                    ExprKind::ident(name)
                }
            },
            _ => {
                self.pos += 1;
                ExprKind::opaque()
            }
        }
    }

    fn parse_arrow_body(&mut self) {
        if self.peek().map(|t| t.is_punct("{")).unwrap_or(false) {
            self.consume_balanced_braces();
        } else {
            self.parse_expr();
        }
    }

    fn consume_balanced_braces(&mut self) {
        if !self.eat_punct("{") {
            return;
        }
        let mut depth = 1usize;
        while let Some(token) = self.bump() {
            match token {
                Token::Punct("{") => depth += 1,
                Token::Punct("}") => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Parses an expression from source text. Convenience for tests and the
/// analysis walks.
pub fn parse_expression(src: &str) -> Expr {
    let tokens = super::lexer::lex(src);
    Parser::new(&tokens).parse_expr()
}
