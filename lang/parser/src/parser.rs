//! Hand-written recursive-descent parser (`spec.md` §1: "the lexer and
//! recursive-descent parser producing the raw AST" are thin external
//! collaborators, described only by the interface the core consumes).
//!
//! Declarations are newline-insensitive: each declaration's term parse is
//! self-terminating (it stops as soon as no further token continues it), so
//! the top-level loop can simply parse declarations back to back with an
//! optional `;` between them, exactly as `spec.md` §6 describes.

use logos::Logos;

use crate::cst::{Decl, Expr, Module, Path, Span};
use crate::lexer::Token;
use crate::result::{ParseError, ParseResult};

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    eof: Span,
}

pub fn parse_module(source: &str) -> ParseResult<Module> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start as u32, range.end as u32);
        match result {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => return Err(ParseError::invalid_token(span)),
        }
    }
    let eof_at = source.len() as u32;
    let eof = Span::new(eof_at, eof_at);
    let mut parser = Parser { tokens, pos: 0, eof };
    parser.parse_module()
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens.get(self.pos).map(|(_, s)| *s).unwrap_or(self.eof)
    }

    fn advance(&mut self) -> Option<(Token, Span)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn describe(tok: Option<&Token>) -> String {
        match tok {
            Some(t) => format!("{t:?}"),
            None => "end of input".to_string(),
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> ParseResult<Span> {
        match self.advance() {
            Some((tok, span)) if &tok == expected => Ok(span),
            Some((tok, span)) => Err(ParseError::unexpected_token(format!("{tok:?}"), what, span)),
            None => Err(ParseError::UnexpectedEof { expected: what.to_string() }),
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<(String, Span)> {
        match self.advance() {
            Some((Token::Ident(name), span)) => Ok((name, span)),
            Some((tok, span)) => Err(ParseError::unexpected_token(format!("{tok:?}"), what, span)),
            None => Err(ParseError::UnexpectedEof { expected: what.to_string() }),
        }
    }

    fn parse_module(&mut self) -> ParseResult<Module> {
        let mut decls = Vec::new();
        while self.eat(&Token::Semicolon) {}
        while self.peek().is_some() {
            decls.push(self.parse_decl()?);
            while self.eat(&Token::Semicolon) {}
        }
        Ok(Module { decls })
    }

    fn parse_decl(&mut self) -> ParseResult<Decl> {
        let start = self.peek_span();
        let lhs = self.parse_term()?;
        match self.peek() {
            Some(Token::Colon) => {
                self.advance();
                let ty = self.parse_term()?;
                if self.eat(&Token::Eq) {
                    let value = self.parse_term()?;
                    let span = start.merge(value.span());
                    Ok(Decl::TypedDefinition { lhs, ty, value, span })
                } else {
                    let span = start.merge(ty.span());
                    Ok(Decl::TypeAssertion { lhs, ty, span })
                }
            }
            Some(Token::Eq) => {
                self.advance();
                let value = self.parse_term()?;
                let span = start.merge(value.span());
                Ok(Decl::UntypedDefinition { lhs, value, span })
            }
            Some(Token::ColonEq) => {
                self.advance();
                let value = self.parse_term()?;
                let span = start.merge(value.span());
                Ok(Decl::RewriteRule { lhs, value, span })
            }
            Some(Token::ColonEqEqEq) => {
                self.advance();
                let value = self.parse_term()?;
                let span = start.merge(value.span());
                Ok(Decl::EqualityCheck { lhs, value, span })
            }
            other => Err(ParseError::unexpected_token(
                Self::describe(other),
                "`:`, `=`, `:=` or `:===`",
                self.peek_span(),
            )),
        }
    }

    /// Entry point for a full term: a leading `\` makes the whole term a
    /// (possibly nested) lambda, whose body extends as far right as
    /// possible; otherwise delegate to the arrow-level parser.
    fn parse_term(&mut self) -> ParseResult<Expr> {
        if self.peek() == Some(&Token::Backslash) {
            let start = self.peek_span();
            self.advance();
            let (arg, _) = self.expect_ident("a lambda argument name")?;
            let body = self.parse_term()?;
            let span = start.merge(body.span());
            Ok(Expr::Lambda { arg, body: Box::new(body), span })
        } else {
            self.parse_arrow()
        }
    }

    /// `binder_or_atom ("->" arrow)?`, right-associative.
    fn parse_arrow(&mut self) -> ParseResult<Expr> {
        let (arg, left) = self.parse_binder_or_atom()?;
        if self.eat(&Token::Arrow) {
            let output = self.parse_arrow()?;
            let span = left.span().merge(output.span());
            Ok(Expr::Arrow { input: Box::new(left), arg, output: Box::new(output), span })
        } else {
            Ok(left)
        }
    }

    /// Parses `(name : T)` (returning the binder name alongside `T`) or a
    /// plain parenthesised/application term (returning `None`).
    fn parse_binder_or_atom(&mut self) -> ParseResult<(Option<String>, Expr)> {
        if self.peek() == Some(&Token::LParen)
            && matches!(self.peek_at(1), Some(Token::Ident(_)))
            && matches!(self.peek_at(2), Some(Token::Colon))
        {
            let start = self.peek_span();
            self.advance();
            let (name, _) = self.expect_ident("a binder name")?;
            self.advance(); // ':'
            let ty = self.parse_term()?;
            let close = self.expect(&Token::RParen, "`)`")?;
            let _span = start.merge(close);
            Ok((Some(name), ty))
        } else if self.eat(&Token::LParen) {
            let inner = self.parse_term()?;
            self.expect(&Token::RParen, "`)`")?;
            Ok((None, inner))
        } else {
            Ok((None, self.parse_application()?))
        }
    }

    /// A primary term optionally followed by one `(args)` call suffix.
    fn parse_application(&mut self) -> ParseResult<Expr> {
        let func = self.parse_primary()?;
        if self.peek() == Some(&Token::LParen) {
            let start = func.span();
            self.advance();
            let mut args = Vec::new();
            if self.peek() != Some(&Token::RParen) {
                args.push(self.parse_term()?);
                while self.eat(&Token::Comma) {
                    args.push(self.parse_term()?);
                }
            }
            let close = self.expect(&Token::RParen, "`)` to close a call's argument list")?;
            let span = start.merge(close);
            Ok(Expr::Call { func: Box::new(func), args, span })
        } else {
            Ok(func)
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.advance() {
            Some((Token::Type, start)) => {
                self.expect(&Token::LParen, "`(` after `type`")?;
                let subscript = self.parse_term()?;
                let close = self.expect(&Token::RParen, "`)` to close `type(...)`")?;
                Ok(Expr::Universe { subscript: Box::new(subscript), span: start.merge(close) })
            }
            Some((Token::Underscore, span)) => Ok(Expr::Placeholder { span }),
            Some((Token::Question, start)) => {
                if let Some(Token::Ident(_)) = self.peek() {
                    let (name, end) = self.expect_ident("a pattern name")?;
                    Ok(Expr::PatternHole { name: Some(name), span: start.merge(end) })
                } else {
                    Ok(Expr::PatternHole { name: None, span: start })
                }
            }
            Some((Token::LevelLit(n), span)) => Ok(Expr::LevelLit { value: n, span }),
            Some((Token::Ident(first), start)) => {
                let mut segments = vec![first];
                let mut end = start;
                while self.peek() == Some(&Token::Dot) {
                    self.advance();
                    let (seg, seg_span) = self.expect_ident("an identifier after `.`")?;
                    segments.push(seg);
                    end = seg_span;
                }
                Ok(Expr::Var(Path { segments, span: start.merge(end) }))
            }
            Some((tok, span)) => {
                Err(ParseError::unexpected_token(format!("{tok:?}"), "a term", span))
            }
            None => Err(ParseError::UnexpectedEof { expected: "a term".to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::Decl;

    fn path(e: &Expr) -> Vec<&str> {
        match e {
            Expr::Var(p) => p.segments.iter().map(String::as_str).collect(),
            _ => panic!("expected a Var, got {e:?}"),
        }
    }

    #[test]
    fn parses_type_assertion() {
        let module = parse_module("Nat: type(0l)").unwrap();
        assert_eq!(module.decls.len(), 1);
        match &module.decls[0] {
            Decl::TypeAssertion { lhs, ty, .. } => {
                assert_eq!(path(lhs), vec!["Nat"]);
                assert!(matches!(ty, Expr::Universe { .. }));
            }
            other => panic!("expected a TypeAssertion, got {other:?}"),
        }
    }

    #[test]
    fn parses_dependent_and_non_dependent_arrows() {
        let module = parse_module("f: (n: builtin.Level) -> Nat -> Nat").unwrap();
        match &module.decls[0] {
            Decl::TypeAssertion { ty, .. } => match ty {
                Expr::Arrow { arg: Some(n), output, .. } => {
                    assert_eq!(n, "n");
                    assert!(matches!(**output, Expr::Arrow { arg: None, .. }));
                }
                other => panic!("expected a dependent Arrow, got {other:?}"),
            },
            other => panic!("expected a TypeAssertion, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_lambda_and_call() {
        let module = parse_module("double: Nat -> Nat = \\x\\y Nat.succ(Nat.succ(y))").unwrap();
        match &module.decls[0] {
            Decl::TypedDefinition { value, .. } => match value {
                Expr::Lambda { arg, body, .. } => {
                    assert_eq!(arg, "x");
                    assert!(matches!(**body, Expr::Lambda { .. }));
                }
                other => panic!("expected a Lambda, got {other:?}"),
            },
            other => panic!("expected a TypedDefinition, got {other:?}"),
        }
    }

    #[test]
    fn parses_rewrite_rule_with_pattern_holes() {
        let module = parse_module("Nat.ind(?n, ?C, ?c0, ?cs, Nat.zero) := c0").unwrap();
        match &module.decls[0] {
            Decl::RewriteRule { lhs, value, .. } => {
                match lhs {
                    Expr::Call { args, .. } => {
                        assert_eq!(args.len(), 5);
                        assert!(matches!(args[0], Expr::PatternHole { name: Some(_), .. }));
                    }
                    other => panic!("expected a Call, got {other:?}"),
                }
                assert_eq!(path(value), vec!["c0"]);
            }
            other => panic!("expected a RewriteRule, got {other:?}"),
        }
    }

    #[test]
    fn parses_equality_check() {
        let module = parse_module("Nat.double(Nat.zero) :=== Nat.zero").unwrap();
        assert!(matches!(module.decls[0], Decl::EqualityCheck { .. }));
    }

    #[test]
    fn parses_multiple_declarations_without_separators() {
        let module = parse_module(
            "Nat: type(0l)\nNat.zero: Nat\nNat.succ: Nat -> Nat",
        )
        .unwrap();
        assert_eq!(module.decls.len(), 3);
    }

    #[test]
    fn rejects_unexpected_token() {
        let err = parse_module("Nat ==").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn parses_placeholder_level_in_universe() {
        let module = parse_module("Id: (T: type(?)) -> T -> T = \\T\\x x").unwrap();
        match &module.decls[0] {
            Decl::TypedDefinition { ty, .. } => match ty {
                Expr::Arrow { input, .. } => {
                    assert!(matches!(**input, Expr::Universe { .. }));
                }
                other => panic!("expected an Arrow, got {other:?}"),
            },
            other => panic!("expected a TypedDefinition, got {other:?}"),
        }
    }
}
