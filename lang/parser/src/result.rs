use miette::SourceSpan;
use thiserror::Error;

use crate::cst::Span;

fn to_source_span(span: Span) -> SourceSpan {
    (span.start as usize, (span.end - span.start) as usize).into()
}

#[derive(Error, miette::Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected token {found}, expected {expected}")]
    #[diagnostic(code("P-001"))]
    UnexpectedToken {
        found: String,
        expected: String,
        #[label]
        span: SourceSpan,
    },
    #[error("unexpected end of input, expected {expected}")]
    #[diagnostic(code("P-002"))]
    UnexpectedEof { expected: String },
    #[error("invalid token")]
    #[diagnostic(code("P-003"))]
    InvalidToken {
        #[label]
        span: SourceSpan,
    },
}

impl ParseError {
    pub fn unexpected_token(found: impl Into<String>, expected: impl Into<String>, span: Span) -> Self {
        ParseError::UnexpectedToken { found: found.into(), expected: expected.into(), span: to_source_span(span) }
    }

    pub fn invalid_token(span: Span) -> Self {
        ParseError::InvalidToken { span: to_source_span(span) }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
