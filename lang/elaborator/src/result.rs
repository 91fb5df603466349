//! Diagnostics produced by name resolution, constraint solving and
//! elaboration (`spec.md` §6 "Diagnostic surface", §7).

use miette::{Diagnostic as MietteDiagnostic, SourceSpan};
use thiserror::Error;

/// Every value reported back to a caller of the elaborator. Core terms
/// carry no source spans of their own (`spec.md` §3), so most variants are
/// raised deep inside the solver with `span: None`; the driver fills spans
/// in where it still has the CST at hand (name resolution, redefinition,
/// parsing) before rendering.
#[derive(Error, MietteDiagnostic, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("could not infer a type for {term}")]
    #[diagnostic(code("E-001"))]
    UntypedExpression {
        term: String,
        #[label]
        span: Option<SourceSpan>,
    },

    #[error("the following terms are not equal:\n  1: {lhs}\n  2: {rhs}")]
    #[diagnostic(code("E-002"))]
    Unequal {
        lhs: String,
        rhs: String,
        #[label("here")]
        span: Option<SourceSpan>,
    },

    #[error("universe subscript constraint {lesser} < {greater} could not be met")]
    #[diagnostic(code("E-003"))]
    UnmetSubscriptConstraint {
        lesser: String,
        greater: String,
        #[label]
        span: Option<SourceSpan>,
    },

    #[error("constraint left unresolved after solving: {constraint}")]
    #[diagnostic(code("E-004"))]
    UnresolvedConstraint {
        constraint: String,
        #[label]
        span: Option<SourceSpan>,
    },

    #[error("could not infer a value for: {names}")]
    #[diagnostic(code("E-005"))]
    UninferredVar {
        names: String,
        #[label]
        span: Option<SourceSpan>,
    },

    #[error("expected a function type, found {term}")]
    #[diagnostic(code("E-006"))]
    FnTypeExpected {
        term: String,
        #[label]
        span: Option<SourceSpan>,
    },

    #[error("identifier `{name}` is not in scope")]
    #[diagnostic(code("E-007"))]
    NameNotFound {
        name: String,
        #[label]
        span: Option<SourceSpan>,
    },

    #[error("`{name}` is already defined")]
    #[diagnostic(code("E-008"))]
    RedefinitionError {
        name: String,
        #[label("redefined here")]
        span: Option<SourceSpan>,
        #[label("first defined here")]
        previous_span: Option<SourceSpan>,
    },

    #[error("solver exceeded the maximum of {limit} iterations without reaching a fixed point")]
    #[diagnostic(code("E-009"))]
    MaxIterationsExceeded { limit: usize },

    #[error("{message}")]
    #[diagnostic(code("E-010"))]
    ParseError {
        message: String,
        #[label]
        span: Option<SourceSpan>,
    },

    #[error("pattern hole `?{name}` is only meaningful in a rewrite rule's left-hand side")]
    #[diagnostic(code("E-011"))]
    PatternHoleOutsideRule {
        name: String,
        #[label]
        span: Option<SourceSpan>,
    },
}

pub type DiagnosticList = Vec<Diagnostic>;
