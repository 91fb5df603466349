//! Core data model: term representation, symbol registry, substitution and
//! pattern matching. These four pieces are deliberately kept in one crate
//! because they share a single representation invariant (fresh, globally
//! unique binder symbols) that the other crates never need to know about.

pub mod pattern;
pub mod registry;
pub mod subst;
pub mod term;

pub use pattern::{match_pattern, Substitutions};
pub use registry::{Env, Registry, ScratchRegistry, SymbolEntry, VariableInfo};
pub use subst::{replace_many, replace_one};
pub use term::{RewriteRule, Symbol, Term};
