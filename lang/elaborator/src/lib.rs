//! Normalisation, constraint solving and elaboration for the core calculus
//! (`spec.md` §4).

pub mod constraints;
pub mod elaborate;
pub mod normalize;
pub mod result;
pub mod solve;

pub use constraints::Constraint;
pub use elaborate::{elaborate_module, elaborate_source};
pub use result::{Diagnostic, DiagnosticList};
pub use solve::{Solver, DEFAULT_MAX_ITERATIONS};
