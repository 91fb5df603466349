//! The constraint language the solver iterates to a fixed point
//! (`spec.md` §4.5).

use ast::Term;

/// A unit of pending work posted by the elaborator or by an earlier solver
/// step. `Debug`-formatted for diagnostics; there is no pretty-printer in
/// this repo (surface rendering is an external collaborator's job, per
/// `spec.md` §1), so `UnresolvedConstraint` messages are necessarily terse.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// `e : T` — assert a term has a type.
    Type { term: Term, ty: Term },
    /// `f(a1..an) : T` — assert applying head `f` to `args` returns `T`,
    /// used when `f`'s type is not yet known, only its arity and result.
    Fn { head: Term, args: Vec<Term>, ty: Term },
    /// `e1 ≡ e2` — unification constraint.
    Equal { lhs: Term, rhs: Term },
    /// `F, a1..an ⇒ T` — `F` must normalise to a Π chain consuming
    /// `a1..an` with output `T`.
    FnTypeEqual { func: Term, args: Vec<Term>, output: Term },
}
