//! Matches a term against a pattern term, returning a mapping from pattern
//! variables to subterms, or failure (`spec.md` §4.3).
//!
//! Pattern trees come straight from a rewrite-rule LHS written by the user,
//! so they are shallow by construction; plain recursion bounds depth safely
//! here (unlike the normaliser and substitution, which walk terms that may
//! have grown arbitrarily deep through repeated expansion).

use fxhash::FxHashMap;

use crate::subst::replace_one;
use crate::term::{Symbol, Term};

pub type Substitutions = FxHashMap<Symbol, Term>;

/// Attempt to match `pattern` against `subject`, threading bindings already
/// made for repeated pattern variables through `substitutes`.
pub fn match_pattern(pattern: &Term, subject: &Term) -> Option<Substitutions> {
    let mut substitutes = Substitutions::default();
    match_into(pattern, subject, &mut substitutes).then_some(substitutes)
}

fn match_into(pattern: &Term, subject: &Term, substitutes: &mut Substitutions) -> bool {
    match pattern {
        Term::Pattern(Some(v)) => match substitutes.get(v).cloned() {
            None => {
                substitutes.insert(*v, subject.clone());
                true
            }
            Some(previous) => match_into(&previous, subject, substitutes),
        },
        Term::Pattern(None) => true,
        Term::Symbol(s) => matches!(subject, Term::Symbol(s2) if s == s2),
        Term::Call { func, args } => match subject {
            Term::Call { func: sfunc, args: sargs } if args.len() == sargs.len() => {
                match_into(func, sfunc, substitutes)
                    && args.iter().zip(sargs.iter()).all(|(p, s)| match_into(p, s, substitutes))
            }
            _ => false,
        },
        Term::Lambda { arg, body } => match subject {
            Term::Lambda { arg: sarg, body: sbody } => {
                let renamed_sbody = replace_one(sbody, *sarg, &Term::Symbol(*arg));
                match_into(body, &renamed_sbody, substitutes)
            }
            _ => false,
        },
        Term::FnType { input, output, arg } => match subject {
            Term::FnType { input: sinput, output: soutput, arg: sarg } => {
                if !match_into(input, sinput, substitutes) {
                    return false;
                }
                match (arg, sarg) {
                    (Some(a), Some(sa)) => {
                        let renamed = replace_one(soutput, *sa, &Term::Symbol(*a));
                        match_into(output, &renamed, substitutes)
                    }
                    (None, None) => match_into(output, soutput, substitutes),
                    _ => false,
                }
            }
            _ => false,
        },
        Term::Universe { subscript } => match subject {
            Term::Universe { subscript: ssubscript } => match_into(subscript, ssubscript, substitutes),
            _ => false,
        },
        Term::LevelType => matches!(subject, Term::LevelType),
        Term::Level(n) => matches!(subject, Term::Level(m) if n == m),
        Term::LevelSucc(inner) => match subject {
            Term::LevelSucc(sinner) => match_into(inner, sinner, substitutes),
            Term::Level(0) => false,
            Term::Level(n) => match_into(inner, &Term::Level(n - 1), substitutes),
            _ => false,
        },
        Term::LevelMax(lhs, rhs) => match subject {
            Term::LevelMax(slhs, srhs) => {
                match_into(lhs, slhs, substitutes) && match_into(rhs, srhs, substitutes)
            }
            _ => false,
        },
        Term::Placeholder => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(n: u32) -> Symbol {
        Symbol(n)
    }

    #[test]
    fn matches_pattern_hole_and_binds() {
        let zero = s(0);
        let pattern = Term::Pattern(Some(s(10)));
        let subject = Term::Symbol(zero);
        let subs = match_pattern(&pattern, &subject).unwrap();
        assert_eq!(subs.get(&s(10)), Some(&Term::Symbol(zero)));
    }

    #[test]
    fn repeated_pattern_variable_must_match_consistently() {
        let x = s(10);
        let pattern = Term::call(
            Term::Symbol(s(0)),
            vec![Term::Pattern(Some(x)), Term::Pattern(Some(x))],
        );
        let ok_subject = Term::call(Term::Symbol(s(0)), vec![Term::Level(1), Term::Level(1)]);
        assert!(match_pattern(&pattern, &ok_subject).is_some());

        let bad_subject = Term::call(Term::Symbol(s(0)), vec![Term::Level(1), Term::Level(2)]);
        assert!(match_pattern(&pattern, &bad_subject).is_none());
    }

    #[test]
    fn level_succ_against_zero_fails() {
        let pattern = Term::LevelSucc(Box::new(Term::Pattern(Some(s(10)))));
        assert!(match_pattern(&pattern, &Term::Level(0)).is_none());
    }

    #[test]
    fn level_succ_against_positive_binds_predecessor() {
        let pattern = Term::LevelSucc(Box::new(Term::Pattern(Some(s(10)))));
        let subs = match_pattern(&pattern, &Term::Level(3)).unwrap();
        assert_eq!(subs.get(&s(10)), Some(&Term::Level(2)));
    }

    #[test]
    fn arity_mismatch_fails() {
        let pattern = Term::call(Term::Symbol(s(0)), vec![Term::Pattern(None)]);
        let subject = Term::call(Term::Symbol(s(0)), vec![Term::Level(1), Term::Level(2)]);
        assert!(match_pattern(&pattern, &subject).is_none());
    }

    #[test]
    fn lambda_matches_up_to_alpha_renaming() {
        let px = s(20);
        let sx = s(21);
        let pattern = Term::lambda(px, Term::Symbol(px));
        let subject = Term::lambda(sx, Term::Symbol(sx));
        assert!(match_pattern(&pattern, &subject).is_some());
    }
}
