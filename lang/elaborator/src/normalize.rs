//! The normaliser ("Expander"): reduces a term one node at a time,
//! substituting own-values, applying β-reduction, applying the first
//! matching user rewrite rule, and folding closed level arithmetic
//! (`spec.md` §4.4).
//!
//! `expand` reduces everywhere, not just at the head: once a `Call`'s
//! function position settles (no more β/own-value/rule redex visible there),
//! every argument is itself expanded to normal form before the call is
//! rebuilt. This is what lets a rule's substituted body expose further
//! redexes nested inside its arguments (e.g. `succ(succ(double(x)))` after
//! substitution) rather than leaving them stuck one level down
//! (`spec.md` §4.4 "reduces everywhere until no local redex is visible").

use ast::pattern::match_pattern;
use ast::subst::{replace_many, replace_one};
use ast::{Env, Term};

/// Weak-normalise `term` under `env`, returning the result and whether any
/// reduction fired.
pub fn expand<E: Env>(env: &E, term: &Term) -> (Term, bool) {
    match term {
        Term::Symbol(s) => match env.get(*s).info.own_value.clone() {
            Some(own) => {
                let (expanded, _) = expand(env, &own);
                (expanded, true)
            }
            None => (term.clone(), false),
        },
        Term::Call { func, args } => expand_call(env, (**func).clone(), args.clone()),
        Term::Lambda { arg, body } => {
            let (ebody, changed) = expand(env, body);
            if changed {
                (Term::Lambda { arg: *arg, body: Box::new(ebody) }, true)
            } else {
                (term.clone(), false)
            }
        }
        Term::FnType { input, output, arg } => {
            let (einput, c1) = expand(env, input);
            let (eoutput, c2) = expand(env, output);
            if c1 || c2 {
                (Term::FnType { input: Box::new(einput), output: Box::new(eoutput), arg: *arg }, true)
            } else {
                (term.clone(), false)
            }
        }
        Term::Universe { subscript } => {
            let (esub, changed) = expand(env, subscript);
            if changed {
                (Term::Universe { subscript: Box::new(esub) }, true)
            } else {
                (term.clone(), false)
            }
        }
        Term::LevelSucc(inner) => {
            let (einner, changed) = expand(env, inner);
            match einner {
                Term::Level(n) => (Term::Level(n + 1), true),
                _ if changed => (Term::LevelSucc(Box::new(einner)), true),
                _ => (term.clone(), false),
            }
        }
        Term::LevelMax(lhs, rhs) => {
            let (elhs, c1) = expand(env, lhs);
            let (erhs, c2) = expand(env, rhs);
            match (&elhs, &erhs) {
                (Term::Level(a), Term::Level(b)) => (Term::Level((*a).max(*b)), true),
                // Permitted algebraic simplification (spec.md §9 open question):
                // max(x, 0) and max(0, x) both fold to x.
                (Term::Level(0), _) => (erhs, true),
                (_, Term::Level(0)) => (elhs, true),
                _ if c1 || c2 => (Term::LevelMax(Box::new(elhs), Box::new(erhs)), true),
                _ => (term.clone(), false),
            }
        }
        Term::LevelType | Term::Level(_) | Term::Pattern(_) | Term::Placeholder => (term.clone(), false),
    }
}

/// Processes a `Call` node: expand `func`, then apply β-reduction,
/// curry-flattening, or the first matching down-value rule, looping until
/// the call is irreducible at the head; once the head settles, every
/// argument is expanded to normal form before the call is rebuilt, so rule
/// matching (and the final shape) sees fully reduced arguments.
fn expand_call<E: Env>(env: &E, mut func: Term, mut args: Vec<Term>) -> (Term, bool) {
    let mut changed = false;
    loop {
        let (efunc, c) = expand(env, &func);
        changed |= c;
        match efunc {
            Term::Lambda { arg, body } => {
                let mut iter = args.into_iter();
                let first = iter.next().expect("Call invariant: args is non-empty");
                let rest: Vec<Term> = iter.collect();
                let substituted = replace_one(&body, arg, &first);
                changed = true;
                if rest.is_empty() {
                    let (final_term, _) = expand(env, &substituted);
                    return (final_term, true);
                }
                let (new_func, _) = expand(env, &substituted);
                func = new_func;
                args = rest;
            }
            Term::Call { func: inner_func, args: inner_args } => {
                let mut combined = inner_args;
                combined.extend(args);
                func = *inner_func;
                args = combined;
                changed = true;
            }
            Term::Symbol(head) if env.get(head).info.down_values.is_some() => {
                let (nargs, args_changed) = expand_args(env, args);
                changed |= args_changed;
                let candidate = Term::Call { func: Box::new(Term::Symbol(head)), args: nargs };
                let rules = env.get(head).info.down_values.clone().expect("checked above");
                let fired = rules.iter().find_map(|rule| {
                    match_pattern(&rule.lhs, &candidate).map(|subs| replace_many(&rule.rhs, &subs))
                });
                return match fired {
                    Some(substituted) => {
                        let (final_term, _) = expand(env, &substituted);
                        (final_term, true)
                    }
                    None => (candidate, changed),
                };
            }
            other => {
                let (nargs, args_changed) = expand_args(env, args);
                return (Term::Call { func: Box::new(other), args: nargs }, changed || args_changed);
            }
        }
    }
}

/// Expands every element of `args` to normal form, reporting whether any of
/// them changed.
fn expand_args<E: Env>(env: &E, args: Vec<Term>) -> (Vec<Term>, bool) {
    let mut changed = false;
    let expanded = args
        .iter()
        .map(|a| {
            let (ea, c) = expand(env, a);
            changed |= c;
            ea
        })
        .collect();
    (expanded, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::RewriteRule;
    use fxhash::FxHashSet;

    #[test]
    fn expanding_normal_term_reports_unchanged() {
        let reg = ast::Registry::new();
        let (term, changed) = expand(&reg, &Term::Level(3));
        assert_eq!(term, Term::Level(3));
        assert!(!changed);
    }

    #[test]
    fn beta_reduces_lambda_application() {
        let mut reg = ast::Registry::new();
        let (x, _) = reg.create_child(None, "x", true);
        let (nat, _) = reg.create_child(None, "Nat", false);
        let id = Term::lambda(x, Term::Symbol(x));
        let applied = Term::call(id, vec![Term::Symbol(nat)]);
        let (result, changed) = expand(&reg, &applied);
        assert_eq!(result, Term::Symbol(nat));
        assert!(changed);
    }

    #[test]
    fn expands_own_value_chain() {
        let mut reg = ast::Registry::new();
        let (nat, _) = reg.create_child(None, "Nat", false);
        let (alias, _) = reg.create_child(None, "NatAlias", false);
        reg.entry_mut(alias).info.own_value = Some(Term::Symbol(nat));
        let (result, changed) = expand(&reg, &Term::Symbol(alias));
        assert_eq!(result, Term::Symbol(nat));
        assert!(changed);
    }

    #[test]
    fn applies_first_matching_down_value_rule() {
        let mut reg = ast::Registry::new();
        let (nat, _) = reg.create_child(None, "Nat", false);
        let (zero, _) = reg.create_child(Some(nat), "zero", false);
        let (succ, _) = reg.create_child(Some(nat), "succ", false);
        let (double, _) = reg.create_child(None, "double", false);

        let hidden = reg.create_child(None, "patterns", true).0;
        let (px, _) = reg.create_child(Some(hidden), "x", true);

        // double(zero) := zero
        let rule_zero = RewriteRule {
            patterns: FxHashSet::default(),
            lhs: Term::call(Term::Symbol(double), vec![Term::Symbol(zero)]),
            rhs: Term::Symbol(zero),
        };
        // double(succ(?x)) := succ(succ(double(x)))
        let mut patterns = FxHashSet::default();
        patterns.insert(px);
        let rule_succ = RewriteRule {
            patterns,
            lhs: Term::call(
                Term::Symbol(double),
                vec![Term::call(Term::Symbol(succ), vec![Term::Pattern(Some(px))])],
            ),
            rhs: Term::call(
                Term::Symbol(succ),
                vec![Term::call(
                    Term::Symbol(succ),
                    vec![Term::call(Term::Symbol(double), vec![Term::Symbol(px)])],
                )],
            ),
        };
        reg.entry_mut(double).info.down_values = Some(vec![rule_zero, rule_succ]);

        // double(succ(succ(zero)))
        let subject = Term::call(
            Term::Symbol(double),
            vec![Term::call(
                Term::Symbol(succ),
                vec![Term::call(Term::Symbol(succ), vec![Term::Symbol(zero)])],
            )],
        );
        let (result, changed) = expand(&reg, &subject);
        assert!(changed);
        let expected = Term::call(
            Term::Symbol(succ),
            vec![Term::call(
                Term::Symbol(succ),
                vec![Term::call(
                    Term::Symbol(succ),
                    vec![Term::call(Term::Symbol(succ), vec![Term::Symbol(zero)])],
                )],
            )],
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn level_succ_and_max_fold_closed_arithmetic() {
        let reg = ast::Registry::new();
        let (r1, _) = expand(&reg, &Term::LevelSucc(Box::new(Term::Level(2))));
        assert_eq!(r1, Term::Level(3));
        let (r2, _) = expand(&reg, &Term::LevelMax(Box::new(Term::Level(2)), Box::new(Term::Level(5))));
        assert_eq!(r2, Term::Level(5));
    }

    #[test]
    fn level_max_with_zero_folds_to_other_side() {
        let mut reg = ast::Registry::new();
        let (n, _) = reg.create_child(None, "n", true);
        let (result, changed) =
            expand(&reg, &Term::LevelMax(Box::new(Term::Symbol(n)), Box::new(Term::Level(0))));
        assert_eq!(result, Term::Symbol(n));
        assert!(changed);
    }

    #[test]
    fn flattens_curried_call_through_own_value() {
        // alias := f, applied as alias(a) must flatten to f(a) before rule matching.
        let mut reg = ast::Registry::new();
        let (f, _) = reg.create_child(None, "f", false);
        let (a, _) = reg.create_child(None, "a", false);
        let (alias, _) = reg.create_child(None, "alias", false);
        reg.entry_mut(alias).info.own_value =
            Some(Term::call(Term::Symbol(f), vec![Term::Symbol(a)]));
        let term = Term::call(Term::Symbol(alias), vec![Term::Symbol(a)]);
        let (result, changed) = expand(&reg, &term);
        assert!(changed);
        assert_eq!(result, Term::call(Term::Symbol(f), vec![Term::Symbol(a), Term::Symbol(a)]));
    }
}
