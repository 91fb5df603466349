//! Capture-avoiding replacement of one or many symbols by terms. Used for
//! β-reduction, rule rewriting, and post-solve instantiation of
//! metavariables (`spec.md` §4.2).
//!
//! Traverses with an explicit work stack rather than native recursion,
//! since the terms being substituted into can come from arbitrarily deep
//! user programs.

use fxhash::{FxHashMap, FxHashSet};

use crate::term::{Symbol, Term};

/// One step of the traversal: either visit a subterm (possibly under a
/// growing set of masked binder symbols), or rebuild a compound node from
/// already-visited children sitting on the `results` stack.
enum Frame {
    Enter { term: Term, masked: FxHashSet<Symbol> },
    RebuildCall { arity: usize },
    RebuildLambda { arg: Symbol },
    RebuildFnType { arg: Option<Symbol> },
    RebuildUniverse,
    RebuildLevelSucc,
    RebuildLevelMax,
}

/// Replace every free occurrence of `source` with `replacement`.
pub fn replace_one(term: &Term, source: Symbol, replacement: &Term) -> Term {
    let mut map = FxHashMap::default();
    map.insert(source, replacement.clone());
    replace_many(term, &map)
}

/// Replace every free occurrence of a symbol in `map`'s keys with its
/// associated term.
pub fn replace_many(term: &Term, map: &FxHashMap<Symbol, Term>) -> Term {
    let mut stack = vec![Frame::Enter { term: term.clone(), masked: FxHashSet::default() }];
    let mut results: Vec<Term> = Vec::new();

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter { term, masked } => match term {
                Term::Symbol(s) => {
                    if masked.contains(&s) {
                        results.push(Term::Symbol(s));
                    } else if let Some(replacement) = map.get(&s) {
                        results.push(replacement.clone());
                    } else {
                        results.push(Term::Symbol(s));
                    }
                }
                Term::Call { func, args } => {
                    stack.push(Frame::RebuildCall { arity: args.len() });
                    for arg in args.into_iter().rev() {
                        stack.push(Frame::Enter { term: arg, masked: masked.clone() });
                    }
                    stack.push(Frame::Enter { term: *func, masked });
                }
                Term::Lambda { arg, body } => {
                    stack.push(Frame::RebuildLambda { arg });
                    let mut body_masked = masked;
                    body_masked.insert(arg);
                    stack.push(Frame::Enter { term: *body, masked: body_masked });
                }
                Term::FnType { input, output, arg } => {
                    stack.push(Frame::RebuildFnType { arg });
                    let output_masked = match arg {
                        Some(a) => {
                            let mut m = masked.clone();
                            m.insert(a);
                            m
                        }
                        None => masked.clone(),
                    };
                    stack.push(Frame::Enter { term: *output, masked: output_masked });
                    stack.push(Frame::Enter { term: *input, masked });
                }
                Term::Universe { subscript } => {
                    stack.push(Frame::RebuildUniverse);
                    stack.push(Frame::Enter { term: *subscript, masked });
                }
                Term::LevelSucc(inner) => {
                    stack.push(Frame::RebuildLevelSucc);
                    stack.push(Frame::Enter { term: *inner, masked });
                }
                Term::LevelMax(lhs, rhs) => {
                    stack.push(Frame::RebuildLevelMax);
                    stack.push(Frame::Enter { term: *rhs, masked: masked.clone() });
                    stack.push(Frame::Enter { term: *lhs, masked });
                }
                leaf @ (Term::LevelType | Term::Level(_) | Term::Pattern(_) | Term::Placeholder) => {
                    results.push(leaf);
                }
            },
            Frame::RebuildCall { arity } => {
                let mut args = Vec::with_capacity(arity);
                for _ in 0..arity {
                    args.push(results.pop().expect("substitution: missing call arg"));
                }
                args.reverse();
                let func = results.pop().expect("substitution: missing call head");
                results.push(Term::Call { func: Box::new(func), args });
            }
            Frame::RebuildLambda { arg } => {
                let body = results.pop().expect("substitution: missing lambda body");
                results.push(Term::Lambda { arg, body: Box::new(body) });
            }
            Frame::RebuildFnType { arg } => {
                let output = results.pop().expect("substitution: missing fn output");
                let input = results.pop().expect("substitution: missing fn input");
                results.push(Term::FnType { input: Box::new(input), output: Box::new(output), arg });
            }
            Frame::RebuildUniverse => {
                let subscript = results.pop().expect("substitution: missing universe subscript");
                results.push(Term::Universe { subscript: Box::new(subscript) });
            }
            Frame::RebuildLevelSucc => {
                let inner = results.pop().expect("substitution: missing level succ operand");
                results.push(Term::LevelSucc(Box::new(inner)));
            }
            Frame::RebuildLevelMax => {
                let rhs = results.pop().expect("substitution: missing level max rhs");
                let lhs = results.pop().expect("substitution: missing level max lhs");
                results.push(Term::LevelMax(Box::new(lhs), Box::new(rhs)));
            }
        }
    }

    results.pop().expect("substitution: empty result")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_free_symbol() {
        let x = Symbol(0);
        let nat = Symbol(1);
        let term = Term::Symbol(x);
        let result = replace_one(&term, x, &Term::Symbol(nat));
        assert_eq!(result, Term::Symbol(nat));
    }

    #[test]
    fn masks_binder_symbol_in_body() {
        let x = Symbol(0);
        let replacement = Term::Level(7);
        // \x. x — substituting for x must not touch the bound occurrence.
        let term = Term::lambda(x, Term::Symbol(x));
        let result = replace_one(&term, x, &replacement);
        assert_eq!(result, Term::lambda(x, Term::Symbol(x)));
    }

    #[test]
    fn substitutes_inside_call_args_in_order() {
        let f = Symbol(0);
        let x = Symbol(1);
        let term = Term::call(Term::Symbol(f), vec![Term::Symbol(x), Term::Symbol(x)]);
        let result = replace_one(&term, x, &Term::Level(3));
        assert_eq!(result, Term::call(Term::Symbol(f), vec![Term::Level(3), Term::Level(3)]));
    }

    #[test]
    fn level_max_preserves_operand_order() {
        let l = Symbol(0);
        let term = Term::LevelMax(Box::new(Term::Symbol(l)), Box::new(Term::Level(2)));
        let result = replace_one(&term, l, &Term::Level(5));
        assert_eq!(result, Term::LevelMax(Box::new(Term::Level(5)), Box::new(Term::Level(2))));
    }

    #[test]
    fn non_dependent_fn_type_output_not_masked() {
        let a = Symbol(0);
        let b = Symbol(1);
        // (a) -> b, non-dependent, substituting for b in the output.
        let term = Term::non_dependent_fn(Term::Symbol(a), Term::Symbol(b));
        let result = replace_one(&term, b, &Term::Level(1));
        assert_eq!(result, Term::non_dependent_fn(Term::Symbol(a), Term::Level(1)));
    }
}
