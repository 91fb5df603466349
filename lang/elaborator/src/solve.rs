//! The constraint solver: iterates a FIFO-per-pass worklist to a fixed
//! point, then runs a stuck pass that permits `CALL ≡ CALL` head
//! decomposition; a stuck pass that makes progress resumes ordinary
//! iteration and the cycle repeats until a stuck pass itself changes
//! nothing, at which point metavariables are finalised (`spec.md` §4.5).

use std::collections::VecDeque;

use ast::subst::{replace_many, replace_one};
use ast::{Env, RewriteRule, ScratchRegistry, Symbol, Term};
use fxhash::{FxHashMap, FxHashSet};
use log::trace;

use crate::constraints::Constraint;
use crate::normalize::expand;
use crate::result::Diagnostic;

/// `spec.md` §5: cap iterations so a malformed or genuinely non-terminating
/// set of rewrite rules cannot hang the solver forever.
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

pub struct Solver<'r> {
    env: ScratchRegistry<'r>,
    queue: VecDeque<Constraint>,
    /// Permanent symbols the elaborator has declared writable this pass.
    unlocked: FxHashSet<Symbol>,
    /// Every symbol (temp or permanent) whose entry was mutated while
    /// solving; drives the final back-substitution pass.
    touched: FxHashSet<Symbol>,
    diagnostics: Vec<Diagnostic>,
}

impl<'r> Solver<'r> {
    pub fn new(env: ScratchRegistry<'r>, unlocked: FxHashSet<Symbol>) -> Self {
        Solver { env, queue: VecDeque::new(), unlocked, touched: FxHashSet::default(), diagnostics: Vec::new() }
    }

    pub fn post(&mut self, constraint: Constraint) {
        self.queue.push_back(constraint);
    }

    pub fn env(&self) -> &ScratchRegistry<'r> {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut ScratchRegistry<'r> {
        &mut self.env
    }

    fn writable(&self, sym: Symbol) -> bool {
        self.env.is_temp(sym) || self.unlocked.contains(&sym)
    }

    /// Runs ordinary passes to a fixed point, then a stuck pass permitting
    /// `CALL ≡ CALL` head decomposition. A stuck pass that makes progress
    /// posts new, simpler sub-constraints that ordinary passes have not seen
    /// yet, so it resumes ordinary iteration to a fixed point and tries the
    /// stuck pass again; this repeats until a stuck pass itself yields no
    /// change, which is the only point at which the whole solve is truly
    /// done (`spec.md` §4.5, §9 "Ordering subtlety"). Consumes the solver and
    /// hands back the registry (with metavariables resolved where possible)
    /// and the diagnostics raised.
    pub fn run(mut self, max_iterations: usize) -> (ScratchRegistry<'r>, Vec<Diagnostic>) {
        let mut iterations = 0usize;
        loop {
            loop {
                let changed = self.pass(false);
                iterations += 1;
                trace!("solver pass {iterations} changed={changed}, queue len={}", self.queue.len());
                if !changed {
                    break;
                }
                if iterations >= max_iterations {
                    self.diagnostics.push(Diagnostic::MaxIterationsExceeded { limit: max_iterations });
                    return self.finish();
                }
            }

            let stuck_changed = self.pass(true);
            iterations += 1;
            trace!("solver stuck pass {iterations} changed={stuck_changed}, queue len={}", self.queue.len());
            if !stuck_changed {
                break;
            }
            if iterations >= max_iterations {
                self.diagnostics.push(Diagnostic::MaxIterationsExceeded { limit: max_iterations });
                break;
            }
        }
        self.finish()
    }

    fn pass(&mut self, stuck: bool) -> bool {
        let batch: Vec<Constraint> = self.queue.drain(..).collect();
        let mut changed = false;
        for constraint in batch {
            changed |= self.step(constraint, stuck);
        }
        changed
    }

    fn step(&mut self, constraint: Constraint, stuck: bool) -> bool {
        match constraint {
            Constraint::Equal { lhs, rhs } => self.step_equal(lhs, rhs, stuck),
            Constraint::Type { term, ty } => self.step_type(term, ty),
            Constraint::Fn { head, args, ty } => self.step_fn(head, args, ty),
            Constraint::FnTypeEqual { func, args, output } => self.step_fn_type_equal(func, args, output),
        }
    }

    fn orient(&self, lhs: Term, rhs: Term) -> (Term, Term) {
        match (&lhs, &rhs) {
            (Term::Symbol(a), Term::Symbol(b)) => {
                if !self.env.is_temp(*a) && self.env.is_temp(*b) {
                    (rhs, lhs)
                } else {
                    (lhs, rhs)
                }
            }
            (_, Term::Symbol(_)) => (rhs, lhs),
            _ => (lhs, rhs),
        }
    }

    fn step_equal(&mut self, lhs: Term, rhs: Term, stuck: bool) -> bool {
        let (elhs, c1) = expand(&self.env, &lhs);
        let (erhs, c2) = expand(&self.env, &rhs);
        let expansion_progressed = c1 || c2;
        let (elhs, erhs) = self.orient(elhs, erhs);

        match (&elhs, &erhs) {
            (Term::Symbol(a), Term::Symbol(b)) if a == b => true,
            (Term::Symbol(sym), _) => {
                if self.try_set_own_value(*sym, &erhs) {
                    true
                } else if expansion_progressed {
                    self.queue.push_back(Constraint::Equal { lhs: elhs, rhs: erhs });
                    true
                } else {
                    self.queue.push_back(Constraint::Equal { lhs, rhs });
                    false
                }
            }
            (Term::Lambda { arg: a1, body: b1 }, Term::Lambda { arg: a2, body: b2 }) => {
                let fresh = self.env.create_temp(format!("$eq{}", a1.index()), true);
                let lhs = replace_one(b1, *a1, &Term::Symbol(fresh));
                let rhs = replace_one(b2, *a2, &Term::Symbol(fresh));
                self.queue.push_back(Constraint::Equal { lhs, rhs });
                true
            }
            (
                Term::FnType { input: i1, output: o1, arg: a1 },
                Term::FnType { input: i2, output: o2, arg: a2 },
            ) => {
                self.queue.push_back(Constraint::Equal { lhs: (**i1).clone(), rhs: (**i2).clone() });
                let fresh = self.env.create_temp("$eqfn".into(), true);
                let out1 = match a1 {
                    Some(a) => replace_one(o1, *a, &Term::Symbol(fresh)),
                    None => (**o1).clone(),
                };
                let out2 = match a2 {
                    Some(a) => replace_one(o2, *a, &Term::Symbol(fresh)),
                    None => (**o2).clone(),
                };
                self.queue.push_back(Constraint::Equal { lhs: out1, rhs: out2 });
                true
            }
            (Term::Universe { subscript: s1 }, Term::Universe { subscript: s2 }) => {
                self.queue.push_back(Constraint::Equal { lhs: (**s1).clone(), rhs: (**s2).clone() });
                true
            }
            (Term::LevelType, Term::LevelType) => true,
            (Term::Level(a), Term::Level(b)) => {
                if a == b {
                    true
                } else {
                    self.report_unequal(&elhs, &erhs);
                    true
                }
            }
            (Term::LevelSucc(x), Term::LevelSucc(y)) => {
                self.queue.push_back(Constraint::Equal { lhs: (**x).clone(), rhs: (**y).clone() });
                true
            }
            (Term::LevelSucc(x), Term::Level(n)) if *n > 0 => {
                self.queue.push_back(Constraint::Equal { lhs: (**x).clone(), rhs: Term::Level(n - 1) });
                true
            }
            (Term::LevelSucc(_), Term::Level(0)) => {
                self.report_unequal(&elhs, &erhs);
                true
            }
            (Term::Call { func: f1, args: a1 }, Term::Call { func: f2, args: a2 }) if stuck => {
                if a1.len() == a2.len() {
                    self.queue.push_back(Constraint::Equal { lhs: (**f1).clone(), rhs: (**f2).clone() });
                    for (x, y) in a1.iter().zip(a2.iter()) {
                        self.queue.push_back(Constraint::Equal { lhs: x.clone(), rhs: y.clone() });
                    }
                    true
                } else {
                    self.report_unequal(&elhs, &erhs);
                    true
                }
            }
            _ if expansion_progressed => {
                self.queue.push_back(Constraint::Equal { lhs: elhs, rhs: erhs });
                true
            }
            _ => {
                self.queue.push_back(Constraint::Equal { lhs, rhs });
                false
            }
        }
    }

    fn report_unequal(&mut self, lhs: &Term, rhs: &Term) {
        self.diagnostics.push(Diagnostic::Unequal {
            lhs: format!("{lhs:?}"),
            rhs: format!("{rhs:?}"),
            span: None,
        });
    }

    /// Assigns `value` as `sym`'s own-value, provided `sym` is writable, has
    /// no own-value yet, and `value` does not mention `sym` (an occurs-check
    /// cycle would make the registry self-referential).
    fn try_set_own_value(&mut self, sym: Symbol, value: &Term) -> bool {
        if !self.writable(sym) || self.env.get(sym).info.own_value.is_some() || occurs(sym, value) {
            return false;
        }
        let known_ty = self.env.get(sym).info.ty.clone();
        self.env.get_mut(sym).info.own_value = Some(value.clone());
        self.touched.insert(sym);
        if let Some(ty) = known_ty {
            self.queue.push_back(Constraint::Type { term: value.clone(), ty });
        }
        true
    }

    fn step_type(&mut self, term: Term, ty: Term) -> bool {
        match term {
            Term::Symbol(sym) => match self.env.get(sym).info.ty.clone() {
                Some(existing) => {
                    self.queue.push_back(Constraint::Equal { lhs: existing, rhs: ty });
                    true
                }
                None if self.writable(sym) => {
                    self.env.get_mut(sym).info.ty = Some(ty.clone());
                    self.touched.insert(sym);
                    if let Some(own) = self.env.get(sym).info.own_value.clone() {
                        self.queue.push_back(Constraint::Type { term: own, ty });
                    }
                    true
                }
                None => {
                    self.diagnostics.push(Diagnostic::UntypedExpression {
                        term: format!("{:?}", Term::Symbol(sym)),
                        span: None,
                    });
                    true
                }
            },
            Term::Call { func, args } => {
                self.queue.push_back(Constraint::Fn { head: *func, args, ty });
                true
            }
            Term::Lambda { arg, body } => {
                let in_meta = self.env.create_temp("?in".into(), true);
                let out_meta = self.env.create_temp("?out".into(), true);
                let fresh = self.env.create_temp(format!("${}", arg.index()), true);
                let renamed_body = replace_one(&body, arg, &Term::Symbol(fresh));
                self.queue.push_back(Constraint::Type { term: Term::Symbol(fresh), ty: Term::Symbol(in_meta) });
                self.queue.push_back(Constraint::Type { term: renamed_body, ty: Term::Symbol(out_meta) });
                let pi = Term::dependent_fn(Term::Symbol(in_meta), fresh, Term::Symbol(out_meta));
                self.queue.push_back(Constraint::Equal { lhs: pi, rhs: ty });
                true
            }
            Term::FnType { input, output, arg } => {
                let in_level = self.env.create_temp("?lin".into(), true);
                let out_level = self.env.create_temp("?lout".into(), true);
                self.queue.push_back(Constraint::Type {
                    term: (*input).clone(),
                    ty: Term::universe(Term::Symbol(in_level)),
                });
                let renamed_output = match arg {
                    Some(a) => {
                        let fresh = self.env.create_temp(format!("${}", a.index()), true);
                        replace_one(&output, a, &Term::Symbol(fresh))
                    }
                    None => (*output).clone(),
                };
                self.queue.push_back(Constraint::Type {
                    term: renamed_output,
                    ty: Term::universe(Term::Symbol(out_level)),
                });
                let whole_level = Term::LevelMax(Box::new(Term::Symbol(in_level)), Box::new(Term::Symbol(out_level)));
                self.queue.push_back(Constraint::Equal { lhs: Term::universe(whole_level), rhs: ty });
                true
            }
            Term::Universe { subscript } => {
                self.queue.push_back(Constraint::Equal {
                    lhs: Term::universe(Term::LevelSucc(subscript)),
                    rhs: ty,
                });
                true
            }
            Term::Level(_) | Term::LevelSucc(_) | Term::LevelMax(_, _) => {
                self.queue.push_back(Constraint::Equal { lhs: Term::LevelType, rhs: ty });
                true
            }
            Term::LevelType => {
                self.queue.push_back(Constraint::Equal { lhs: Term::universe(Term::Level(0)), rhs: ty });
                true
            }
            Term::Placeholder | Term::Pattern(_) => true,
        }
    }

    fn step_fn(&mut self, head: Term, args: Vec<Term>, ty: Term) -> bool {
        match head {
            Term::Symbol(sym) => match self.env.get(sym).info.ty.clone() {
                Some(fn_ty) => {
                    self.queue.push_back(Constraint::FnTypeEqual { func: fn_ty, args, output: ty });
                    true
                }
                None if self.writable(sym) => {
                    let arg_metas: Vec<Symbol> =
                        args.iter().map(|_| self.env.create_temp("?a".into(), true)).collect();
                    let mut assigned_ty = ty.clone();
                    for meta in arg_metas.iter().rev() {
                        assigned_ty = Term::non_dependent_fn(Term::Symbol(*meta), assigned_ty);
                    }
                    self.env.get_mut(sym).info.ty = Some(assigned_ty);
                    self.touched.insert(sym);
                    for (meta, arg) in arg_metas.iter().zip(args.iter()) {
                        self.queue.push_back(Constraint::Type { term: arg.clone(), ty: Term::Symbol(*meta) });
                    }
                    true
                }
                None => {
                    self.diagnostics.push(Diagnostic::UntypedExpression {
                        term: format!("{:?}", Term::Symbol(sym)),
                        span: None,
                    });
                    true
                }
            },
            Term::Lambda { arg, body } => {
                let mut iter = args.into_iter();
                let first = iter.next().expect("Fn constraint with a Lambda head needs an argument");
                let rest: Vec<Term> = iter.collect();
                let substituted = replace_one(&body, arg, &first);
                if rest.is_empty() {
                    self.queue.push_back(Constraint::Type { term: substituted, ty });
                } else {
                    self.queue.push_back(Constraint::Fn { head: substituted, args: rest, ty });
                }
                true
            }
            other => {
                let (expanded, changed) = expand(&self.env, &other);
                self.queue.push_back(Constraint::Fn { head: expanded, args, ty });
                changed
            }
        }
    }

    fn step_fn_type_equal(&mut self, func: Term, args: Vec<Term>, output: Term) -> bool {
        let (efunc, changed) = expand(&self.env, &func);
        match efunc {
            Term::FnType { input, output: out, arg } => {
                let mut iter = args.into_iter();
                let first = iter.next().expect("FnTypeEqual requires at least one argument");
                let rest: Vec<Term> = iter.collect();
                self.queue.push_back(Constraint::Type { term: first.clone(), ty: (*input).clone() });
                let substituted_out = match arg {
                    Some(a) => replace_one(&out, a, &first),
                    None => (*out).clone(),
                };
                if rest.is_empty() {
                    self.queue.push_back(Constraint::Equal { lhs: substituted_out, rhs: output });
                } else {
                    self.queue.push_back(Constraint::FnTypeEqual { func: substituted_out, args: rest, output });
                }
                true
            }
            _ if self.definitely_not_fn_type(&efunc) => {
                self.diagnostics
                    .push(Diagnostic::FnTypeExpected { term: format!("{efunc:?}"), span: None });
                true
            }
            _ => {
                self.queue.push_back(Constraint::FnTypeEqual { func: efunc, args, output });
                changed
            }
        }
    }

    /// `true` iff `term` is a fully expanded shape that can never become a
    /// `FN_TYPE` no matter what else gets solved — a concrete irreducible
    /// non-Π term, or a permanent symbol this elaboration cannot write to
    /// and which has no own-value to expand further. Distinguishing this
    /// from "merely still stuck" is what lets `FN_TYPE_EXPECTED`
    /// (`spec.md` §6) fire instead of silently falling through to a generic
    /// `UNRESOLVED_CONSTRAINT` at the final check.
    fn definitely_not_fn_type(&self, term: &Term) -> bool {
        match term {
            Term::Universe { .. }
            | Term::LevelType
            | Term::Level(_)
            | Term::LevelSucc(_)
            | Term::LevelMax(_, _)
            | Term::Placeholder
            | Term::Pattern(_)
            | Term::Lambda { .. } => true,
            Term::Symbol(s) => !self.writable(*s) && self.env.get(*s).info.own_value.is_none(),
            _ => false,
        }
    }

    /// `spec.md` §4.5 "Final check".
    fn finish(mut self) -> (ScratchRegistry<'r>, Vec<Diagnostic>) {
        let temps: Vec<Symbol> = self.env.temp_symbols().collect();

        for sym in &temps {
            let entry = self.env.get(*sym);
            if entry.info.own_value.is_some() {
                continue;
            }
            let Some(ty) = entry.info.ty.clone() else { continue };
            let (expanded_ty, _) = expand(&self.env, &ty);
            if expanded_ty == Term::LevelType {
                self.env.get_mut(*sym).info.own_value = Some(Term::Level(0));
            }
        }

        for constraint in self.queue.drain(..) {
            self.diagnostics.push(Diagnostic::UnresolvedConstraint {
                constraint: format!("{constraint:?}"),
                span: None,
            });
        }

        let uninferred: Vec<String> = temps
            .iter()
            .filter(|sym| {
                let entry = self.env.get(**sym);
                entry.info.own_value.is_none() && !entry.is_local
            })
            .map(|sym| self.env.get(*sym).name.clone())
            .collect();
        if !uninferred.is_empty() {
            self.diagnostics.push(Diagnostic::UninferredVar { names: uninferred.join(", "), span: None });
        }

        let substitution: FxHashMap<Symbol, Term> = temps
            .iter()
            .filter_map(|sym| self.env.get(*sym).info.own_value.clone().map(|v| (*sym, v)))
            .collect();

        let touched_permanent: Vec<Symbol> =
            self.touched.iter().copied().filter(|sym| !self.env.is_temp(*sym)).collect();
        for sym in touched_permanent {
            let entry = self.env.base().entry(sym).clone();
            let new_ty = entry.info.ty.as_ref().map(|t| replace_many(t, &substitution));
            let new_own = entry.info.own_value.as_ref().map(|t| replace_many(t, &substitution));
            let new_rules = entry.info.down_values.as_ref().map(|rules| {
                rules
                    .iter()
                    .map(|rule| RewriteRule {
                        patterns: rule.patterns.clone(),
                        lhs: replace_many(&rule.lhs, &substitution),
                        rhs: replace_many(&rule.rhs, &substitution),
                    })
                    .collect()
            });
            let base_entry = self.env.base_mut().entry_mut(sym);
            base_entry.info.ty = new_ty;
            base_entry.info.own_value = new_own;
            base_entry.info.down_values = new_rules;
        }

        (self.env, self.diagnostics)
    }
}

/// Occurs-check for metavariable assignment: does `target` appear anywhere
/// in `term`? Iterative, since `term` may have grown arbitrarily deep
/// through repeated solving.
fn occurs(target: Symbol, term: &Term) -> bool {
    let mut stack = vec![term];
    while let Some(t) = stack.pop() {
        match t {
            Term::Symbol(s) => {
                if *s == target {
                    return true;
                }
            }
            Term::Call { func, args } => {
                stack.push(func);
                stack.extend(args.iter());
            }
            Term::Lambda { body, .. } => stack.push(body),
            Term::FnType { input, output, .. } => {
                stack.push(input);
                stack.push(output);
            }
            Term::Universe { subscript } => stack.push(subscript),
            Term::LevelSucc(inner) => stack.push(inner),
            Term::LevelMax(lhs, rhs) => {
                stack.push(lhs);
                stack.push(rhs);
            }
            Term::LevelType | Term::Level(_) | Term::Pattern(_) | Term::Placeholder => {}
        }
    }
    false
}
