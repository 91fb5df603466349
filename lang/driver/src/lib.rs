//! Reference driver: constructs a registry, pre-declares the built-ins,
//! elaborates a source string and reports the outcome (`spec.md` §6 "CLI /
//! driver").

mod render_reports;

use ast::{Registry, Term};
use elaborator::{elaborate_source, Diagnostic, DEFAULT_MAX_ITERATIONS};

pub use render_reports::{render_reports, render_reports_io, render_reports_to_string};

/// Builds a fresh registry with `builtin.Level` pre-declared: its own-value
/// is `LEVEL_TYPE` itself (so `(n: builtin.Level) -> ...` type-checks a
/// parameter as a level), and its type is `type(0l)` (`spec.md` §8
/// "`builtin.Level` has type `type(0l)`").
pub fn new_registry() -> Registry {
    let mut registry = Registry::new();
    let (builtin, _) = registry.create_child(None, "builtin", false);
    let (level, _) = registry.create_child(Some(builtin), "Level", false);
    let entry = registry.entry_mut(level);
    entry.info.ty = Some(Term::universe(Term::level(0)));
    entry.info.own_value = Some(Term::LevelType);
    registry
}

/// Elaborates `source` against a fresh built-in-populated registry. Returns
/// the registry (with this run's declarations, or unchanged if elaboration
/// failed) and whatever diagnostics were raised.
pub fn elaborate(source: &str, max_iterations: usize) -> (Registry, Vec<Diagnostic>) {
    let mut registry = new_registry();
    let diagnostics = elaborate_source(source, &mut registry, max_iterations);
    (registry, diagnostics)
}

pub fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

/// Renders every permanent entry as `dotted.path : type [= own-value]`, one
/// per line, in handle order. Skips the pre-declared `builtin.Level` itself
/// since it carries no source-level content.
pub fn dump_registry(registry: &Registry) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for index in 0..registry.count() {
        let sym = ast::Symbol(index as u32);
        let entry = registry.entry(sym);
        if entry.parent.is_none() && entry.name == "builtin" {
            continue;
        }
        let path = registry.stringify(sym);
        if path == "builtin.Level" {
            continue;
        }
        let ty = entry.info.ty.as_ref().map(|t| format!("{t:?}")).unwrap_or_else(|| "?".to_string());
        match &entry.info.own_value {
            Some(value) => writeln!(out, "{path} : {ty} = {value:?}").unwrap(),
            None => writeln!(out, "{path} : {ty}").unwrap(),
        }
    }
    out
}
