//! End-to-end scenarios from `spec.md` §8, exercised through the driver's
//! public `elaborate` entry point rather than the `strata` binary itself,
//! since the scenarios are source-string fixtures, not files on disk.

use elaborator::Diagnostic;

fn elaborate(source: &str) -> (ast::Registry, Vec<Diagnostic>) {
    strata_driver::elaborate(source, strata_driver::default_max_iterations())
}

/// `strata_driver::elaborate` starts every run from `new_registry()`, which
/// pre-declares `builtin` and `builtin.Level` before a single source symbol
/// is seen. Tests care about how many symbols *this source* contributed, so
/// count against this baseline rather than a hardcoded constant.
fn declared_count(registry: &ast::Registry) -> usize {
    registry.count() - strata_driver::new_registry().count()
}

#[test]
fn untyped_nat_elaborates_cleanly() {
    let source = "\
Nat: type(0l)
Nat.zero = Nat.zero
";
    // zero is its own value here only to exercise an untyped definition;
    // a self-referential own-value is fine since nothing forces expansion.
    let (registry, diagnostics) = elaborate(source);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(declared_count(&registry), 2, "Nat and Nat.zero");
}

#[test]
fn nat_never_itself_declared_is_untyped() {
    // spec.md §8 scenario 1.
    let source = "\
Nat.zero: Nat
Nat.succ: Nat -> Nat
";
    let (registry, diagnostics) = elaborate(source);
    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().all(|d| matches!(d, Diagnostic::UntypedExpression { .. })), "{diagnostics:?}");
    assert_eq!(declared_count(&registry), 0, "a failed elaboration rolls back every symbol this source created");
}

#[test]
fn fully_typed_nat_elaborates_cleanly() {
    let source = "\
Nat: type(0l)
Nat.zero: Nat
Nat.succ: Nat -> Nat
";
    let (registry, diagnostics) = elaborate(source);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(declared_count(&registry), 3, "Nat, Nat.zero and Nat.succ");
}

#[test]
fn rewrite_rules_and_a_successful_equality_check() {
    let source = "\
Nat: type(0l)
Nat.zero: Nat
Nat.succ: Nat -> Nat
Nat.add: Nat -> Nat -> Nat
Nat.add(Nat.zero, ?n) := ?n
Nat.add(Nat.succ(?m), ?n) := Nat.succ(Nat.add(?m, ?n))
Nat.add(Nat.succ(Nat.zero), Nat.zero) :=== Nat.succ(Nat.zero)
";
    let (registry, diagnostics) = elaborate(source);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    let nat = registry.lookup(None, "Nat").unwrap();
    let add = registry.lookup(Some(nat), "add").unwrap();
    let rules = registry.entry(add).info.down_values.as_ref().expect("rules installed");
    assert_eq!(rules.len(), 2);
}

#[test]
fn failing_equality_check_reports_unequal_and_rolls_back() {
    let source = "\
Nat: type(0l)
Nat.zero: Nat
Nat.succ: Nat -> Nat
Nat.zero :=== Nat.succ(Nat.zero)
";
    let (registry, diagnostics) = elaborate(source);
    assert!(matches!(diagnostics.as_slice(), [Diagnostic::Unequal { .. }]));
    assert_eq!(declared_count(&registry), 0);
}

#[test]
fn inferred_universe_level_defaults_to_zero() {
    let source = "Id: (T: type(?)) -> T -> T = \\T\\x x\n";
    let (registry, diagnostics) = elaborate(source);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(declared_count(&registry), 1, "Id");
}

#[test]
fn undeclared_identifier_reports_name_not_found_and_rolls_back_everything() {
    let source = "\
Nat: type(0l)
Nat.zero: Nat
Nat.bogus: DoesNotExist
";
    let (registry, diagnostics) = elaborate(source);
    assert!(matches!(diagnostics.as_slice(), [Diagnostic::NameNotFound { .. }]));
    assert_eq!(declared_count(&registry), 0, "the whole call rolls back, including Nat and Nat.zero");
}

#[test]
fn dump_registry_omits_the_builtin_prelude() {
    let (registry, diagnostics) = elaborate("Nat: type(0l)\n");
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    let dump = strata_driver::dump_registry(&registry);
    assert!(dump.contains("Nat"));
    assert!(!dump.contains("builtin"));
}
