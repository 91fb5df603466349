//! The symbol registry: a context-of-contexts mapping qualified names to
//! entries, plus a scratch layer that appends temporary metavariable
//! entries without mutating the underlying table (`spec.md` §4.1).

use fxhash::FxHashMap;

use crate::term::{RewriteRule, Symbol, Term};

/// The mutable payload of a symbol entry: its type, its own-value
/// (definition) and its down-values (rewrite rules).
#[derive(Debug, Clone, Default)]
pub struct VariableInfo {
    pub ty: Option<Term>,
    pub own_value: Option<Term>,
    pub down_values: Option<Vec<RewriteRule>>,
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub name: String,
    pub parent: Option<Symbol>,
    /// Distinguishes globally addressable symbols from binder-introduced or
    /// metavariable symbols; uninferred *local* temp symbols are not
    /// reported as errors at the final check (`spec.md` §4.5).
    pub is_local: bool,
    pub children: Option<FxHashMap<String, Symbol>>,
    pub info: VariableInfo,
}

impl SymbolEntry {
    fn new(name: String, parent: Option<Symbol>, is_local: bool) -> Self {
        SymbolEntry { name, parent, is_local, children: None, info: VariableInfo::default() }
    }
}

/// Implemented by both [`Registry`] and [`ScratchRegistry`] so that the
/// normaliser, pattern matcher and solver can read and write entries without
/// caring which layer a handle belongs to.
pub trait Env {
    fn get(&self, sym: Symbol) -> &SymbolEntry;
    fn get_mut(&mut self, sym: Symbol) -> &mut SymbolEntry;
    /// `true` iff `sym` lives in a scratch layer rather than the permanent
    /// registry beneath it.
    fn is_temp(&self, sym: Symbol) -> bool;
}

/// The permanent, flat table of global entries addressed by dense integer
/// handles.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<SymbolEntry>,
    /// Name map for root-level (no-parent) symbols; per-parent maps live on
    /// each `SymbolEntry::children` instead.
    roots: FxHashMap<String, Symbol>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { entries: Vec::new(), roots: FxHashMap::default() }
    }

    /// Number of permanent entries. Any scratch registry built on top of
    /// `self` assigns handles starting at this value, giving the cheap
    /// `handle >= count` temp test (`spec.md` §4.1).
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, parent: Option<Symbol>, name: &str) -> Option<Symbol> {
        match parent {
            None => self.roots.get(name).copied(),
            Some(p) => self.entries[p.index()].children.as_ref()?.get(name).copied(),
        }
    }

    /// Create a new child under `parent` named `name`, or return the
    /// existing one. `was_new` tells the caller (typically the elaborator's
    /// declare pass) whether it needs to unlock the symbol for this
    /// elaboration.
    pub fn create_child(&mut self, parent: Option<Symbol>, name: &str, is_local: bool) -> (Symbol, bool) {
        if let Some(existing) = self.lookup(parent, name) {
            return (existing, false);
        }
        let handle = Symbol(self.entries.len() as u32);
        self.entries.push(SymbolEntry::new(name.to_owned(), parent, is_local));
        match parent {
            None => {
                self.roots.insert(name.to_owned(), handle);
            }
            Some(p) => {
                let children = self.entries[p.index()].children.get_or_insert_with(FxHashMap::default);
                children.insert(name.to_owned(), handle);
            }
        }
        (handle, true)
    }

    pub fn entry(&self, sym: Symbol) -> &SymbolEntry {
        &self.entries[sym.index()]
    }

    pub fn entry_mut(&mut self, sym: Symbol) -> &mut SymbolEntry {
        &mut self.entries[sym.index()]
    }

    /// Dotted path, e.g. `Nat.succ`.
    pub fn stringify(&self, sym: Symbol) -> String {
        let entry = self.entry(sym);
        match entry.parent {
            None => entry.name.clone(),
            Some(p) => format!("{}.{}", self.stringify(p), entry.name),
        }
    }

    /// Release the slot for reuse. Only supported for the most recently
    /// added symbol (a LIFO rollback, as used by the elaborator when a
    /// declaration fails); the name-map does not need rebuilding in that
    /// case (`spec.md` §4.1).
    pub fn remove(&mut self, sym: Symbol) {
        assert_eq!(sym.index(), self.entries.len() - 1, "remove only supports the most recently added symbol");
        let entry = self.entries.pop().expect("remove called on empty registry");
        match entry.parent {
            None => {
                self.roots.remove(&entry.name);
            }
            Some(parent) => {
                if let Some(children) = self.entries[parent.index()].children.as_mut() {
                    children.remove(&entry.name);
                }
            }
        }
    }
}

impl Env for Registry {
    fn get(&self, sym: Symbol) -> &SymbolEntry {
        self.entry(sym)
    }

    fn get_mut(&mut self, sym: Symbol) -> &mut SymbolEntry {
        self.entry_mut(sym)
    }

    fn is_temp(&self, _sym: Symbol) -> bool {
        false
    }
}

/// A layer of temporary metavariable entries stacked on top of a permanent
/// [`Registry`]. Handles assigned here are strictly greater than any
/// permanent handle at the time the scratch registry was created.
pub struct ScratchRegistry<'a> {
    base: &'a mut Registry,
    threshold: u32,
    temp: Vec<SymbolEntry>,
}

impl<'a> ScratchRegistry<'a> {
    pub fn new(base: &'a mut Registry) -> Self {
        let threshold = base.count() as u32;
        ScratchRegistry { base, threshold, temp: Vec::new() }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Create a fresh temp symbol (a unification metavariable, or a local
    /// binder symbol introduced during elaboration/solving).
    pub fn create_temp(&mut self, name: String, is_local: bool) -> Symbol {
        let handle = Symbol(self.threshold + self.temp.len() as u32);
        self.temp.push(SymbolEntry::new(name, None, is_local));
        handle
    }

    pub fn base(&self) -> &Registry {
        self.base
    }

    pub fn base_mut(&mut self) -> &mut Registry {
        self.base
    }

    /// Every temp symbol created so far, for the solver's final pass.
    pub fn temp_symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        (0..self.temp.len()).map(move |i| Symbol(self.threshold + i as u32))
    }
}

impl Env for ScratchRegistry<'_> {
    fn get(&self, sym: Symbol) -> &SymbolEntry {
        if sym.0 >= self.threshold {
            &self.temp[(sym.0 - self.threshold) as usize]
        } else {
            self.base.entry(sym)
        }
    }

    fn get_mut(&mut self, sym: Symbol) -> &mut SymbolEntry {
        if sym.0 >= self.threshold {
            &mut self.temp[(sym.0 - self.threshold) as usize]
        } else {
            self.base.entry_mut(sym)
        }
    }

    fn is_temp(&self, sym: Symbol) -> bool {
        sym.0 >= self.threshold
    }
}
