//! Symbol table - the dense id space for named definitions.
//!
//! Every function, global, const, parameter, local binding, union tag, and
//! intrinsic the front-end resolved carries a [`SymbolId`]. The middle-end
//! also allocates fresh ids here for definitions it synthesizes (async state
//! tags, the entry shim); synthesized ids are deterministic because they are
//! append-only.

use surgec_util::{define_idx, IndexVec, Symbol};

define_idx!(SymbolId);

/// What the table records per symbol.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub name: Symbol,
    /// Dot-separated defining module path. Built-ins use `core`; synthesized
    /// definitions use the empty path. Drives tag-symbol preference in the
    /// metadata builder.
    pub module_path: Symbol,
}

pub struct SymbolTable {
    infos: IndexVec<SymbolId, SymbolInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            infos: IndexVec::new(),
        }
    }

    /// Allocate a fresh symbol.
    pub fn fresh(&mut self, name: Symbol, module_path: Symbol) -> SymbolId {
        self.infos.push(SymbolInfo { name, module_path })
    }

    /// Allocate a fresh symbol in the `core` module.
    pub fn fresh_core(&mut self, name: &str) -> SymbolId {
        self.fresh(Symbol::intern(name), Symbol::intern("core"))
    }

    /// Allocate a fresh synthesized symbol (empty module path).
    pub fn fresh_synthetic(&mut self, name: &str) -> SymbolId {
        self.fresh(Symbol::intern(name), Symbol::intern(""))
    }

    pub fn name(&self, id: SymbolId) -> Symbol {
        self.infos[id].name
    }

    pub fn module_path(&self, id: SymbolId) -> Symbol {
        self.infos[id].module_path
    }

    pub fn get(&self, id: SymbolId) -> Option<&SymbolInfo> {
        self.infos.get(id)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_dense() {
        let mut tab = SymbolTable::new();
        let a = tab.fresh_synthetic("a");
        let b = tab.fresh_synthetic("b");
        assert_eq!(a, SymbolId(0));
        assert_eq!(b, SymbolId(1));
        assert_eq!(tab.name(b).as_str(), "b");
    }

    #[test]
    fn module_paths_recorded() {
        let mut tab = SymbolTable::new();
        let core = tab.fresh_core("size_of");
        let synth = tab.fresh_synthetic("__tmp");
        assert_eq!(tab.module_path(core).as_str(), "core");
        assert_eq!(tab.module_path(synth).as_str(), "");
    }
}
