//! Well-known runtime intrinsics.
//!
//! Emitted code calls into the Surge runtime by symbol; the names are ABI.
//! Semantic analysis registers them once per compilation so every pass
//! agrees on the ids.

use crate::symtab::{SymbolId, SymbolTable};

#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub rt_argv: SymbolId,
    pub rt_stdin_read_all: SymbolId,
    pub rt_exit: SymbolId,
    pub len: SymbolId,
    pub task_state: SymbolId,
    pub task_create: SymbolId,
    pub rt_scope_enter: SymbolId,
    pub rt_scope_exit: SymbolId,
    pub rt_scope_cancel_all: SymbolId,
    pub scope_join_failed: SymbolId,
    pub rt_map_new: SymbolId,
    pub rt_map_insert: SymbolId,
    pub from_str: SymbolId,
    pub size_of: SymbolId,
}

impl WellKnown {
    pub fn register(symbols: &mut SymbolTable) -> Self {
        Self {
            rt_argv: symbols.fresh_core("rt_argv"),
            rt_stdin_read_all: symbols.fresh_core("rt_stdin_read_all"),
            rt_exit: symbols.fresh_core("rt_exit"),
            len: symbols.fresh_core("__len"),
            task_state: symbols.fresh_core("__task_state"),
            task_create: symbols.fresh_core("__task_create"),
            rt_scope_enter: symbols.fresh_core("rt_scope_enter"),
            rt_scope_exit: symbols.fresh_core("rt_scope_exit"),
            rt_scope_cancel_all: symbols.fresh_core("rt_scope_cancel_all"),
            scope_join_failed: symbols.fresh_core("__scope_join_failed"),
            rt_map_new: symbols.fresh_core("rt_map_new"),
            rt_map_insert: symbols.fresh_core("rt_map_insert"),
            from_str: symbols.fresh_core("from_str"),
            size_of: symbols.fresh_core("size_of"),
        }
    }
}
