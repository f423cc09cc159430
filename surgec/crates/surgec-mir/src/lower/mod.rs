//! HIR → MIR lowering.

mod consts;
mod entry;
mod hir_to_mir;

pub use hir_to_mir::lower_module;
