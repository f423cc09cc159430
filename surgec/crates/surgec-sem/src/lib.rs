//! surgec-sem - Semantic-analysis output consumed by the MIR core.
//!
//! The Surge front-end (lexer, parser, name resolution, type checking,
//! monomorphization) lives outside this repository. This crate defines the
//! *data* it hands to the middle-end:
//!
//! - [`types`]: the interned type table ([`TypeId`], [`TypeInterner`]) with
//!   the [`Builtins`] set and the classification queries lowering relies on
//!   (copyability, generic-parameter closure, canonicalization).
//! - [`symtab`]: the dense [`SymbolId`] space with per-symbol names and
//!   module paths, plus fresh-id generation for synthesized definitions
//!   (async state tags, lifted entry shims).
//! - [`hir`]: the monomorphized HIR the lowerer walks.
//! - [`layout`]: the target-ABI layout engine referenced by module metadata.

pub mod hir;
pub mod layout;
pub mod symtab;
pub mod types;
pub mod well_known;

pub use layout::LayoutEngine;
pub use symtab::{SymbolId, SymbolInfo, SymbolTable};
pub use types::{Builtins, FloatWidth, IntWidth, OwnershipKind, StructDef, TagCase, TypeId, TypeInterner, TypeKind, UnionDef};
pub use well_known::WellKnown;

/// Everything semantic analysis produces for one module, bundled.
///
/// The MIR passes take `&mut SemResult` so they can intern synthesized types
/// and symbols (async state unions, frame structs) through the same tables
/// the front-end used.
pub struct SemResult {
    pub symbols: SymbolTable,
    pub types: TypeInterner,
    pub layout: LayoutEngine,
    pub well_known: WellKnown,
}

impl SemResult {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        let types = TypeInterner::new(&mut symbols);
        let well_known = WellKnown::register(&mut symbols);
        Self {
            symbols,
            types,
            layout: LayoutEngine::host(),
            well_known,
        }
    }
}

impl Default for SemResult {
    fn default() -> Self {
        Self::new()
    }
}
