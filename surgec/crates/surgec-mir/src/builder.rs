//! Function builder.
//!
//! A thin cursor over a [`Func`] under construction: tracks the current
//! block, appends instructions, and allocates locals with ownership flags
//! inferred from the type interner.

use crate::ir::*;
use surgec_sem::{OwnershipKind, SymbolId, TypeId, TypeInterner};
use surgec_util::{Span, Symbol};

pub struct FuncBuilder {
    pub func: Func,
    pub current: BlockId,
}

/// Classify a type into local flags: `COPY` iff trivially duplicable, plus
/// at most one of `OWN`/`REF`/`REF_MUT`/`PTR`.
pub fn flags_for(types: &TypeInterner, ty: TypeId) -> LocalFlags {
    let mut flags = LocalFlags::EMPTY;
    if types.is_copy(ty) {
        flags = flags.union(LocalFlags::COPY);
    }
    match types.ownership(ty) {
        OwnershipKind::None => {}
        OwnershipKind::Own => flags = flags.union(LocalFlags::OWN),
        OwnershipKind::Ref => flags = flags.union(LocalFlags::REF),
        OwnershipKind::RefMut => flags = flags.union(LocalFlags::REF_MUT),
        OwnershipKind::Ptr => flags = flags.union(LocalFlags::PTR),
    }
    flags
}

impl FuncBuilder {
    pub fn new(sym: SymbolId, name: Symbol, span: Span, result: TypeId) -> Self {
        Self {
            func: Func::new(sym, name, span, result),
            current: BlockId::NONE,
        }
    }

    /// Create a block; does not switch to it.
    pub fn new_block(&mut self) -> BlockId {
        self.func.new_block()
    }

    /// Create the entry block and position the cursor on it.
    pub fn start_entry(&mut self) -> BlockId {
        let entry = self.func.new_block();
        self.func.entry = entry;
        self.current = entry;
        entry
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn local(
        &mut self,
        sym: SymbolId,
        name: Symbol,
        ty: TypeId,
        types: &TypeInterner,
        span: Span,
    ) -> LocalId {
        self.func.add_local(Local {
            sym,
            ty,
            flags: flags_for(types, ty),
            name,
            span,
        })
    }

    /// Allocate an anonymous temporary.
    pub fn temp(&mut self, ty: TypeId, types: &TypeInterner) -> LocalId {
        let n = self.func.locals.len();
        self.local(
            SymbolId::NONE,
            Symbol::intern(&format!("__t{}", n)),
            ty,
            types,
            Span::DUMMY,
        )
    }

    pub fn push(&mut self, instr: Instr) {
        self.func.blocks[self.current].instrs.push(instr);
    }

    pub fn assign(&mut self, dst: Place, src: Rvalue) {
        self.push(Instr::Assign { dst, src });
    }

    /// Set the current block's terminator unless one is already present.
    /// Unreachable tails (code after `return`) keep the first terminator.
    pub fn terminate(&mut self, term: Terminator) {
        let block = &mut self.func.blocks[self.current];
        if block.term.is_none() {
            block.term = term;
        }
    }

    /// Overwrite the current block's terminator unconditionally.
    pub fn reterminate(&mut self, term: Terminator) {
        self.func.blocks[self.current].term = term;
    }

    pub fn is_terminated(&self) -> bool {
        !self.func.blocks[self.current].term.is_none()
    }

    /// Finish construction: any block left without a terminator becomes
    /// `Unreachable`.
    pub fn finish(mut self) -> Func {
        for block in self.func.blocks.iter_mut() {
            if block.term.is_none() {
                block.term = Terminator::Unreachable;
            }
        }
        self.func
    }
}
