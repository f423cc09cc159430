//! Target-ABI layout engine.
//!
//! Computes size and alignment for every interned type on a 64-bit target.
//! The engine is referenced from `ModuleMeta` so back-ends and the metadata
//! builder agree on one source of truth for layout.
//!
//! Unions lay out as a `u32` tag followed by the max-aligned payload.
//! Handles (`Task`, `Chan`, scopes) are pointer-sized runtime values.

use crate::types::{TypeId, TypeInterner, TypeKind};

pub fn align_up(offset: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

impl Layout {
    const ZERO: Layout = Layout { size: 0, align: 1 };

    fn scalar(size: u64) -> Layout {
        Layout { size, align: size.max(1) }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutEngine {
    pub ptr_size: u64,
}

impl LayoutEngine {
    /// The 64-bit host/target profile.
    pub fn host() -> Self {
        Self { ptr_size: 8 }
    }

    pub fn layout_of(&self, types: &TypeInterner, id: TypeId) -> Layout {
        let Some(kind) = types.get(id) else {
            return Layout::ZERO;
        };
        match kind {
            TypeKind::Error | TypeKind::Nothing => Layout::ZERO,
            TypeKind::Bool => Layout::scalar(1),
            TypeKind::Int(w) | TypeKind::Uint(w) => Layout::scalar(w.bytes()),
            TypeKind::Float(w) => Layout::scalar(w.bytes()),
            // ptr + len
            TypeKind::String | TypeKind::Slice(_) => Layout {
                size: self.ptr_size * 2,
                align: self.ptr_size,
            },
            TypeKind::Ptr(_) | TypeKind::Ref(_) | TypeKind::RefMut(_) | TypeKind::Fn { .. } => {
                Layout::scalar(self.ptr_size)
            }
            TypeKind::Own(t) => self.layout_of(types, *t),
            TypeKind::Alias { target, .. } => self.layout_of(types, *target),
            TypeKind::Array(elem, n) => {
                let e = self.layout_of(types, *elem);
                Layout {
                    size: align_up(e.size, e.align) * n,
                    align: e.align,
                }
            }
            TypeKind::Tuple(elems) => self.record(types, elems.iter().copied()),
            TypeKind::Struct(def) => {
                // Opaque runtime handles carry no fields.
                if def.fields.is_empty() {
                    return Layout::scalar(self.ptr_size);
                }
                self.record(types, def.fields.iter().map(|(_, t)| *t))
            }
            TypeKind::Union(def) => {
                let mut payload = Layout::ZERO;
                for case in &def.cases {
                    let case_layout = self.record(types, case.payload.iter().copied());
                    payload.size = payload.size.max(case_layout.size);
                    payload.align = payload.align.max(case_layout.align);
                }
                let tag = Layout::scalar(4);
                let align = tag.align.max(payload.align);
                Layout {
                    size: align_up(align_up(tag.size, payload.align.max(1)) + payload.size, align),
                    align,
                }
            }
            TypeKind::Param(_) => Layout::ZERO,
        }
    }

    pub fn size_of(&self, types: &TypeInterner, id: TypeId) -> u64 {
        self.layout_of(types, id).size
    }

    pub fn align_of(&self, types: &TypeInterner, id: TypeId) -> u64 {
        self.layout_of(types, id).align
    }

    fn record(&self, types: &TypeInterner, fields: impl Iterator<Item = TypeId>) -> Layout {
        let mut offset = 0u64;
        let mut align = 1u64;
        for field in fields {
            let f = self.layout_of(types, field);
            offset = align_up(offset, f.align) + f.size;
            align = align.max(f.align);
        }
        Layout {
            size: align_up(offset, align),
            align,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::SymbolTable;

    fn setup() -> (TypeInterner, LayoutEngine) {
        let mut symbols = SymbolTable::new();
        let types = TypeInterner::new(&mut symbols);
        (types, LayoutEngine::host())
    }

    #[test]
    fn scalar_sizes() {
        let (types, engine) = setup();
        let b = *types.builtins();
        assert_eq!(engine.size_of(&types, b.bool_), 1);
        assert_eq!(engine.size_of(&types, b.int32), 4);
        assert_eq!(engine.size_of(&types, b.int), 8);
        assert_eq!(engine.size_of(&types, b.nothing), 0);
        assert_eq!(engine.size_of(&types, b.string), 16);
    }

    #[test]
    fn tuple_packs_with_alignment() {
        let (mut types, engine) = setup();
        let b = *types.builtins();
        // (bool, int64): 1 byte + 7 pad + 8 = 16, align 8
        let t = types.mk_tuple(vec![b.bool_, b.int]);
        let l = engine.layout_of(&types, t);
        assert_eq!(l.size, 16);
        assert_eq!(l.align, 8);
    }

    #[test]
    fn array_layout() {
        let (mut types, engine) = setup();
        let b = *types.builtins();
        let a = types.mk_array(b.int32, 3);
        assert_eq!(engine.size_of(&types, a), 12);
        assert_eq!(engine.align_of(&types, a), 4);
    }

    #[test]
    fn union_is_tag_plus_max_payload() {
        let (mut types, engine) = setup();
        let b = *types.builtins();
        // Erring<int64, Error>: tag(4) pad(4) + max(int64=8, Error payload=16) = 24
        let e = types.erring(b.int, b.error_union);
        let l = engine.layout_of(&types, e);
        assert_eq!(l.align, 8);
        assert_eq!(l.size, 24);
    }

    #[test]
    fn handles_are_pointer_sized() {
        let (mut types, engine) = setup();
        let int = types.builtins().int;
        let task = types.task_of(int);
        assert_eq!(engine.size_of(&types, task), 8);
    }
}
