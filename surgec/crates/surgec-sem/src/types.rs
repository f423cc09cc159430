//! The interned type table.
//!
//! Types are hash-consed: structurally equal types share one [`TypeId`], so
//! type equality anywhere in the middle-end is an integer comparison. The
//! interner also answers the classification queries lowering and validation
//! depend on: copyability (drives local ownership flags), generic-parameter
//! closure (the validator rejects unresolved parameters), and
//! canonicalization (alias/ref/own/pointer peeling for metadata keys).
//!
//! `TypeId::NONE` models the tolerated "no type" of pre-monomorphization
//! leftovers; every query treats it as opaque.

use crate::symtab::{SymbolId, SymbolTable};
use rustc_hash::{FxHashMap, FxHashSet};
use surgec_util::{define_idx, IndexVec, Symbol};

define_idx!(TypeId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    pub fn bytes(self) -> u64 {
        (self.bits() / 8) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    W32,
    W64,
}

impl FloatWidth {
    pub fn bytes(self) -> u64 {
        match self {
            FloatWidth::W32 => 4,
            FloatWidth::W64 => 8,
        }
    }
}

/// A named struct instance (monomorphized: `type_args` are concrete unless
/// the instance still carries a `Param`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDef {
    pub sym: SymbolId,
    pub name: Symbol,
    pub type_args: Vec<TypeId>,
    pub fields: Vec<(Symbol, TypeId)>,
}

/// One case of a tagged union.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagCase {
    pub sym: SymbolId,
    pub name: Symbol,
    pub payload: Vec<TypeId>,
}

/// A tagged-union instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnionDef {
    pub sym: SymbolId,
    pub name: Symbol,
    pub type_args: Vec<TypeId>,
    pub cases: Vec<TagCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Recovery type from front-end errors.
    Error,
    /// The unit/void type, spelled `nothing` in Surge.
    Nothing,
    Bool,
    /// Owning string.
    String,
    Int(IntWidth),
    Uint(IntWidth),
    Float(FloatWidth),
    /// Raw pointer `*T`.
    Ptr(TypeId),
    /// Shared borrow `&T`.
    Ref(TypeId),
    /// Mutable borrow `&mut T`.
    RefMut(TypeId),
    /// Explicit owning wrapper `own T`.
    Own(TypeId),
    /// Fixed array `[T; N]`.
    Array(TypeId, u64),
    /// Slice `[T]`.
    Slice(TypeId),
    Tuple(Vec<TypeId>),
    Fn { params: Vec<TypeId>, result: TypeId },
    Struct(StructDef),
    Union(UnionDef),
    Alias { sym: SymbolId, name: Symbol, target: TypeId },
    /// Unresolved generic parameter. Must not survive monomorphization;
    /// the validator rejects any reachable occurrence.
    Param(Symbol),
}

/// Ownership classification a local inherits from its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipKind {
    /// Trivially duplicable, nothing to release.
    None,
    /// Owning value; requires a `drop` at end of life.
    Own,
    /// Shared borrow; requires `end_borrow`.
    Ref,
    /// Mutable borrow; requires `end_borrow`.
    RefMut,
    /// Raw pointer; duplicable, never dropped.
    Ptr,
}

/// Pre-interned ids for the built-in types.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub error: TypeId,
    pub nothing: TypeId,
    pub bool_: TypeId,
    pub string: TypeId,
    pub int: TypeId,
    pub uint: TypeId,
    pub int8: TypeId,
    pub int16: TypeId,
    pub int32: TypeId,
    pub uint8: TypeId,
    pub uint16: TypeId,
    pub uint32: TypeId,
    pub float32: TypeId,
    pub float64: TypeId,
    /// The `core.Error` union used by `from_str` failures.
    pub error_union: TypeId,
}

pub struct TypeInterner {
    kinds: IndexVec<TypeId, TypeKind>,
    dedup: FxHashMap<TypeKind, TypeId>,
    builtins: Builtins,
    /// Symbol for the synthesized `Task` struct template.
    task_sym: SymbolId,
    /// Symbol for the synthesized `Chan` struct template.
    chan_sym: SymbolId,
    /// Symbol for the `core.Erring` union template.
    erring_sym: SymbolId,
    erring_ok_sym: SymbolId,
    erring_err_sym: SymbolId,
    /// Symbols for the iterator protocol: the `Iter` state handle and the
    /// `Step` union `Next(T) | Done` that `iter_next` yields.
    iter_sym: SymbolId,
    step_sym: SymbolId,
    step_next_sym: SymbolId,
    step_done_sym: SymbolId,
    /// Symbol for the `Map` handle template behind `rt_map_*`.
    map_sym: SymbolId,
}

impl TypeInterner {
    pub fn new(symbols: &mut SymbolTable) -> Self {
        let mut kinds = IndexVec::new();
        let mut dedup = FxHashMap::default();
        let mut intern = |kind: TypeKind| -> TypeId {
            if let Some(&id) = dedup.get(&kind) {
                return id;
            }
            let id = kinds.push(kind.clone());
            dedup.insert(kind, id);
            id
        };

        let error = intern(TypeKind::Error);
        let nothing = intern(TypeKind::Nothing);
        let bool_ = intern(TypeKind::Bool);
        let string = intern(TypeKind::String);
        let int = intern(TypeKind::Int(IntWidth::W64));
        let uint = intern(TypeKind::Uint(IntWidth::W64));
        let int8 = intern(TypeKind::Int(IntWidth::W8));
        let int16 = intern(TypeKind::Int(IntWidth::W16));
        let int32 = intern(TypeKind::Int(IntWidth::W32));
        let uint8 = intern(TypeKind::Uint(IntWidth::W8));
        let uint16 = intern(TypeKind::Uint(IntWidth::W16));
        let uint32 = intern(TypeKind::Uint(IntWidth::W32));
        let float32 = intern(TypeKind::Float(FloatWidth::W32));
        let float64 = intern(TypeKind::Float(FloatWidth::W64));

        let error_union_sym = symbols.fresh_core("Error");
        let message_case = symbols.fresh_core("Message");
        let error_union = intern(TypeKind::Union(UnionDef {
            sym: error_union_sym,
            name: Symbol::intern("Error"),
            type_args: Vec::new(),
            cases: vec![TagCase {
                sym: message_case,
                name: Symbol::intern("Message"),
                payload: vec![string],
            }],
        }));

        let builtins = Builtins {
            error,
            nothing,
            bool_,
            string,
            int,
            uint,
            int8,
            int16,
            int32,
            uint8,
            uint16,
            uint32,
            float32,
            float64,
            error_union,
        };

        Self {
            kinds,
            dedup,
            builtins,
            task_sym: symbols.fresh_core("Task"),
            chan_sym: symbols.fresh_core("Chan"),
            erring_sym: symbols.fresh_core("Erring"),
            erring_ok_sym: symbols.fresh_core("Ok"),
            erring_err_sym: symbols.fresh_core("Err"),
            iter_sym: symbols.fresh_core("Iter"),
            step_sym: symbols.fresh_core("Step"),
            step_next_sym: symbols.fresh_core("Next"),
            step_done_sym: symbols.fresh_core("Done"),
            map_sym: symbols.fresh_core("Map"),
        }
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.dedup.get(&kind) {
            return id;
        }
        let id = self.kinds.push(kind.clone());
        self.dedup.insert(kind, id);
        id
    }

    /// The kind behind an id. `TypeId::NONE` has no kind; callers guard.
    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id]
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeKind> {
        if id.is_none() {
            return None;
        }
        self.kinds.get(id)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    // ---- constructors -----------------------------------------------------

    pub fn mk_ref(&mut self, target: TypeId) -> TypeId {
        self.intern(TypeKind::Ref(target))
    }

    pub fn mk_ref_mut(&mut self, target: TypeId) -> TypeId {
        self.intern(TypeKind::RefMut(target))
    }

    pub fn mk_ptr(&mut self, target: TypeId) -> TypeId {
        self.intern(TypeKind::Ptr(target))
    }

    pub fn mk_own(&mut self, target: TypeId) -> TypeId {
        self.intern(TypeKind::Own(target))
    }

    pub fn mk_array(&mut self, elem: TypeId, len: u64) -> TypeId {
        self.intern(TypeKind::Array(elem, len))
    }

    pub fn mk_slice(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Slice(elem))
    }

    pub fn mk_tuple(&mut self, elems: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Tuple(elems))
    }

    pub fn mk_fn(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        self.intern(TypeKind::Fn { params, result })
    }

    /// `Task<payload>`: a synthesized struct instance with a single type
    /// argument. The handle itself is opaque to the middle-end.
    pub fn task_of(&mut self, payload: TypeId) -> TypeId {
        let sym = self.task_sym;
        self.intern(TypeKind::Struct(StructDef {
            sym,
            name: Symbol::intern("Task"),
            type_args: vec![payload],
            fields: Vec::new(),
        }))
    }

    /// The payload type of a `Task<P>` instance, peeling wrappers first.
    pub fn payload_of_task(&self, id: TypeId) -> Option<TypeId> {
        match self.get(self.canonical(id))? {
            TypeKind::Struct(def) if def.sym == self.task_sym => def.type_args.first().copied(),
            _ => None,
        }
    }

    /// `Chan<elem>`: the channel handle type.
    pub fn chan_of(&mut self, elem: TypeId) -> TypeId {
        let sym = self.chan_sym;
        self.intern(TypeKind::Struct(StructDef {
            sym,
            name: Symbol::intern("Chan"),
            type_args: vec![elem],
            fields: Vec::new(),
        }))
    }

    pub fn chan_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.get(self.canonical(id))? {
            TypeKind::Struct(def) if def.sym == self.chan_sym => def.type_args.first().copied(),
            _ => None,
        }
    }

    /// `Erring<T, E>`: the two-case result union `Ok(T) | Err(E)` that
    /// `from_str` and other fallible core operations return.
    pub fn erring(&mut self, ok: TypeId, err: TypeId) -> TypeId {
        let def = UnionDef {
            sym: self.erring_sym,
            name: Symbol::intern("Erring"),
            type_args: vec![ok, err],
            cases: vec![
                TagCase {
                    sym: self.erring_ok_sym,
                    name: Symbol::intern("Ok"),
                    payload: vec![ok],
                },
                TagCase {
                    sym: self.erring_err_sym,
                    name: Symbol::intern("Err"),
                    payload: vec![err],
                },
            ],
        };
        self.intern(TypeKind::Union(def))
    }

    /// `Iter<elem>`: the opaque iterator state produced by `iter_init`.
    pub fn iter_of(&mut self, elem: TypeId) -> TypeId {
        let sym = self.iter_sym;
        self.intern(TypeKind::Struct(StructDef {
            sym,
            name: Symbol::intern("Iter"),
            type_args: vec![elem],
            fields: Vec::new(),
        }))
    }

    pub fn iter_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.get(self.canonical(id))? {
            TypeKind::Struct(def) if def.sym == self.iter_sym => def.type_args.first().copied(),
            _ => None,
        }
    }

    /// `Step<elem>`: what `iter_next` yields, `Next(elem) | Done`.
    pub fn step_of(&mut self, elem: TypeId) -> TypeId {
        let def = UnionDef {
            sym: self.step_sym,
            name: Symbol::intern("Step"),
            type_args: vec![elem],
            cases: vec![
                TagCase {
                    sym: self.step_next_sym,
                    name: Symbol::intern("Next"),
                    payload: vec![elem],
                },
                TagCase {
                    sym: self.step_done_sym,
                    name: Symbol::intern("Done"),
                    payload: Vec::new(),
                },
            ],
        };
        self.intern(TypeKind::Union(def))
    }

    /// `Map<key, value>`: the runtime map handle filled via `rt_map_new` /
    /// `rt_map_insert`.
    pub fn map_of(&mut self, key: TypeId, value: TypeId) -> TypeId {
        let sym = self.map_sym;
        self.intern(TypeKind::Struct(StructDef {
            sym,
            name: Symbol::intern("Map"),
            type_args: vec![key, value],
            fields: Vec::new(),
        }))
    }

    // ---- classification ---------------------------------------------------

    /// Is the type semantically trivially duplicable?
    ///
    /// Numerics, `bool`, `nothing`, raw pointers, shared borrows, and
    /// function values are; aggregates are iff all components are. Owning
    /// containers, mutable borrows, unions, and unresolved parameters are
    /// not.
    pub fn is_copy(&self, id: TypeId) -> bool {
        match self.get(id) {
            None => false,
            Some(kind) => match kind {
                TypeKind::Nothing
                | TypeKind::Bool
                | TypeKind::Int(_)
                | TypeKind::Uint(_)
                | TypeKind::Float(_)
                | TypeKind::Ptr(_)
                | TypeKind::Ref(_)
                | TypeKind::Fn { .. } => true,
                TypeKind::Tuple(elems) => elems.iter().all(|&e| self.is_copy(e)),
                TypeKind::Array(elem, _) => self.is_copy(*elem),
                TypeKind::Alias { target, .. } => self.is_copy(*target),
                TypeKind::Error
                | TypeKind::String
                | TypeKind::RefMut(_)
                | TypeKind::Own(_)
                | TypeKind::Slice(_)
                | TypeKind::Struct(_)
                | TypeKind::Union(_)
                | TypeKind::Param(_) => false,
            },
        }
    }

    /// Ownership kind a local of this type carries. At most one of
    /// `Own/Ref/RefMut/Ptr`; `None` for plain copy types.
    pub fn ownership(&self, id: TypeId) -> OwnershipKind {
        match self.get(id) {
            None => OwnershipKind::None,
            Some(TypeKind::Ref(_)) => OwnershipKind::Ref,
            Some(TypeKind::RefMut(_)) => OwnershipKind::RefMut,
            Some(TypeKind::Ptr(_)) => OwnershipKind::Ptr,
            Some(TypeKind::Alias { target, .. }) => self.ownership(*target),
            Some(_) => {
                if self.is_copy(id) {
                    OwnershipKind::None
                } else {
                    OwnershipKind::Own
                }
            }
        }
    }

    /// Does any type reachable from `id` (through deref, tuples, functions,
    /// struct fields, union payloads, aliases, arrays, slices, type args)
    /// contain an unresolved generic parameter?
    pub fn contains_param(&self, id: TypeId) -> bool {
        let mut visited = FxHashSet::default();
        self.contains_param_rec(id, &mut visited)
    }

    fn contains_param_rec(&self, id: TypeId, visited: &mut FxHashSet<TypeId>) -> bool {
        if id.is_none() || !visited.insert(id) {
            return false;
        }
        match self.kind(id) {
            TypeKind::Param(_) => true,
            TypeKind::Error
            | TypeKind::Nothing
            | TypeKind::Bool
            | TypeKind::String
            | TypeKind::Int(_)
            | TypeKind::Uint(_)
            | TypeKind::Float(_) => false,
            TypeKind::Ptr(t)
            | TypeKind::Ref(t)
            | TypeKind::RefMut(t)
            | TypeKind::Own(t)
            | TypeKind::Array(t, _)
            | TypeKind::Slice(t) => self.contains_param_rec(*t, visited),
            TypeKind::Alias { target, .. } => self.contains_param_rec(*target, visited),
            TypeKind::Tuple(elems) => elems.iter().any(|&e| self.contains_param_rec(e, visited)),
            TypeKind::Fn { params, result } => {
                params.iter().any(|&p| self.contains_param_rec(p, visited))
                    || self.contains_param_rec(*result, visited)
            }
            TypeKind::Struct(def) => {
                def.type_args.iter().any(|&a| self.contains_param_rec(a, visited))
                    || def.fields.iter().any(|(_, t)| self.contains_param_rec(*t, visited))
            }
            TypeKind::Union(def) => {
                def.type_args.iter().any(|&a| self.contains_param_rec(a, visited))
                    || def
                        .cases
                        .iter()
                        .any(|c| c.payload.iter().any(|&t| self.contains_param_rec(t, visited)))
            }
        }
    }

    /// Peel alias, reference, own, and pointer layers down to a structural
    /// kind. Used for metadata key construction.
    pub fn canonical(&self, id: TypeId) -> TypeId {
        let mut cur = id;
        loop {
            match self.get(cur) {
                Some(TypeKind::Alias { target, .. })
                | Some(TypeKind::Ref(target))
                | Some(TypeKind::RefMut(target))
                | Some(TypeKind::Own(target))
                | Some(TypeKind::Ptr(target)) => cur = *target,
                _ => return cur,
            }
        }
    }

    /// The union definition behind `id`, if its canonical form is a union.
    pub fn as_union(&self, id: TypeId) -> Option<&UnionDef> {
        match self.get(self.canonical(id))? {
            TypeKind::Union(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_struct(&self, id: TypeId) -> Option<&StructDef> {
        match self.get(self.canonical(id))? {
            TypeKind::Struct(def) => Some(def),
            _ => None,
        }
    }

    /// Is `id` (before canonicalization) a reference type?
    pub fn is_ref(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Some(TypeKind::Ref(_)) | Some(TypeKind::RefMut(_))
        )
    }

    pub fn is_nothing(&self, id: TypeId) -> bool {
        matches!(self.get(id), Some(TypeKind::Nothing))
    }

    /// Dereference one layer of `&T`/`&mut T`, or `None`.
    pub fn deref_once(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id)? {
            TypeKind::Ref(t) | TypeKind::RefMut(t) => Some(*t),
            _ => None,
        }
    }

    // ---- rendering --------------------------------------------------------

    /// Structural textual form used by the MIR pretty-printer. Deterministic
    /// by construction: no map iteration, only structure.
    pub fn render(&self, id: TypeId) -> String {
        if id.is_none() {
            return "<none>".to_string();
        }
        match self.kind(id) {
            TypeKind::Error => "<error>".to_string(),
            TypeKind::Nothing => "nothing".to_string(),
            TypeKind::Bool => "bool".to_string(),
            TypeKind::String => "string".to_string(),
            TypeKind::Int(w) => format!("int{}", w.bits()),
            TypeKind::Uint(w) => format!("uint{}", w.bits()),
            TypeKind::Float(w) => match w {
                FloatWidth::W32 => "float32".to_string(),
                FloatWidth::W64 => "float64".to_string(),
            },
            TypeKind::Ptr(t) => format!("*{}", self.render(*t)),
            TypeKind::Ref(t) => format!("&{}", self.render(*t)),
            TypeKind::RefMut(t) => format!("&mut {}", self.render(*t)),
            TypeKind::Own(t) => format!("own {}", self.render(*t)),
            TypeKind::Array(t, n) => format!("[{}; {}]", self.render(*t), n),
            TypeKind::Slice(t) => format!("[{}]", self.render(*t)),
            TypeKind::Tuple(elems) => {
                let inner: Vec<String> = elems.iter().map(|&e| self.render(e)).collect();
                format!("({})", inner.join(", "))
            }
            TypeKind::Fn { params, result } => {
                let inner: Vec<String> = params.iter().map(|&p| self.render(p)).collect();
                format!("fn({}) -> {}", inner.join(", "), self.render(*result))
            }
            TypeKind::Struct(def) => {
                if def.type_args.is_empty() {
                    def.name.as_str().to_string()
                } else {
                    let args: Vec<String> = def.type_args.iter().map(|&a| self.render(a)).collect();
                    format!("{}<{}>", def.name, args.join(", "))
                }
            }
            TypeKind::Union(def) => {
                if def.type_args.is_empty() {
                    def.name.as_str().to_string()
                } else {
                    let args: Vec<String> = def.type_args.iter().map(|&a| self.render(a)).collect();
                    format!("{}<{}>", def.name, args.join(", "))
                }
            }
            TypeKind::Alias { name, .. } => name.as_str().to_string(),
            TypeKind::Param(name) => format!("?{}", name),
        }
    }
}
