//! The MIR data model.
//!
//! Every node is a plain value: no back-pointers, no interior mutability.
//! Cross-references are typed ids into append-only [`IndexVec`]s owned by
//! [`Func`] and [`Module`]; mutation goes through the owner. This keeps the
//! graph acyclic at the ownership level and lets passes move block vectors
//! wholesale (the async lowering transfers a function's blocks to its poll
//! twin).

use indexmap::IndexMap;
use surgec_sem::{LayoutEngine, SymbolId, TypeId};
use surgec_util::{define_idx, FxHashMap, IndexVec, Span, Symbol};

define_idx!(FuncId);
define_idx!(BlockId);
define_idx!(LocalId);
define_idx!(GlobalId);

/// The unit handed between passes. Owns every function and global of one
/// compiled module.
pub struct Module {
    pub funcs: IndexVec<FuncId, Func>,
    pub func_by_sym: FxHashMap<SymbolId, FuncId>,
    pub globals: IndexVec<GlobalId, Global>,
    pub meta: ModuleMeta,
}

impl Module {
    pub fn new(layout: LayoutEngine) -> Self {
        Self {
            funcs: IndexVec::new(),
            func_by_sym: FxHashMap::default(),
            globals: IndexVec::new(),
            meta: ModuleMeta::new(layout),
        }
    }

    /// Append a function, assigning its dense id and registering its symbol.
    pub fn add_func(&mut self, mut func: Func) -> FuncId {
        let id = self.funcs.next_index();
        func.id = id;
        self.func_by_sym.insert(func.sym, id);
        self.funcs.push(func)
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        self.globals.push(global)
    }

    pub fn func_of_sym(&self, sym: SymbolId) -> Option<FuncId> {
        self.func_by_sym.get(&sym).copied()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("funcs", &self.funcs.len())
            .field("globals", &self.globals.len())
            .finish()
    }
}

/// A function body as a CFG.
#[derive(Clone)]
pub struct Func {
    pub id: FuncId,
    pub sym: SymbolId,
    pub name: Symbol,
    pub span: Span,
    pub result: TypeId,
    pub is_async: bool,
    /// Structured-scope policy: cancel siblings on first child failure.
    pub failfast: bool,
    /// Set once the async state-machine pass has rewritten this function.
    pub async_lowered: bool,
    pub locals: IndexVec<LocalId, Local>,
    pub blocks: IndexVec<BlockId, Block>,
    pub entry: BlockId,
    /// Handle to the enclosing structured-concurrency scope, or
    /// `LocalId::NONE` for non-async functions.
    pub scope_local: LocalId,
    /// `locals[0..param_count]` are the formal parameters in declaration
    /// order.
    pub param_count: usize,
}

impl Func {
    pub fn new(sym: SymbolId, name: Symbol, span: Span, result: TypeId) -> Self {
        Self {
            id: FuncId::NONE,
            sym,
            name,
            span,
            result,
            is_async: false,
            failfast: false,
            async_lowered: false,
            locals: IndexVec::new(),
            blocks: IndexVec::new(),
            entry: BlockId::NONE,
            scope_local: LocalId::NONE,
            param_count: 0,
        }
    }

    pub fn add_local(&mut self, local: Local) -> LocalId {
        self.locals.push(local)
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = self.blocks.next_index();
        self.blocks.push(Block {
            id,
            instrs: Vec::new(),
            term: Terminator::None,
        })
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    pub fn param_locals(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.locals.indices().take(self.param_count)
    }
}

impl std::fmt::Debug for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.name)
            .field("blocks", &self.blocks.len())
            .field("locals", &self.locals.len())
            .field("is_async", &self.is_async)
            .finish()
    }
}

/// Ownership-and-kind bits a local inherits from its type.
///
/// `COPY` is orthogonal; at most one of `OWN`/`REF`/`REF_MUT`/`PTR` is set.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalFlags(pub u8);

impl LocalFlags {
    pub const EMPTY: LocalFlags = LocalFlags(0);
    pub const COPY: LocalFlags = LocalFlags(1 << 0);
    pub const OWN: LocalFlags = LocalFlags(1 << 1);
    pub const REF: LocalFlags = LocalFlags(1 << 2);
    pub const REF_MUT: LocalFlags = LocalFlags(1 << 3);
    pub const PTR: LocalFlags = LocalFlags(1 << 4);

    #[inline]
    pub fn contains(self, other: LocalFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn union(self, other: LocalFlags) -> LocalFlags {
        LocalFlags(self.0 | other.0)
    }

    pub fn is_copy(self) -> bool {
        self.contains(Self::COPY)
    }

    pub fn is_borrow(self) -> bool {
        self.contains(Self::REF) || self.contains(Self::REF_MUT)
    }

    pub fn is_owning(self) -> bool {
        self.contains(Self::OWN)
    }
}

impl std::fmt::Debug for LocalFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::COPY) {
            names.push("copy");
        }
        if self.contains(Self::OWN) {
            names.push("own");
        }
        if self.contains(Self::REF) {
            names.push("ref");
        }
        if self.contains(Self::REF_MUT) {
            names.push("ref_mut");
        }
        if self.contains(Self::PTR) {
            names.push("ptr");
        }
        write!(f, "[{}]", names.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub sym: SymbolId,
    pub ty: TypeId,
    pub flags: LocalFlags,
    pub name: Symbol,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Global {
    pub sym: SymbolId,
    pub ty: TypeId,
    pub name: Symbol,
    pub is_mut: bool,
    pub span: Span,
}

/// A basic block: a straight-line instruction sequence plus one terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub term: Terminator,
}

// ---- places and operands ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceRoot {
    Local(LocalId),
    Global(GlobalId),
}

/// A rooted l-value path. Projections never rebind the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub root: PlaceRoot,
    pub proj: Vec<Projection>,
}

impl Place {
    pub fn local(id: LocalId) -> Place {
        Place {
            root: PlaceRoot::Local(id),
            proj: Vec::new(),
        }
    }

    pub fn global(id: GlobalId) -> Place {
        Place {
            root: PlaceRoot::Global(id),
            proj: Vec::new(),
        }
    }

    pub fn deref(mut self) -> Place {
        self.proj.push(Projection::Deref);
        self
    }

    pub fn field(mut self, name: Symbol, index: u32) -> Place {
        self.proj.push(Projection::Field { name, index });
        self
    }

    pub fn index(mut self, index: LocalId) -> Place {
        self.proj.push(Projection::Index { index });
        self
    }

    /// The root local when this is a bare, unprojected local place.
    pub fn as_plain_local(&self) -> Option<LocalId> {
        match (self.root, self.proj.is_empty()) {
            (PlaceRoot::Local(id), true) => Some(id),
            _ => None,
        }
    }

    pub fn root_local(&self) -> Option<LocalId> {
        match self.root {
            PlaceRoot::Local(id) => Some(id),
            PlaceRoot::Global(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Deref,
    Field { name: Symbol, index: u32 },
    Index { index: LocalId },
}

/// Constant values, with source spelling preserved where the width requires
/// reparsing downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int { value: i64, text: Option<Symbol> },
    Float { value: f64, text: Option<Symbol> },
    Bool(bool),
    Str(Symbol),
    Nothing,
    /// Function symbol used as a first-class value.
    FnAddr { sym: SymbolId, name: Symbol },
}

impl Const {
    pub fn int(value: i64) -> Const {
        Const::Int { value, text: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperandKind {
    Const(Const),
    Copy(Place),
    Move(Place),
    AddrOf(Place),
    AddrOfMut(Place),
}

/// A value read: constant, copy/move out of a place, or address-of.
/// `Move` is used iff the source type is non-`Copy` and the position
/// consumes the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub kind: OperandKind,
    pub ty: TypeId,
}

impl Operand {
    pub fn konst(c: Const, ty: TypeId) -> Operand {
        Operand {
            kind: OperandKind::Const(c),
            ty,
        }
    }

    pub fn copy(place: Place, ty: TypeId) -> Operand {
        Operand {
            kind: OperandKind::Copy(place),
            ty,
        }
    }

    pub fn mov(place: Place, ty: TypeId) -> Operand {
        Operand {
            kind: OperandKind::Move(place),
            ty,
        }
    }

    pub fn addr_of(place: Place, ty: TypeId) -> Operand {
        Operand {
            kind: OperandKind::AddrOf(place),
            ty,
        }
    }

    pub fn addr_of_mut(place: Place, ty: TypeId) -> Operand {
        Operand {
            kind: OperandKind::AddrOfMut(place),
            ty,
        }
    }

    pub fn nothing(ty: TypeId) -> Operand {
        Operand::konst(Const::Nothing, ty)
    }

    pub fn place(&self) -> Option<&Place> {
        match &self.kind {
            OperandKind::Copy(p)
            | OperandKind::Move(p)
            | OperandKind::AddrOf(p)
            | OperandKind::AddrOfMut(p) => Some(p),
            OperandKind::Const(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    IntToInt,
    IntToFloat,
    FloatToInt,
    FloatToFloat,
    PtrToPtr,
    PtrToInt,
    IntToPtr,
}

/// Right-hand sides of `Assign`.
#[derive(Debug, Clone, PartialEq)]
pub enum Rvalue {
    Use(Operand),
    Unary {
        op: UnOp,
        operand: Operand,
    },
    Binary {
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    Cast {
        kind: CastKind,
        operand: Operand,
        to: TypeId,
    },
    StructLit {
        ty: TypeId,
        fields: Vec<Operand>,
    },
    ArrayLit {
        ty: TypeId,
        elems: Vec<Operand>,
    },
    TupleLit {
        ty: TypeId,
        elems: Vec<Operand>,
    },
    /// Field read out of a value.
    Field {
        base: Operand,
        name: Symbol,
        index: u32,
    },
    /// Index read out of a value.
    Index {
        base: Operand,
        index: Operand,
    },
    /// `value is Tag` predicate.
    TagTest {
        value: Operand,
        tag: Symbol,
    },
    /// Field-style extraction of a tag payload component.
    TagPayload {
        value: Operand,
        tag: Symbol,
        index: u32,
    },
    IterInit {
        iterable: Operand,
    },
    IterNext {
        iter: Operand,
    },
    TypeTest {
        value: Operand,
        ty: TypeId,
    },
    /// Subtype/heir classification test.
    HeirTest {
        value: Operand,
        ty: TypeId,
    },
}

/// How a call names its target.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Sym { sym: SymbolId, name: Symbol },
    Value(Operand),
}

/// One arm of a `select`/`race`.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectArm {
    Task { task: Operand },
    Recv { chan: Operand },
    Send { chan: Operand, value: Operand },
    Timeout { millis: Operand },
    Default,
}

/// Instructions. Suspend forms carry `ready`/`pend` edges; `pend` stays
/// `BlockId::NONE` until the state-machine pass back-patches it.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Assign {
        dst: Place,
        src: Rvalue,
    },
    Call {
        dst: Option<Place>,
        callee: Callee,
        args: Vec<Operand>,
    },
    /// Consumes a non-copy, non-reference local. Forbidden on copy/ref
    /// locals.
    Drop {
        place: Place,
    },
    /// Retires a `Ref`/`RefMut` local. Forbidden on non-reference locals.
    EndBorrow {
        place: Place,
    },
    /// Synchronous-looking suspend; normalized into `Poll` before
    /// state-machine lowering.
    Await {
        dst: Option<LocalId>,
        task: Operand,
    },
    /// Start an independent task.
    Spawn {
        dst: LocalId,
        value: Operand,
    },
    /// Normalized suspend: the only awaiting form in post-normalization
    /// async code.
    Poll {
        dst: Option<LocalId>,
        task: Operand,
        ready: BlockId,
        pend: BlockId,
    },
    /// Structured-scope join suspend.
    JoinAll {
        dst: Option<LocalId>,
        scope: Operand,
        ready: BlockId,
        pend: BlockId,
    },
    ChanSend {
        chan: Operand,
        value: Operand,
        ready: BlockId,
        pend: BlockId,
    },
    ChanRecv {
        dst: Option<LocalId>,
        chan: Operand,
        ready: BlockId,
        pend: BlockId,
    },
    Timeout {
        dst: Option<LocalId>,
        task: Operand,
        millis: Operand,
        ready: BlockId,
        pend: BlockId,
    },
    /// Multi-way suspend. On a race, losing task arms receive cancel in arm
    /// order before the winner's value is produced.
    Select {
        dst: Option<LocalId>,
        arms: Vec<SelectArm>,
        race: bool,
        ready: BlockId,
        pend: BlockId,
    },
    Nop,
}

impl Instr {
    /// Is this a poll-style suspend (has ready/pend edges)?
    pub fn is_suspend(&self) -> bool {
        matches!(
            self,
            Instr::Poll { .. }
                | Instr::JoinAll { .. }
                | Instr::ChanSend { .. }
                | Instr::ChanRecv { .. }
                | Instr::Timeout { .. }
                | Instr::Select { .. }
        )
    }

    /// The ready/pend edge pair of a suspend instruction.
    pub fn suspend_edges(&self) -> Option<(BlockId, BlockId)> {
        match self {
            Instr::Poll { ready, pend, .. }
            | Instr::JoinAll { ready, pend, .. }
            | Instr::ChanSend { ready, pend, .. }
            | Instr::ChanRecv { ready, pend, .. }
            | Instr::Timeout { ready, pend, .. }
            | Instr::Select { ready, pend, .. } => Some((*ready, *pend)),
            _ => None,
        }
    }

    pub fn suspend_edges_mut(&mut self) -> Option<(&mut BlockId, &mut BlockId)> {
        match self {
            Instr::Poll { ready, pend, .. }
            | Instr::JoinAll { ready, pend, .. }
            | Instr::ChanSend { ready, pend, .. }
            | Instr::ChanRecv { ready, pend, .. }
            | Instr::Timeout { ready, pend, .. }
            | Instr::Select { ready, pend, .. } => Some((ready, pend)),
            _ => None,
        }
    }

    /// The destination local a suspend writes on resume, if any.
    pub fn suspend_dst(&self) -> Option<LocalId> {
        match self {
            Instr::Poll { dst, .. }
            | Instr::JoinAll { dst, .. }
            | Instr::ChanRecv { dst, .. }
            | Instr::Timeout { dst, .. }
            | Instr::Select { dst, .. } => *dst,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub tag: Symbol,
    pub target: BlockId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Transient during construction; forbidden after validation.
    None,
    Return {
        has_value: bool,
        value: Option<Operand>,
        /// Lowered from a source-level `return` that leaves a structured
        /// scope before the lexical end; drives cancel-before-join.
        early: bool,
        cancelled: bool,
    },
    AsyncYield {
        state: Operand,
    },
    AsyncReturn {
        state: Operand,
        has_value: bool,
        value: Option<Operand>,
    },
    AsyncReturnCancelled {
        state: Operand,
    },
    Goto {
        target: BlockId,
    },
    If {
        cond: Operand,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    SwitchTag {
        value: Operand,
        cases: Vec<SwitchCase>,
        default: BlockId,
    },
    Unreachable,
}

impl Terminator {
    pub fn is_none(&self) -> bool {
        matches!(self, Terminator::None)
    }

    /// Block targets named by this terminator (suspend successors are
    /// queried separately from the block's last instruction).
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Terminator::Goto { target } => vec![*target],
            Terminator::If { then_bb, else_bb, .. } => vec![*then_bb, *else_bb],
            Terminator::SwitchTag { cases, default, .. } => {
                let mut out: Vec<BlockId> = cases.iter().map(|c| c.target).collect();
                out.push(*default);
                out
            }
            _ => Vec::new(),
        }
    }
}

// ---- module metadata -------------------------------------------------------

/// Per-case metadata for one reached union type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCaseMeta {
    pub tag_name: Symbol,
    /// Preferred symbol: `core` path wins, else non-empty path, else the
    /// higher symbol id.
    pub tag_sym: SymbolId,
    /// Payload component types, canonicalized (alias/ref/own/pointer
    /// peeled).
    pub payload: Vec<TypeId>,
}

/// Side tables populated during lowering and async lowering, consumed by
/// code generation.
pub struct ModuleMeta {
    pub tag_layouts: IndexMap<TypeId, Vec<TagCaseMeta>>,
    pub tag_names: IndexMap<SymbolId, Symbol>,
    /// Monomorphized tag instance → original tag symbol.
    pub tag_aliases: IndexMap<SymbolId, SymbolId>,
    pub layout: LayoutEngine,
    /// Per-instance type arguments for intrinsics whose code gen depends on
    /// type parameters (`size_of` and friends).
    pub func_type_args: IndexMap<SymbolId, Vec<TypeId>>,
}

impl ModuleMeta {
    pub fn new(layout: LayoutEngine) -> Self {
        Self {
            tag_layouts: IndexMap::new(),
            tag_names: IndexMap::new(),
            tag_aliases: IndexMap::new(),
            layout,
            func_type_args: IndexMap::new(),
        }
    }
}

impl std::fmt::Debug for ModuleMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleMeta")
            .field("tag_layouts", &self.tag_layouts.len())
            .field("tag_names", &self.tag_names.len())
            .field("tag_aliases", &self.tag_aliases.len())
            .field("func_type_args", &self.func_type_args.len())
            .finish()
    }
}
