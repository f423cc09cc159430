//! Monomorphized HIR - the lowerer's input.
//!
//! This is the shape semantic analysis hands to the middle-end: names are
//! resolved to [`SymbolId`]s, every expression carries its [`TypeId`], all
//! generics are instantiated, and async blocks have been lifted into named
//! async functions. Method-style channel/timeout calls survive as
//! `MethodCall` nodes; the lowerer rewrites them into dedicated suspend
//! instructions when the enclosing function is async.

use crate::symtab::SymbolId;
use crate::types::TypeId;
use surgec_util::{Span, Symbol};

#[derive(Debug, Clone)]
pub struct HirModule {
    pub funcs: Vec<HirFunc>,
    pub globals: Vec<HirGlobal>,
    pub consts: Vec<HirConst>,
    pub entry: Option<EntryPoint>,
}

impl HirModule {
    pub fn new() -> Self {
        Self {
            funcs: Vec::new(),
            globals: Vec::new(),
            consts: Vec::new(),
            entry: None,
        }
    }
}

impl Default for HirModule {
    fn default() -> Self {
        Self::new()
    }
}

/// The single `@entrypoint` function and how its arguments arrive.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint {
    pub sym: SymbolId,
    pub mode: EntryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// Call with parameter defaults.
    None,
    /// Parse each parameter from `rt_argv()` slots via `from_str`.
    Argv,
    /// Read stdin fully and parse once.
    Stdin,
}

#[derive(Debug, Clone)]
pub struct HirFunc {
    pub sym: SymbolId,
    pub name: Symbol,
    pub span: Span,
    pub params: Vec<HirParam>,
    pub result: TypeId,
    pub is_async: bool,
    /// Structured-concurrency scope policy: cancel all siblings on the
    /// first child failure.
    pub failfast: bool,
    pub body: Vec<HirStmt>,
}

#[derive(Debug, Clone)]
pub struct HirParam {
    pub sym: SymbolId,
    pub name: Symbol,
    pub ty: TypeId,
    /// Default expression, lowered in the caller's scope when the call site
    /// omits this argument.
    pub default: Option<HirExpr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct HirGlobal {
    pub sym: SymbolId,
    pub name: Symbol,
    pub ty: TypeId,
    pub is_mut: bool,
    pub init: HirExpr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct HirConst {
    pub sym: SymbolId,
    pub name: Symbol,
    pub ty: TypeId,
    pub value: HirExpr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum HirStmt {
    Let {
        sym: SymbolId,
        name: Symbol,
        ty: TypeId,
        init: Option<HirExpr>,
        span: Span,
    },
    /// `target = value` or, with `op`, compound assignment `target op= value`.
    Assign {
        target: HirExpr,
        op: Option<BinOp>,
        value: HirExpr,
        span: Span,
    },
    Expr(HirExpr),
    Return {
        value: Option<HirExpr>,
        span: Span,
    },
    While {
        cond: HirExpr,
        body: Vec<HirStmt>,
        span: Span,
    },
    /// `for binder in iterable { body }`, lowered through the iterator
    /// protocol (`iter_init` / `iter_next` over a `Step` union).
    For {
        sym: SymbolId,
        name: Symbol,
        binder_ty: TypeId,
        iterable: HirExpr,
        body: Vec<HirStmt>,
        span: Span,
    },
    If {
        cond: HirExpr,
        then_body: Vec<HirStmt>,
        else_body: Vec<HirStmt>,
        span: Span,
    },
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

#[derive(Debug, Clone)]
pub enum HirLit {
    /// `text` preserves the source spelling for widths that require
    /// reparsing in the back-end.
    Int { value: i64, text: Option<Symbol> },
    Float { value: f64, text: Option<Symbol> },
    Bool(bool),
    Str(Symbol),
    Nothing,
}

/// How a call names its target.
#[derive(Debug, Clone)]
pub enum HirCallee {
    /// Direct call of a resolved function symbol. `type_args` is non-empty
    /// for monomorphized intrinsic instances (`size_of` and friends) whose
    /// code generation depends on the instantiation.
    Fn {
        sym: SymbolId,
        name: Symbol,
        type_args: Vec<TypeId>,
    },
    /// Indirect call through a function-typed value.
    Value(Box<HirExpr>),
}

#[derive(Debug, Clone)]
pub enum SelectArmKind {
    /// Await a task.
    Task(HirExpr),
    /// Receive from a channel.
    Recv(HirExpr),
    /// Send a value on a channel.
    Send { chan: HirExpr, value: HirExpr },
    /// Fire after the given number of milliseconds.
    Timeout(HirExpr),
    /// Taken immediately when no other arm is ready.
    Default,
}

#[derive(Debug, Clone)]
pub struct HirSelectArm {
    pub kind: SelectArmKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CompareArm {
    /// Tag name tested against the scrutinee.
    pub tag: Symbol,
    /// Payload binders, in payload order.
    pub binders: Vec<(SymbolId, Symbol, TypeId)>,
    pub body: HirExpr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum HirExpr {
    Literal {
        lit: HirLit,
        ty: TypeId,
        span: Span,
    },
    /// Resolved value reference: local, global, const, or function symbol.
    /// The lowerer decides which via its scope maps.
    Var {
        sym: SymbolId,
        name: Symbol,
        ty: TypeId,
        span: Span,
    },
    Unary {
        op: UnOp,
        expr: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    Call {
        callee: HirCallee,
        args: Vec<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    /// Method-style call. Channel `send`/`recv` and task `timeout` reach
    /// the lowerer in this form and are rewritten to suspend instructions
    /// inside async functions.
    MethodCall {
        receiver: Box<HirExpr>,
        method: Symbol,
        args: Vec<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    Field {
        base: Box<HirExpr>,
        name: Symbol,
        index: u32,
        ty: TypeId,
        span: Span,
    },
    Index {
        base: Box<HirExpr>,
        index: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    /// `&place` / `&mut place`.
    AddrOf {
        mutable: bool,
        place: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    StructLit {
        ty: TypeId,
        fields: Vec<(Symbol, HirExpr)>,
        span: Span,
    },
    ArrayLit {
        ty: TypeId,
        elems: Vec<HirExpr>,
        span: Span,
    },
    TupleLit {
        ty: TypeId,
        elems: Vec<HirExpr>,
        span: Span,
    },
    /// Sum-type introspection predicate: `value is Tag`.
    TagTest {
        value: Box<HirExpr>,
        tag: Symbol,
        ty: TypeId,
        span: Span,
    },
    /// Runtime type classification: `value is Type`.
    TypeTest {
        value: Box<HirExpr>,
        tested: TypeId,
        ty: TypeId,
        span: Span,
    },
    /// Heir (subtype) classification against a base type.
    HeirTest {
        value: Box<HirExpr>,
        tested: TypeId,
        ty: TypeId,
        span: Span,
    },
    /// Map literal, built through `rt_map_new` / `rt_map_insert`.
    MapLit {
        ty: TypeId,
        entries: Vec<(HirExpr, HirExpr)>,
        span: Span,
    },
    /// `compare scrutinee { Tag(binders) => body; ...; else => default }`.
    Compare {
        scrutinee: Box<HirExpr>,
        arms: Vec<CompareArm>,
        default: Option<Box<HirExpr>>,
        ty: TypeId,
        span: Span,
    },
    If {
        cond: Box<HirExpr>,
        then_expr: Box<HirExpr>,
        else_expr: Option<Box<HirExpr>>,
        ty: TypeId,
        span: Span,
    },
    Block {
        stmts: Vec<HirStmt>,
        tail: Option<Box<HirExpr>>,
        ty: TypeId,
        span: Span,
    },
    Cast {
        expr: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    Await {
        task: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    Spawn {
        value: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    ChanSend {
        chan: Box<HirExpr>,
        value: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    ChanRecv {
        chan: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    Timeout {
        task: Box<HirExpr>,
        millis: Box<HirExpr>,
        ty: TypeId,
        span: Span,
    },
    Select {
        arms: Vec<HirSelectArm>,
        is_race: bool,
        ty: TypeId,
        span: Span,
    },
}

impl HirExpr {
    pub fn ty(&self) -> TypeId {
        match self {
            HirExpr::Literal { ty, .. }
            | HirExpr::Var { ty, .. }
            | HirExpr::Unary { ty, .. }
            | HirExpr::Binary { ty, .. }
            | HirExpr::Call { ty, .. }
            | HirExpr::MethodCall { ty, .. }
            | HirExpr::Field { ty, .. }
            | HirExpr::Index { ty, .. }
            | HirExpr::AddrOf { ty, .. }
            | HirExpr::StructLit { ty, .. }
            | HirExpr::ArrayLit { ty, .. }
            | HirExpr::TupleLit { ty, .. }
            | HirExpr::TagTest { ty, .. }
            | HirExpr::TypeTest { ty, .. }
            | HirExpr::HeirTest { ty, .. }
            | HirExpr::MapLit { ty, .. }
            | HirExpr::Compare { ty, .. }
            | HirExpr::If { ty, .. }
            | HirExpr::Block { ty, .. }
            | HirExpr::Cast { ty, .. }
            | HirExpr::Await { ty, .. }
            | HirExpr::Spawn { ty, .. }
            | HirExpr::ChanSend { ty, .. }
            | HirExpr::ChanRecv { ty, .. }
            | HirExpr::Timeout { ty, .. }
            | HirExpr::Select { ty, .. } => *ty,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            HirExpr::Literal { span, .. }
            | HirExpr::Var { span, .. }
            | HirExpr::Unary { span, .. }
            | HirExpr::Binary { span, .. }
            | HirExpr::Call { span, .. }
            | HirExpr::MethodCall { span, .. }
            | HirExpr::Field { span, .. }
            | HirExpr::Index { span, .. }
            | HirExpr::AddrOf { span, .. }
            | HirExpr::StructLit { span, .. }
            | HirExpr::ArrayLit { span, .. }
            | HirExpr::TupleLit { span, .. }
            | HirExpr::TagTest { span, .. }
            | HirExpr::TypeTest { span, .. }
            | HirExpr::HeirTest { span, .. }
            | HirExpr::MapLit { span, .. }
            | HirExpr::Compare { span, .. }
            | HirExpr::If { span, .. }
            | HirExpr::Block { span, .. }
            | HirExpr::Cast { span, .. }
            | HirExpr::Await { span, .. }
            | HirExpr::Spawn { span, .. }
            | HirExpr::ChanSend { span, .. }
            | HirExpr::ChanRecv { span, .. }
            | HirExpr::Timeout { span, .. }
            | HirExpr::Select { span, .. } => *span,
        }
    }

    /// Is this a place expression (names storage rather than a value)?
    pub fn is_place(&self) -> bool {
        match self {
            HirExpr::Var { .. } => true,
            HirExpr::Field { base, .. } | HirExpr::Index { base, .. } => base.is_place(),
            _ => false,
        }
    }
}
