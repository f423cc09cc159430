//! HIR → MIR lowering.
//!
//! Translates monomorphized HIR functions into basic-block MIR, allocating
//! locals and temporaries, preserving ownership/move semantics, and
//! synthesizing `__surge_start` when the module declares an entrypoint.
//!
//! Conventions:
//! - Functions are sorted by `(name, symbol)` before `FuncId` assignment so
//!   dumps and diagnostics are deterministic.
//! - Expression lowering produces [`Operand`]s. `lower_expr` may yield a
//!   reference-typed operand; `lower_value_expr` auto-derefs exactly once
//!   when a value is required and the expression type is a reference.
//! - Operands default to `Copy`; consuming positions (call arguments,
//!   literal fields, assignment right-hand sides) upgrade to `Move` iff the
//!   type is non-copy.
//! - `if`/`block`/`compare` expressions use the result-local protocol:
//!   allocate a result temp, write it at every arm tail, branch to a join
//!   block. `Nothing`-typed expressions skip the temp.
//! - A shared borrow of a string literal is promoted to a module-level
//!   static-string global interned by content, so repeated references share
//!   one address.
//! - Scope exits emit lifetime endpoints for the scope's bindings: `drop`
//!   for owning locals, `end_borrow` for borrows, skipped on paths that
//!   already returned.

use crate::builder::FuncBuilder;
use crate::error::LowerError;
use crate::ir::*;
use crate::lower::consts::eval_const;
use crate::lower::entry::synthesize_start;
use crate::meta::build_metadata;
use surgec_sem::hir::{
    BinOp as HirBinOp, CompareArm, HirCallee, HirConst, HirExpr, HirFunc, HirLit, HirModule,
    HirSelectArm, HirStmt, SelectArmKind, UnOp as HirUnOp,
};
use surgec_sem::{SemResult, SymbolId, TypeId, TypeKind};
use surgec_util::{FxHashMap, Span, Symbol};

/// Module-wide lowering context. Owns the output pieces until the final
/// `Module` is assembled.
pub(crate) struct LowerCx<'h, 's> {
    pub hir: &'h HirModule,
    pub sem: &'s mut SemResult,
    pub globals: surgec_util::IndexVec<GlobalId, Global>,
    pub global_by_sym: FxHashMap<SymbolId, GlobalId>,
    pub const_by_sym: FxHashMap<SymbolId, &'h HirConst>,
    pub func_sigs: FxHashMap<SymbolId, &'h HirFunc>,
    /// Static-string globals interned by raw content.
    pub string_globals: FxHashMap<Symbol, GlobalId>,
    /// `(global, content)` in creation order (== global-id order).
    pub string_inits: Vec<(GlobalId, Symbol)>,
    pub const_cache: FxHashMap<SymbolId, Const>,
    pub const_stack: Vec<SymbolId>,
    /// Recorded `func_type_args` entries for intrinsic instances.
    pub type_arg_records: Vec<(SymbolId, Vec<TypeId>)>,
}

impl<'h, 's> LowerCx<'h, 's> {
    fn new(hir: &'h HirModule, sem: &'s mut SemResult) -> Self {
        let mut cx = Self {
            hir,
            sem,
            globals: surgec_util::IndexVec::new(),
            global_by_sym: FxHashMap::default(),
            const_by_sym: FxHashMap::default(),
            func_sigs: FxHashMap::default(),
            string_globals: FxHashMap::default(),
            string_inits: Vec::new(),
            const_cache: FxHashMap::default(),
            const_stack: Vec::new(),
            type_arg_records: Vec::new(),
        };
        for c in &hir.consts {
            cx.const_by_sym.insert(c.sym, c);
        }
        for f in &hir.funcs {
            cx.func_sigs.insert(f.sym, f);
        }
        cx
    }

    /// Intern a static-string global for a borrowed string literal.
    pub fn string_global(&mut self, content: Symbol) -> GlobalId {
        if let Some(&gid) = self.string_globals.get(&content) {
            return gid;
        }
        let name = Symbol::intern(&format!("__str${}", self.string_inits.len()));
        let sym = self.sem.symbols.fresh(name, Symbol::intern(""));
        let gid = self.globals.push(Global {
            sym,
            ty: self.sem.types.builtins().string,
            name,
            is_mut: false,
            span: Span::DUMMY,
        });
        self.string_globals.insert(content, gid);
        self.string_inits.push((gid, content));
        gid
    }
}

/// Lower a whole HIR module through to a MIR [`Module`].
pub fn lower_module(hir: &HirModule, sem: &mut SemResult) -> Result<Module, LowerError> {
    let layout = sem.layout;
    let mut cx = LowerCx::new(hir, sem);

    // Declared globals get their ids in declaration order; the synthesized
    // entry initializes them in the same order.
    for g in &hir.globals {
        let gid = cx.globals.push(Global {
            sym: g.sym,
            ty: g.ty,
            name: g.name,
            is_mut: g.is_mut,
            span: g.span,
        });
        cx.global_by_sym.insert(g.sym, gid);
    }

    // Stable function order: by (name, symbol id).
    let mut order: Vec<&HirFunc> = hir.funcs.iter().collect();
    order.sort_by(|a, b| {
        a.name
            .as_str()
            .cmp(b.name.as_str())
            .then(a.sym.cmp(&b.sym))
    });

    let mut funcs = Vec::with_capacity(order.len());
    for f in order {
        funcs.push(lower_func(&mut cx, f)?);
    }

    if let Some(entry) = hir.entry {
        funcs.push(synthesize_start(&mut cx, entry)?);
    }

    let mut module = Module::new(layout);
    module.globals = cx.globals;
    for func in funcs {
        module.add_func(func);
    }
    for (sym, args) in cx.type_arg_records {
        module.meta.func_type_args.insert(sym, args);
    }

    build_metadata(&mut module, cx.sem);
    Ok(module)
}

fn lower_func(cx: &mut LowerCx<'_, '_>, hir_fn: &HirFunc) -> Result<Func, LowerError> {
    let mut fcx = FuncCx::new(cx, hir_fn.sym, hir_fn.name, hir_fn.span, hir_fn.result);
    fcx.b.func.is_async = hir_fn.is_async;
    fcx.b.func.failfast = hir_fn.failfast;
    fcx.is_async = hir_fn.is_async;

    for p in &hir_fn.params {
        let local = {
            let types = &fcx.cx.sem.types;
            fcx.b.local(p.sym, p.name, p.ty, types, p.span)
        };
        fcx.bind(p.sym, local);
    }
    fcx.b.func.param_count = hir_fn.params.len();

    if hir_fn.is_async {
        let uint = fcx.cx.sem.types.builtins().uint;
        let scope = {
            let types = &fcx.cx.sem.types;
            fcx.b
                .local(SymbolId::NONE, Symbol::intern("__scope"), uint, types, Span::DUMMY)
        };
        fcx.b.func.scope_local = scope;
    }

    fcx.b.start_entry();
    fcx.lower_body(&hir_fn.body, true)?;
    fcx.end_scope_lifetimes();

    if !fcx.b.is_terminated() {
        let result = fcx.b.func.result;
        if result.is_none() || fcx.cx.sem.types.is_nothing(result) {
            fcx.b.terminate(Terminator::Return {
                has_value: false,
                value: None,
                early: false,
                cancelled: false,
            });
        } else {
            // Control cannot fall off the end of a value-returning body.
            fcx.b.terminate(Terminator::Unreachable);
        }
    }

    Ok(fcx.b.finish())
}

/// Per-function lowering state.
pub(crate) struct FuncCx<'a, 'h, 's> {
    pub cx: &'a mut LowerCx<'h, 's>,
    pub b: FuncBuilder,
    scopes: Vec<FxHashMap<SymbolId, LocalId>>,
    pub is_async: bool,
}

impl<'a, 'h, 's> FuncCx<'a, 'h, 's> {
    pub fn new(
        cx: &'a mut LowerCx<'h, 's>,
        sym: SymbolId,
        name: Symbol,
        span: Span,
        result: TypeId,
    ) -> Self {
        Self {
            cx,
            b: FuncBuilder::new(sym, name, span, result),
            scopes: vec![FxHashMap::default()],
            is_async: false,
        }
    }

    // ---- scopes ----------------------------------------------------------

    pub fn bind(&mut self, sym: SymbolId, local: LocalId) {
        self.scopes
            .last_mut()
            .expect("scope stack never empty")
            .insert(sym, local);
    }

    fn lookup(&self, sym: SymbolId) -> Option<LocalId> {
        self.scopes.iter().rev().find_map(|s| s.get(&sym).copied())
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Emit lifetime endpoints for the innermost scope's bindings: `drop`
    /// for owning locals, `end_borrow` for borrows, in reverse binding
    /// order. Skipped when the current block already terminated (every
    /// local on that path was consumed by the return).
    fn end_scope_lifetimes(&mut self) {
        if self.b.is_terminated() {
            return;
        }
        let Some(scope) = self.scopes.last() else {
            return;
        };
        let mut locals: Vec<LocalId> = scope.values().copied().collect();
        locals.sort();
        for local in locals.into_iter().rev() {
            let flags = self.b.func.locals[local].flags;
            if flags.is_borrow() {
                self.b.push(Instr::EndBorrow {
                    place: Place::local(local),
                });
            } else if flags.is_owning() {
                self.b.push(Instr::Drop {
                    place: Place::local(local),
                });
            }
        }
    }

    // ---- small helpers ---------------------------------------------------

    pub(crate) fn temp(&mut self, ty: TypeId) -> LocalId {
        let types = &self.cx.sem.types;
        self.b.temp(ty, types)
    }

    /// Materialize an operand into a fresh temp local.
    pub(crate) fn materialize(&mut self, op: Operand) -> LocalId {
        let ty = op.ty;
        let tmp = self.temp(ty);
        self.b.assign(Place::local(tmp), Rvalue::Use(op));
        tmp
    }

    /// Default-copy read of a local.
    pub(crate) fn read_local(&self, local: LocalId) -> Operand {
        let info = &self.b.func.locals[local];
        Operand::copy(Place::local(local), info.ty)
    }

    /// Upgrade to `Move` in a consuming position iff the type is non-copy.
    pub(crate) fn consume(&self, op: Operand) -> Operand {
        if self.cx.sem.types.is_copy(op.ty) {
            return op;
        }
        match op.kind {
            OperandKind::Copy(place) => Operand::mov(place, op.ty),
            _ => op,
        }
    }

    pub(crate) fn nothing_op(&self) -> Operand {
        Operand::nothing(self.cx.sem.types.builtins().nothing)
    }

    pub(crate) fn is_nothing(&self, ty: TypeId) -> bool {
        ty.is_none() || self.cx.sem.types.is_nothing(ty)
    }

    // ---- statements ------------------------------------------------------

    /// Lower a statement list. `tail` marks the lexical end of the function
    /// body: returns there are not "early" for scope-epilogue purposes.
    pub fn lower_body(&mut self, stmts: &[HirStmt], tail: bool) -> Result<(), LowerError> {
        let last = stmts.len().checked_sub(1);
        for (i, stmt) in stmts.iter().enumerate() {
            if self.b.is_terminated() {
                break;
            }
            self.lower_stmt(stmt, tail && Some(i) == last)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &HirStmt, tail: bool) -> Result<(), LowerError> {
        match stmt {
            HirStmt::Let { sym, name, ty, init, span } => {
                let local = {
                    let types = &self.cx.sem.types;
                    self.b.local(*sym, *name, *ty, types, *span)
                };
                self.bind(*sym, local);
                if let Some(init) = init {
                    let op = self.lower_value_expr(init)?;
                    let op = self.consume(op);
                    self.b.assign(Place::local(local), Rvalue::Use(op));
                }
                Ok(())
            }
            HirStmt::Assign { target, op, value, .. } => {
                let place = self.lower_place_expr(target)?;
                // A reference-typed l-value auto-unwraps when assigned its
                // referent type.
                let (place, slot_ty) =
                    if self.cx.sem.types.deref_once(target.ty()) == Some(value.ty()) {
                        (place.deref(), value.ty())
                    } else {
                        (place, target.ty())
                    };
                match op {
                    Some(binop) => {
                        // `x op= y` lowers to `tmp = x op y; x = tmp`.
                        let lhs = Operand::copy(place.clone(), slot_ty);
                        let rhs = self.lower_value_expr(value)?;
                        let tmp = self.temp(slot_ty);
                        self.b.assign(
                            Place::local(tmp),
                            Rvalue::Binary {
                                op: lower_binop(*binop),
                                lhs,
                                rhs,
                            },
                        );
                        let read = self.read_local(tmp);
                        let read = self.consume(read);
                        self.b.assign(place, Rvalue::Use(read));
                    }
                    None => {
                        let op = self.lower_value_expr(value)?;
                        let op = self.consume(op);
                        self.b.assign(place, Rvalue::Use(op));
                    }
                }
                Ok(())
            }
            HirStmt::Expr(e) => {
                self.lower_expr(e)?;
                Ok(())
            }
            HirStmt::Return { value, .. } => {
                let (has_value, op) = match value {
                    Some(v) if !self.is_nothing(v.ty()) => {
                        let op = self.lower_value_expr(v)?;
                        (true, Some(self.consume(op)))
                    }
                    Some(v) => {
                        self.lower_expr(v)?;
                        (false, None)
                    }
                    None => (false, None),
                };
                self.b.terminate(Terminator::Return {
                    has_value,
                    value: op,
                    early: !tail,
                    cancelled: false,
                });
                Ok(())
            }
            HirStmt::While { cond, body, .. } => {
                let cond_bb = self.b.new_block();
                let body_bb = self.b.new_block();
                let exit_bb = self.b.new_block();

                self.b.terminate(Terminator::Goto { target: cond_bb });
                self.b.switch_to(cond_bb);
                let c = self.lower_value_expr(cond)?;
                self.b.terminate(Terminator::If {
                    cond: c,
                    then_bb: body_bb,
                    else_bb: exit_bb,
                });

                self.b.switch_to(body_bb);
                self.push_scope();
                self.lower_body(body, false)?;
                self.end_scope_lifetimes();
                self.pop_scope();
                self.b.terminate(Terminator::Goto { target: cond_bb });

                self.b.switch_to(exit_bb);
                Ok(())
            }
            HirStmt::For { sym, name, binder_ty, iterable, body, span } => {
                let iterable_op = self.lower_value_expr(iterable)?;
                let iterable_op = self.consume(iterable_op);
                let iter_ty = self.cx.sem.types.iter_of(*binder_ty);
                let step_ty = self.cx.sem.types.step_of(*binder_ty);
                let bool_ty = self.cx.sem.types.builtins().bool_;

                let iter_l = self.temp(iter_ty);
                self.b.assign(
                    Place::local(iter_l),
                    Rvalue::IterInit {
                        iterable: iterable_op,
                    },
                );

                let cond_bb = self.b.new_block();
                let body_bb = self.b.new_block();
                let exit_bb = self.b.new_block();

                self.b.terminate(Terminator::Goto { target: cond_bb });
                self.b.switch_to(cond_bb);
                let step_l = self.temp(step_ty);
                self.b.assign(
                    Place::local(step_l),
                    Rvalue::IterNext {
                        iter: Operand::copy(Place::local(iter_l), iter_ty),
                    },
                );
                let has_next = self.temp(bool_ty);
                self.b.assign(
                    Place::local(has_next),
                    Rvalue::TagTest {
                        value: Operand::copy(Place::local(step_l), step_ty),
                        tag: Symbol::intern("Next"),
                    },
                );
                self.b.terminate(Terminator::If {
                    cond: Operand::copy(Place::local(has_next), bool_ty),
                    then_bb: body_bb,
                    else_bb: exit_bb,
                });

                self.b.switch_to(body_bb);
                self.push_scope();
                let binder = {
                    let types = &self.cx.sem.types;
                    self.b.local(*sym, *name, *binder_ty, types, *span)
                };
                self.b.assign(
                    Place::local(binder),
                    Rvalue::TagPayload {
                        value: Operand::copy(Place::local(step_l), step_ty),
                        tag: Symbol::intern("Next"),
                        index: 0,
                    },
                );
                self.bind(*sym, binder);
                self.lower_body(body, false)?;
                self.end_scope_lifetimes();
                self.pop_scope();
                self.b.terminate(Terminator::Goto { target: cond_bb });

                self.b.switch_to(exit_bb);
                Ok(())
            }
            HirStmt::If { cond, then_body, else_body, .. } => {
                let c = self.lower_value_expr(cond)?;
                let then_bb = self.b.new_block();
                let else_bb = self.b.new_block();
                let join_bb = self.b.new_block();

                self.b.terminate(Terminator::If {
                    cond: c,
                    then_bb,
                    else_bb,
                });

                self.b.switch_to(then_bb);
                self.push_scope();
                self.lower_body(then_body, tail)?;
                self.end_scope_lifetimes();
                self.pop_scope();
                self.b.terminate(Terminator::Goto { target: join_bb });

                self.b.switch_to(else_bb);
                self.push_scope();
                self.lower_body(else_body, tail)?;
                self.end_scope_lifetimes();
                self.pop_scope();
                self.b.terminate(Terminator::Goto { target: join_bb });

                self.b.switch_to(join_bb);
                Ok(())
            }
        }
    }

    // ---- places ----------------------------------------------------------

    /// Lower an expression to an l-value path. Non-place expressions are
    /// materialized into a temp.
    fn lower_place_expr(&mut self, e: &HirExpr) -> Result<Place, LowerError> {
        match e {
            HirExpr::Var { sym, name, .. } => {
                if let Some(local) = self.lookup(*sym) {
                    return Ok(Place::local(local));
                }
                if let Some(&gid) = self.cx.global_by_sym.get(sym) {
                    return Ok(Place::global(gid));
                }
                // Consts and function symbols are values, not storage.
                let op = self.lower_expr(e).map_err(|_| LowerError::UnknownValue { name: *name })?;
                Ok(Place::local(self.materialize(op)))
            }
            HirExpr::Field { base, name, index, .. } => {
                let mut place = self.lower_place_expr(base)?;
                if self.cx.sem.types.is_ref(base.ty()) {
                    place = place.deref();
                }
                Ok(place.field(*name, *index))
            }
            HirExpr::Index { base, index, .. } => {
                let mut place = self.lower_place_expr(base)?;
                if self.cx.sem.types.is_ref(base.ty()) {
                    place = place.deref();
                }
                let idx_op = self.lower_value_expr(index)?;
                let plain = match &idx_op.kind {
                    OperandKind::Copy(p) => p.as_plain_local(),
                    _ => None,
                };
                let idx_local = match plain {
                    Some(local) => local,
                    None => self.materialize(idx_op),
                };
                Ok(place.index(idx_local))
            }
            other => {
                let op = self.lower_expr(other)?;
                Ok(Place::local(self.materialize(op)))
            }
        }
    }

    // ---- expressions -----------------------------------------------------

    /// Lower an expression where a value-typed operand is required:
    /// reference-typed results auto-deref exactly once.
    pub fn lower_value_expr(&mut self, e: &HirExpr) -> Result<Operand, LowerError> {
        let op = self.lower_expr(e)?;
        match self.cx.sem.types.deref_once(op.ty) {
            Some(inner) => {
                let place = match op.kind {
                    OperandKind::Copy(p) | OperandKind::Move(p) => p,
                    _ => Place::local(self.materialize(op)),
                };
                Ok(Operand::copy(place.deref(), inner))
            }
            None => Ok(op),
        }
    }

    pub fn lower_expr(&mut self, e: &HirExpr) -> Result<Operand, LowerError> {
        match e {
            HirExpr::Literal { lit, ty, .. } => Ok(Operand::konst(lower_lit(lit), *ty)),

            HirExpr::Var { sym, name, ty, .. } => {
                if let Some(local) = self.lookup(*sym) {
                    return Ok(self.read_local(local));
                }
                if let Some(&gid) = self.cx.global_by_sym.get(sym) {
                    return Ok(Operand::copy(Place::global(gid), *ty));
                }
                if self.cx.const_by_sym.contains_key(sym) {
                    let value = eval_const(self.cx, *sym)?;
                    return Ok(Operand::konst(value, *ty));
                }
                if self.cx.func_sigs.contains_key(sym) {
                    return Ok(Operand::konst(
                        Const::FnAddr {
                            sym: *sym,
                            name: *name,
                        },
                        *ty,
                    ));
                }
                Err(LowerError::UnknownValue { name: *name })
            }

            HirExpr::Unary { op, expr, ty, .. } => {
                let operand = self.lower_value_expr(expr)?;
                let tmp = self.temp(*ty);
                self.b.assign(
                    Place::local(tmp),
                    Rvalue::Unary {
                        op: lower_unop(*op),
                        operand,
                    },
                );
                Ok(self.read_local(tmp))
            }

            HirExpr::Binary { op, lhs, rhs, ty, .. } => {
                let l = self.lower_value_expr(lhs)?;
                let r = self.lower_value_expr(rhs)?;
                let tmp = self.temp(*ty);
                self.b.assign(
                    Place::local(tmp),
                    Rvalue::Binary {
                        op: lower_binop(*op),
                        lhs: l,
                        rhs: r,
                    },
                );
                Ok(self.read_local(tmp))
            }

            HirExpr::Call { callee, args, ty, span } => {
                self.lower_call(callee, args, *ty, *span)
            }

            HirExpr::MethodCall { receiver, method, args, ty, .. } => {
                self.lower_method_call(receiver, *method, args, *ty)
            }

            HirExpr::Field { ty, .. } | HirExpr::Index { ty, .. } => {
                let place = self.lower_place_expr(e)?;
                Ok(Operand::copy(place, *ty))
            }

            HirExpr::AddrOf { mutable, place, ty, .. } => {
                // A shared borrow of a string literal is promoted to an
                // interned static-string global.
                if let HirExpr::Literal { lit: HirLit::Str(content), .. } = place.as_ref() {
                    if !mutable {
                        let gid = self.cx.string_global(*content);
                        return Ok(Operand::addr_of(Place::global(gid), *ty));
                    }
                }
                let p = self.lower_place_expr(place)?;
                Ok(if *mutable {
                    Operand::addr_of_mut(p, *ty)
                } else {
                    Operand::addr_of(p, *ty)
                })
            }

            HirExpr::StructLit { ty, fields, .. } => {
                let mut ops = Vec::with_capacity(fields.len());
                for (_, fe) in fields {
                    let op = self.lower_value_expr(fe)?;
                    ops.push(self.consume(op));
                }
                let tmp = self.temp(*ty);
                self.b.assign(
                    Place::local(tmp),
                    Rvalue::StructLit { ty: *ty, fields: ops },
                );
                Ok(self.read_local(tmp))
            }

            HirExpr::ArrayLit { ty, elems, .. } => {
                let mut ops = Vec::with_capacity(elems.len());
                for el in elems {
                    let op = self.lower_value_expr(el)?;
                    ops.push(self.consume(op));
                }
                let tmp = self.temp(*ty);
                self.b
                    .assign(Place::local(tmp), Rvalue::ArrayLit { ty: *ty, elems: ops });
                Ok(self.read_local(tmp))
            }

            HirExpr::TupleLit { ty, elems, .. } => {
                let mut ops = Vec::with_capacity(elems.len());
                for el in elems {
                    let op = self.lower_value_expr(el)?;
                    ops.push(self.consume(op));
                }
                let tmp = self.temp(*ty);
                self.b
                    .assign(Place::local(tmp), Rvalue::TupleLit { ty: *ty, elems: ops });
                Ok(self.read_local(tmp))
            }

            HirExpr::TagTest { value, tag, ty, .. } => {
                let v = self.lower_value_expr(value)?;
                let tmp = self.temp(*ty);
                self.b.assign(
                    Place::local(tmp),
                    Rvalue::TagTest { value: v, tag: *tag },
                );
                Ok(self.read_local(tmp))
            }

            HirExpr::TypeTest { value, tested, ty, .. } => {
                let v = self.lower_value_expr(value)?;
                let tmp = self.temp(*ty);
                self.b.assign(
                    Place::local(tmp),
                    Rvalue::TypeTest {
                        value: v,
                        ty: *tested,
                    },
                );
                Ok(self.read_local(tmp))
            }

            HirExpr::HeirTest { value, tested, ty, .. } => {
                let v = self.lower_value_expr(value)?;
                let tmp = self.temp(*ty);
                self.b.assign(
                    Place::local(tmp),
                    Rvalue::HeirTest {
                        value: v,
                        ty: *tested,
                    },
                );
                Ok(self.read_local(tmp))
            }

            HirExpr::MapLit { ty, entries, .. } => {
                let map_l = self.temp(*ty);
                let map_new = self.cx.sem.well_known.rt_map_new;
                let map_new_name = self.cx.sem.symbols.name(map_new);
                self.b.push(Instr::Call {
                    dst: Some(Place::local(map_l)),
                    callee: Callee::Sym {
                        sym: map_new,
                        name: map_new_name,
                    },
                    args: Vec::new(),
                });

                let map_ref_ty = self.cx.sem.types.mk_ref_mut(*ty);
                let map_insert = self.cx.sem.well_known.rt_map_insert;
                let map_insert_name = self.cx.sem.symbols.name(map_insert);
                for (k, v) in entries {
                    let k = self.lower_value_expr(k)?;
                    let k = self.consume(k);
                    let v = self.lower_value_expr(v)?;
                    let v = self.consume(v);
                    self.b.push(Instr::Call {
                        dst: None,
                        callee: Callee::Sym {
                            sym: map_insert,
                            name: map_insert_name,
                        },
                        args: vec![
                            Operand::addr_of_mut(Place::local(map_l), map_ref_ty),
                            k,
                            v,
                        ],
                    });
                }
                Ok(self.read_local(map_l))
            }

            HirExpr::Compare { scrutinee, arms, default, ty, .. } => {
                self.lower_compare(scrutinee, arms, default.as_deref(), *ty)
            }

            HirExpr::If { cond, then_expr, else_expr, ty, .. } => {
                let c = self.lower_value_expr(cond)?;
                let then_bb = self.b.new_block();
                let else_bb = self.b.new_block();
                let join_bb = self.b.new_block();
                let result = if self.is_nothing(*ty) {
                    None
                } else {
                    Some(self.temp(*ty))
                };

                self.b.terminate(Terminator::If {
                    cond: c,
                    then_bb,
                    else_bb,
                });

                self.b.switch_to(then_bb);
                let tv = self.lower_value_expr(then_expr)?;
                if let Some(res) = result {
                    let tv = self.consume(tv);
                    self.b.assign(Place::local(res), Rvalue::Use(tv));
                }
                self.b.terminate(Terminator::Goto { target: join_bb });

                self.b.switch_to(else_bb);
                if let Some(else_expr) = else_expr {
                    let ev = self.lower_value_expr(else_expr)?;
                    if let Some(res) = result {
                        let ev = self.consume(ev);
                        self.b.assign(Place::local(res), Rvalue::Use(ev));
                    }
                }
                self.b.terminate(Terminator::Goto { target: join_bb });

                self.b.switch_to(join_bb);
                Ok(match result {
                    Some(res) => self.read_local(res),
                    None => self.nothing_op(),
                })
            }

            HirExpr::Block { stmts, tail, .. } => {
                self.push_scope();
                self.lower_body(stmts, false)?;
                let out = match tail {
                    Some(t) => {
                        let op = self.lower_value_expr(t)?;
                        let op = self.consume(op);
                        let parked = self.materialize(op);
                        self.end_scope_lifetimes();
                        self.read_local(parked)
                    }
                    None => {
                        self.end_scope_lifetimes();
                        self.nothing_op()
                    }
                };
                self.pop_scope();
                Ok(out)
            }

            HirExpr::Cast { expr, ty, .. } => {
                let operand = self.lower_value_expr(expr)?;
                let kind = cast_kind(&self.cx.sem.types, operand.ty, *ty);
                let tmp = self.temp(*ty);
                self.b.assign(
                    Place::local(tmp),
                    Rvalue::Cast {
                        kind,
                        operand,
                        to: *ty,
                    },
                );
                Ok(self.read_local(tmp))
            }

            HirExpr::Await { task, ty, .. } => {
                self.require_async("await")?;
                let task_op = self.lower_value_expr(task)?;
                let task_op = self.consume(task_op);
                if self.is_nothing(*ty) {
                    self.b.push(Instr::Await {
                        dst: None,
                        task: task_op,
                    });
                    Ok(self.nothing_op())
                } else {
                    let dst = self.temp(*ty);
                    self.b.push(Instr::Await {
                        dst: Some(dst),
                        task: task_op,
                    });
                    Ok(self.read_local(dst))
                }
            }

            HirExpr::Spawn { value, ty, .. } => {
                let v = self.lower_value_expr(value)?;
                let v = self.consume(v);
                let dst = self.temp(*ty);
                self.b.push(Instr::Spawn { dst, value: v });
                Ok(self.read_local(dst))
            }

            HirExpr::ChanSend { chan, value, .. } => {
                self.require_async("channel send")?;
                let c = self.lower_value_expr(chan)?;
                let v = self.lower_value_expr(value)?;
                let v = self.consume(v);
                self.b.push(Instr::ChanSend {
                    chan: c,
                    value: v,
                    ready: BlockId::NONE,
                    pend: BlockId::NONE,
                });
                Ok(self.nothing_op())
            }

            HirExpr::ChanRecv { chan, ty, .. } => {
                self.require_async("channel recv")?;
                let c = self.lower_value_expr(chan)?;
                let dst = self.temp(*ty);
                self.b.push(Instr::ChanRecv {
                    dst: Some(dst),
                    chan: c,
                    ready: BlockId::NONE,
                    pend: BlockId::NONE,
                });
                Ok(self.read_local(dst))
            }

            HirExpr::Timeout { task, millis, ty, .. } => {
                self.require_async("timeout")?;
                let t = self.lower_value_expr(task)?;
                let t = self.consume(t);
                let m = self.lower_value_expr(millis)?;
                let dst = self.temp(*ty);
                self.b.push(Instr::Timeout {
                    dst: Some(dst),
                    task: t,
                    millis: m,
                    ready: BlockId::NONE,
                    pend: BlockId::NONE,
                });
                Ok(self.read_local(dst))
            }

            HirExpr::Select { arms, is_race, ty, .. } => {
                self.require_async(if *is_race { "race" } else { "select" })?;
                self.lower_select(arms, *is_race, *ty)
            }
        }
    }

    fn require_async(&self, what: &'static str) -> Result<(), LowerError> {
        if self.is_async {
            Ok(())
        } else {
            Err(LowerError::SuspendOutsideAsync {
                what,
                func: self.b.func.name,
            })
        }
    }

    pub(crate) fn lower_call(
        &mut self,
        callee: &HirCallee,
        args: &[HirExpr],
        ty: TypeId,
        _span: Span,
    ) -> Result<Operand, LowerError> {
        match callee {
            HirCallee::Fn { sym, name, type_args } => {
                if !type_args.is_empty() {
                    self.cx.type_arg_records.push((*sym, type_args.clone()));
                }

                let mut ops = Vec::with_capacity(args.len());
                for a in args {
                    let op = self.lower_value_expr(a)?;
                    ops.push(self.consume(op));
                }

                // Bind missing trailing arguments from the callee's default
                // expressions, lowered in the caller's scope under a scoped
                // symbol→local rebind.
                let sig = self.cx.func_sigs.get(sym).copied();
                if let Some(sig) = sig {
                    if ops.len() < sig.params.len() {
                        self.push_scope();
                        let provided: Vec<Operand> = ops.drain(..).collect();
                        for (i, op) in provided.into_iter().enumerate() {
                            let local = self.materialize(op);
                            self.bind(sig.params[i].sym, local);
                            let read = self.read_local(local);
                            ops.push(self.consume(read));
                        }
                        for param in sig.params.iter().skip(ops.len()) {
                            let Some(default) = &param.default else {
                                self.pop_scope();
                                return Err(LowerError::MissingDefault {
                                    func: *name,
                                    param: param.name,
                                });
                            };
                            let op = self.lower_value_expr(default)?;
                            let op = self.consume(op);
                            let local = self.materialize(op);
                            self.bind(param.sym, local);
                            let read = self.read_local(local);
                            ops.push(self.consume(read));
                        }
                        self.pop_scope();
                    }
                }

                self.emit_call(
                    Callee::Sym {
                        sym: *sym,
                        name: *name,
                    },
                    ops,
                    ty,
                )
            }
            HirCallee::Value(f) => {
                let f_op = self.lower_value_expr(f)?;
                let mut ops = Vec::with_capacity(args.len());
                for a in args {
                    let op = self.lower_value_expr(a)?;
                    ops.push(self.consume(op));
                }
                self.emit_call(Callee::Value(f_op), ops, ty)
            }
        }
    }

    pub(crate) fn emit_call(
        &mut self,
        callee: Callee,
        args: Vec<Operand>,
        ty: TypeId,
    ) -> Result<Operand, LowerError> {
        if self.is_nothing(ty) {
            self.b.push(Instr::Call {
                dst: None,
                callee,
                args,
            });
            Ok(self.nothing_op())
        } else {
            let dst = self.temp(ty);
            self.b.push(Instr::Call {
                dst: Some(Place::local(dst)),
                callee,
                args,
            });
            Ok(self.read_local(dst))
        }
    }

    /// Rewrite method-style channel/timeout calls into suspend instructions.
    fn lower_method_call(
        &mut self,
        receiver: &HirExpr,
        method: Symbol,
        args: &[HirExpr],
        ty: TypeId,
    ) -> Result<Operand, LowerError> {
        let recv_ty = receiver.ty();
        let types = &self.cx.sem.types;
        let is_chan = types.chan_elem(recv_ty).is_some();
        let is_task = types.payload_of_task(recv_ty).is_some();

        match method.as_str() {
            "send" if is_chan && args.len() == 1 => {
                self.require_async("channel send")?;
                let c = self.lower_value_expr(receiver)?;
                let v = self.lower_value_expr(&args[0])?;
                let v = self.consume(v);
                self.b.push(Instr::ChanSend {
                    chan: c,
                    value: v,
                    ready: BlockId::NONE,
                    pend: BlockId::NONE,
                });
                Ok(self.nothing_op())
            }
            "recv" if is_chan && args.is_empty() => {
                self.require_async("channel recv")?;
                let c = self.lower_value_expr(receiver)?;
                let dst = self.temp(ty);
                self.b.push(Instr::ChanRecv {
                    dst: Some(dst),
                    chan: c,
                    ready: BlockId::NONE,
                    pend: BlockId::NONE,
                });
                Ok(self.read_local(dst))
            }
            "timeout" if is_task && args.len() == 1 => {
                self.require_async("timeout")?;
                let t = self.lower_value_expr(receiver)?;
                let t = self.consume(t);
                let m = self.lower_value_expr(&args[0])?;
                let dst = self.temp(ty);
                self.b.push(Instr::Timeout {
                    dst: Some(dst),
                    task: t,
                    millis: m,
                    ready: BlockId::NONE,
                    pend: BlockId::NONE,
                });
                Ok(self.read_local(dst))
            }
            _ => Err(LowerError::UnknownMethod { method }),
        }
    }

    /// Lower `compare` into a `tag_test` + `if` chain over a shared
    /// scrutinee place, shaped so the switch recognizer can collapse it.
    fn lower_compare(
        &mut self,
        scrutinee: &HirExpr,
        arms: &[CompareArm],
        default: Option<&HirExpr>,
        ty: TypeId,
    ) -> Result<Operand, LowerError> {
        let scrut_op = self.lower_value_expr(scrutinee)?;
        let scrut_ty = scrut_op.ty;
        let scrut_local = self.materialize(scrut_op);
        let scrut_place = Place::local(scrut_local);

        let result = if self.is_nothing(ty) {
            None
        } else {
            Some(self.temp(ty))
        };
        let join_bb = self.b.new_block();
        let bool_ty = self.cx.sem.types.builtins().bool_;

        let mut arm_bbs = Vec::with_capacity(arms.len());
        for arm in arms {
            // Test in the current block; each subsequent test gets a block
            // of its own holding exactly the tag_test.
            let arm_bb = self.b.new_block();
            let next_bb = self.b.new_block();
            let test = self.temp(bool_ty);
            self.b.assign(
                Place::local(test),
                Rvalue::TagTest {
                    value: Operand::copy(scrut_place.clone(), scrut_ty),
                    tag: arm.tag,
                },
            );
            self.b.terminate(Terminator::If {
                cond: Operand::copy(Place::local(test), bool_ty),
                then_bb: arm_bb,
                else_bb: next_bb,
            });
            arm_bbs.push(arm_bb);
            self.b.switch_to(next_bb);
        }

        // Default arm, or unreachable when the compare is exhaustive.
        match default {
            Some(d) => {
                let dv = self.lower_value_expr(d)?;
                if let Some(res) = result {
                    let dv = self.consume(dv);
                    self.b.assign(Place::local(res), Rvalue::Use(dv));
                }
                self.b.terminate(Terminator::Goto { target: join_bb });
            }
            None => {
                self.b.terminate(Terminator::Unreachable);
            }
        }

        for (arm, arm_bb) in arms.iter().zip(arm_bbs) {
            self.b.switch_to(arm_bb);
            self.push_scope();
            for (j, (bsym, bname, bty)) in arm.binders.iter().enumerate() {
                let local = {
                    let types = &self.cx.sem.types;
                    self.b.local(*bsym, *bname, *bty, types, arm.span)
                };
                self.b.assign(
                    Place::local(local),
                    Rvalue::TagPayload {
                        value: Operand::copy(scrut_place.clone(), scrut_ty),
                        tag: arm.tag,
                        index: j as u32,
                    },
                );
                self.bind(*bsym, local);
            }
            let av = self.lower_value_expr(&arm.body)?;
            if let Some(res) = result {
                let av = self.consume(av);
                self.b.assign(Place::local(res), Rvalue::Use(av));
            }
            self.end_scope_lifetimes();
            self.pop_scope();
            self.b.terminate(Terminator::Goto { target: join_bb });
        }

        self.b.switch_to(join_bb);
        Ok(match result {
            Some(res) => self.read_local(res),
            None => self.nothing_op(),
        })
    }

    /// Pre-lower each arm into a materialized [`SelectArm`]. Race arms are
    /// parked in temps so losing tasks stay addressable for cancellation.
    fn lower_select(
        &mut self,
        arms: &[HirSelectArm],
        is_race: bool,
        ty: TypeId,
    ) -> Result<Operand, LowerError> {
        let mut lowered = Vec::with_capacity(arms.len());
        for arm in arms {
            let a = match &arm.kind {
                SelectArmKind::Task(task) => {
                    let op = self.lower_value_expr(task)?;
                    let local = self.materialize(op);
                    let read = self.read_local(local);
                    SelectArm::Task {
                        task: self.consume(read),
                    }
                }
                SelectArmKind::Recv(chan) => {
                    let chan = self.lower_value_expr(chan)?;
                    SelectArm::Recv { chan }
                }
                SelectArmKind::Send { chan, value } => {
                    let chan = self.lower_value_expr(chan)?;
                    let value = self.lower_value_expr(value)?;
                    let value = self.consume(value);
                    SelectArm::Send { chan, value }
                }
                SelectArmKind::Timeout(millis) => {
                    let millis = self.lower_value_expr(millis)?;
                    SelectArm::Timeout { millis }
                }
                SelectArmKind::Default => SelectArm::Default,
            };
            lowered.push(a);
        }

        let dst = if self.is_nothing(ty) {
            None
        } else {
            Some(self.temp(ty))
        };
        self.b.push(Instr::Select {
            dst,
            arms: lowered,
            race: is_race,
            ready: BlockId::NONE,
            pend: BlockId::NONE,
        });
        Ok(match dst {
            Some(d) => self.read_local(d),
            None => self.nothing_op(),
        })
    }
}

// ---- leaf conversions -------------------------------------------------------

pub(crate) fn lower_lit(lit: &HirLit) -> Const {
    match lit {
        HirLit::Int { value, text } => Const::Int {
            value: *value,
            text: *text,
        },
        HirLit::Float { value, text } => Const::Float {
            value: *value,
            text: *text,
        },
        HirLit::Bool(b) => Const::Bool(*b),
        HirLit::Str(s) => Const::Str(*s),
        HirLit::Nothing => Const::Nothing,
    }
}

pub(crate) fn lower_unop(op: HirUnOp) -> UnOp {
    match op {
        HirUnOp::Neg => UnOp::Neg,
        HirUnOp::Not => UnOp::Not,
    }
}

pub(crate) fn lower_binop(op: HirBinOp) -> BinOp {
    match op {
        HirBinOp::Add => BinOp::Add,
        HirBinOp::Sub => BinOp::Sub,
        HirBinOp::Mul => BinOp::Mul,
        HirBinOp::Div => BinOp::Div,
        HirBinOp::Rem => BinOp::Rem,
        HirBinOp::Eq => BinOp::Eq,
        HirBinOp::Ne => BinOp::Ne,
        HirBinOp::Lt => BinOp::Lt,
        HirBinOp::Le => BinOp::Le,
        HirBinOp::Gt => BinOp::Gt,
        HirBinOp::Ge => BinOp::Ge,
        HirBinOp::And => BinOp::And,
        HirBinOp::Or => BinOp::Or,
        HirBinOp::BitAnd => BinOp::BitAnd,
        HirBinOp::BitOr => BinOp::BitOr,
        HirBinOp::BitXor => BinOp::BitXor,
        HirBinOp::Shl => BinOp::Shl,
        HirBinOp::Shr => BinOp::Shr,
    }
}

fn cast_kind(types: &surgec_sem::TypeInterner, from: TypeId, to: TypeId) -> CastKind {
    use TypeKind::*;
    let f = types.get(from);
    let t = types.get(to);
    match (f, t) {
        (Some(Int(_) | Uint(_) | Bool), Some(Float(_))) => CastKind::IntToFloat,
        (Some(Float(_)), Some(Int(_) | Uint(_))) => CastKind::FloatToInt,
        (Some(Float(_)), Some(Float(_))) => CastKind::FloatToFloat,
        (Some(Ptr(_)), Some(Ptr(_))) => CastKind::PtrToPtr,
        (Some(Ptr(_)), Some(Int(_) | Uint(_))) => CastKind::PtrToInt,
        (Some(Int(_) | Uint(_)), Some(Ptr(_))) => CastKind::IntToPtr,
        _ => CastKind::IntToInt,
    }
}
