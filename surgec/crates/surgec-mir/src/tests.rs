//! Unit and integration tests for the MIR model, builder, lowering, and
//! transform passes.

use crate::*;
use surgec_sem::hir::{
    BinOp as HirBinOp, HirCallee, HirConst, HirExpr, HirFunc, HirLit, HirModule, HirParam,
    HirStmt,
};
use surgec_sem::{SemResult, SymbolId as SemSym, TypeId};
use surgec_util::{Span, Symbol};

// ---- HIR construction helpers ----------------------------------------------

fn lit_int(value: i64, ty: TypeId) -> HirExpr {
    HirExpr::Literal {
        lit: HirLit::Int { value, text: None },
        ty,
        span: Span::DUMMY,
    }
}

fn var(sym: SemSym, name: &str, ty: TypeId) -> HirExpr {
    HirExpr::Var {
        sym,
        name: Symbol::intern(name),
        ty,
        span: Span::DUMMY,
    }
}

fn ret(value: Option<HirExpr>) -> HirStmt {
    HirStmt::Return {
        value,
        span: Span::DUMMY,
    }
}

fn mk_func(
    sem: &mut SemResult,
    name: &str,
    params: Vec<(SemSym, &str, TypeId)>,
    result: TypeId,
    body: Vec<HirStmt>,
) -> HirFunc {
    let sym = sem.symbols.fresh_synthetic(name);
    HirFunc {
        sym,
        name: Symbol::intern(name),
        span: Span::DUMMY,
        params: params
            .into_iter()
            .map(|(sym, name, ty)| HirParam {
                sym,
                name: Symbol::intern(name),
                ty,
                default: None,
                span: Span::DUMMY,
            })
            .collect(),
        result,
        is_async: false,
        failfast: false,
        body,
    }
}

fn module_of(funcs: Vec<HirFunc>) -> HirModule {
    HirModule {
        funcs,
        globals: Vec::new(),
        consts: Vec::new(),
        entry: None,
    }
}

/// `fn test(x: int) -> int { if x > 0 { return 1 } else { return 0 } }`
fn branchy_hir(sem: &mut SemResult) -> HirModule {
    let int = sem.types.builtins().int;
    let bool_ty = sem.types.builtins().bool_;
    let x = sem.symbols.fresh_synthetic("x");
    let cond = HirExpr::Binary {
        op: HirBinOp::Gt,
        lhs: Box::new(var(x, "x", int)),
        rhs: Box::new(lit_int(0, int)),
        ty: bool_ty,
        span: Span::DUMMY,
    };
    let body = vec![HirStmt::If {
        cond,
        then_body: vec![ret(Some(lit_int(1, int)))],
        else_body: vec![ret(Some(lit_int(0, int)))],
        span: Span::DUMMY,
    }];
    let f = mk_func(sem, "test", vec![(x, "x", int)], int, body);
    module_of(vec![f])
}

// ---- data model -------------------------------------------------------------

#[test]
fn func_blocks_get_dense_ids() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let mut func = Func::new(SemSym::NONE, Symbol::intern("f"), Span::DUMMY, int);
    assert_eq!(func.new_block(), BlockId(0));
    assert_eq!(func.new_block(), BlockId(1));
    assert!(func.blocks[BlockId(0)].term.is_none());
}

#[test]
fn place_equality_is_componentwise() {
    let a = Place::local(LocalId(1)).field(Symbol::intern("f"), 0);
    let b = Place::local(LocalId(1)).field(Symbol::intern("f"), 0);
    let c = Place::local(LocalId(1)).field(Symbol::intern("g"), 1);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_plain_local(), None);
    assert_eq!(Place::local(LocalId(3)).as_plain_local(), Some(LocalId(3)));
}

#[test]
fn local_flags_classify_types() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let string_ref = sem.types.mk_ref(b.string);
    let string_ref_mut = sem.types.mk_ref_mut(b.string);

    let copy_flags = builder::flags_for(&sem.types, b.int);
    assert!(copy_flags.is_copy());
    assert!(!copy_flags.is_owning());

    let own_flags = builder::flags_for(&sem.types, b.string);
    assert!(own_flags.is_owning());
    assert!(!own_flags.is_copy());

    assert!(builder::flags_for(&sem.types, string_ref).is_borrow());
    assert!(builder::flags_for(&sem.types, string_ref_mut).is_borrow());
}

// ---- lowering ---------------------------------------------------------------

#[test]
fn lower_branchy_function() {
    let mut sem = SemResult::new();
    let hir = branchy_hir(&mut sem);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    assert_eq!(module.funcs.len(), 1);
    let func = &module.funcs[FuncId(0)];
    assert_eq!(func.name.as_str(), "test");
    assert_eq!(func.param_count, 1);
    assert!(func.entry.is_some());
}

#[test]
fn lowered_branchy_function_validates_after_simplify() {
    let mut sem = SemResult::new();
    let hir = branchy_hir(&mut sem);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    for func in module.funcs.iter_mut() {
        simplify_cfg(func);
    }
    validate(&module, &sem.types).expect("validator passes");

    // One If terminator and two Return blocks; no trivial-goto blocks left.
    let func = &module.funcs[FuncId(0)];
    let mut ifs = 0;
    let mut returns = 0;
    for block in func.blocks.iter() {
        assert!(
            !(block.instrs.is_empty() && matches!(block.term, Terminator::Goto { .. })),
            "trivial goto survived simplify_cfg"
        );
        match &block.term {
            Terminator::If { .. } => ifs += 1,
            Terminator::Return { has_value, .. } => {
                assert!(*has_value);
                returns += 1;
            }
            _ => {}
        }
    }
    assert_eq!(ifs, 1);
    assert_eq!(returns, 2);
}

#[test]
fn functions_sorted_by_name_then_sym() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let fb = mk_func(&mut sem, "beta", vec![], int, vec![ret(Some(lit_int(1, int)))]);
    let fa = mk_func(&mut sem, "alpha", vec![], int, vec![ret(Some(lit_int(2, int)))]);
    let hir = module_of(vec![fb, fa]);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    assert_eq!(module.funcs[FuncId(0)].name.as_str(), "alpha");
    assert_eq!(module.funcs[FuncId(1)].name.as_str(), "beta");
}

#[test]
fn nothing_function_falls_through_to_return() {
    let mut sem = SemResult::new();
    let nothing = sem.types.builtins().nothing;
    let f = mk_func(&mut sem, "noop", vec![], nothing, vec![]);
    let hir = module_of(vec![f]);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    validate(&module, &sem.types).expect("validator passes");
    let func = &module.funcs[FuncId(0)];
    let entry = &func.blocks[func.entry];
    assert!(matches!(
        entry.term,
        Terminator::Return {
            has_value: false,
            ..
        }
    ));
}

#[test]
fn missing_default_argument_is_an_error() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let nothing = sem.types.builtins().nothing;
    let p = sem.symbols.fresh_synthetic("p");

    let callee = mk_func(&mut sem, "target", vec![(p, "p", int)], int, vec![ret(Some(var(p, "p", int)))]);
    let callee_sym = callee.sym;
    let call = HirExpr::Call {
        callee: HirCallee::Fn {
            sym: callee_sym,
            name: Symbol::intern("target"),
            type_args: Vec::new(),
        },
        args: Vec::new(),
        ty: int,
        span: Span::DUMMY,
    };
    let caller = mk_func(
        &mut sem,
        "caller",
        vec![],
        nothing,
        vec![HirStmt::Expr(call)],
    );
    let hir = module_of(vec![callee, caller]);

    let err = lower_module(&hir, &mut sem).unwrap_err();
    assert!(matches!(err, LowerError::MissingDefault { .. }));
}

#[test]
fn default_argument_fills_missing_call_slot() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let p = sem.symbols.fresh_synthetic("p");

    let mut callee = mk_func(&mut sem, "target", vec![(p, "p", int)], int, vec![ret(Some(var(p, "p", int)))]);
    callee.params[0].default = Some(lit_int(7, int));
    let callee_sym = callee.sym;

    let call = HirExpr::Call {
        callee: HirCallee::Fn {
            sym: callee_sym,
            name: Symbol::intern("target"),
            type_args: Vec::new(),
        },
        args: Vec::new(),
        ty: int,
        span: Span::DUMMY,
    };
    let caller = mk_func(&mut sem, "caller", vec![], int, vec![ret(Some(call))]);
    let hir = module_of(vec![callee, caller]);

    let module = lower_module(&hir, &mut sem).expect("default fills the slot");
    validate(&module, &sem.types).expect("validator passes");

    // The caller materializes the default before the call.
    let caller_fn = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "caller")
        .unwrap();
    let has_call_with_arg = caller_fn.blocks.iter().any(|b| {
        b.instrs.iter().any(
            |i| matches!(i, Instr::Call { callee: Callee::Sym { name, .. }, args, .. }
                if name.as_str() == "target" && args.len() == 1),
        )
    });
    assert!(has_call_with_arg);
}

#[test]
fn borrowed_string_literal_promotes_to_static_global() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let str_ref = sem.types.mk_ref(b.string);
    let nothing = b.nothing;
    let s = sem.symbols.fresh_synthetic("s");

    let lit = HirExpr::Literal {
        lit: HirLit::Str(Symbol::intern("hello")),
        ty: b.string,
        span: Span::DUMMY,
    };
    let addr = HirExpr::AddrOf {
        mutable: false,
        place: Box::new(lit),
        ty: str_ref,
        span: Span::DUMMY,
    };
    let body = vec![
        HirStmt::Let {
            sym: s,
            name: Symbol::intern("s"),
            ty: str_ref,
            init: Some(addr.clone()),
            span: Span::DUMMY,
        },
        HirStmt::Let {
            sym: sem.symbols.fresh_synthetic("s2"),
            name: Symbol::intern("s2"),
            ty: str_ref,
            init: Some(addr),
            span: Span::DUMMY,
        },
    ];
    let f = mk_func(&mut sem, "f", vec![], nothing, body);
    let hir = module_of(vec![f]);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    // Interned by content: two borrows, one global.
    assert_eq!(module.globals.len(), 1);
    assert_eq!(module.globals[GlobalId(0)].name.as_str(), "__str$0");
}

#[test]
fn compound_assignment_goes_through_a_temp() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let x = sem.symbols.fresh_synthetic("x");
    let body = vec![
        HirStmt::Let {
            sym: x,
            name: Symbol::intern("x"),
            ty: int,
            init: Some(lit_int(1, int)),
            span: Span::DUMMY,
        },
        HirStmt::Assign {
            target: var(x, "x", int),
            op: Some(HirBinOp::Add),
            value: lit_int(2, int),
            span: Span::DUMMY,
        },
        ret(Some(var(x, "x", int))),
    ];
    let f = mk_func(&mut sem, "f", vec![], int, body);
    let hir = module_of(vec![f]);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    let func = &module.funcs[FuncId(0)];
    let entry = &func.blocks[func.entry];
    // tmp = add x, 2 followed by x = tmp.
    let add_pos = entry
        .instrs
        .iter()
        .position(|i| matches!(i, Instr::Assign { src: Rvalue::Binary { op: BinOp::Add, .. }, .. }))
        .expect("binary add instruction");
    assert!(matches!(
        &entry.instrs[add_pos + 1],
        Instr::Assign { src: Rvalue::Use(_), .. }
    ));
}

#[test]
fn cyclic_consts_are_rejected() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let a = sem.symbols.fresh_synthetic("A");
    let b = sem.symbols.fresh_synthetic("B");

    let consts = vec![
        HirConst {
            sym: a,
            name: Symbol::intern("A"),
            ty: int,
            value: var(b, "B", int),
            span: Span::DUMMY,
        },
        HirConst {
            sym: b,
            name: Symbol::intern("B"),
            ty: int,
            value: var(a, "A", int),
            span: Span::DUMMY,
        },
    ];
    let f = mk_func(&mut sem, "f", vec![], int, vec![ret(Some(var(a, "A", int)))]);
    let mut hir = module_of(vec![f]);
    hir.consts = consts;

    let err = lower_module(&hir, &mut sem).unwrap_err();
    assert!(matches!(err, LowerError::ConstCycle { .. }));
}

// ---- simplify_cfg -----------------------------------------------------------

/// entry --goto--> three trivial blocks --> return
fn goto_chain_func(sem: &SemResult) -> Func {
    let int = sem.types.builtins().int;
    let mut func = Func::new(SemSym::NONE, Symbol::intern("chain"), Span::DUMMY, int);
    let entry = func.new_block();
    let t1 = func.new_block();
    let t2 = func.new_block();
    let t3 = func.new_block();
    let exit = func.new_block();
    func.entry = entry;

    func.blocks[entry].instrs.push(Instr::Nop);
    func.blocks[entry].term = Terminator::Goto { target: t1 };
    func.blocks[t1].term = Terminator::Goto { target: t2 };
    func.blocks[t2].term = Terminator::Goto { target: t3 };
    func.blocks[t3].term = Terminator::Goto { target: exit };
    func.blocks[exit].term = Terminator::Return {
        has_value: true,
        value: Some(Operand::konst(Const::int(0), int)),
        early: false,
        cancelled: false,
    };
    func
}

#[test]
fn simplify_collapses_goto_chains() {
    let sem = SemResult::new();
    let mut func = goto_chain_func(&sem);
    simplify_cfg(&mut func);

    assert_eq!(func.blocks.len(), 2);
    let entry = &func.blocks[func.entry];
    match entry.term {
        Terminator::Goto { target } => {
            assert!(matches!(
                func.blocks[target].term,
                Terminator::Return { .. }
            ));
        }
        ref other => panic!("expected goto straight to return, got {:?}", other),
    }
}

#[test]
fn simplify_is_idempotent() {
    let sem = SemResult::new();
    let mut func = goto_chain_func(&sem);
    simplify_cfg(&mut func);
    let blocks = func.blocks.clone();
    let entry = func.entry;
    simplify_cfg(&mut func);
    assert_eq!(func.blocks, blocks);
    assert_eq!(func.entry, entry);
}

#[test]
fn simplify_drops_unreachable_blocks() {
    let sem = SemResult::new();
    let int = sem.types.builtins().int;
    let mut func = Func::new(SemSym::NONE, Symbol::intern("dead"), Span::DUMMY, int);
    let entry = func.new_block();
    let dead = func.new_block();
    func.entry = entry;
    func.blocks[entry].term = Terminator::Return {
        has_value: true,
        value: Some(Operand::konst(Const::int(1), int)),
        early: false,
        cancelled: false,
    };
    func.blocks[dead].instrs.push(Instr::Nop);
    func.blocks[dead].term = Terminator::Unreachable;

    simplify_cfg(&mut func);
    assert_eq!(func.blocks.len(), 1);
}

// ---- recognize_switch_tag ---------------------------------------------------

/// Build `if v is A -> bbA else if v is B -> bbB else bbDefault` by hand.
fn tag_chain_func(sem: &mut SemResult) -> (Func, LocalId) {
    let b = *sem.types.builtins();
    let union_ty = sem.types.erring(b.int, b.error_union);
    let mut func = Func::new(SemSym::NONE, Symbol::intern("dispatch"), Span::DUMMY, b.int);

    let v = func.add_local(Local {
        sym: SemSym::NONE,
        ty: union_ty,
        flags: LocalFlags::OWN,
        name: Symbol::intern("v"),
        span: Span::DUMMY,
    });
    let t1 = func.add_local(Local {
        sym: SemSym::NONE,
        ty: b.bool_,
        flags: LocalFlags::COPY,
        name: Symbol::intern("t1"),
        span: Span::DUMMY,
    });
    let t2 = func.add_local(Local {
        sym: SemSym::NONE,
        ty: b.bool_,
        flags: LocalFlags::COPY,
        name: Symbol::intern("t2"),
        span: Span::DUMMY,
    });

    let entry = func.new_block();
    let test2 = func.new_block();
    let arm_ok = func.new_block();
    let arm_err = func.new_block();
    let fallback = func.new_block();
    func.entry = entry;

    func.blocks[entry].instrs.push(Instr::Assign {
        dst: Place::local(t1),
        src: Rvalue::TagTest {
            value: Operand::copy(Place::local(v), union_ty),
            tag: Symbol::intern("Ok"),
        },
    });
    func.blocks[entry].term = Terminator::If {
        cond: Operand::copy(Place::local(t1), b.bool_),
        then_bb: arm_ok,
        else_bb: test2,
    };

    func.blocks[test2].instrs.push(Instr::Assign {
        dst: Place::local(t2),
        src: Rvalue::TagTest {
            value: Operand::copy(Place::local(v), union_ty),
            tag: Symbol::intern("Err"),
        },
    });
    func.blocks[test2].term = Terminator::If {
        cond: Operand::copy(Place::local(t2), b.bool_),
        then_bb: arm_err,
        else_bb: fallback,
    };

    for (bb, code) in [(arm_ok, 1), (arm_err, 2), (fallback, 3)] {
        func.blocks[bb].term = Terminator::Return {
            has_value: true,
            value: Some(Operand::konst(Const::int(code), b.int)),
            early: false,
            cancelled: false,
        };
    }
    (func, v)
}

#[test]
fn switch_tag_recognizer_collapses_chains() {
    let mut sem = SemResult::new();
    let (mut func, v) = tag_chain_func(&mut sem);
    recognize_switch_tag(&mut func);

    let entry = &func.blocks[func.entry];
    match &entry.term {
        Terminator::SwitchTag { value, cases, default } => {
            assert_eq!(value.place().unwrap().as_plain_local(), Some(v));
            assert_eq!(cases.len(), 2);
            assert_eq!(cases[0].tag.as_str(), "Ok");
            assert_eq!(cases[1].tag.as_str(), "Err");
            assert!(default.is_some());
        }
        other => panic!("expected switch_tag, got {:?}", other),
    }
    // The redundant tag_test is gone from the starting block.
    assert!(entry
        .instrs
        .iter()
        .all(|i| !matches!(i, Instr::Assign { src: Rvalue::TagTest { .. }, .. })));
}

#[test]
fn switch_tag_preserves_case_targets() {
    let mut sem = SemResult::new();
    let (mut func, _) = tag_chain_func(&mut sem);

    // Record the original mapping from the if/else chain.
    let entry_term = func.blocks[func.entry].term.clone();
    let Terminator::If { then_bb: ok_bb, else_bb: test2, .. } = entry_term else {
        panic!("expected if");
    };
    let Terminator::If { then_bb: err_bb, else_bb: fallback, .. } =
        func.blocks[test2].term.clone()
    else {
        panic!("expected second if");
    };

    recognize_switch_tag(&mut func);
    let Terminator::SwitchTag { cases, default, .. } = &func.blocks[func.entry].term else {
        panic!("expected switch_tag");
    };
    assert_eq!(cases[0].target, ok_bb);
    assert_eq!(cases[1].target, err_bb);
    assert_eq!(*default, fallback);
}

#[test]
fn single_tag_chain_is_left_alone() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let union_ty = sem.types.erring(b.int, b.error_union);
    let mut func = Func::new(SemSym::NONE, Symbol::intern("single"), Span::DUMMY, b.int);
    let v = func.add_local(Local {
        sym: SemSym::NONE,
        ty: union_ty,
        flags: LocalFlags::OWN,
        name: Symbol::intern("v"),
        span: Span::DUMMY,
    });
    let t = func.add_local(Local {
        sym: SemSym::NONE,
        ty: b.bool_,
        flags: LocalFlags::COPY,
        name: Symbol::intern("t"),
        span: Span::DUMMY,
    });
    let entry = func.new_block();
    let yes = func.new_block();
    let no = func.new_block();
    func.entry = entry;
    func.blocks[entry].instrs.push(Instr::Assign {
        dst: Place::local(t),
        src: Rvalue::TagTest {
            value: Operand::copy(Place::local(v), union_ty),
            tag: Symbol::intern("Ok"),
        },
    });
    func.blocks[entry].term = Terminator::If {
        cond: Operand::copy(Place::local(t), b.bool_),
        then_bb: yes,
        else_bb: no,
    };
    for bb in [yes, no] {
        func.blocks[bb].term = Terminator::Return {
            has_value: true,
            value: Some(Operand::konst(Const::int(0), b.int)),
            early: false,
            cancelled: false,
        };
    }

    recognize_switch_tag(&mut func);
    assert!(matches!(
        func.blocks[func.entry].term,
        Terminator::If { .. }
    ));
}

// ---- async pipeline ---------------------------------------------------------

/// `async fn work(x: int) -> int { let t = mk_task(); let v = t.await; return v + x; }`
/// plus the stub `fn mk_task() -> Task<int>`.
fn async_hir(sem: &mut SemResult) -> HirModule {
    let int = sem.types.builtins().int;
    let task_int = sem.types.task_of(int);

    let mk_task = mk_func(sem, "mk_task", vec![], task_int, vec![]);
    let mk_task_sym = mk_task.sym;

    let x = sem.symbols.fresh_synthetic("x");
    let t = sem.symbols.fresh_synthetic("t");
    let v = sem.symbols.fresh_synthetic("v");

    let call = HirExpr::Call {
        callee: HirCallee::Fn {
            sym: mk_task_sym,
            name: Symbol::intern("mk_task"),
            type_args: Vec::new(),
        },
        args: Vec::new(),
        ty: task_int,
        span: Span::DUMMY,
    };
    let await_expr = HirExpr::Await {
        task: Box::new(var(t, "t", task_int)),
        ty: int,
        span: Span::DUMMY,
    };
    let sum = HirExpr::Binary {
        op: HirBinOp::Add,
        lhs: Box::new(var(v, "v", int)),
        rhs: Box::new(var(x, "x", int)),
        ty: int,
        span: Span::DUMMY,
    };
    let body = vec![
        HirStmt::Let {
            sym: t,
            name: Symbol::intern("t"),
            ty: task_int,
            init: Some(call),
            span: Span::DUMMY,
        },
        HirStmt::Let {
            sym: v,
            name: Symbol::intern("v"),
            ty: int,
            init: Some(await_expr),
            span: Span::DUMMY,
        },
        ret(Some(sum)),
    ];
    let mut work = mk_func(sem, "work", vec![(x, "x", int)], int, body);
    work.is_async = true;
    work.failfast = true;

    module_of(vec![mk_task, work])
}

#[test]
fn normalizer_splits_awaits_into_poll_blocks() {
    let mut sem = SemResult::new();
    let hir = async_hir(&mut sem);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    let work = module
        .funcs
        .iter_enumerated()
        .find(|(_, f)| f.name.as_str() == "work")
        .map(|(id, _)| id)
        .unwrap();
    let func = &mut module.funcs[work];
    split_async_suspends(func);

    let sites = collect_suspend_sites(func).expect("sites collect");
    assert_eq!(sites.len(), 1);
    let site_block = &func.blocks[sites[0].block];
    assert_eq!(sites[0].instr + 1, site_block.instrs.len());
    assert!(matches!(
        site_block.instrs[sites[0].instr],
        Instr::Poll { .. }
    ));

    // No Await anywhere after normalization.
    for block in func.blocks.iter() {
        assert!(block.instrs.iter().all(|i| !matches!(i, Instr::Await { .. })));
    }
}

#[test]
fn await_in_loop_is_rejected() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let bool_ty = sem.types.builtins().bool_;
    let task_int = sem.types.task_of(int);

    let mk_task = mk_func(&mut sem, "mk_task", vec![], task_int, vec![]);
    let mk_task_sym = mk_task.sym;
    let t = sem.symbols.fresh_synthetic("t");

    let cond = HirExpr::Literal {
        lit: HirLit::Bool(true),
        ty: bool_ty,
        span: Span::DUMMY,
    };
    let body = vec![
        HirStmt::Let {
            sym: t,
            name: Symbol::intern("t"),
            ty: task_int,
            init: Some(HirExpr::Call {
                callee: HirCallee::Fn {
                    sym: mk_task_sym,
                    name: Symbol::intern("mk_task"),
                    type_args: Vec::new(),
                },
                args: Vec::new(),
                ty: task_int,
                span: Span::DUMMY,
            }),
            span: Span::DUMMY,
        },
        HirStmt::While {
            cond,
            body: vec![HirStmt::Expr(HirExpr::Await {
                task: Box::new(var(t, "t", task_int)),
                ty: int,
                span: Span::DUMMY,
            })],
            span: Span::DUMMY,
        },
        ret(Some(lit_int(0, int))),
    ];
    let mut looper = mk_func(&mut sem, "looper", vec![], int, body);
    looper.is_async = true;

    let hir = module_of(vec![mk_task, looper]);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    let err = lower_async_state_machine(&mut module, &mut sem).unwrap_err();
    let message = err.to_string();
    assert!(
        message.contains("await inside loop is not supported in"),
        "unexpected message: {message}"
    );
    assert!(message.contains("looper"));
}

#[test]
fn state_machine_produces_poll_and_constructor() {
    let mut sem = SemResult::new();
    let hir = async_hir(&mut sem);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    for func in module.funcs.iter_mut() {
        simplify_cfg(func);
        recognize_switch_tag(func);
        simplify_cfg(func);
    }
    lower_async_state_machine(&mut module, &mut sem).expect("async lowering succeeds");
    validate(&module, &sem.types).expect("validator passes");

    // No function is async anymore.
    assert!(module.funcs.iter().all(|f| !f.is_async));

    let poll = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "work$poll")
        .expect("poll companion exists");
    assert!(poll.async_lowered);

    // The poll function dispatches over the saved pc and yields on pend.
    let has_yield = poll
        .blocks
        .iter()
        .any(|b| matches!(b.term, Terminator::AsyncYield { .. }));
    assert!(has_yield, "pending block yields");
    let has_async_return = poll
        .blocks
        .iter()
        .any(|b| matches!(b.term, Terminator::AsyncReturn { .. }));
    assert!(has_async_return, "returns rewritten to async returns");

    // Every suspend's pend edge is back-patched.
    for block in poll.blocks.iter() {
        for instr in &block.instrs {
            if let Some((ready, pend)) = instr.suspend_edges() {
                assert!(ready.is_some());
                assert!(pend.is_some(), "pend edge back-patched");
            }
        }
    }

    // The constructor packs the initial state and creates the task.
    let ctor = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "work")
        .expect("constructor keeps the original name");
    assert!(!ctor.is_async);
    let creates_task = ctor.blocks.iter().any(|b| {
        b.instrs.iter().any(
            |i| matches!(i, Instr::Call { callee: Callee::Sym { name, .. }, .. }
                if name.as_str() == "__task_create"),
        )
    });
    assert!(creates_task);
    assert!(sem.types.payload_of_task(ctor.result).is_some());
}

#[test]
fn state_variants_save_live_locals_only() {
    let mut sem = SemResult::new();
    let hir = async_hir(&mut sem);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");
    lower_async_state_machine(&mut module, &mut sem).expect("async lowering succeeds");

    // The synthesized state union for `work` has S0 (params) and S1 (the
    // await's live set). S1 must not include the await's destination.
    let poll = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "work$poll")
        .unwrap();

    let state_cases = module
        .meta
        .tag_layouts
        .iter()
        .find_map(|(_, cases)| {
            (cases.first().map(|c| c.tag_name.as_str()) == Some("S0")).then_some(cases)
        })
        .expect("state union registered in tag_layouts");
    // S0 (start), S1 (the await), S2 (the scope join).
    assert_eq!(state_cases.len(), 3);
    assert_eq!(state_cases[0].tag_name.as_str(), "S0");
    assert_eq!(state_cases[1].tag_name.as_str(), "S1");
    assert_eq!(state_cases[2].tag_name.as_str(), "S2");
    // S0 carries exactly the single parameter.
    assert_eq!(state_cases[0].payload.len(), poll.param_count);
    // S1 carries the task handle, the scope, and x; the await result is
    // reproduced on resume and never saved.
    assert!(state_cases[1].payload.len() >= 2);
    // S2 carries the scope and the parked return value.
    assert!(state_cases[2].payload.len() >= 2);
}

#[test]
fn scope_epilogue_joins_before_returning() {
    let mut sem = SemResult::new();
    let hir = async_hir(&mut sem);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");
    lower_async_state_machine(&mut module, &mut sem).expect("async lowering succeeds");

    let poll = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "work$poll")
        .unwrap();

    let has_join = poll
        .blocks
        .iter()
        .any(|b| b.instrs.iter().any(|i| matches!(i, Instr::JoinAll { .. })));
    assert!(has_join, "join_all spliced in");

    let has_scope_exit = poll.blocks.iter().any(|b| {
        b.instrs.iter().any(
            |i| matches!(i, Instr::Call { callee: Callee::Sym { name, .. }, .. }
                if name.as_str() == "rt_scope_exit"),
        )
    });
    assert!(has_scope_exit);

    let has_cancelled_return = poll
        .blocks
        .iter()
        .any(|b| matches!(b.term, Terminator::AsyncReturnCancelled { .. }));
    assert!(has_cancelled_return, "failed join cancels");
}

// ---- liveness ---------------------------------------------------------------

#[test]
fn liveness_excludes_dead_locals() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let mut func = Func::new(SemSym::NONE, Symbol::intern("live"), Span::DUMMY, int);
    let x = func.add_local(Local {
        sym: SemSym::NONE,
        ty: int,
        flags: LocalFlags::COPY,
        name: Symbol::intern("x"),
        span: Span::DUMMY,
    });
    let y = func.add_local(Local {
        sym: SemSym::NONE,
        ty: int,
        flags: LocalFlags::COPY,
        name: Symbol::intern("y"),
        span: Span::DUMMY,
    });

    let b0 = func.new_block();
    let b1 = func.new_block();
    func.entry = b0;
    // b0: x = 1; y = 2; goto b1.  b1: return x.  (y dies in b0)
    func.blocks[b0].instrs.push(Instr::Assign {
        dst: Place::local(x),
        src: Rvalue::Use(Operand::konst(Const::int(1), int)),
    });
    func.blocks[b0].instrs.push(Instr::Assign {
        dst: Place::local(y),
        src: Rvalue::Use(Operand::konst(Const::int(2), int)),
    });
    func.blocks[b0].term = Terminator::Goto { target: b1 };
    func.blocks[b1].term = Terminator::Return {
        has_value: true,
        value: Some(Operand::copy(Place::local(x), int)),
        early: false,
        cancelled: false,
    };

    let live = analysis::analyze_liveness(&func);
    assert!(live.live_in[b1].contains(&x));
    assert!(!live.live_in[b1].contains(&y));
    assert!(live.live_out[b0].contains(&x));
    assert!(!live.live_out[b0].contains(&y));
    // Nothing is live into the entry.
    assert!(live.live_in[b0].is_empty());
}

#[test]
fn liveness_move_kills_source() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let mut func = Func::new(SemSym::NONE, Symbol::intern("mv"), Span::DUMMY, b.string);
    let s = func.add_local(Local {
        sym: SemSym::NONE,
        ty: b.string,
        flags: LocalFlags::OWN,
        name: Symbol::intern("s"),
        span: Span::DUMMY,
    });
    let d = func.add_local(Local {
        sym: SemSym::NONE,
        ty: b.string,
        flags: LocalFlags::OWN,
        name: Symbol::intern("d"),
        span: Span::DUMMY,
    });

    let b0 = func.new_block();
    let b1 = func.new_block();
    func.entry = b0;
    // b0: d = move s; goto b1.  b1: return move d.
    func.blocks[b0].instrs.push(Instr::Assign {
        dst: Place::local(d),
        src: Rvalue::Use(Operand::mov(Place::local(s), b.string)),
    });
    func.blocks[b0].term = Terminator::Goto { target: b1 };
    func.blocks[b1].term = Terminator::Return {
        has_value: true,
        value: Some(Operand::mov(Place::local(d), b.string)),
        early: false,
        cancelled: false,
    };

    let live = analysis::analyze_liveness(&func);
    // s is consumed in b0: live into b0, dead out of it.
    assert!(live.live_in[b0].contains(&s));
    assert!(!live.live_out[b0].contains(&s));
}

// ---- validator --------------------------------------------------------------

#[test]
fn validator_flags_unterminated_blocks() {
    let sem = SemResult::new();
    let int = sem.types.builtins().int;
    let mut module = Module::new(sem.layout);
    let mut func = Func::new(SemSym::NONE, Symbol::intern("bad"), Span::DUMMY, int);
    let entry = func.new_block();
    func.entry = entry;
    module.add_func(func);

    let errors = validate(&module, &sem.types).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidateError::Unterminated { .. })));
}

#[test]
fn validator_flags_missing_targets_and_bad_returns() {
    let sem = SemResult::new();
    let b = *sem.types.builtins();
    let mut module = Module::new(sem.layout);
    let mut func = Func::new(SemSym::NONE, Symbol::intern("bad"), Span::DUMMY, b.int);
    let entry = func.new_block();
    func.entry = entry;
    func.blocks[entry].term = Terminator::Goto {
        target: BlockId(99),
    };
    let second = func.new_block();
    func.blocks[second].term = Terminator::Return {
        has_value: false,
        value: None,
        early: false,
        cancelled: false,
    };
    module.add_func(func);

    let errors = validate(&module, &sem.types).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidateError::MissingTarget { .. })));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidateError::MissingReturnValue { .. })));
}

#[test]
fn validator_enforces_drop_and_end_borrow_rules() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let str_ref = sem.types.mk_ref(b.string);
    let mut module = Module::new(sem.layout);
    let mut func = Func::new(SemSym::NONE, Symbol::intern("bad"), Span::DUMMY, b.nothing);
    let copy_local = func.add_local(Local {
        sym: SemSym::NONE,
        ty: b.int,
        flags: LocalFlags::COPY,
        name: Symbol::intern("c"),
        span: Span::DUMMY,
    });
    let value_local = func.add_local(Local {
        sym: SemSym::NONE,
        ty: b.string,
        flags: LocalFlags::OWN,
        name: Symbol::intern("owned"),
        span: Span::DUMMY,
    });
    let _ = str_ref;
    let entry = func.new_block();
    func.entry = entry;
    func.blocks[entry].instrs.push(Instr::Drop {
        place: Place::local(copy_local),
    });
    func.blocks[entry].instrs.push(Instr::EndBorrow {
        place: Place::local(value_local),
    });
    func.blocks[entry].term = Terminator::Return {
        has_value: false,
        value: None,
        early: false,
        cancelled: false,
    };
    module.add_func(func);

    let errors = validate(&module, &sem.types).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidateError::DropOfCopy { .. })));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidateError::EndBorrowOfValue { .. })));
}

#[test]
fn validator_rejects_duplicate_switch_cases() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let union_ty = sem.types.erring(b.int, b.error_union);
    let mut module = Module::new(sem.layout);
    let mut func = Func::new(SemSym::NONE, Symbol::intern("dup"), Span::DUMMY, b.nothing);
    let v = func.add_local(Local {
        sym: SemSym::NONE,
        ty: union_ty,
        flags: LocalFlags::OWN,
        name: Symbol::intern("v"),
        span: Span::DUMMY,
    });
    let entry = func.new_block();
    let a = func.new_block();
    let d = func.new_block();
    func.entry = entry;
    func.blocks[entry].term = Terminator::SwitchTag {
        value: Operand::copy(Place::local(v), union_ty),
        cases: vec![
            SwitchCase {
                tag: Symbol::intern("Ok"),
                target: a,
            },
            SwitchCase {
                tag: Symbol::intern("Ok"),
                target: d,
            },
        ],
        default: d,
    };
    for bb in [a, d] {
        func.blocks[bb].term = Terminator::Return {
            has_value: false,
            value: None,
            early: false,
            cancelled: false,
        };
    }
    module.add_func(func);

    let errors = validate(&module, &sem.types).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidateError::DuplicateSwitchCase { .. })));
}

// ---- pretty printer ---------------------------------------------------------

#[test]
fn dump_is_deterministic() {
    let mut sem = SemResult::new();
    let hir = branchy_hir(&mut sem);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");
    for func in module.funcs.iter_mut() {
        simplify_cfg(func);
    }
    let a = dump_module(&module, &sem.types);
    let b = dump_module(&module, &sem.types);
    assert_eq!(a, b);
    assert!(a.contains("fn test(1) -> int64 {"));
    assert!(a.contains("if "));
    assert!(a.contains("return"));
}

#[test]
fn dump_golden_small_function() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let f = mk_func(&mut sem, "answer", vec![], int, vec![ret(Some(lit_int(42, int)))]);
    let hir = module_of(vec![f]);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");
    for func in module.funcs.iter_mut() {
        simplify_cfg(func);
    }

    let dump = dump_module(&module, &sem.types);
    let expected = "\
fn answer(0) -> int64 {
  bb0: // entry
    return 42
}
";
    assert_eq!(dump, expected);
}

// ---- metadata ---------------------------------------------------------------

#[test]
fn metadata_records_reached_unions() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let erring = sem.types.erring(b.int, b.error_union);
    let v = sem.symbols.fresh_synthetic("v");

    let body = vec![
        HirStmt::Let {
            sym: v,
            name: Symbol::intern("v"),
            ty: erring,
            init: None,
            span: Span::DUMMY,
        },
        ret(None),
    ];
    let f = mk_func(&mut sem, "f", vec![], b.nothing, body);
    let hir = module_of(vec![f]);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    let cases = module
        .meta
        .tag_layouts
        .get(&erring)
        .expect("erring union recorded");
    // Ok/Err plus the inlined nested Error union member.
    assert!(cases.iter().any(|c| c.tag_name.as_str() == "Ok"));
    assert!(cases.iter().any(|c| c.tag_name.as_str() == "Err"));
    assert!(cases.iter().any(|c| c.tag_name.as_str() == "Message"));

    for case in cases {
        assert!(module.meta.tag_names.contains_key(&case.tag_sym));
    }
}

// ---- iterator, map, and classification lowering -----------------------------

#[test]
fn for_loop_lowers_through_iterator_protocol() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let slice_int = sem.types.mk_slice(b.int);
    let xs = sem.symbols.fresh_synthetic("xs");
    let n = sem.symbols.fresh_synthetic("n");
    let x = sem.symbols.fresh_synthetic("x");

    let body = vec![
        HirStmt::Let {
            sym: n,
            name: Symbol::intern("n"),
            ty: b.int,
            init: Some(lit_int(0, b.int)),
            span: Span::DUMMY,
        },
        HirStmt::For {
            sym: x,
            name: Symbol::intern("x"),
            binder_ty: b.int,
            iterable: var(xs, "xs", slice_int),
            body: vec![HirStmt::Assign {
                target: var(n, "n", b.int),
                op: Some(HirBinOp::Add),
                value: var(x, "x", b.int),
                span: Span::DUMMY,
            }],
            span: Span::DUMMY,
        },
        ret(Some(var(n, "n", b.int))),
    ];
    let f = mk_func(&mut sem, "count", vec![(xs, "xs", slice_int)], b.int, body);
    let hir = module_of(vec![f]);
    let mut module = lower_module(&hir, &mut sem).expect("lowering succeeds");

    for func in module.funcs.iter_mut() {
        simplify_cfg(func);
    }
    validate(&module, &sem.types).expect("validator passes");

    let func = &module.funcs[FuncId(0)];
    let mut inits = 0;
    let mut nexts = 0;
    let mut next_tests = 0;
    for block in func.blocks.iter() {
        for instr in &block.instrs {
            match instr {
                Instr::Assign { src: Rvalue::IterInit { .. }, .. } => inits += 1,
                Instr::Assign { src: Rvalue::IterNext { .. }, .. } => nexts += 1,
                Instr::Assign { src: Rvalue::TagTest { tag, .. }, .. }
                    if tag.as_str() == "Next" =>
                {
                    next_tests += 1
                }
                _ => {}
            }
        }
    }
    assert_eq!(inits, 1);
    assert_eq!(nexts, 1);
    assert_eq!(next_tests, 1);

    // The loop header is reachable from the body: a genuine cycle.
    let header = func
        .blocks
        .iter_enumerated()
        .find_map(|(id, b)| {
            b.instrs
                .iter()
                .any(|i| matches!(i, Instr::Assign { src: Rvalue::IterNext { .. }, .. }))
                .then_some(id)
        })
        .unwrap();
    assert!(analysis::has_cycle_from(&module.funcs[FuncId(0)], header));
}

#[test]
fn map_literal_builds_through_runtime_calls() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let map_ty = sem.types.map_of(b.string, b.int);

    let entries = vec![
        (
            HirExpr::Literal {
                lit: HirLit::Str(Symbol::intern("a")),
                ty: b.string,
                span: Span::DUMMY,
            },
            lit_int(1, b.int),
        ),
        (
            HirExpr::Literal {
                lit: HirLit::Str(Symbol::intern("b")),
                ty: b.string,
                span: Span::DUMMY,
            },
            lit_int(2, b.int),
        ),
    ];
    let map = HirExpr::MapLit {
        ty: map_ty,
        entries,
        span: Span::DUMMY,
    };
    let f = mk_func(&mut sem, "make", vec![], map_ty, vec![ret(Some(map))]);
    let hir = module_of(vec![f]);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");
    validate(&module, &sem.types).expect("validator passes");

    let func = &module.funcs[FuncId(0)];
    let count_calls = |name: &str| {
        func.blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .filter(|i| {
                matches!(i, Instr::Call { callee: Callee::Sym { name: n, .. }, .. }
                    if n.as_str() == name)
            })
            .count()
    };
    assert_eq!(count_calls("rt_map_new"), 1);
    assert_eq!(count_calls("rt_map_insert"), 2);
}

#[test]
fn type_and_heir_tests_lower_to_rvalues() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let v = sem.symbols.fresh_synthetic("v");

    let body = vec![
        HirStmt::Expr(HirExpr::TypeTest {
            value: Box::new(var(v, "v", b.int)),
            tested: b.int,
            ty: b.bool_,
            span: Span::DUMMY,
        }),
        HirStmt::Expr(HirExpr::HeirTest {
            value: Box::new(var(v, "v", b.int)),
            tested: b.int,
            ty: b.bool_,
            span: Span::DUMMY,
        }),
        ret(None),
    ];
    let f = mk_func(&mut sem, "classify", vec![(v, "v", b.int)], b.nothing, body);
    let hir = module_of(vec![f]);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");
    validate(&module, &sem.types).expect("validator passes");

    let func = &module.funcs[FuncId(0)];
    let instrs: Vec<&Instr> = func.blocks.iter().flat_map(|b| b.instrs.iter()).collect();
    assert!(instrs
        .iter()
        .any(|i| matches!(i, Instr::Assign { src: Rvalue::TypeTest { .. }, .. })));
    assert!(instrs
        .iter()
        .any(|i| matches!(i, Instr::Assign { src: Rvalue::HeirTest { .. }, .. })));
}

#[test]
fn scope_exit_emits_lifetime_markers() {
    let mut sem = SemResult::new();
    let b = *sem.types.builtins();
    let s = sem.symbols.fresh_synthetic("s");
    let str_ref = sem.types.mk_ref(b.string);
    let r = sem.symbols.fresh_synthetic("r");

    // An owned string and a borrow of it, both falling out of scope at the
    // end of a nothing-returning body.
    let body = vec![
        HirStmt::Let {
            sym: s,
            name: Symbol::intern("s"),
            ty: b.string,
            init: None,
            span: Span::DUMMY,
        },
        HirStmt::Let {
            sym: r,
            name: Symbol::intern("r"),
            ty: str_ref,
            init: Some(HirExpr::AddrOf {
                mutable: false,
                place: Box::new(var(s, "s", b.string)),
                ty: str_ref,
                span: Span::DUMMY,
            }),
            span: Span::DUMMY,
        },
    ];
    let f = mk_func(&mut sem, "holder", vec![], b.nothing, body);
    let hir = module_of(vec![f]);
    let module = lower_module(&hir, &mut sem).expect("lowering succeeds");
    validate(&module, &sem.types).expect("validator passes");

    let func = &module.funcs[FuncId(0)];
    let instrs: Vec<&Instr> = func.blocks.iter().flat_map(|b| b.instrs.iter()).collect();
    let drops = instrs
        .iter()
        .filter(|i| matches!(i, Instr::Drop { .. }))
        .count();
    let end_borrows = instrs
        .iter()
        .filter(|i| matches!(i, Instr::EndBorrow { .. }))
        .count();
    assert_eq!(drops, 1, "the owned string gets a drop");
    assert_eq!(end_borrows, 1, "the borrow gets an end_borrow");

    // The borrow retires before the owner drops.
    let entry = &func.blocks[func.entry];
    let eb_pos = entry
        .instrs
        .iter()
        .position(|i| matches!(i, Instr::EndBorrow { .. }))
        .unwrap();
    let drop_pos = entry
        .instrs
        .iter()
        .position(|i| matches!(i, Instr::Drop { .. }))
        .unwrap();
    assert!(eb_pos < drop_pos);
}
