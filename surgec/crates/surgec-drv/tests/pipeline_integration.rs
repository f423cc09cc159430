//! End-to-end pipeline scenarios over programmatically built HIR.

mod support;

use support::*;
use surgec_drv::{run_pipeline, Config};
use surgec_mir::{dump_module, simplify_cfg, Instr, Rvalue, Terminator};
use surgec_sem::hir::*;
use surgec_sem::types::{TagCase, TypeKind, UnionDef};
use surgec_sem::{SemResult, TypeId};
use surgec_util::{Span, Symbol};

fn config() -> Config {
    Config::default()
}

/// `fn test(x: int) -> int { if x > 0 { return 1 } else { return 0 } }`
fn branchy(sem: &mut SemResult) -> HirModule {
    let int = sem.types.builtins().int;
    let bool_ty = sem.types.builtins().bool_;
    let x = sem.symbols.fresh_synthetic("x");
    let cond = HirExpr::Binary {
        op: BinOp::Gt,
        lhs: Box::new(var(x, "x", int)),
        rhs: Box::new(lit_int(0, int)),
        ty: bool_ty,
        span: Span::DUMMY,
    };
    let f = mk_func(
        sem,
        "test",
        vec![(x, "x", int)],
        int,
        vec![HirStmt::If {
            cond,
            then_body: vec![ret(Some(lit_int(1, int)))],
            else_body: vec![ret(Some(lit_int(0, int)))],
            span: Span::DUMMY,
        }],
    );
    module_of(vec![f])
}

#[test]
fn s1_branchy_function_simplifies_and_validates() {
    let mut sem = SemResult::new();
    let hir = branchy(&mut sem);
    let module = run_pipeline(&hir, &mut sem, &config()).expect("pipeline succeeds");

    let func = module.funcs.iter().find(|f| f.name.as_str() == "test").unwrap();
    let mut ifs = 0;
    let mut returns = 0;
    for block in func.blocks.iter() {
        assert!(
            !(block.instrs.is_empty() && matches!(block.term, Terminator::Goto { .. })),
            "no trivial-goto block survives the pipeline"
        );
        match block.term {
            Terminator::If { .. } => ifs += 1,
            Terminator::Return { .. } => returns += 1,
            _ => {}
        }
    }
    assert_eq!(ifs, 1);
    assert_eq!(returns, 2);
}

/// A two-case union `Outcome = Success(int) | Cancelled`.
fn outcome_union(sem: &mut SemResult) -> TypeId {
    let int = sem.types.builtins().int;
    let union_sym = sem.symbols.fresh_synthetic("Outcome");
    let success = sem.symbols.fresh_synthetic("Success");
    let cancelled = sem.symbols.fresh_synthetic("Cancelled");
    sem.types.intern(TypeKind::Union(UnionDef {
        sym: union_sym,
        name: Symbol::intern("Outcome"),
        type_args: Vec::new(),
        cases: vec![
            TagCase {
                sym: success,
                name: Symbol::intern("Success"),
                payload: vec![int],
            },
            TagCase {
                sym: cancelled,
                name: Symbol::intern("Cancelled"),
                payload: Vec::new(),
            },
        ],
    }))
}

#[test]
fn s2_compare_chain_becomes_switch_tag() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let outcome = outcome_union(&mut sem);

    let res = sem.symbols.fresh_synthetic("res");
    let v = sem.symbols.fresh_synthetic("v");
    let compare = HirExpr::Compare {
        scrutinee: Box::new(var(res, "res", outcome)),
        arms: vec![
            CompareArm {
                tag: Symbol::intern("Success"),
                binders: vec![(v, Symbol::intern("v"), int)],
                body: var(v, "v", int),
                span: Span::DUMMY,
            },
            CompareArm {
                tag: Symbol::intern("Cancelled"),
                binders: Vec::new(),
                body: lit_int(0, int),
                span: Span::DUMMY,
            },
        ],
        default: None,
        ty: int,
        span: Span::DUMMY,
    };
    let f = mk_func(
        &mut sem,
        "classify",
        vec![(res, "res", outcome)],
        int,
        vec![ret(Some(compare))],
    );
    let hir = module_of(vec![f]);
    let module = run_pipeline(&hir, &mut sem, &config()).expect("pipeline succeeds");

    let func = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "classify")
        .unwrap();

    let switch = func
        .blocks
        .iter()
        .find_map(|b| match &b.term {
            Terminator::SwitchTag { cases, default, .. } => Some((cases.clone(), *default)),
            _ => None,
        })
        .expect("tag_test/if chain collapsed into switch_tag");
    let (cases, default) = switch;
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].tag.as_str(), "Success");
    assert_eq!(cases[1].tag.as_str(), "Cancelled");
    assert!(default.is_some());

    // The chain's tag_test instructions are gone.
    for block in func.blocks.iter() {
        assert!(block
            .instrs
            .iter()
            .all(|i| !matches!(i, Instr::Assign { src: Rvalue::TagTest { .. }, .. })));
    }
}

/// S3: an async entrypoint whose lifted async block awaits a runtime task.
fn async_entry(sem: &mut SemResult) -> HirModule {
    let int = sem.types.builtins().int;
    let task_int = sem.types.task_of(int);

    // fn checkpoint() -> Task<int>   (runtime stub)
    let checkpoint = mk_func(sem, "checkpoint", vec![], task_int, vec![]);
    let checkpoint_sym = checkpoint.sym;

    // async fn main$block0() -> int { checkpoint().await; return 1; }
    let mut block0 = mk_func(
        sem,
        "main$block0",
        vec![],
        int,
        vec![
            HirStmt::Expr(HirExpr::Await {
                task: Box::new(call_fn(checkpoint_sym, "checkpoint", Vec::new(), task_int)),
                ty: int,
                span: Span::DUMMY,
            }),
            ret(Some(lit_int(1, int))),
        ],
    );
    block0.is_async = true;
    let block0_sym = block0.sym;

    // async fn main() -> int { let r = main$block0().await; return r; }
    let block_task = sem.types.task_of(int);
    let r = sem.symbols.fresh_synthetic("r");
    let mut main = mk_func(
        sem,
        "main",
        vec![],
        int,
        vec![
            HirStmt::Let {
                sym: r,
                name: Symbol::intern("r"),
                ty: int,
                init: Some(HirExpr::Await {
                    task: Box::new(call_fn(block0_sym, "main$block0", Vec::new(), block_task)),
                    ty: int,
                    span: Span::DUMMY,
                }),
                span: Span::DUMMY,
            },
            ret(Some(var(r, "r", int))),
        ],
    );
    main.is_async = true;
    let main_sym = main.sym;

    let mut hir = module_of(vec![checkpoint, block0, main]);
    hir.entry = Some(EntryPoint {
        sym: main_sym,
        mode: EntryMode::None,
    });
    hir
}

#[test]
fn s3_async_entry_pipeline_produces_poll_and_start() {
    let mut sem = SemResult::new();
    let hir = async_entry(&mut sem);
    let module = run_pipeline(&hir, &mut sem, &config()).expect("pipeline succeeds");

    // Every async function became a constructor plus a poll companion.
    assert!(module.funcs.iter().all(|f| !f.is_async));
    for name in ["main$poll", "main$block0$poll"] {
        assert!(
            module.funcs.iter().any(|f| f.name.as_str() == name),
            "missing {name}"
        );
    }

    // Constructors produce tasks.
    let ctor = module.funcs.iter().find(|f| f.name.as_str() == "main").unwrap();
    assert!(sem.types.payload_of_task(ctor.result).is_some());

    // __surge_start calls the entrypoint and exits with the converted code.
    let start = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "__surge_start")
        .expect("entry shim synthesized");
    let calls: Vec<&str> = start
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .filter_map(|i| match i {
            Instr::Call {
                callee: surgec_mir::Callee::Sym { name, .. },
                ..
            } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert!(calls.contains(&"main"));
    assert!(calls.contains(&"rt_exit"));
}

#[test]
fn s4_await_inside_loop_is_rejected() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let bool_ty = sem.types.builtins().bool_;
    let task_int = sem.types.task_of(int);

    let mk_task = mk_func(&mut sem, "mk_task", vec![], task_int, vec![]);
    let mk_task_sym = mk_task.sym;

    let mut looper = mk_func(
        &mut sem,
        "looper",
        vec![],
        int,
        vec![
            HirStmt::While {
                cond: HirExpr::Literal {
                    lit: HirLit::Bool(true),
                    ty: bool_ty,
                    span: Span::DUMMY,
                },
                body: vec![HirStmt::Expr(HirExpr::Await {
                    task: Box::new(call_fn(mk_task_sym, "mk_task", Vec::new(), task_int)),
                    ty: int,
                    span: Span::DUMMY,
                })],
                span: Span::DUMMY,
            },
            ret(Some(lit_int(0, int))),
        ],
    );
    looper.is_async = true;

    let hir = module_of(vec![mk_task, looper]);
    let err = run_pipeline(&hir, &mut sem, &config()).unwrap_err();
    let message = format!("{:#}", err);
    assert!(
        message.contains("await inside loop"),
        "unexpected message: {message}"
    );
}

#[test]
fn s5_nothing_function_returns_without_value() {
    let mut sem = SemResult::new();
    let nothing = sem.types.builtins().nothing;
    let f = mk_func(&mut sem, "quiet", vec![], nothing, vec![]);
    let hir = module_of(vec![f]);
    let module = run_pipeline(&hir, &mut sem, &config()).expect("pipeline succeeds");

    let func = module.funcs.iter().find(|f| f.name.as_str() == "quiet").unwrap();
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
fn s6_pipeline_output_is_deterministic_and_stable() {
    let build = || {
        let mut sem = SemResult::new();
        let hir = branchy(&mut sem);
        let module = run_pipeline(&hir, &mut sem, &config()).expect("pipeline succeeds");
        dump_module(&module, &sem.types)
    };
    let first = build();
    let second = build();
    assert_eq!(first, second, "same input, byte-identical dump");

    // Re-running simplify_cfg on the finished module changes nothing.
    let mut sem = SemResult::new();
    let hir = branchy(&mut sem);
    let mut module = run_pipeline(&hir, &mut sem, &config()).expect("pipeline succeeds");
    let before = dump_module(&module, &sem.types);
    for func in module.funcs.iter_mut() {
        simplify_cfg(func);
    }
    let after = dump_module(&module, &sem.types);
    assert_eq!(before, after);
}

#[test]
fn argv_entry_mode_parses_arguments() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let n = sem.symbols.fresh_synthetic("n");
    let main = mk_func(
        &mut sem,
        "main",
        vec![(n, "n", int)],
        int,
        vec![ret(Some(var(n, "n", int)))],
    );
    let main_sym = main.sym;
    let mut hir = module_of(vec![main]);
    hir.entry = Some(EntryPoint {
        sym: main_sym,
        mode: EntryMode::Argv,
    });

    let module = run_pipeline(&hir, &mut sem, &config()).expect("pipeline succeeds");
    let start = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "__surge_start")
        .unwrap();
    let calls: Vec<&str> = start
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .filter_map(|i| match i {
            Instr::Call {
                callee: surgec_mir::Callee::Sym { name, .. },
                ..
            } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    for expected in ["rt_argv", "__len", "from_str", "main", "rt_exit"] {
        assert!(calls.contains(&expected), "missing call to {expected}");
    }
}

#[test]
fn stdin_entry_mode_reads_and_parses_once() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let n = sem.symbols.fresh_synthetic("n");
    let main = mk_func(
        &mut sem,
        "main",
        vec![(n, "n", int)],
        int,
        vec![ret(Some(var(n, "n", int)))],
    );
    let main_sym = main.sym;
    let mut hir = module_of(vec![main]);
    hir.entry = Some(EntryPoint {
        sym: main_sym,
        mode: EntryMode::Stdin,
    });

    let module = run_pipeline(&hir, &mut sem, &config()).expect("pipeline succeeds");
    let start = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "__surge_start")
        .unwrap();
    let reads = start
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .filter(|i| {
            matches!(i, Instr::Call { callee: surgec_mir::Callee::Sym { name, .. }, .. }
                if name.as_str() == "rt_stdin_read_all")
        })
        .count();
    assert_eq!(reads, 1);
}
