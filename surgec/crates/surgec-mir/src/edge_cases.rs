//! Edge-case tests: degenerate CFGs, sentinel ids, and boundary shapes the
//! main test suite does not cover.

use crate::analysis::{has_cycle_from, succ_blocks};
use crate::*;
use surgec_sem::{SemResult, SymbolId as SemSym, TypeId};
use surgec_util::{Span, Symbol};

fn empty_func(sem: &SemResult, name: &str) -> Func {
    let int = sem.types.builtins().int;
    Func::new(SemSym::NONE, Symbol::intern(name), Span::DUMMY, int)
}

#[test]
fn sentinels_are_not_valid_ids() {
    assert!(BlockId::NONE.is_none());
    assert!(LocalId::NONE.is_none());
    assert!(FuncId::NONE.is_none());
    assert!(GlobalId::NONE.is_none());
    assert!(BlockId(0).is_some());
}

#[test]
fn validator_flags_func_without_entry() {
    let sem = SemResult::new();
    let mut module = Module::new(sem.layout);
    module.add_func(empty_func(&sem, "hollow"));

    let errors = validate(&module, &sem.types).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidateError::NoEntry { .. })));
}

#[test]
fn simplify_on_empty_func_is_a_noop() {
    let sem = SemResult::new();
    let mut func = empty_func(&sem, "empty");
    simplify_cfg(&mut func);
    assert!(func.blocks.is_empty());
}

#[test]
fn simplify_redirects_trivial_entry() {
    let sem = SemResult::new();
    let mut func = empty_func(&sem, "entrygoto");
    let entry = func.new_block();
    let real = func.new_block();
    func.entry = entry;
    func.blocks[entry].term = Terminator::Goto { target: real };
    func.blocks[real].instrs.push(Instr::Nop);
    func.blocks[real].term = Terminator::Return {
        has_value: true,
        value: Some(Operand::konst(Const::int(1), sem.types.builtins().int)),
        early: false,
        cancelled: false,
    };

    simplify_cfg(&mut func);
    assert_eq!(func.blocks.len(), 1);
    assert_eq!(func.entry, BlockId(0));
    assert!(matches!(
        func.blocks[func.entry].term,
        Terminator::Return { .. }
    ));
}

#[test]
fn simplify_handles_trivial_goto_self_loop() {
    let sem = SemResult::new();
    let mut func = empty_func(&sem, "selfloop");
    let entry = func.new_block();
    let looper = func.new_block();
    func.entry = entry;
    func.blocks[entry].instrs.push(Instr::Nop);
    func.blocks[entry].term = Terminator::Return {
        has_value: true,
        value: Some(Operand::konst(Const::int(0), sem.types.builtins().int)),
        early: false,
        cancelled: false,
    };
    // Unreachable trivial cycle: must not hang and must be dropped.
    func.blocks[looper].term = Terminator::Goto { target: looper };

    simplify_cfg(&mut func);
    assert_eq!(func.blocks.len(), 1);
}

#[test]
fn succ_blocks_prefers_suspend_edges() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let task_int = sem.types.task_of(int);
    let mut func = empty_func(&sem, "susp");
    let t = func.add_local(Local {
        sym: SemSym::NONE,
        ty: task_int,
        flags: LocalFlags::OWN,
        name: Symbol::intern("t"),
        span: Span::DUMMY,
    });
    let poll_bb = func.new_block();
    let ready = func.new_block();
    let pend = func.new_block();
    func.entry = poll_bb;
    func.blocks[poll_bb].instrs.push(Instr::Poll {
        dst: None,
        task: Operand::mov(Place::local(t), task_int),
        ready,
        pend: BlockId::NONE,
    });
    // A stale goto must be ignored once the suspend provides successors.
    func.blocks[poll_bb].term = Terminator::Unreachable;
    func.blocks[ready].term = Terminator::Unreachable;
    func.blocks[pend].term = Terminator::Unreachable;

    assert_eq!(succ_blocks(&func, poll_bb, true), vec![ready]);
    assert_eq!(succ_blocks(&func, poll_bb, false), vec![ready]);

    // With the pend edge filled, include_pend controls whether it shows.
    if let Instr::Poll { pend: p, .. } = &mut func.blocks[poll_bb].instrs[0] {
        *p = pend;
    }
    assert_eq!(succ_blocks(&func, poll_bb, true), vec![ready, pend]);
    assert_eq!(succ_blocks(&func, poll_bb, false), vec![ready]);
}

#[test]
fn cycle_detection_from_block() {
    let sem = SemResult::new();
    let mut func = empty_func(&sem, "cyc");
    let a = func.new_block();
    let b = func.new_block();
    let c = func.new_block();
    func.entry = a;
    func.blocks[a].term = Terminator::Goto { target: b };
    func.blocks[b].term = Terminator::Goto { target: c };
    func.blocks[c].term = Terminator::Goto { target: a };

    assert!(has_cycle_from(&func, a));
    assert!(has_cycle_from(&func, b));

    // Break the back edge: no block reaches itself anymore.
    func.blocks[c].term = Terminator::Unreachable;
    assert!(!has_cycle_from(&func, a));
    assert!(!has_cycle_from(&func, c));
}

#[test]
fn normalizer_leaves_suspend_free_functions_alone() {
    let sem = SemResult::new();
    let mut func = empty_func(&sem, "plain");
    let entry = func.new_block();
    func.entry = entry;
    func.blocks[entry].instrs.push(Instr::Nop);
    func.blocks[entry].term = Terminator::Return {
        has_value: true,
        value: Some(Operand::konst(Const::int(3), sem.types.builtins().int)),
        early: false,
        cancelled: false,
    };
    let before = func.blocks.clone();

    split_async_suspends(&mut func);
    assert_eq!(func.blocks, before);
    assert!(collect_suspend_sites(&func).unwrap().is_empty());
}

#[test]
fn suspend_not_last_in_block_is_an_error() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let task_int = sem.types.task_of(int);
    let mut func = empty_func(&sem, "malformed");
    let t = func.add_local(Local {
        sym: SemSym::NONE,
        ty: task_int,
        flags: LocalFlags::OWN,
        name: Symbol::intern("t"),
        span: Span::DUMMY,
    });
    let entry = func.new_block();
    let ready = func.new_block();
    func.entry = entry;
    func.blocks[entry].instrs.push(Instr::Poll {
        dst: None,
        task: Operand::mov(Place::local(t), task_int),
        ready,
        pend: BlockId::NONE,
    });
    func.blocks[entry].instrs.push(Instr::Nop);
    func.blocks[entry].term = Terminator::Unreachable;
    func.blocks[ready].term = Terminator::Unreachable;

    let err = collect_suspend_sites(&func).unwrap_err();
    assert!(matches!(err, AsyncLowerError::NotASuspend { .. }));
}

#[test]
fn state_machine_handles_async_func_without_suspends() {
    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let mut module = Module::new(sem.layout);

    let sym = sem.symbols.fresh_synthetic("quick");
    let mut func = Func::new(sym, Symbol::intern("quick"), Span::DUMMY, int);
    func.is_async = true;
    // No structured scope: built by hand, not through the lowerer.
    let entry = func.new_block();
    func.entry = entry;
    func.blocks[entry].term = Terminator::Return {
        has_value: true,
        value: Some(Operand::konst(Const::int(5), int)),
        early: false,
        cancelled: false,
    };
    module.add_func(func);

    lower_async_state_machine(&mut module, &mut sem).expect("lowering succeeds");
    validate(&module, &sem.types).expect("validator passes");

    let poll = module
        .funcs
        .iter()
        .find(|f| f.name.as_str() == "quick$poll")
        .expect("poll twin");
    assert!(!poll.is_async);
    // Single S0 variant: the dispatch still exists, and the only return is
    // an async return.
    assert!(poll
        .blocks
        .iter()
        .any(|b| matches!(b.term, Terminator::AsyncReturn { .. })));
    assert!(poll
        .blocks
        .iter()
        .all(|b| b.instrs.iter().all(|i| !matches!(i, Instr::JoinAll { .. }))));
}

#[test]
fn operand_helpers_expose_places() {
    let int_place = Place::local(LocalId(4));
    let op = Operand::copy(int_place.clone(), TypeId::NONE);
    assert_eq!(op.place(), Some(&int_place));
    let c = Operand::konst(Const::int(1), TypeId::NONE);
    assert_eq!(c.place(), None);
}
