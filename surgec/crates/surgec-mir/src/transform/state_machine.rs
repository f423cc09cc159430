//! Async state-machine lowering.
//!
//! Rewrites every async function `f` with payload type `P` into:
//!
//! - a non-async poll function `f$poll` that owns `f`'s original locals and
//!   blocks, entered through a pc-based dispatch over a synthesized state
//!   union `__AsyncState$f` whose variants carry exactly the locals live
//!   across each suspend;
//! - a constructor left in `f`'s slot that packs the `S0` variant over the
//!   parameters and calls `__task_create(poll_fn_id, state)` to produce
//!   `Task<P>`.
//!
//! The poll function's shape:
//!
//! ```text
//! entry: s = __task_state(); pc = s.pc; payload = s.payload
//!        if pc == S0.resume  -> unpack0   else -> test1
//! testK: if pc == SK.resume  -> unpackK   else -> ...; default: unreachable
//! unpackK: restore live locals from payload; (S0 only: rt_scope_enter)
//!          goto SK.resume
//! pendK: payload' = SK(live locals); s' = { pc: SK.resume, payload' }
//!        async_yield s'
//! ```
//!
//! Each suspend's resume point is its own poll block: on wake the suspend
//! re-polls, writes its destination, and takes the ready edge, so the
//! destination local is never part of the saved state.
//!
//! When `scope_local` is set, every original `Return` is rerouted through a
//! join epilogue that cancels (early returns), joins the scope, exits it,
//! and branches on `__scope_join_failed` into a cancelled or successful
//! async return.

use crate::analysis::liveness::analyze_liveness;
use crate::builder::flags_for;
use crate::error::AsyncLowerError;
use crate::ir::*;
use crate::transform::normalize::{
    collect_suspend_sites, reject_await_in_loops, split_async_suspends, SuspendSite,
};
use surgec_sem::{SemResult, StructDef, SymbolId, TagCase, TypeId, TypeKind, UnionDef};
use surgec_util::{Span, Symbol};

/// One arm of the synthesized state union.
struct Variant {
    tag_sym: SymbolId,
    tag_name: Symbol,
    /// Block the variant resumes at: the function entry for `S0`, the
    /// suspend's own poll block otherwise.
    resume: BlockId,
    /// Saved locals, sorted by id for determinism.
    locals: Vec<LocalId>,
}

pub fn lower_async_state_machine(
    module: &mut Module,
    sem: &mut SemResult,
) -> Result<(), AsyncLowerError> {
    let async_ids: Vec<FuncId> = module
        .funcs
        .iter_enumerated()
        .filter(|(_, f)| f.is_async && !f.async_lowered)
        .map(|(id, _)| id)
        .collect();

    for fid in async_ids {
        lower_one(module, sem, fid)?;
    }
    Ok(())
}

fn lower_one(module: &mut Module, sem: &mut SemResult, fid: FuncId) -> Result<(), AsyncLowerError> {
    let (name, span, payload_ty, failfast, scope_local, param_count, locals, blocks, entry) = {
        let f = &mut module.funcs[fid];
        (
            f.name,
            f.span,
            f.result,
            f.failfast,
            f.scope_local,
            f.param_count,
            f.locals.clone(),
            f.blocks.take(),
            f.entry,
        )
    };

    if entry.is_none() {
        return Err(AsyncLowerError::BlockOutOfRange {
            func: name,
            block: entry,
        });
    }

    let task_ty = sem.types.task_of(payload_ty);

    // The poll twin inherits locals, blocks, and the scope handle wholesale.
    let poll_name = Symbol::intern(&format!("{}$poll", name));
    let poll_sym = sem.symbols.fresh(poll_name, Symbol::intern(""));
    let mut poll = Func::new(poll_sym, poll_name, span, payload_ty);
    poll.locals = locals;
    poll.blocks = blocks;
    poll.entry = entry;
    poll.param_count = param_count;
    poll.scope_local = scope_local;
    poll.failfast = failfast;
    poll.async_lowered = true;

    split_async_suspends(&mut poll);
    if poll.scope_local.is_some() {
        splice_scope_epilogues(&mut poll, sem);
    }
    let sites = collect_suspend_sites(&poll)?;
    reject_await_in_loops(&poll, &sites)?;
    let live = analyze_liveness(&poll);

    // Variant table: S0 saves the parameters; S(i+1) saves what is live
    // into site i's poll block, minus the suspend's own destination.
    let mut variants = Vec::with_capacity(sites.len() + 1);
    variants.push(Variant {
        tag_sym: sem.symbols.fresh_synthetic("S0"),
        tag_name: Symbol::intern("S0"),
        resume: poll.entry,
        locals: poll.param_locals().collect(),
    });
    for (i, site) in sites.iter().enumerate() {
        let block = poll
            .blocks
            .get(site.block)
            .ok_or(AsyncLowerError::BlockOutOfRange {
                func: name,
                block: site.block,
            })?;
        let instr = block
            .instrs
            .get(site.instr)
            .filter(|ins| ins.is_suspend())
            .ok_or(AsyncLowerError::NotASuspend {
                func: name,
                block: site.block,
                index: site.instr,
            })?;
        let dst = instr.suspend_dst();
        let mut saved: Vec<LocalId> = live
            .live_into(site.block)
            .iter()
            .copied()
            .filter(|l| Some(*l) != dst)
            .collect();
        saved.sort();

        let tag = format!("S{}", i + 1);
        variants.push(Variant {
            tag_sym: sem.symbols.fresh_synthetic(&tag),
            tag_name: Symbol::intern(&tag),
            resume: site.block,
            locals: saved,
        });
    }

    // Synthesize the state union and the frame struct `{ pc, payload }`.
    let union_name = Symbol::intern(&format!("__AsyncState${}", name));
    let union_sym = sem.symbols.fresh(union_name, Symbol::intern(""));
    let cases: Vec<TagCase> = variants
        .iter()
        .map(|v| TagCase {
            sym: v.tag_sym,
            name: v.tag_name,
            payload: v.locals.iter().map(|&l| poll.locals[l].ty).collect(),
        })
        .collect();
    let state_union_ty = sem.types.intern(TypeKind::Union(UnionDef {
        sym: union_sym,
        name: union_name,
        type_args: Vec::new(),
        cases,
    }));

    let frame_name = Symbol::intern(&format!("__AsyncFrame${}", name));
    let frame_sym = sem.symbols.fresh(frame_name, Symbol::intern(""));
    let uint = sem.types.builtins().uint;
    let frame_ty = sem.types.intern(TypeKind::Struct(StructDef {
        sym: frame_sym,
        name: frame_name,
        type_args: Vec::new(),
        fields: vec![
            (Symbol::intern("pc"), uint),
            (Symbol::intern("payload"), state_union_ty),
        ],
    }));

    register_state_meta(module, sem, state_union_ty, &variants, &poll);

    let resume0 = variants[0].resume;
    build_poll_entry(&mut poll, sem, &variants, state_union_ty, frame_ty);
    for (i, site) in sites.iter().enumerate() {
        build_pending_block(&mut poll, sem, &variants[i + 1], state_union_ty, frame_ty, *site)?;
    }
    rewrite_returns(&mut poll, sem, frame_ty);

    let poll_id = module.add_func(poll);
    build_constructor(
        module,
        sem,
        fid,
        poll_id,
        resume0,
        state_union_ty,
        frame_ty,
        task_ty,
    );
    Ok(())
}

fn add_temp(func: &mut Func, sem: &SemResult, name: &str, ty: TypeId) -> LocalId {
    let n = func.locals.len();
    func.locals.push(Local {
        sym: SymbolId::NONE,
        ty,
        flags: flags_for(&sem.types, ty),
        name: Symbol::intern(&format!("{}{}", name, n)),
        span: Span::DUMMY,
    })
}

/// Copy for copy-flagged locals, move otherwise (a constructor argument is
/// a consuming position).
fn consume_local(func: &Func, local: LocalId) -> Operand {
    let info = &func.locals[local];
    if info.flags.is_copy() {
        Operand::copy(Place::local(local), info.ty)
    } else {
        Operand::mov(Place::local(local), info.ty)
    }
}

fn call_sym(sem: &SemResult, sym: SymbolId) -> Callee {
    Callee::Sym {
        sym,
        name: sem.symbols.name(sym),
    }
}

fn register_state_meta(
    module: &mut Module,
    sem: &SemResult,
    state_union_ty: TypeId,
    variants: &[Variant],
    poll: &Func,
) {
    let cases: Vec<TagCaseMeta> = variants
        .iter()
        .map(|v| TagCaseMeta {
            tag_name: v.tag_name,
            tag_sym: v.tag_sym,
            payload: v
                .locals
                .iter()
                .map(|&l| sem.types.canonical(poll.locals[l].ty))
                .collect(),
        })
        .collect();
    module.meta.tag_layouts.insert(state_union_ty, cases);
    for v in variants {
        module.meta.tag_names.insert(v.tag_sym, v.tag_name);
    }
}

/// Emit the dispatch prologue: fetch the task state, read `pc` and
/// `payload`, and test `pc` against each variant's resume block in a linear
/// chain. Each hit unpacks the saved locals and jumps to the resume block;
/// the fall-through is unreachable.
fn build_poll_entry(
    poll: &mut Func,
    sem: &SemResult,
    variants: &[Variant],
    state_union_ty: TypeId,
    frame_ty: TypeId,
) {
    let uint = sem.types.builtins().uint;
    let bool_ty = sem.types.builtins().bool_;

    let state_l = add_temp(poll, sem, "__state", frame_ty);
    let pc_l = add_temp(poll, sem, "__pc", uint);
    let payload_l = add_temp(poll, sem, "__payload", state_union_ty);

    let entry_bb = poll.new_block();
    let default_bb = poll.new_block();
    poll.blocks[default_bb].term = Terminator::Unreachable;

    let mut test_bbs = vec![entry_bb];
    for _ in 1..variants.len() {
        test_bbs.push(poll.new_block());
    }
    let unpack_bbs: Vec<BlockId> = variants.iter().map(|_| poll.new_block()).collect();

    for (k, variant) in variants.iter().enumerate() {
        let bb = test_bbs[k];
        if k == 0 {
            let instrs = &mut poll.blocks[bb].instrs;
            instrs.push(Instr::Call {
                dst: Some(Place::local(state_l)),
                callee: call_sym(sem, sem.well_known.task_state),
                args: Vec::new(),
            });
            instrs.push(Instr::Assign {
                dst: Place::local(pc_l),
                src: Rvalue::Field {
                    base: Operand::copy(Place::local(state_l), frame_ty),
                    name: Symbol::intern("pc"),
                    index: 0,
                },
            });
            instrs.push(Instr::Assign {
                dst: Place::local(payload_l),
                src: Rvalue::Field {
                    base: Operand::copy(Place::local(state_l), frame_ty),
                    name: Symbol::intern("payload"),
                    index: 1,
                },
            });
        }

        let eq_l = add_temp(poll, sem, "__is_s", bool_ty);
        poll.blocks[bb].instrs.push(Instr::Assign {
            dst: Place::local(eq_l),
            src: Rvalue::Binary {
                op: BinOp::Eq,
                lhs: Operand::copy(Place::local(pc_l), uint),
                rhs: Operand::konst(Const::int(variant.resume.0 as i64), uint),
            },
        });
        let else_bb = if k + 1 < variants.len() {
            test_bbs[k + 1]
        } else {
            default_bb
        };
        poll.blocks[bb].term = Terminator::If {
            cond: Operand::copy(Place::local(eq_l), bool_ty),
            then_bb: unpack_bbs[k],
            else_bb,
        };
    }

    for (k, variant) in variants.iter().enumerate() {
        let bb = unpack_bbs[k];
        for (j, &local) in variant.locals.iter().enumerate() {
            poll.blocks[bb].instrs.push(Instr::Assign {
                dst: Place::local(local),
                src: Rvalue::TagPayload {
                    value: Operand::copy(Place::local(payload_l), state_union_ty),
                    tag: variant.tag_name,
                    index: j as u32,
                },
            });
        }
        // The start variant establishes the structured scope.
        if k == 0 && poll.scope_local.is_some() {
            poll.blocks[bb].instrs.push(Instr::Call {
                dst: Some(Place::local(poll.scope_local)),
                callee: call_sym(sem, sem.well_known.rt_scope_enter),
                args: vec![Operand::konst(Const::Bool(poll.failfast), bool_ty)],
            });
        }
        poll.blocks[bb].term = Terminator::Goto {
            target: variant.resume,
        };
    }

    poll.entry = entry_bb;
}

/// Emit the pending block for one suspend site and back-patch the site's
/// pend edge: build the variant via its tag constructor over the saved
/// locals, pack the frame, and yield it.
fn build_pending_block(
    poll: &mut Func,
    sem: &SemResult,
    variant: &Variant,
    state_union_ty: TypeId,
    frame_ty: TypeId,
    site: SuspendSite,
) -> Result<(), AsyncLowerError> {
    let uint = sem.types.builtins().uint;

    let pend_bb = poll.new_block();
    let payload_l = add_temp(poll, sem, "__pend_payload", state_union_ty);
    let state_l = add_temp(poll, sem, "__pend_state", frame_ty);

    let args: Vec<Operand> = variant.locals.iter().map(|&l| consume_local(poll, l)).collect();
    let block = &mut poll.blocks[pend_bb];
    block.instrs.push(Instr::Call {
        dst: Some(Place::local(payload_l)),
        callee: Callee::Sym {
            sym: variant.tag_sym,
            name: variant.tag_name,
        },
        args,
    });
    block.instrs.push(Instr::Assign {
        dst: Place::local(state_l),
        src: Rvalue::StructLit {
            ty: frame_ty,
            fields: vec![
                Operand::konst(Const::int(variant.resume.0 as i64), uint),
                Operand::mov(Place::local(payload_l), state_union_ty),
            ],
        },
    });
    block.term = Terminator::AsyncYield {
        state: Operand::mov(Place::local(state_l), frame_ty),
    };

    let func_name = poll.name;
    let site_block = poll
        .blocks
        .get_mut(site.block)
        .ok_or(AsyncLowerError::BlockOutOfRange {
            func: func_name,
            block: site.block,
        })?;
    let instr = site_block
        .instrs
        .get_mut(site.instr)
        .ok_or(AsyncLowerError::NotASuspend {
            func: func_name,
            block: site.block,
            index: site.instr,
        })?;
    match instr.suspend_edges_mut() {
        Some((_, pend)) => *pend = pend_bb,
        None => {
            return Err(AsyncLowerError::NotASuspend {
                func: func_name,
                block: site.block,
                index: site.instr,
            })
        }
    }
    Ok(())
}

/// Turn every remaining `Return` into `AsyncReturn` (or
/// `AsyncReturnCancelled` when the cancel flag was set), re-fetching the
/// task state immediately before the return.
fn rewrite_returns(poll: &mut Func, sem: &SemResult, frame_ty: TypeId) {
    for bb in poll.blocks.indices().collect::<Vec<_>>() {
        let Terminator::Return {
            has_value,
            value,
            cancelled,
            ..
        } = poll.blocks[bb].term.clone()
        else {
            continue;
        };

        let state_l = add_temp(poll, sem, "__final_state", frame_ty);
        poll.blocks[bb].instrs.push(Instr::Call {
            dst: Some(Place::local(state_l)),
            callee: call_sym(sem, sem.well_known.task_state),
            args: Vec::new(),
        });
        let state = Operand::mov(Place::local(state_l), frame_ty);
        poll.blocks[bb].term = if cancelled {
            Terminator::AsyncReturnCancelled { state }
        } else {
            Terminator::AsyncReturn {
                state,
                has_value,
                value,
            }
        };
    }
}

/// Reroute every original `Return` through the structured-scope join
/// epilogue. The return value is parked in a temp so it survives the
/// `JoinAll` suspend.
fn splice_scope_epilogues(poll: &mut Func, sem: &SemResult) {
    let uint = sem.types.builtins().uint;
    let bool_ty = sem.types.builtins().bool_;
    let scope = poll.scope_local;
    let result_ty = poll.result;

    for bb in poll.blocks.indices().collect::<Vec<_>>() {
        let Terminator::Return {
            has_value,
            value,
            early,
            cancelled,
        } = poll.blocks[bb].term.clone()
        else {
            continue;
        };
        if cancelled {
            continue;
        }

        let ret_op = match (has_value, value) {
            (true, Some(v)) => {
                let tmp = add_temp(poll, sem, "__ret", result_ty);
                poll.blocks[bb].instrs.push(Instr::Assign {
                    dst: Place::local(tmp),
                    src: Rvalue::Use(v),
                });
                Some(consume_local(poll, tmp))
            }
            _ => None,
        };

        let join_bb = poll.new_block();
        let done_bb = poll.new_block();
        let cancel_bb = poll.new_block();
        let success_bb = poll.new_block();

        poll.blocks[bb].term = Terminator::Goto { target: join_bb };

        let scope_op = Operand::copy(Place::local(scope), uint);
        let join = &mut poll.blocks[join_bb];
        if early {
            join.instrs.push(Instr::Call {
                dst: None,
                callee: call_sym(sem, sem.well_known.rt_scope_cancel_all),
                args: vec![scope_op.clone()],
            });
        }
        join.instrs.push(Instr::JoinAll {
            dst: None,
            scope: scope_op.clone(),
            ready: done_bb,
            pend: BlockId::NONE,
        });
        join.term = Terminator::Unreachable;

        let failed_l = add_temp(poll, sem, "__join_failed", bool_ty);
        let done = &mut poll.blocks[done_bb];
        done.instrs.push(Instr::Call {
            dst: None,
            callee: call_sym(sem, sem.well_known.rt_scope_exit),
            args: vec![scope_op.clone()],
        });
        done.instrs.push(Instr::Call {
            dst: Some(Place::local(failed_l)),
            callee: call_sym(sem, sem.well_known.scope_join_failed),
            args: vec![scope_op],
        });
        done.term = Terminator::If {
            cond: Operand::copy(Place::local(failed_l), bool_ty),
            then_bb: cancel_bb,
            else_bb: success_bb,
        };

        poll.blocks[cancel_bb].term = Terminator::Return {
            has_value: false,
            value: None,
            early: false,
            cancelled: true,
        };
        poll.blocks[success_bb].term = Terminator::Return {
            has_value,
            value: ret_op,
            early: false,
            cancelled: false,
        };
    }
}

/// Rebuild `f` as the constructor: pack the `S0` variant over the
/// parameters, pack the initial frame pointing at the poll entry, create
/// the task, and return it.
#[allow(clippy::too_many_arguments)]
fn build_constructor(
    module: &mut Module,
    sem: &mut SemResult,
    fid: FuncId,
    poll_id: FuncId,
    resume0: BlockId,
    state_union_ty: TypeId,
    frame_ty: TypeId,
    task_ty: TypeId,
) {
    let int = sem.types.builtins().int;
    let uint = sem.types.builtins().uint;

    let (s0_sym, s0_name) = {
        let s0 = &module.meta.tag_layouts[&state_union_ty][0];
        (s0.tag_sym, s0.tag_name)
    };

    let f = &mut module.funcs[fid];
    let params: Vec<Local> = f.locals.iter().take(f.param_count).cloned().collect();
    f.locals = params.into_iter().collect();
    f.blocks = surgec_util::IndexVec::new();
    f.result = task_ty;
    f.is_async = false;
    f.async_lowered = true;
    f.scope_local = LocalId::NONE;

    let param_args: Vec<Operand> = f.param_locals().map(|l| consume_local(f, l)).collect();

    let payload_l = add_temp(f, sem, "__init_payload", state_union_ty);
    let state_l = add_temp(f, sem, "__init_state", frame_ty);
    let task_l = add_temp(f, sem, "__task", task_ty);

    let entry = f.new_block();
    f.entry = entry;
    let block = &mut f.blocks[entry];
    block.instrs.push(Instr::Call {
        dst: Some(Place::local(payload_l)),
        callee: Callee::Sym {
            sym: s0_sym,
            name: s0_name,
        },
        args: param_args,
    });
    block.instrs.push(Instr::Assign {
        dst: Place::local(state_l),
        src: Rvalue::StructLit {
            ty: frame_ty,
            fields: vec![
                Operand::konst(Const::int(resume0.0 as i64), uint),
                Operand::mov(Place::local(payload_l), state_union_ty),
            ],
        },
    });
    block.instrs.push(Instr::Call {
        dst: Some(Place::local(task_l)),
        callee: call_sym(sem, sem.well_known.task_create),
        args: vec![
            Operand::konst(Const::int(poll_id.0 as i64), int),
            Operand::mov(Place::local(state_l), frame_ty),
        ],
    });
    block.term = Terminator::Return {
        has_value: true,
        value: Some(Operand::mov(Place::local(task_l), task_ty)),
        early: false,
        cancelled: false,
    };
}
