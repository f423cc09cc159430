//! Structural and semantic validation.
//!
//! Run after the full pass pipeline. Checks, per function:
//!
//! - every block is terminated (no `None`);
//! - every referenced block exists (`goto`/`if`/`switch_tag` targets and
//!   the filled ready/pend edges of suspends); `switch_tag` has no
//!   duplicate case tags;
//! - every referenced local exists;
//! - every local has a known type, and no local or result type reaches an
//!   unresolved generic parameter (`TypeId::NONE` results are tolerated as
//!   pre-monomorphization leftovers);
//! - returns carry a value exactly when the result type is not `nothing`;
//! - `drop` never applies to copy or reference locals, `end_borrow` only
//!   to reference locals.
//!
//! All diagnostics are collected and returned together.

use crate::error::ValidateError;
use crate::ir::*;
use surgec_sem::TypeInterner;

pub fn validate(module: &Module, types: &TypeInterner) -> Result<(), Vec<ValidateError>> {
    let mut errors = Vec::new();
    for func in module.funcs.iter() {
        validate_func(func, types, &mut errors);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_func(func: &Func, types: &TypeInterner, errors: &mut Vec<ValidateError>) {
    if func.entry.is_none() || func.blocks.get(func.entry).is_none() {
        errors.push(ValidateError::NoEntry { func: func.name });
    }

    check_locals(func, types, errors);

    if func.result.is_some() && types.contains_param(func.result) {
        errors.push(ValidateError::GenericResult { func: func.name });
    }

    let result_is_nothing = func.result.is_none() || types.is_nothing(func.result);
    let result_unresolved = func.result.is_none();

    for (bb, block) in func.blocks.iter_enumerated() {
        if block.term.is_none() {
            errors.push(ValidateError::Unterminated {
                func: func.name,
                block: bb,
            });
        }

        check_targets(func, bb, block, errors);
        check_local_refs(func, bb, block, errors);

        for instr in &block.instrs {
            match instr {
                Instr::Drop { place } => {
                    if let Some(local) = place.root_local() {
                        if let Some(info) = func.locals.get(local) {
                            if info.flags.is_copy() || info.flags.is_borrow() {
                                errors.push(ValidateError::DropOfCopy {
                                    func: func.name,
                                    block: bb,
                                    local,
                                });
                            }
                        }
                    }
                }
                Instr::EndBorrow { place } => {
                    if let Some(local) = place.root_local() {
                        if let Some(info) = func.locals.get(local) {
                            if !info.flags.is_borrow() {
                                errors.push(ValidateError::EndBorrowOfValue {
                                    func: func.name,
                                    block: bb,
                                    local,
                                });
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        match &block.term {
            Terminator::Return { has_value, value, .. }
            | Terminator::AsyncReturn { has_value, value, .. } => {
                if result_unresolved {
                    // Tolerated leftover: no shape requirement.
                } else if result_is_nothing && (*has_value || value.is_some()) {
                    errors.push(ValidateError::UnexpectedReturnValue {
                        func: func.name,
                        block: bb,
                    });
                } else if !result_is_nothing && (!*has_value || value.is_none()) {
                    errors.push(ValidateError::MissingReturnValue {
                        func: func.name,
                        block: bb,
                    });
                }
            }
            _ => {}
        }
    }
}

fn check_locals(func: &Func, types: &TypeInterner, errors: &mut Vec<ValidateError>) {
    for (local, info) in func.locals.iter_enumerated() {
        if info.ty.is_none() || types.get(info.ty).is_none() {
            errors.push(ValidateError::UntypedLocal {
                func: func.name,
                local,
            });
        } else if types.contains_param(info.ty) {
            errors.push(ValidateError::GenericLocal {
                func: func.name,
                local,
            });
        }
    }
}

fn check_target(func: &Func, bb: BlockId, target: BlockId, errors: &mut Vec<ValidateError>) {
    if target.is_some() && func.blocks.get(target).is_none() {
        errors.push(ValidateError::MissingTarget {
            func: func.name,
            block: bb,
            target,
        });
    }
}

fn check_targets(func: &Func, bb: BlockId, block: &Block, errors: &mut Vec<ValidateError>) {
    for instr in &block.instrs {
        if let Some((ready, pend)) = instr.suspend_edges() {
            check_target(func, bb, ready, errors);
            check_target(func, bb, pend, errors);
        }
    }

    match &block.term {
        Terminator::Goto { target } => check_target(func, bb, *target, errors),
        Terminator::If { then_bb, else_bb, .. } => {
            check_target(func, bb, *then_bb, errors);
            check_target(func, bb, *else_bb, errors);
        }
        Terminator::SwitchTag { cases, default, .. } => {
            let mut seen = surgec_util::FxHashSet::default();
            for case in cases {
                check_target(func, bb, case.target, errors);
                if !seen.insert(case.tag) {
                    errors.push(ValidateError::DuplicateSwitchCase {
                        func: func.name,
                        block: bb,
                        tag: case.tag,
                    });
                }
            }
            check_target(func, bb, *default, errors);
        }
        _ => {}
    }
}

/// Walk every operand and place in the block and flag unknown locals.
fn check_local_refs(func: &Func, bb: BlockId, block: &Block, errors: &mut Vec<ValidateError>) {
    for instr in &block.instrs {
        match instr {
            Instr::Assign { dst, src } => {
                ref_place(func, bb, dst, errors);
                ref_rvalue(func, bb, src, errors);
            }
            Instr::Call { dst, callee, args } => {
                if let Some(dst) = dst {
                    ref_place(func, bb, dst, errors);
                }
                if let Callee::Value(op) = callee {
                    ref_operand(func, bb, op, errors);
                }
                for arg in args {
                    ref_operand(func, bb, arg, errors);
                }
            }
            Instr::Drop { place } | Instr::EndBorrow { place } => {
                ref_place(func, bb, place, errors)
            }
            Instr::Await { dst, task } => {
                if let Some(d) = dst {
                    ref_local(func, bb, *d, errors);
                }
                ref_operand(func, bb, task, errors);
            }
            Instr::Spawn { dst, value } => {
                ref_local(func, bb, *dst, errors);
                ref_operand(func, bb, value, errors);
            }
            Instr::Poll { dst, task, .. } => {
                if let Some(d) = dst {
                    ref_local(func, bb, *d, errors);
                }
                ref_operand(func, bb, task, errors);
            }
            Instr::JoinAll { dst, scope, .. } => {
                if let Some(d) = dst {
                    ref_local(func, bb, *d, errors);
                }
                ref_operand(func, bb, scope, errors);
            }
            Instr::ChanSend { chan, value, .. } => {
                ref_operand(func, bb, chan, errors);
                ref_operand(func, bb, value, errors);
            }
            Instr::ChanRecv { dst, chan, .. } => {
                if let Some(d) = dst {
                    ref_local(func, bb, *d, errors);
                }
                ref_operand(func, bb, chan, errors);
            }
            Instr::Timeout { dst, task, millis, .. } => {
                if let Some(d) = dst {
                    ref_local(func, bb, *d, errors);
                }
                ref_operand(func, bb, task, errors);
                ref_operand(func, bb, millis, errors);
            }
            Instr::Select { dst, arms, .. } => {
                if let Some(d) = dst {
                    ref_local(func, bb, *d, errors);
                }
                for arm in arms {
                    match arm {
                        SelectArm::Task { task } => ref_operand(func, bb, task, errors),
                        SelectArm::Recv { chan } => ref_operand(func, bb, chan, errors),
                        SelectArm::Send { chan, value } => {
                            ref_operand(func, bb, chan, errors);
                            ref_operand(func, bb, value, errors);
                        }
                        SelectArm::Timeout { millis } => ref_operand(func, bb, millis, errors),
                        SelectArm::Default => {}
                    }
                }
            }
            Instr::Nop => {}
        }
    }

    match &block.term {
        Terminator::Return { value, .. } => {
            if let Some(v) = value {
                ref_operand(func, bb, v, errors);
            }
        }
        Terminator::AsyncYield { state } | Terminator::AsyncReturnCancelled { state } => {
            ref_operand(func, bb, state, errors);
        }
        Terminator::AsyncReturn { state, value, .. } => {
            ref_operand(func, bb, state, errors);
            if let Some(v) = value {
                ref_operand(func, bb, v, errors);
            }
        }
        Terminator::If { cond, .. } => ref_operand(func, bb, cond, errors),
        Terminator::SwitchTag { value, .. } => ref_operand(func, bb, value, errors),
        _ => {}
    }
}

fn ref_local(func: &Func, bb: BlockId, local: LocalId, errors: &mut Vec<ValidateError>) {
    if func.locals.get(local).is_none() {
        errors.push(ValidateError::UnknownLocal {
            func: func.name,
            block: bb,
            local,
        });
    }
}

fn ref_place(func: &Func, bb: BlockId, place: &Place, errors: &mut Vec<ValidateError>) {
    if let Some(root) = place.root_local() {
        ref_local(func, bb, root, errors);
    }
    for proj in &place.proj {
        if let Projection::Index { index } = proj {
            ref_local(func, bb, *index, errors);
        }
    }
}

fn ref_operand(func: &Func, bb: BlockId, op: &Operand, errors: &mut Vec<ValidateError>) {
    if let Some(place) = op.place() {
        ref_place(func, bb, place, errors);
    }
}

fn ref_rvalue(func: &Func, bb: BlockId, rv: &Rvalue, errors: &mut Vec<ValidateError>) {
    match rv {
        Rvalue::Use(op) | Rvalue::Unary { operand: op, .. } | Rvalue::Cast { operand: op, .. } => {
            ref_operand(func, bb, op, errors)
        }
        Rvalue::Binary { lhs, rhs, .. } => {
            ref_operand(func, bb, lhs, errors);
            ref_operand(func, bb, rhs, errors);
        }
        Rvalue::StructLit { fields, .. } => {
            for f in fields {
                ref_operand(func, bb, f, errors);
            }
        }
        Rvalue::ArrayLit { elems, .. } | Rvalue::TupleLit { elems, .. } => {
            for e in elems {
                ref_operand(func, bb, e, errors);
            }
        }
        Rvalue::Field { base, .. } => ref_operand(func, bb, base, errors),
        Rvalue::Index { base, index } => {
            ref_operand(func, bb, base, errors);
            ref_operand(func, bb, index, errors);
        }
        Rvalue::TagTest { value, .. }
        | Rvalue::TagPayload { value, .. }
        | Rvalue::TypeTest { value, .. }
        | Rvalue::HeirTest { value, .. } => ref_operand(func, bb, value, errors),
        Rvalue::IterInit { iterable } => ref_operand(func, bb, iterable, errors),
        Rvalue::IterNext { iter } => ref_operand(func, bb, iter, errors),
    }
}
