//! `__surge_start` synthesis.
//!
//! When the module declares exactly one `@entrypoint` function, the lowerer
//! emits a synthetic `__surge_start` that:
//!
//! 1. initializes declared globals in declaration order, then interned
//!    static-string globals in global-id order;
//! 2. prepares entrypoint arguments per the entry mode: `none` (defaults),
//!    `argv` (`rt_argv` + `__len` + per-slot `from_str` expecting
//!    `Erring<T, Error>`, exiting on parse failure), or `stdin` (read all,
//!    parse once);
//! 3. calls the entrypoint and converts its result to an exit code
//!    (`nothing` → 0, `int` → the value, else a `__to` function when one
//!    exists, else 0);
//! 4. calls `rt_exit(code)` and returns.

use crate::error::LowerError;
use crate::ir::*;
use crate::lower::hir_to_mir::{FuncCx, LowerCx};
use surgec_sem::hir::{EntryMode, EntryPoint, HirCallee, HirFunc};
use surgec_sem::{TypeId, TypeKind};
use surgec_util::{Span, Symbol};

pub(crate) fn synthesize_start(
    cx: &mut LowerCx<'_, '_>,
    entry: EntryPoint,
) -> Result<Func, LowerError> {
    let entry_fn = cx
        .hir
        .funcs
        .iter()
        .find(|f| f.sym == entry.sym)
        .ok_or(LowerError::EntrypointNotFound)?;

    let name = Symbol::intern("__surge_start");
    let sym = cx.sem.symbols.fresh_synthetic("__surge_start");
    let nothing = cx.sem.types.builtins().nothing;

    let mut fcx = FuncCx::new(cx, sym, name, Span::DUMMY, nothing);
    fcx.b.start_entry();

    // 1. Declared globals, in declaration order.
    let hir = fcx.cx.hir;
    for (i, g) in hir.globals.iter().enumerate() {
        let gid = GlobalId(i as u32);
        let op = fcx.lower_value_expr(&g.init)?;
        let op = fcx.consume(op);
        fcx.b.assign(Place::global(gid), Rvalue::Use(op));
    }

    // 1b. Interned static strings, in global-id order. Lowering the global
    // initializers above may itself have interned more strings; the list is
    // complete by now.
    let string_ty = fcx.cx.sem.types.builtins().string;
    let inits = fcx.cx.string_inits.clone();
    for (gid, content) in inits {
        fcx.b.assign(
            Place::global(gid),
            Rvalue::Use(Operand::konst(Const::Str(content), string_ty)),
        );
    }

    // 2–3. Arguments, call, exit-code conversion.
    let code = match entry.mode {
        EntryMode::None => {
            let callee = HirCallee::Fn {
                sym: entry_fn.sym,
                name: entry_fn.name,
                type_args: Vec::new(),
            };
            let ret = fcx.lower_call(&callee, &[], entry_fn.result, Span::DUMMY)?;
            convert_exit_code(&mut fcx, entry_fn, ret)?
        }
        EntryMode::Argv => {
            let args = prepare_argv_args(&mut fcx, entry_fn)?;
            let ret = fcx.emit_call(
                Callee::Sym {
                    sym: entry_fn.sym,
                    name: entry_fn.name,
                },
                args,
                entry_fn.result,
            )?;
            convert_exit_code(&mut fcx, entry_fn, ret)?
        }
        EntryMode::Stdin => {
            let args = prepare_stdin_args(&mut fcx, entry_fn)?;
            let ret = fcx.emit_call(
                Callee::Sym {
                    sym: entry_fn.sym,
                    name: entry_fn.name,
                },
                args,
                entry_fn.result,
            )?;
            convert_exit_code(&mut fcx, entry_fn, ret)?
        }
    };

    // 4. rt_exit and return.
    let rt_exit = fcx.cx.sem.well_known.rt_exit;
    let exit_name = fcx.cx.sem.symbols.name(rt_exit);
    fcx.b.push(Instr::Call {
        dst: None,
        callee: Callee::Sym {
            sym: rt_exit,
            name: exit_name,
        },
        args: vec![code],
    });
    fcx.b.terminate(Terminator::Return {
        has_value: false,
        value: None,
        early: false,
        cancelled: false,
    });

    Ok(fcx.b.finish())
}

/// Emit `rt_exit(1); unreachable` into `fail_bb`.
fn emit_exit_failure(fcx: &mut FuncCx<'_, '_, '_>, fail_bb: BlockId) {
    let int = fcx.cx.sem.types.builtins().int;
    let rt_exit = fcx.cx.sem.well_known.rt_exit;
    let exit_name = fcx.cx.sem.symbols.name(rt_exit);
    let cur = fcx.b.current;
    fcx.b.switch_to(fail_bb);
    fcx.b.push(Instr::Call {
        dst: None,
        callee: Callee::Sym {
            sym: rt_exit,
            name: exit_name,
        },
        args: vec![Operand::konst(Const::int(1), int)],
    });
    fcx.b.terminate(Terminator::Unreachable);
    fcx.b.switch_to(cur);
}

/// Parse one `&string` slot via `from_str`, exiting on the `Err` case.
/// Returns the operand carrying the parsed value.
fn parse_slot(
    fcx: &mut FuncCx<'_, '_, '_>,
    slot_ref: Operand,
    target_ty: TypeId,
) -> Result<Operand, LowerError> {
    let bool_ty = fcx.cx.sem.types.builtins().bool_;
    let err_union = fcx.cx.sem.types.builtins().error_union;
    let erring_ty = fcx.cx.sem.types.erring(target_ty, err_union);

    let from_str = fcx.cx.sem.well_known.from_str;
    let from_str_name = fcx.cx.sem.symbols.name(from_str);
    fcx.cx.type_arg_records.push((from_str, vec![target_ty]));

    let res = fcx.temp(erring_ty);
    fcx.b.push(Instr::Call {
        dst: Some(Place::local(res)),
        callee: Callee::Sym {
            sym: from_str,
            name: from_str_name,
        },
        args: vec![slot_ref],
    });

    let is_err = fcx.temp(bool_ty);
    fcx.b.assign(
        Place::local(is_err),
        Rvalue::TagTest {
            value: Operand::copy(Place::local(res), erring_ty),
            tag: Symbol::intern("Err"),
        },
    );

    let fail_bb = fcx.b.new_block();
    let ok_bb = fcx.b.new_block();
    fcx.b.terminate(Terminator::If {
        cond: Operand::copy(Place::local(is_err), bool_ty),
        then_bb: fail_bb,
        else_bb: ok_bb,
    });
    emit_exit_failure(fcx, fail_bb);

    fcx.b.switch_to(ok_bb);
    let value = fcx.temp(target_ty);
    fcx.b.assign(
        Place::local(value),
        Rvalue::TagPayload {
            value: Operand::copy(Place::local(res), erring_ty),
            tag: Symbol::intern("Ok"),
            index: 0,
        },
    );
    Ok(fcx.read_local(value))
}

fn prepare_argv_args(
    fcx: &mut FuncCx<'_, '_, '_>,
    entry_fn: &HirFunc,
) -> Result<Vec<Operand>, LowerError> {
    let b = *fcx.cx.sem.types.builtins();
    let argv_ty = {
        let string = b.string;
        fcx.cx.sem.types.intern(TypeKind::Slice(string))
    };
    let argv_ref_ty = fcx.cx.sem.types.mk_ref(argv_ty);
    let string_ref_ty = fcx.cx.sem.types.mk_ref(b.string);

    let rt_argv = fcx.cx.sem.well_known.rt_argv;
    let argv_name = fcx.cx.sem.symbols.name(rt_argv);
    let argv = fcx.temp(argv_ty);
    fcx.b.push(Instr::Call {
        dst: Some(Place::local(argv)),
        callee: Callee::Sym {
            sym: rt_argv,
            name: argv_name,
        },
        args: Vec::new(),
    });

    // Arity check: __len(&argv) must equal the parameter count.
    let len_sym = fcx.cx.sem.well_known.len;
    let len_name = fcx.cx.sem.symbols.name(len_sym);
    let n = fcx.temp(b.uint);
    fcx.b.push(Instr::Call {
        dst: Some(Place::local(n)),
        callee: Callee::Sym {
            sym: len_sym,
            name: len_name,
        },
        args: vec![Operand::addr_of(Place::local(argv), argv_ref_ty)],
    });
    let ok = fcx.temp(b.bool_);
    fcx.b.assign(
        Place::local(ok),
        Rvalue::Binary {
            op: BinOp::Eq,
            lhs: Operand::copy(Place::local(n), b.uint),
            rhs: Operand::konst(Const::int(entry_fn.params.len() as i64), b.uint),
        },
    );
    let fail_bb = fcx.b.new_block();
    let parse_bb = fcx.b.new_block();
    fcx.b.terminate(Terminator::If {
        cond: Operand::copy(Place::local(ok), b.bool_),
        then_bb: parse_bb,
        else_bb: fail_bb,
    });
    emit_exit_failure(fcx, fail_bb);
    fcx.b.switch_to(parse_bb);

    let mut args = Vec::with_capacity(entry_fn.params.len());
    for (i, param) in entry_fn.params.iter().enumerate() {
        let idx = fcx.temp(b.uint);
        fcx.b.assign(
            Place::local(idx),
            Rvalue::Use(Operand::konst(Const::int(i as i64), b.uint)),
        );
        let slot = Place::local(argv).index(idx);
        let slot_ref = Operand::addr_of(slot, string_ref_ty);
        let parsed = parse_slot(fcx, slot_ref, param.ty)?;
        let parsed = fcx.consume(parsed);
        args.push(parsed);
    }
    Ok(args)
}

fn prepare_stdin_args(
    fcx: &mut FuncCx<'_, '_, '_>,
    entry_fn: &HirFunc,
) -> Result<Vec<Operand>, LowerError> {
    let b = *fcx.cx.sem.types.builtins();
    let string_ref_ty = fcx.cx.sem.types.mk_ref(b.string);

    let read_all = fcx.cx.sem.well_known.rt_stdin_read_all;
    let read_name = fcx.cx.sem.symbols.name(read_all);
    let input = fcx.temp(b.string);
    fcx.b.push(Instr::Call {
        dst: Some(Place::local(input)),
        callee: Callee::Sym {
            sym: read_all,
            name: read_name,
        },
        args: Vec::new(),
    });

    let mut args = Vec::with_capacity(entry_fn.params.len());
    if let Some(param) = entry_fn.params.first() {
        let slot_ref = Operand::addr_of(Place::local(input), string_ref_ty);
        let parsed = parse_slot(fcx, slot_ref, param.ty)?;
        let parsed = fcx.consume(parsed);
        args.push(parsed);
    }
    Ok(args)
}

/// Convert the entrypoint's return value to an `int` exit code.
fn convert_exit_code(
    fcx: &mut FuncCx<'_, '_, '_>,
    entry_fn: &HirFunc,
    ret: Operand,
) -> Result<Operand, LowerError> {
    let b = *fcx.cx.sem.types.builtins();
    if entry_fn.result.is_none() || fcx.cx.sem.types.is_nothing(entry_fn.result) {
        return Ok(Operand::konst(Const::int(0), b.int));
    }
    if entry_fn.result == b.int {
        return Ok(ret);
    }
    // A user-provided `__to` conversion, when one matches the result type.
    let to_fn = fcx
        .cx
        .func_sigs
        .values()
        .find(|f| {
            f.name.as_str() == "__to"
                && f.params.len() == 1
                && f.params[0].ty == entry_fn.result
                && f.result == b.int
        })
        .copied();
    match to_fn {
        Some(to_fn) => {
            let ret = fcx.consume(ret);
            fcx.emit_call(
                Callee::Sym {
                    sym: to_fn.sym,
                    name: to_fn.name,
                },
                vec![ret],
                b.int,
            )
        }
        None => Ok(Operand::konst(Const::int(0), b.int)),
    }
}
