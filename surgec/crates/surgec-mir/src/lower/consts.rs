//! Const-declaration evaluation.
//!
//! Const decls are evaluated to [`Const`] values on first reference and
//! cached. Evaluation is cycle-guarded: a const whose initializer refers
//! back to a const currently being evaluated fails with `ConstCycle`.

use crate::error::LowerError;
use crate::ir::Const;
use crate::lower::hir_to_mir::{lower_lit, LowerCx};
use surgec_sem::hir::{BinOp, HirExpr, UnOp};
use surgec_sem::SymbolId;

pub(crate) fn eval_const(cx: &mut LowerCx<'_, '_>, sym: SymbolId) -> Result<Const, LowerError> {
    if let Some(cached) = cx.const_cache.get(&sym) {
        return Ok(cached.clone());
    }
    let decl = cx
        .const_by_sym
        .get(&sym)
        .copied()
        .ok_or(LowerError::UnknownValue {
            name: cx.sem.symbols.name(sym),
        })?;

    if cx.const_stack.contains(&sym) {
        return Err(LowerError::ConstCycle { name: decl.name });
    }
    cx.const_stack.push(sym);
    let result = eval_expr(cx, &decl.value);
    cx.const_stack.pop();

    let value = result?;
    cx.const_cache.insert(sym, value.clone());
    Ok(value)
}

fn eval_expr(cx: &mut LowerCx<'_, '_>, e: &HirExpr) -> Result<Const, LowerError> {
    match e {
        HirExpr::Literal { lit, .. } => Ok(lower_lit(lit)),

        HirExpr::Var { sym, name, .. } => {
            if cx.const_by_sym.contains_key(sym) {
                eval_const(cx, *sym)
            } else if cx.func_sigs.contains_key(sym) {
                Ok(Const::FnAddr {
                    sym: *sym,
                    name: *name,
                })
            } else {
                Err(LowerError::UnknownValue { name: *name })
            }
        }

        HirExpr::Unary { op, expr, .. } => {
            let v = eval_expr(cx, expr)?;
            match (op, v) {
                (UnOp::Neg, Const::Int { value, .. }) => Ok(Const::int(value.wrapping_neg())),
                (UnOp::Neg, Const::Float { value, .. }) => Ok(Const::Float {
                    value: -value,
                    text: None,
                }),
                (UnOp::Not, Const::Bool(b)) => Ok(Const::Bool(!b)),
                (UnOp::Not, Const::Int { value, .. }) => Ok(Const::int(!value)),
                _ => Err(LowerError::UnknownValue {
                    name: surgec_util::Symbol::intern("<const unary>"),
                }),
            }
        }

        HirExpr::Binary { op, lhs, rhs, .. } => {
            let l = eval_expr(cx, lhs)?;
            let r = eval_expr(cx, rhs)?;
            eval_binary(*op, l, r)
        }

        _ => Err(LowerError::UnknownValue {
            name: surgec_util::Symbol::intern("<const expr>"),
        }),
    }
}

fn eval_binary(op: BinOp, l: Const, r: Const) -> Result<Const, LowerError> {
    let fail = || LowerError::UnknownValue {
        name: surgec_util::Symbol::intern("<const binary>"),
    };
    match (l, r) {
        (Const::Int { value: a, .. }, Const::Int { value: b, .. }) => {
            let v = match op {
                BinOp::Add => Const::int(a.wrapping_add(b)),
                BinOp::Sub => Const::int(a.wrapping_sub(b)),
                BinOp::Mul => Const::int(a.wrapping_mul(b)),
                BinOp::Div if b != 0 => Const::int(a.wrapping_div(b)),
                BinOp::Rem if b != 0 => Const::int(a.wrapping_rem(b)),
                BinOp::BitAnd => Const::int(a & b),
                BinOp::BitOr => Const::int(a | b),
                BinOp::BitXor => Const::int(a ^ b),
                BinOp::Shl => Const::int(a.wrapping_shl(b as u32)),
                BinOp::Shr => Const::int(a.wrapping_shr(b as u32)),
                BinOp::Eq => Const::Bool(a == b),
                BinOp::Ne => Const::Bool(a != b),
                BinOp::Lt => Const::Bool(a < b),
                BinOp::Le => Const::Bool(a <= b),
                BinOp::Gt => Const::Bool(a > b),
                BinOp::Ge => Const::Bool(a >= b),
                _ => return Err(fail()),
            };
            Ok(v)
        }
        (Const::Bool(a), Const::Bool(b)) => {
            let v = match op {
                BinOp::And => Const::Bool(a && b),
                BinOp::Or => Const::Bool(a || b),
                BinOp::Eq => Const::Bool(a == b),
                BinOp::Ne => Const::Bool(a != b),
                _ => return Err(fail()),
            };
            Ok(v)
        }
        _ => Err(fail()),
    }
}
