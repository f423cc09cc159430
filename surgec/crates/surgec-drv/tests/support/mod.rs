//! Shared HIR builders for the integration tests.
#![allow(dead_code)]

use surgec_sem::hir::*;
use surgec_sem::{SemResult, SymbolId, TypeId};
use surgec_util::{Span, Symbol};

pub fn lit_int(value: i64, ty: TypeId) -> HirExpr {
    HirExpr::Literal {
        lit: HirLit::Int { value, text: None },
        ty,
        span: Span::DUMMY,
    }
}

pub fn var(sym: SymbolId, name: &str, ty: TypeId) -> HirExpr {
    HirExpr::Var {
        sym,
        name: Symbol::intern(name),
        ty,
        span: Span::DUMMY,
    }
}

pub fn ret(value: Option<HirExpr>) -> HirStmt {
    HirStmt::Return {
        value,
        span: Span::DUMMY,
    }
}

pub fn call_fn(sym: SymbolId, name: &str, args: Vec<HirExpr>, ty: TypeId) -> HirExpr {
    HirExpr::Call {
        callee: HirCallee::Fn {
            sym,
            name: Symbol::intern(name),
            type_args: Vec::new(),
        },
        args,
        ty,
        span: Span::DUMMY,
    }
}

pub fn mk_func(
    sem: &mut SemResult,
    name: &str,
    params: Vec<(SymbolId, &str, TypeId)>,
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

pub fn module_of(funcs: Vec<HirFunc>) -> HirModule {
    HirModule {
        funcs,
        globals: Vec::new(),
        consts: Vec::new(),
        entry: None,
    }
}
