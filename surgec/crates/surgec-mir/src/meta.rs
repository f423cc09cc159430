//! Module metadata builder.
//!
//! Walks every type reachable from the module (locals, results, globals,
//! and the struct/tuple/union/array closure over them) and, for each union
//! reached, records its `TagCaseMeta` sequence; nested union members are
//! inlined so heir-style unions present one flat case table. Payload type
//! ids are canonicalized through alias/ref/own/pointer peeling.
//!
//! When the same tag name is reachable through several symbols, one symbol
//! is preferred (`core` module path wins, else any non-empty path, else the
//! higher symbol id) and the others are recorded in `tag_aliases`.

use crate::ir::{Module, TagCaseMeta};
use surgec_sem::{SemResult, SymbolId, TypeId, TypeKind};
use surgec_util::{FxHashSet, Symbol};

pub fn build_metadata(module: &mut Module, sem: &SemResult) {
    // Seed with every type the IR names, in deterministic order.
    let mut worklist: Vec<TypeId> = Vec::new();
    for func in module.funcs.iter() {
        if func.result.is_some() {
            worklist.push(func.result);
        }
        for local in func.locals.iter() {
            worklist.push(local.ty);
        }
    }
    for global in module.globals.iter() {
        worklist.push(global.ty);
    }

    // Closure over component types; record unions in discovery order.
    let mut seen: FxHashSet<TypeId> = FxHashSet::default();
    let mut unions: Vec<TypeId> = Vec::new();
    while let Some(ty) = worklist.pop() {
        if ty.is_none() || !seen.insert(ty) {
            continue;
        }
        let Some(kind) = sem.types.get(ty) else {
            continue;
        };
        match kind {
            TypeKind::Ptr(t)
            | TypeKind::Ref(t)
            | TypeKind::RefMut(t)
            | TypeKind::Own(t)
            | TypeKind::Array(t, _)
            | TypeKind::Slice(t) => worklist.push(*t),
            TypeKind::Alias { target, .. } => worklist.push(*target),
            TypeKind::Tuple(elems) => worklist.extend(elems.iter().copied()),
            TypeKind::Fn { params, result } => {
                worklist.extend(params.iter().copied());
                worklist.push(*result);
            }
            TypeKind::Struct(def) => {
                worklist.extend(def.type_args.iter().copied());
                worklist.extend(def.fields.iter().map(|(_, t)| *t));
            }
            TypeKind::Union(def) => {
                unions.push(ty);
                worklist.extend(def.type_args.iter().copied());
                for case in &def.cases {
                    worklist.extend(case.payload.iter().copied());
                }
            }
            _ => {}
        }
    }

    for union_ty in unions {
        if module.meta.tag_layouts.contains_key(&union_ty) {
            continue;
        }
        let cases = collect_cases(sem, union_ty);
        for case in &cases {
            module.meta.tag_names.insert(case.tag_sym, case.tag_name);
        }
        module.meta.tag_layouts.insert(union_ty, cases);
    }

    record_tag_aliases(module, sem);
}

/// The flat case table of one union: its own cases, then the cases of any
/// directly nested union payloads, deduplicated by tag symbol.
fn collect_cases(sem: &SemResult, union_ty: TypeId) -> Vec<TagCaseMeta> {
    let mut out = Vec::new();
    let mut visited: FxHashSet<TypeId> = FxHashSet::default();
    let mut seen_syms: FxHashSet<SymbolId> = FxHashSet::default();
    inline_cases(sem, union_ty, &mut out, &mut visited, &mut seen_syms);
    out
}

fn inline_cases(
    sem: &SemResult,
    union_ty: TypeId,
    out: &mut Vec<TagCaseMeta>,
    visited: &mut FxHashSet<TypeId>,
    seen_syms: &mut FxHashSet<SymbolId>,
) {
    if !visited.insert(union_ty) {
        return;
    }
    let Some(def) = sem.types.as_union(union_ty) else {
        return;
    };
    for case in &def.cases {
        if seen_syms.insert(case.sym) {
            out.push(TagCaseMeta {
                tag_name: case.name,
                tag_sym: case.sym,
                payload: case.payload.iter().map(|&t| sem.types.canonical(t)).collect(),
            });
        }
        for &payload_ty in &case.payload {
            let canon = sem.types.canonical(payload_ty);
            if sem.types.as_union(canon).is_some() {
                inline_cases(sem, canon, out, visited, seen_syms);
            }
        }
    }
}

/// Preference rank of a tag symbol's defining module: built-in `core`
/// wins, then any named module, then synthesized (empty path).
fn rank(sem: &SemResult, s: SymbolId) -> u8 {
    match sem.symbols.module_path(s).as_str() {
        "core" => 2,
        "" => 0,
        _ => 1,
    }
}

fn prefer(sem: &SemResult, a: SymbolId, b: SymbolId) -> SymbolId {
    let (ra, rb) = (rank(sem, a), rank(sem, b));
    if ra != rb {
        if ra > rb {
            a
        } else {
            b
        }
    } else if a >= b {
        // Same rank: the higher symbol id is the stable winner.
        a
    } else {
        b
    }
}

/// Group recorded tags by name; where a synthesized or module-local
/// instance shadows a better-ranked original, point it at the winner.
/// Same-rank name collisions (two unrelated synthesized `S0`s) are not
/// aliases of one another and stay unrecorded.
fn record_tag_aliases(module: &mut Module, sem: &SemResult) {
    let mut by_name: Vec<(Symbol, Vec<SymbolId>)> = Vec::new();
    for (&sym, &name) in module.meta.tag_names.iter() {
        match by_name.iter_mut().find(|(n, _)| *n == name) {
            Some((_, syms)) => syms.push(sym),
            None => by_name.push((name, vec![sym])),
        }
    }
    for (_, syms) in by_name {
        if syms.len() < 2 {
            continue;
        }
        let mut winner = syms[0];
        for &s in &syms[1..] {
            winner = prefer(sem, winner, s);
        }
        for s in syms {
            if s != winner && rank(sem, s) < rank(sem, winner) {
                module.meta.tag_aliases.insert(s, winner);
            }
        }
    }
}
