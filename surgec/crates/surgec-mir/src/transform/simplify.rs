//! CFG simplifier.
//!
//! Four phases, in order:
//!
//! 1. Build a redirect map from trivial-goto blocks (zero instructions,
//!    `Goto` terminator) to their targets, following chains with cycle
//!    detection. A trivial cycle fixes at itself.
//! 2. Apply the redirects to every `Goto`/`If`/`SwitchTag` target, to the
//!    ready/pend edge of every suspend instruction, and to the entry.
//! 3. Drop blocks unreachable from the entry (honoring suspend successors).
//! 4. Compact surviving blocks into dense ids and remap all references.
//!
//! Idempotent: a second run changes nothing.

use crate::analysis::cfg::reachable_blocks;
use crate::ir::*;
use surgec_util::{FxHashMap, FxHashSet, Idx, IndexVec};

pub fn simplify_cfg(func: &mut Func) {
    if func.blocks.is_empty() || func.entry.is_none() {
        return;
    }

    // Phase 1: trivial-goto redirect map.
    let mut trivial: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    for (id, block) in func.blocks.iter_enumerated() {
        if block.instrs.is_empty() {
            if let Terminator::Goto { target } = block.term {
                trivial.insert(id, target);
            }
        }
    }

    let resolve = |start: BlockId| -> BlockId {
        let mut seen = FxHashSet::default();
        seen.insert(start);
        let mut cur = start;
        while let Some(&next) = trivial.get(&cur) {
            if !seen.insert(next) {
                // Trivial cycle: the block keeps pointing at itself.
                return start;
            }
            cur = next;
        }
        cur
    };

    let redirect: FxHashMap<BlockId, BlockId> =
        trivial.keys().map(|&b| (b, resolve(b))).collect();

    // Phase 2: apply redirects everywhere a block is referenced.
    let apply = |b: BlockId| -> BlockId { redirect.get(&b).copied().unwrap_or(b) };
    retarget(func, &apply);

    // Phase 3: reachability sweep.
    let reachable = reachable_blocks(func);

    // Phase 4: compact survivors into dense ids.
    let mut remap: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    let mut next = 0usize;
    for id in func.blocks.indices() {
        if reachable.contains(&id) {
            remap.insert(id, BlockId::from_usize(next));
            next += 1;
        }
    }

    let old_blocks = func.blocks.take();
    let mut new_blocks: IndexVec<BlockId, Block> = IndexVec::with_capacity(next);
    for (id, mut block) in old_blocks.into_iter_enumerated() {
        if let Some(&new_id) = remap.get(&id) {
            block.id = new_id;
            new_blocks.push(block);
        }
    }
    func.blocks = new_blocks;

    let compact = |b: BlockId| -> BlockId { remap.get(&b).copied().unwrap_or(BlockId::NONE) };
    retarget(func, &compact);
}

/// Rewrite every block reference in `func` through `map`. `BlockId::NONE`
/// (unfilled pend edges) passes through untouched.
fn retarget(func: &mut Func, map: &dyn Fn(BlockId) -> BlockId) {
    let map_edge = |b: BlockId| if b.is_none() { b } else { map(b) };

    func.entry = map_edge(func.entry);
    for block in func.blocks.iter_mut() {
        for instr in &mut block.instrs {
            if let Some((ready, pend)) = instr.suspend_edges_mut() {
                *ready = map_edge(*ready);
                *pend = map_edge(*pend);
            }
        }
        match &mut block.term {
            Terminator::Goto { target } => *target = map_edge(*target),
            Terminator::If { then_bb, else_bb, .. } => {
                *then_bb = map_edge(*then_bb);
                *else_bb = map_edge(*else_bb);
            }
            Terminator::SwitchTag { cases, default, .. } => {
                for case in cases.iter_mut() {
                    case.target = map_edge(case.target);
                }
                *default = map_edge(*default);
            }
            _ => {}
        }
    }
}
