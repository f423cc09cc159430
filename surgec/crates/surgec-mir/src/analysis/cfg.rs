//! Control-flow queries over MIR functions.
//!
//! Successors come from two sources: a suspend instruction at the end of a
//! block contributes its `ready`/`pend` edges, otherwise the terminator
//! contributes its targets. All traversals here honor both.

use crate::ir::{BlockId, Func};
use surgec_util::FxHashSet;

/// Successor blocks of `bb`.
///
/// If the block's last instruction is a suspend form, its `ready` edge (and,
/// when `include_pend` is set and the edge is filled, its `pend` edge) are
/// the successors; the terminator is not consulted. Otherwise successors
/// come from the terminator.
pub fn succ_blocks(func: &Func, bb: BlockId, include_pend: bool) -> Vec<BlockId> {
    let block = &func.blocks[bb];
    if let Some(instr) = block.instrs.last() {
        if let Some((ready, pend)) = instr.suspend_edges() {
            // A suspend with no ready edge has not been normalized yet; the
            // terminator still carries the real successors.
            if ready.is_some() {
                let mut out = Vec::with_capacity(2);
                out.push(ready);
                if include_pend && pend.is_some() {
                    out.push(pend);
                }
                return out;
            }
        }
    }
    block.term.targets()
}

/// Blocks reachable from the entry, honoring suspend successors.
pub fn reachable_blocks(func: &Func) -> FxHashSet<BlockId> {
    let mut seen = FxHashSet::default();
    if func.entry.is_none() || func.blocks.get(func.entry).is_none() {
        return seen;
    }
    let mut stack = vec![func.entry];
    seen.insert(func.entry);
    while let Some(bb) = stack.pop() {
        for succ in succ_blocks(func, bb, true) {
            if func.blocks.get(succ).is_some() && seen.insert(succ) {
                stack.push(succ);
            }
        }
    }
    seen
}

/// Does any path starting at `start` lead back to `start`?
///
/// `start` itself is treated as a sentinel: the search begins at its
/// successors and reports a cycle only when it re-encounters `start`.
pub fn has_cycle_from(func: &Func, start: BlockId) -> bool {
    let mut seen = FxHashSet::default();
    let mut stack: Vec<BlockId> = succ_blocks(func, start, true);
    while let Some(bb) = stack.pop() {
        if bb == start {
            return true;
        }
        if func.blocks.get(bb).is_none() || !seen.insert(bb) {
            continue;
        }
        stack.extend(succ_blocks(func, bb, true));
    }
    false
}
