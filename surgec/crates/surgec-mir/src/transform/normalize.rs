//! Async normalizer.
//!
//! Rewrites every suspend site into its own basic block ending in a single
//! poll-style instruction with a filled `ready` edge:
//!
//! - the prelude (instructions before the suspend) stays in the original
//!   block, whose terminator becomes `Goto(poll_bb)`;
//! - `poll_bb` holds the suspend (an `Await` becomes a `Poll`) with
//!   `ready = after_bb`, `pend = BlockId::NONE` (back-patched by the
//!   state-machine builder), terminated by `Unreachable`;
//! - `after_bb` holds the original tail and terminator.
//!
//! After normalization no `Await` remains and every suspend is the last
//! instruction of its block. Suspends reachable from themselves (awaits in
//! loops) are rejected: supporting them would need variable-sized state
//! variants or per-iteration reallocation.

use crate::analysis::cfg::has_cycle_from;
use crate::error::AsyncLowerError;
use crate::ir::*;

/// A normalized suspend: `instr` is the last instruction of `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendSite {
    pub block: BlockId,
    pub instr: usize,
}

/// Does this instruction still need its own block?
fn needs_split(instr: &Instr) -> bool {
    match instr {
        Instr::Await { .. } => true,
        _ => match instr.suspend_edges() {
            Some((ready, _)) => ready.is_none(),
            None => false,
        },
    }
}

/// Put the suspend into poll form with the given ready edge.
fn into_poll_form(instr: Instr, ready: BlockId) -> Instr {
    match instr {
        Instr::Await { dst, task } => Instr::Poll {
            dst,
            task,
            ready,
            pend: BlockId::NONE,
        },
        Instr::Poll { dst, task, pend, .. } => Instr::Poll { dst, task, ready, pend },
        Instr::JoinAll { dst, scope, pend, .. } => Instr::JoinAll { dst, scope, ready, pend },
        Instr::ChanSend { chan, value, pend, .. } => Instr::ChanSend { chan, value, ready, pend },
        Instr::ChanRecv { dst, chan, pend, .. } => Instr::ChanRecv { dst, chan, ready, pend },
        Instr::Timeout { dst, task, millis, pend, .. } => Instr::Timeout {
            dst,
            task,
            millis,
            ready,
            pend,
        },
        Instr::Select { dst, arms, race, pend, .. } => Instr::Select {
            dst,
            arms,
            race,
            ready,
            pend,
        },
        other => other,
    }
}

/// Split every block at its suspend sites. Repeatedly scans for the first
/// unnormalized suspend and splits until none remain.
pub fn split_async_suspends(func: &mut Func) {
    loop {
        let mut found: Option<(BlockId, usize)> = None;
        'scan: for (bb, block) in func.blocks.iter_enumerated() {
            for (idx, instr) in block.instrs.iter().enumerate() {
                if needs_split(instr) {
                    found = Some((bb, idx));
                    break 'scan;
                }
            }
        }
        let Some((bb, idx)) = found else {
            return;
        };

        let poll_bb = func.new_block();
        let after_bb = func.new_block();

        let block = &mut func.blocks[bb];
        let tail: Vec<Instr> = block.instrs.split_off(idx + 1);
        let suspend = block.instrs.pop().expect("suspend at split index");
        let old_term = std::mem::replace(&mut block.term, Terminator::Goto { target: poll_bb });

        let poll = &mut func.blocks[poll_bb];
        poll.instrs.push(into_poll_form(suspend, after_bb));
        poll.term = Terminator::Unreachable;

        let after = &mut func.blocks[after_bb];
        after.instrs = tail;
        after.term = old_term;
    }
}

/// Enumerate suspend sites in block order.
///
/// Fails if an `Await` survived normalization or a suspend is not the last
/// instruction of its block.
pub fn collect_suspend_sites(func: &Func) -> Result<Vec<SuspendSite>, AsyncLowerError> {
    let mut sites = Vec::new();
    for (bb, block) in func.blocks.iter_enumerated() {
        for (idx, instr) in block.instrs.iter().enumerate() {
            if matches!(instr, Instr::Await { .. }) {
                return Err(AsyncLowerError::UnnormalizedAwait {
                    func: func.name,
                    block: bb,
                });
            }
            if instr.is_suspend() {
                if idx + 1 != block.instrs.len() {
                    return Err(AsyncLowerError::NotASuspend {
                        func: func.name,
                        block: bb,
                        index: idx,
                    });
                }
                sites.push(SuspendSite { block: bb, instr: idx });
            }
        }
    }
    Ok(sites)
}

/// Reject any suspend whose block can reach itself.
pub fn reject_await_in_loops(func: &Func, sites: &[SuspendSite]) -> Result<(), AsyncLowerError> {
    for site in sites {
        if has_cycle_from(func, site.block) {
            return Err(AsyncLowerError::AwaitInLoop { func: func.name });
        }
    }
    Ok(())
}
