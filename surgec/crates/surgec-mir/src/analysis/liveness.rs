//! Liveness analysis.
//!
//! Backward dataflow over `LocalId` sets:
//!
//! ```text
//! out[bb] = union of in[succ] for succ in successors(bb)
//! in[bb]  = use[bb] ∪ (out[bb] \ def[bb])
//! ```
//!
//! Per-block `use`/`def` follow the ownership-aware rules:
//! - operands contribute `use` for their root local unless the block already
//!   `def`'d it; index projections use their index locals;
//! - `Move` additionally `def`s its source (the local is dead of its
//!   original value after the move);
//! - a write through a projected place `use`s the root (a partial write
//!   reads the surrounding value), while a write to a bare local `def`s it;
//! - suspend destinations `def` on resume.
//!
//! The worklist runs in reverse block order; sets grow monotonically on a
//! finite lattice, so the fixpoint terminates.

use crate::analysis::cfg::succ_blocks;
use crate::ir::*;
use surgec_util::{FxHashSet, IndexVec};

pub struct Liveness {
    pub live_in: IndexVec<BlockId, FxHashSet<LocalId>>,
    pub live_out: IndexVec<BlockId, FxHashSet<LocalId>>,
}

impl Liveness {
    pub fn live_into(&self, bb: BlockId) -> &FxHashSet<LocalId> {
        &self.live_in[bb]
    }
}

#[derive(Default)]
struct UseDef {
    uses: FxHashSet<LocalId>,
    defs: FxHashSet<LocalId>,
}

impl UseDef {
    fn read(&mut self, local: LocalId) {
        if !self.defs.contains(&local) {
            self.uses.insert(local);
        }
    }

    fn write(&mut self, local: LocalId) {
        self.defs.insert(local);
    }

    fn read_place(&mut self, place: &Place) {
        if let Some(root) = place.root_local() {
            self.read(root);
        }
        for proj in &place.proj {
            if let Projection::Index { index } = proj {
                self.read(*index);
            }
        }
    }

    fn read_operand(&mut self, op: &Operand) {
        match &op.kind {
            OperandKind::Const(_) => {}
            OperandKind::Copy(place) | OperandKind::AddrOf(place) | OperandKind::AddrOfMut(place) => {
                self.read_place(place);
            }
            OperandKind::Move(place) => {
                self.read_place(place);
                // Post-move the local is dead of its original value.
                if let Some(root) = place.as_plain_local() {
                    self.write(root);
                }
            }
        }
    }

    fn read_rvalue(&mut self, rv: &Rvalue) {
        match rv {
            Rvalue::Use(op) => self.read_operand(op),
            Rvalue::Unary { operand, .. } => self.read_operand(operand),
            Rvalue::Binary { lhs, rhs, .. } => {
                self.read_operand(lhs);
                self.read_operand(rhs);
            }
            Rvalue::Cast { operand, .. } => self.read_operand(operand),
            Rvalue::StructLit { fields, .. } => {
                for f in fields {
                    self.read_operand(f);
                }
            }
            Rvalue::ArrayLit { elems, .. } | Rvalue::TupleLit { elems, .. } => {
                for e in elems {
                    self.read_operand(e);
                }
            }
            Rvalue::Field { base, .. } => self.read_operand(base),
            Rvalue::Index { base, index } => {
                self.read_operand(base);
                self.read_operand(index);
            }
            Rvalue::TagTest { value, .. }
            | Rvalue::TagPayload { value, .. }
            | Rvalue::TypeTest { value, .. }
            | Rvalue::HeirTest { value, .. } => self.read_operand(value),
            Rvalue::IterInit { iterable } => self.read_operand(iterable),
            Rvalue::IterNext { iter } => self.read_operand(iter),
        }
    }

    /// A store into `place`: a bare local is a def, a projected write reads
    /// its root first.
    fn write_place(&mut self, place: &Place) {
        if let Some(local) = place.as_plain_local() {
            self.write(local);
        } else {
            self.read_place(place);
        }
    }

    fn instr(&mut self, instr: &Instr) {
        match instr {
            Instr::Assign { dst, src } => {
                self.read_rvalue(src);
                self.write_place(dst);
            }
            Instr::Call { dst, callee, args } => {
                if let Callee::Value(op) = callee {
                    self.read_operand(op);
                }
                for arg in args {
                    self.read_operand(arg);
                }
                if let Some(dst) = dst {
                    self.write_place(dst);
                }
            }
            Instr::Drop { place } | Instr::EndBorrow { place } => {
                self.read_place(place);
            }
            Instr::Await { dst, task } => {
                self.read_operand(task);
                if let Some(d) = dst {
                    self.write(*d);
                }
            }
            Instr::Spawn { dst, value } => {
                self.read_operand(value);
                self.write(*dst);
            }
            Instr::Poll { dst, task, .. } => {
                self.read_operand(task);
                if let Some(d) = dst {
                    self.write(*d);
                }
            }
            Instr::JoinAll { dst, scope, .. } => {
                self.read_operand(scope);
                if let Some(d) = dst {
                    self.write(*d);
                }
            }
            Instr::ChanSend { chan, value, .. } => {
                self.read_operand(chan);
                self.read_operand(value);
            }
            Instr::ChanRecv { dst, chan, .. } => {
                self.read_operand(chan);
                if let Some(d) = dst {
                    self.write(*d);
                }
            }
            Instr::Timeout { dst, task, millis, .. } => {
                self.read_operand(task);
                self.read_operand(millis);
                if let Some(d) = dst {
                    self.write(*d);
                }
            }
            Instr::Select { dst, arms, .. } => {
                for arm in arms {
                    match arm {
                        SelectArm::Task { task } => self.read_operand(task),
                        SelectArm::Recv { chan } => self.read_operand(chan),
                        SelectArm::Send { chan, value } => {
                            self.read_operand(chan);
                            self.read_operand(value);
                        }
                        SelectArm::Timeout { millis } => self.read_operand(millis),
                        SelectArm::Default => {}
                    }
                }
                if let Some(d) = dst {
                    self.write(*d);
                }
            }
            Instr::Nop => {}
        }
    }

    fn terminator(&mut self, term: &Terminator) {
        match term {
            Terminator::Return { value, .. } => {
                if let Some(v) = value {
                    self.read_operand(v);
                }
            }
            Terminator::AsyncYield { state } | Terminator::AsyncReturnCancelled { state } => {
                self.read_operand(state);
            }
            Terminator::AsyncReturn { state, value, .. } => {
                self.read_operand(state);
                if let Some(v) = value {
                    self.read_operand(v);
                }
            }
            Terminator::If { cond, .. } => self.read_operand(cond),
            Terminator::SwitchTag { value, .. } => self.read_operand(value),
            Terminator::None | Terminator::Goto { .. } | Terminator::Unreachable => {}
        }
    }
}

fn block_use_def(block: &Block) -> UseDef {
    let mut ud = UseDef::default();
    for instr in &block.instrs {
        ud.instr(instr);
    }
    ud.terminator(&block.term);
    ud
}

/// Solve liveness to fixpoint for one function.
pub fn analyze_liveness(func: &Func) -> Liveness {
    let n = func.blocks.len();
    let use_defs: IndexVec<BlockId, UseDef> =
        func.blocks.iter().map(block_use_def).collect();

    let mut live_in: IndexVec<BlockId, FxHashSet<LocalId>> =
        (0..n).map(|_| FxHashSet::default()).collect();
    let mut live_out: IndexVec<BlockId, FxHashSet<LocalId>> =
        (0..n).map(|_| FxHashSet::default()).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for bb in func.blocks.indices().rev() {
            let mut out = FxHashSet::default();
            for succ in succ_blocks(func, bb, true) {
                if let Some(succ_in) = live_in.get(succ) {
                    out.extend(succ_in.iter().copied());
                }
            }

            let ud = &use_defs[bb];
            let mut inn = ud.uses.clone();
            for &local in &out {
                if !ud.defs.contains(&local) {
                    inn.insert(local);
                }
            }

            if inn != live_in[bb] {
                live_in[bb] = inn;
                changed = true;
            }
            live_out[bb] = out;
        }
    }

    Liveness { live_in, live_out }
}
