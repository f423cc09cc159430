//! Control-flow and dataflow analyses over MIR functions.

pub mod cfg;
pub mod liveness;

pub use cfg::{has_cycle_from, reachable_blocks, succ_blocks};
pub use liveness::{analyze_liveness, Liveness};
