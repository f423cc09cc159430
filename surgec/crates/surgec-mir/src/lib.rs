//! surgec-mir - MIR (Mid-level Intermediate Representation) for the Surge
//! compiler.
//!
//! The MIR is a typed control-flow graph of basic blocks holding
//! three-address instructions, with ownership-aware places and explicit
//! lifetime instructions. It sits between the monomorphized HIR and code
//! generation. The pass pipeline on a just-lowered module is:
//!
//! 1. per function: `simplify_cfg`, `recognize_switch_tag`, `simplify_cfg`
//! 2. `lower_async_state_machine`
//! 3. `validate`
//!
//! All passes are plain single-threaded transformations over one [`Module`];
//! modules are independent and a caller may fan out across them.

pub mod analysis;
pub mod builder;
pub mod error;
pub mod ir;
pub mod lower;
pub mod meta;
pub mod pretty;
pub mod transform;
pub mod validate;

pub use builder::FuncBuilder;
pub use error::{AsyncLowerError, LowerError, MirError, ValidateError};
pub use ir::*;
pub use lower::lower_module;
pub use meta::build_metadata;
pub use pretty::dump_module;
pub use transform::normalize::{collect_suspend_sites, reject_await_in_loops, split_async_suspends};
pub use transform::simplify::simplify_cfg;
pub use transform::state_machine::lower_async_state_machine;
pub use transform::switch::recognize_switch_tag;
pub use validate::validate;

#[cfg(test)]
mod edge_cases;
#[cfg(test)]
mod tests;
