//! CFG-transforming passes.
//!
//! Order on a just-lowered module: per function `simplify_cfg`,
//! `recognize_switch_tag`, `simplify_cfg` again; then
//! `lower_async_state_machine` over the whole module (which runs the
//! normalizer and liveness per async function).

pub mod normalize;
pub mod simplify;
pub mod state_machine;
pub mod switch;
