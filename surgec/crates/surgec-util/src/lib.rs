//! surgec-util - Core Utilities and Foundation Types
//!
//! Foundation types shared by every phase of the Surge middle-end:
//!
//! - [`index_vec`]: typed indices and [`IndexVec`], the arena-plus-index
//!   ownership pattern every IR container is built on. Cross-references are
//!   plain ids, never pointers.
//! - [`symbol`]: a global string interner. [`Symbol`] is a 4-byte handle
//!   with O(1) comparison; identifiers, tag names, and static-string
//!   contents all go through it.
//! - [`span`]: source locations carried through the IR for diagnostics.
//! - [`error`]: error types for the utilities themselves.
//!
//! All abstractions here are zero-cost: a `Symbol` is a `u32`, an
//! `IndexVec<I, T>` is a `Vec<T>`, and a typed id compiles to its raw
//! integer.

pub mod error;
pub mod index_vec;
pub mod span;
pub mod symbol;

pub use error::{InternError, SpanError};
pub use index_vec::{Idx, IndexVec};
pub use span::{FileId, Span};
pub use symbol::Symbol;

// Re-export the hash types the whole workspace uses for non-deterministic
// interior maps. Anything whose iteration order reaches emitted code uses
// IndexMap instead.
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
