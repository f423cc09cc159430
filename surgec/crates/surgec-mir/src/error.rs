//! Error types for the MIR passes.
//!
//! Errors are kinded values, never thrown. Each pass returns a `Result`
//! whose error enumerates exactly the failures that pass can produce; the
//! validator joins all of its diagnostics instead of stopping at the first.
//! Typed-index overflow is the one fatal case and panics (it cannot be
//! recovered at compile time).

use crate::ir::{BlockId, LocalId};
use surgec_util::Symbol;
use thiserror::Error;

/// Failures during HIR→MIR lowering.
#[derive(Debug, Clone, Error)]
pub enum LowerError {
    #[error("call to `{func}` omits argument `{param}` which has no default")]
    MissingDefault { func: Symbol, param: Symbol },

    #[error("cyclic const initialization involving `{name}`")]
    ConstCycle { name: Symbol },

    #[error("unknown value reference `{name}`")]
    UnknownValue { name: Symbol },

    #[error("`{method}` is not a known method on this receiver")]
    UnknownMethod { method: Symbol },

    #[error("suspending operation `{what}` outside an async function `{func}`")]
    SuspendOutsideAsync { what: &'static str, func: Symbol },

    #[error("`{func}` declares more than one entrypoint")]
    DuplicateEntrypoint { func: Symbol },

    #[error("entrypoint symbol does not name a function")]
    EntrypointNotFound,

    #[error("`{name}` is not indexable")]
    NotIndexable { name: Symbol },

    #[error("union `{ty}` has no tag `{tag}`")]
    UnknownTag { ty: String, tag: Symbol },
}

/// Failures inside the async normalizer and state-machine builder.
#[derive(Debug, Clone, Error)]
pub enum AsyncLowerError {
    #[error("await inside loop is not supported in `{func}`: each resume point must save a single await's state")]
    AwaitInLoop { func: Symbol },

    #[error("unnormalized await remains in `{func}` at {block:?}")]
    UnnormalizedAwait { func: Symbol, block: BlockId },

    #[error("state index {index} out of range in `{func}` ({len} variants)")]
    StateIndexOutOfRange { func: Symbol, index: usize, len: usize },

    #[error("block {block:?} out of range in `{func}`")]
    BlockOutOfRange { func: Symbol, block: BlockId },

    #[error("instruction {index} of {block:?} in `{func}` is not a suspend")]
    NotASuspend { func: Symbol, block: BlockId, index: usize },

    #[error("cannot determine task payload type for `{func}`")]
    TaskPayload { func: Symbol },
}

/// One validator diagnostic. The validator reports all of them.
#[derive(Debug, Clone, Error)]
pub enum ValidateError {
    #[error("`{func}`: entry does not reference a block")]
    NoEntry { func: Symbol },

    #[error("`{func}`: block {block:?} is unterminated")]
    Unterminated { func: Symbol, block: BlockId },

    #[error("`{func}`: block {block:?} targets missing block {target:?}")]
    MissingTarget { func: Symbol, block: BlockId, target: BlockId },

    #[error("`{func}`: switch_tag in {block:?} repeats case `{tag}`")]
    DuplicateSwitchCase { func: Symbol, block: BlockId, tag: Symbol },

    #[error("`{func}`: unknown local {local:?} referenced in {block:?}")]
    UnknownLocal { func: Symbol, block: BlockId, local: LocalId },

    #[error("`{func}`: local {local:?} has no known type")]
    UntypedLocal { func: Symbol, local: LocalId },

    #[error("`{func}`: type of local {local:?} contains an unresolved generic parameter")]
    GenericLocal { func: Symbol, local: LocalId },

    #[error("`{func}`: result type contains an unresolved generic parameter")]
    GenericResult { func: Symbol },

    #[error("`{func}`: return in {block:?} carries no value but the result type is not nothing")]
    MissingReturnValue { func: Symbol, block: BlockId },

    #[error("`{func}`: return in {block:?} carries a value but the result type is nothing")]
    UnexpectedReturnValue { func: Symbol, block: BlockId },

    #[error("`{func}`: drop of copy or reference local {local:?} in {block:?}")]
    DropOfCopy { func: Symbol, block: BlockId, local: LocalId },

    #[error("`{func}`: end_borrow of non-reference local {local:?} in {block:?}")]
    EndBorrowOfValue { func: Symbol, block: BlockId, local: LocalId },
}

/// Umbrella error for the whole pipeline.
#[derive(Debug, Error)]
pub enum MirError {
    #[error(transparent)]
    Lower(#[from] LowerError),

    #[error(transparent)]
    Async(#[from] AsyncLowerError),

    #[error("validation failed with {} diagnostic(s)", .0.len())]
    Validate(Vec<ValidateError>),
}
