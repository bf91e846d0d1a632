//! The three stages turning a block number into a verified prover input.
//!
//! [`preflight`] traces a block on the remote node, replays the trace against
//! the node's state to discover what it reads, and fetches proofs for all of
//! it. [`prepare`] turns the proofs into a witness and checks the block
//! executes from it alone. [`execute`] repeats that check from a prover
//! input, however it was obtained. Only [`preflight`] talks to the node: the
//! traced state diffs travel with the artifacts.

use ethereum_types::H256;

mod execute;
mod preflight;
mod prepare;

pub use execute::execute;
pub use preflight::preflight;
pub use prepare::prepare;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("parent {parent_hash:x} of block {number} is not available")]
    MissingParentHeader { number: u64, parent_hash: H256 },
    #[error("block {number} has state root {expected:x}, execution gave {computed:x}")]
    StateRootMismatch {
        number: u64,
        expected: H256,
        computed: H256,
    },
    #[error("{blocks} blocks come with {diffs} state diffs")]
    StateDiffCount { blocks: usize, diffs: usize },
}
