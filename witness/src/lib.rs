//! Builds stateless witnesses for Ethereum blocks out of standard
//! `eth_getProof` responses, and executes blocks from them.
//!
//! A witness holds the trie nodes, bytecodes and ancestor headers a block
//! touches. With it, the block can be executed and its post-state root
//! recomputed without any other access to the chain state.
//!
//! The flow is:
//!
//! 1. The block is executed once against some remote state, through an
//!    [`AccessTracker`](tracker::AccessTracker), to learn which accounts and
//!    slots it reads.
//! 2. Proofs for all of them are requested at the parent block, and, for keys
//!    the block deletes, at the block itself.
//! 3. [`build_node_set_with_transition`](nodeset::build_node_set_with_transition)
//!    verifies the proofs and collects their nodes. Deletions may need nodes
//!    that no proof of the parent state contains; see [`nodeset`].
//! 4. The nodes are loaded into a [`MemoryDb`](db::MemoryDb), which backs a
//!    [`TrieState`](state::TrieState) the block is executed against again, now
//!    with nothing else available.
//!
//! Block execution itself is behind [`BlockExecutor`](evm::BlockExecutor).
//! [`replay`] has an implementation that replays state changes reported by a
//! node instead of running an EVM.
//!
//! # Non-Goals
//! - Generating proofs: the remote node is trusted to produce them, and they
//!   are verified before use.
//! - Consensus rules beyond what is needed to link a block to its parent.

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_debug_implementations)]

pub mod chain;
pub mod db;
pub mod evm;
pub mod input;
pub mod node;
pub mod nodeset;
pub mod proof;
pub mod replay;
pub mod state;
pub mod tracker;
pub mod trie;
pub mod types;

pub use chain::{ChainConfig, ChainRegistry};
pub use input::{PreflightData, ProverInput, Witness};
pub use types::{Account, AccountProof, Block, Header, StorageProof};
