//! The artifacts produced by the preflight and prepare stages.

use serde::{Deserialize, Serialize};
use zk_pig_common::Bytes;

use crate::{
    chain::ChainConfig,
    replay::BlockStateDiff,
    types::{AccountProof, Block, Header},
};

/// Bumped whenever the layout of [`ProverInput`] changes.
pub const PROVER_INPUT_VERSION: &str = "v0.2.0";

/// What the discovery run learned about a block: what it read, and the
/// proofs for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightData {
    pub block: Block,
    /// Headers read during execution, the parent's included.
    pub ancestors: Vec<Header>,
    pub chain_config: ChainConfig,
    /// Bytecodes read during execution, sorted and without duplicates.
    pub codes: Vec<Bytes>,
    /// Proofs at the parent block for every account and slot read.
    pub pre_state_proofs: Vec<AccountProof>,
    /// Proofs at the block itself, only for accounts and slots deleted by
    /// the block.
    pub post_state_proofs: Vec<AccountProof>,
    /// What the block reads and writes, as traced by the node.
    pub state_diff: BlockStateDiff,
}

impl PreflightData {
    /// The parent header is always among the ancestors.
    pub fn parent(&self) -> Option<&Header> {
        self.ancestors
            .iter()
            .find(|h| h.hash() == self.block.header.parent_hash)
    }
}

/// Everything needed to execute the blocks without any other state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    pub ancestors: Vec<Header>,
    pub codes: Vec<Bytes>,
    /// Trie nodes, account and storage tries mixed, sorted and without
    /// duplicates.
    pub state: Vec<Bytes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProverInput {
    pub version: String,
    pub blocks: Vec<Block>,
    /// One per block, in the same order.
    pub state_diffs: Vec<BlockStateDiff>,
    pub chain_config: ChainConfig,
    pub witness: Witness,
}
