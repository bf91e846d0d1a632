//! The boundary with the EVM.
//!
//! Block execution itself is not implemented here. An executor is handed a
//! [`StateDatabase`] to read the pre-state from and reports the changes it
//! made as a [`PostState`], which the database turns into a state root.

use std::collections::BTreeMap;

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use zk_pig_common::quantity;

use crate::{chain::ChainConfig, state::StateDatabase, types::Block};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("block {number} does not follow its parent {parent}")]
    ParentNumber { number: u64, parent: u64 },
    #[error("block {number} is not newer than its parent")]
    ParentTimestamp { number: u64 },
    #[error("uncle {uncle} of block {number} is out of range")]
    UncleDepth { number: u64, uncle: u64 },
    #[error("balance of {address:?} overflows")]
    BalanceOverflow { address: Address },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Check the block against its parent before executing it. Discovery
    /// runs execute against partial knowledge and turn this off.
    pub validate: bool,
}

/// Account fields other than the storage root, which follows from the
/// storage writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(with = "quantity")]
    pub nonce: u64,
    pub balance: U256,
    pub code_hash: H256,
}

/// Final state of one account touched by a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    /// `None` if the account does not exist at the end of the block.
    pub info: Option<AccountInfo>,
    /// Storage was wiped during the block; `storage` then holds everything
    /// written after the wipe.
    #[serde(default)]
    pub destructed: bool,
    /// Final slot values. A zero value deletes the slot.
    #[serde(default)]
    pub storage: BTreeMap<H256, U256>,
}

/// All the state changes of a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostState {
    pub accounts: BTreeMap<Address, AccountUpdate>,
}

impl PostState {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub post_state: PostState,
    /// Root after applying `post_state`.
    pub state_root: H256,
}

/// An EVM able to run a whole block.
///
/// Implementations must read, through the database, every account and slot
/// they end up writing: the witness is built from what was read.
pub trait BlockExecutor: Send + Sync {
    fn execute(
        &self,
        chain: &ChainConfig,
        block: &Block,
        db: &mut dyn StateDatabase,
        options: ExecuteOptions,
    ) -> anyhow::Result<ExecutionOutcome>;
}
