//! A [`BlockExecutor`] that replays state changes recorded by a node.
//!
//! Instead of running transactions, [`StateDiffExecutor`] takes the accounts
//! and slots a block reads and the values it leaves behind from a
//! [`StateDiffSource`] (in practice a node's prestate tracer), goes through
//! the database for all of them, and commits the result. Transitions that
//! happen outside of transactions are not part of such traces and are
//! applied here:
//!
//! - the beacon roots contract update (EIP-4788),
//! - the block hash history contract update (EIP-2935),
//! - withdrawals (EIP-4895),
//! - block and uncle rewards before the merge.

use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

use anyhow::Context as _;
use ethereum_types::{Address, BigEndianHash as _, H160, H256, U256};
use hex_literal::hex;
use serde::{Deserialize, Serialize};
use zk_pig_common::{gwei_to_wei, EMPTY_CODE_HASH};

use crate::{
    chain::ChainConfig,
    evm::{
        AccountInfo, AccountUpdate, BlockExecutor, ExecuteOptions, ExecutionOutcome, PostState,
        ValidationError,
    },
    state::StateDatabase,
    types::Block,
};

pub const BEACON_ROOTS_ADDRESS: Address = H160(hex!("000F3df6D732807Ef1319fB7B8bB8522d0Beac02"));
pub const HISTORY_STORAGE_ADDRESS: Address = H160(hex!("0000F90827F1C53a10cb7A02335B175320002935"));
const BEACON_ROOTS_BUFFER: u64 = 8191;
const HISTORY_SERVE_WINDOW: u64 = 8191;
/// Uncles are at most this many generations older than the block.
const MAX_UNCLE_DEPTH: u64 = 6;

/// What a block reads and writes, as reported by a tracer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStateDiff {
    /// Slots read per account. Accounts read without any slot have an empty
    /// set.
    pub reads: BTreeMap<Address, BTreeSet<H256>>,
    pub post: PostState,
}

pub trait StateDiffSource: Send + Sync {
    fn state_diff(&self, block: &Block) -> anyhow::Result<BlockStateDiff>;
}

/// Recorded diffs, by block hash.
impl StateDiffSource for BTreeMap<H256, BlockStateDiff> {
    fn state_diff(&self, block: &Block) -> anyhow::Result<BlockStateDiff> {
        self.get(&block.hash())
            .cloned()
            .with_context(|| format!("no state diff for block {}", block.number()))
    }
}

#[derive(Debug)]
pub struct StateDiffExecutor<D> {
    source: D,
}

impl<D: StateDiffSource> StateDiffExecutor<D> {
    pub fn new(source: D) -> Self {
        Self { source }
    }
}

impl<D: StateDiffSource> BlockExecutor for StateDiffExecutor<D> {
    fn execute(
        &self,
        chain: &ChainConfig,
        block: &Block,
        db: &mut dyn StateDatabase,
        options: ExecuteOptions,
    ) -> anyhow::Result<ExecutionOutcome> {
        let header = &block.header;
        let parent = db
            .header(header.parent_hash)
            .with_context(|| format!("parent of block {}", header.number))?;
        if options.validate {
            if parent.number + 1 != header.number {
                return Err(ValidationError::ParentNumber {
                    number: header.number,
                    parent: parent.number,
                }
                .into());
            }
            if parent.timestamp >= header.timestamp {
                return Err(ValidationError::ParentTimestamp {
                    number: header.number,
                }
                .into());
            }
        }

        let diff = self.source.state_diff(block)?;
        let mut post = diff.post;
        for (address, slots) in &diff.reads {
            read_account(db, *address, slots.iter().copied())?;
        }
        for (address, update) in &post.accounts {
            read_account(db, *address, update.storage.keys().copied())?;
        }

        if let (true, Some(root)) = (
            chain.is_cancun(header.timestamp),
            header.parent_beacon_block_root,
        ) {
            let slot = header.timestamp % BEACON_ROOTS_BUFFER;
            system_store(
                db,
                &mut post,
                BEACON_ROOTS_ADDRESS,
                [
                    (slot.into(), header.timestamp.into()),
                    ((slot + BEACON_ROOTS_BUFFER).into(), root.into_uint()),
                ],
            )?;
        }
        if chain.is_prague(header.timestamp) && header.number > 0 {
            let slot = (header.number - 1) % HISTORY_SERVE_WINDOW;
            system_store(
                db,
                &mut post,
                HISTORY_STORAGE_ADDRESS,
                [(slot.into(), header.parent_hash.into_uint())],
            )?;
        }

        for withdrawal in block.withdrawals.iter().flatten() {
            if withdrawal.amount == 0 {
                continue;
            }
            credit(db, &mut post, withdrawal.address, gwei_to_wei(withdrawal.amount.into()))?;
        }

        if !header.difficulty.is_zero() {
            let reward = chain.block_reward(header.number);
            let uncles = U256::from(block.uncles.len());
            credit(db, &mut post, header.beneficiary, reward + reward / 32 * uncles)?;
            for uncle in &block.uncles {
                let depth = header
                    .number
                    .checked_sub(uncle.number)
                    .filter(|depth| (1..=MAX_UNCLE_DEPTH).contains(depth))
                    .ok_or(ValidationError::UncleDepth {
                        number: header.number,
                        uncle: uncle.number,
                    })?;
                let share = U256::from(8 - depth) * reward / 8;
                credit(db, &mut post, uncle.beneficiary, share)?;
            }
        }

        let state_root = db.commit(&post)?;
        Ok(ExecutionOutcome {
            post_state: post,
            state_root,
        })
    }
}

fn read_account(
    db: &mut dyn StateDatabase,
    address: Address,
    slots: impl IntoIterator<Item = H256>,
) -> anyhow::Result<()> {
    let account = db
        .account(address)
        .with_context(|| format!("account {address:?}"))?;
    if let Some(account) = account.filter(|a| a.has_code()) {
        db.code(account.code_hash)
            .with_context(|| format!("code of {address:?}"))?;
    }
    for slot in slots {
        db.storage(address, slot)
            .with_context(|| format!("slot {slot:?} of {address:?}"))?;
    }
    Ok(())
}

/// The update of `address` in `post`, starting from its current state if the
/// block did not touch it.
fn update_of<'a>(
    db: &mut dyn StateDatabase,
    post: &'a mut PostState,
    address: Address,
) -> anyhow::Result<&'a mut AccountUpdate> {
    Ok(match post.accounts.entry(address) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let info = db
                .account(address)
                .with_context(|| format!("account {address:?}"))?
                .map(|a| AccountInfo {
                    nonce: a.nonce,
                    balance: a.balance,
                    code_hash: a.code_hash,
                });
            entry.insert(AccountUpdate {
                info,
                ..Default::default()
            })
        }
    })
}

fn credit(
    db: &mut dyn StateDatabase,
    post: &mut PostState,
    address: Address,
    amount: U256,
) -> anyhow::Result<()> {
    let update = update_of(db, post, address)?;
    let info = update.info.get_or_insert(AccountInfo {
        nonce: 0,
        balance: U256::zero(),
        code_hash: EMPTY_CODE_HASH,
    });
    info.balance = info
        .balance
        .checked_add(amount)
        .ok_or(ValidationError::BalanceOverflow { address })?;
    Ok(())
}

/// Writes of a system call into a contract. Nothing happens while the
/// contract is not deployed.
fn system_store<const N: usize>(
    db: &mut dyn StateDatabase,
    post: &mut PostState,
    address: Address,
    writes: [(U256, U256); N],
) -> anyhow::Result<()> {
    let slots = writes.map(|(slot, value)| (H256::from_uint(&slot), value));
    read_account(db, address, slots.iter().map(|(slot, _)| *slot))?;
    let update = update_of(db, post, address)?;
    if update.info.is_none() {
        return Ok(());
    }
    update.storage.extend(slots);
    Ok(())
}
