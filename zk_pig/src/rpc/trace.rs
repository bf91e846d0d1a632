//! Block state diffs from the node's `prestateTracer`.
//!
//! The tracer runs per transaction. In default mode it reports every account
//! and slot a transaction touches with its value before the transaction; in
//! diff mode it reports the accounts a transaction modifies, before and
//! after. Fields missing from the post side did not change, slots missing
//! from it were cleared, and accounts missing from it were deleted.

use std::collections::BTreeMap;

use alloy::{
    primitives,
    rpc::types::trace::geth::{
        AccountState, DiffMode, GethDebugBuiltInTracerType, GethDebugTracerType,
        GethDebugTracingOptions, PreStateConfig, PreStateMode,
    },
};
use anyhow::{anyhow, ensure};
use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use serde::Deserialize;
use witness::{
    evm::{AccountInfo, AccountUpdate, PostState},
    replay::BlockStateDiff,
    Block,
};
use zk_pig_common::EMPTY_CODE_HASH;

use super::{quantity, RpcClient, StateDiffClient};

/// One entry of a `debug_traceBlockBy*` response.
#[derive(Debug, Deserialize)]
struct TxTrace<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> TxTrace<T> {
    fn into_result(self, index: usize) -> anyhow::Result<T> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, error) => Err(anyhow!(
                "tracing transaction {index} failed: {}",
                error.unwrap_or_default()
            )),
        }
    }
}

fn prestate_tracing_options(diff_mode: bool) -> GethDebugTracingOptions {
    GethDebugTracingOptions {
        tracer_config: PreStateConfig {
            diff_mode: Some(diff_mode),
        }
        .into(),
        tracer: Some(GethDebugTracerType::BuiltInTracer(
            GethDebugBuiltInTracerType::PreStateTracer,
        )),
        ..GethDebugTracingOptions::default()
    }
}

impl StateDiffClient for RpcClient {
    async fn state_diff(&self, block: &Block) -> anyhow::Result<BlockStateDiff> {
        let number = quantity(block.number());
        let (reads, diffs) = futures::try_join!(
            self.request::<_, Vec<TxTrace<PreStateMode>>>(
                "debug_traceBlockByNumber",
                (&number, prestate_tracing_options(false)),
            ),
            self.request::<_, Vec<TxTrace<DiffMode>>>(
                "debug_traceBlockByNumber",
                (&number, prestate_tracing_options(true)),
            ),
        )?;
        ensure!(
            reads.len() == block.transactions.len() && diffs.len() == block.transactions.len(),
            "block {} has {} transactions but {} and {} traces",
            block.number(),
            block.transactions.len(),
            reads.len(),
            diffs.len()
        );

        let reads = reads
            .into_iter()
            .enumerate()
            .map(|(i, trace)| trace.into_result(i))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let diffs = diffs
            .into_iter()
            .enumerate()
            .map(|(i, trace)| trace.into_result(i))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(fold_traces(reads, diffs))
    }
}

/// Combines the per-transaction traces of a block, in order.
pub fn fold_traces(
    reads: impl IntoIterator<Item = PreStateMode>,
    diffs: impl IntoIterator<Item = DiffMode>,
) -> BlockStateDiff {
    let mut diff = BlockStateDiff::default();
    for PreStateMode(accounts) in reads {
        for (address, state) in accounts {
            diff.reads
                .entry(address_of(address))
                .or_default()
                .extend(state.storage.keys().map(|slot| H256(slot.0)));
        }
    }
    for tx in diffs {
        apply_diff(&mut diff.post, tx);
    }
    diff
}

fn apply_diff(post: &mut PostState, DiffMode { pre, post: after }: DiffMode) {
    for address in pre.keys().filter(|a| !after.contains_key(*a)) {
        post.accounts.insert(
            address_of(*address),
            AccountUpdate {
                info: None,
                destructed: true,
                storage: BTreeMap::new(),
            },
        );
    }

    for (address, state) in after {
        let before = pre.get(&address);
        let update = post.accounts.entry(address_of(address)).or_default();
        let info = update
            .info
            .get_or_insert_with(|| before.map_or_else(empty_info, info_of));
        if let Some(nonce) = state.nonce {
            info.nonce = nonce;
        }
        if let Some(balance) = state.balance {
            info.balance = u256_of(balance);
        }
        if let Some(code) = &state.code {
            info.code_hash = keccak(code);
        }

        for slot in before.into_iter().flat_map(|b| b.storage.keys()) {
            update.storage.insert(H256(slot.0), U256::zero());
        }
        for (slot, value) in &state.storage {
            update
                .storage
                .insert(H256(slot.0), U256::from_big_endian(value.as_slice()));
        }
    }
}

fn empty_info() -> AccountInfo {
    AccountInfo {
        nonce: 0,
        balance: U256::zero(),
        code_hash: EMPTY_CODE_HASH,
    }
}

fn info_of(state: &AccountState) -> AccountInfo {
    AccountInfo {
        nonce: state.nonce.unwrap_or_default(),
        balance: state.balance.map(u256_of).unwrap_or_default(),
        code_hash: state
            .code
            .as_ref()
            .filter(|code| !code.is_empty())
            .map_or(EMPTY_CODE_HASH, keccak),
    }
}

fn address_of(address: primitives::Address) -> Address {
    Address::from_slice(address.as_slice())
}

fn u256_of(value: primitives::U256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use assert2::{check, let_assert};

    use super::*;

    const SENDER: &str = "0x00000000000000000000000000000000000000a1";
    const TOKEN: &str = "0x00000000000000000000000000000000000000b2";
    const DOOMED: &str = "0x00000000000000000000000000000000000000c3";

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn slot(n: u64) -> H256 {
        H256::from_low_u64_be(n)
    }

    fn traces() -> (Vec<PreStateMode>, Vec<DiffMode>) {
        let reads = serde_json::from_value(serde_json::json!([
            {
                SENDER: { "balance": "0x1000", "nonce": 4 },
                TOKEN: {
                    "balance": "0x0",
                    "code": "0x6000",
                    "storage": {
                        "0x0000000000000000000000000000000000000000000000000000000000000001": "0x0000000000000000000000000000000000000000000000000000000000000005",
                        "0x0000000000000000000000000000000000000000000000000000000000000002": "0x0000000000000000000000000000000000000000000000000000000000000007"
                    }
                }
            },
            {
                SENDER: { "balance": "0xf00", "nonce": 5 },
                DOOMED: { "balance": "0x1" }
            }
        ]))
        .unwrap();
        let diffs = serde_json::from_value(serde_json::json!([
            {
                "pre": {
                    SENDER: { "balance": "0x1000", "nonce": 4 },
                    TOKEN: {
                        "balance": "0x0",
                        "code": "0x6000",
                        "storage": {
                            "0x0000000000000000000000000000000000000000000000000000000000000001": "0x0000000000000000000000000000000000000000000000000000000000000005"
                        }
                    }
                },
                "post": {
                    SENDER: { "balance": "0xf00", "nonce": 5 },
                    TOKEN: {
                        "storage": {
                            "0x0000000000000000000000000000000000000000000000000000000000000003": "0x0000000000000000000000000000000000000000000000000000000000000009"
                        }
                    }
                }
            },
            {
                "pre": {
                    SENDER: { "balance": "0xf00", "nonce": 5 },
                    DOOMED: { "balance": "0x1" }
                },
                "post": {
                    SENDER: { "balance": "0xe00", "nonce": 6 }
                }
            }
        ]))
        .unwrap();
        (reads, diffs)
    }

    #[test]
    fn folds_transactions_in_order() {
        let (reads, diffs) = traces();
        let diff = fold_traces(reads, diffs);

        check!(diff.reads.len() == 3);
        check!(diff.reads[&addr(TOKEN)] == BTreeSet::from([slot(1), slot(2)]));
        check!(diff.reads[&addr(SENDER)].is_empty());

        let_assert!(Some(sender) = diff.post.accounts[&addr(SENDER)].info);
        check!(sender.nonce == 6);
        check!(sender.balance == U256::from(0xe00));

        let token = &diff.post.accounts[&addr(TOKEN)];
        let_assert!(Some(info) = token.info);
        check!(info.code_hash == keccak([0x60, 0x00]));
        check!(token.storage[&slot(1)] == U256::zero());
        check!(token.storage[&slot(3)] == U256::from(9));
        check!(!token.storage.contains_key(&slot(2)));

        let doomed = &diff.post.accounts[&addr(DOOMED)];
        check!(doomed.info.is_none());
        check!(doomed.destructed);
    }

    #[test]
    fn failed_traces_are_errors() {
        let traces: Vec<TxTrace<DiffMode>> =
            serde_json::from_str(r#"[{"error":"execution timeout"}]"#).unwrap();
        let_assert!(Some(trace) = traces.into_iter().next());
        let err = trace.into_result(0).unwrap_err();
        check!(err.to_string() == "tracing transaction 0 failed: execution timeout");
    }
}
