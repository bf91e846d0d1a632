use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use anyhow::Context as _;
use ethereum_types::{Address, H256};
use futures::{StreamExt as _, TryStreamExt as _};
use tokio::runtime::Handle;
use tracing::{debug, info};
use witness::{
    evm::{BlockExecutor as _, ExecuteOptions},
    replay::StateDiffExecutor,
    tracker::{deleted_keys, AccessTracker},
    AccountProof, ChainConfig, PreflightData,
};
use zk_pig_common::Bytes;

use super::PipelineError;
use crate::{
    remote::RemoteState,
    rpc::{ChainClient, StateDiffClient},
};

/// Proof requests in flight per block.
const PROOF_CONCURRENCY: usize = 16;

/// Traces block `number`, replays the trace against the node's state at its
/// parent, then fetches proofs for everything the replay read.
///
/// Execution is not validated: it only has to touch the same state the real
/// one does.
pub async fn preflight<C: ChainClient + StateDiffClient>(
    client: Arc<C>,
    chain: ChainConfig,
    number: u64,
) -> anyhow::Result<PreflightData> {
    let block = client
        .block_by_number(Some(number))
        .await
        .with_context(|| format!("fetching block {number}"))?;
    let parent_hash = block.header.parent_hash;
    let parent = client
        .header_by_hash(parent_hash)
        .await
        .with_context(|| format!("fetching the parent of block {number}"))?
        .context(PipelineError::MissingParentHeader {
            number,
            parent_hash,
        })?;
    let state_diff = client
        .state_diff(&block)
        .await
        .with_context(|| format!("tracing block {number}"))?;

    let handle = Handle::current();
    let (tracker, outcome, block, chain) = {
        let client = client.clone();
        let parent = parent.clone();
        let executor =
            StateDiffExecutor::new(BTreeMap::from([(block.hash(), state_diff.clone())]));
        tokio::task::spawn_blocking(move || {
            let mut state = RemoteState::new(client, handle);
            state.mark_block(&parent);
            state.set_root(parent.state_root)?;
            let mut tracker = AccessTracker::new(state, parent.state_root);
            let outcome = executor
                .execute(
                    &chain,
                    &block,
                    &mut tracker,
                    ExecuteOptions { validate: false },
                )
                .with_context(|| format!("executing block {number}"))?;
            anyhow::Ok((tracker, outcome, block, chain))
        })
        .await??
    };

    let accesses = tracker
        .accesses(parent.state_root)
        .cloned()
        .unwrap_or_default();
    let deleted = deleted_keys(&accesses, &outcome.post_state);
    debug!(
        accounts = accesses.len(),
        deleted = deleted.len(),
        "block {number} executed"
    );

    let reads: BTreeMap<Address, BTreeSet<H256>> = accesses
        .into_iter()
        .map(|(address, accessed)| (address, accessed.storage.into_keys().collect()))
        .collect();
    let pre_state_proofs = fetch_proofs(&*client, reads, parent.number)
        .await
        .with_context(|| format!("fetching pre-state proofs of block {number}"))?;
    let post_state_proofs = fetch_proofs(&*client, deleted, number)
        .await
        .with_context(|| format!("fetching post-state proofs of block {number}"))?;

    let mut ancestors = tracker.headers().clone();
    ancestors.insert(parent.hash(), parent);
    let mut ancestors: Vec<_> = ancestors.into_values().collect();
    ancestors.sort_by_key(|header| header.number);

    let codes: BTreeSet<Bytes> = tracker
        .codes()
        .values()
        .map(|code| Bytes::from(code.clone()))
        .collect();

    info!(
        proofs = pre_state_proofs.len(),
        post_proofs = post_state_proofs.len(),
        codes = codes.len(),
        "preflight of block {number} done"
    );
    Ok(PreflightData {
        block,
        ancestors,
        chain_config: chain,
        codes: codes.into_iter().collect(),
        pre_state_proofs,
        post_state_proofs,
        state_diff,
    })
}

async fn fetch_proofs<C: ChainClient>(
    client: &C,
    keys: BTreeMap<Address, BTreeSet<H256>>,
    number: u64,
) -> anyhow::Result<Vec<AccountProof>> {
    futures::stream::iter(keys)
        .map(|(address, slots)| async move {
            client
                .get_proof(address, slots.into_iter().collect(), number)
                .await
                .with_context(|| format!("proof of {address:?} at block {number}"))
        })
        .buffered(PROOF_CONCURRENCY)
        .try_collect()
        .await
}
