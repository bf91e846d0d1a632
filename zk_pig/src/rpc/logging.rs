use std::{future::Future, time::Instant};

use ethereum_types::{Address, H256, U256};
use tracing::{debug, debug_span, warn, Instrument as _};
use witness::{replay::BlockStateDiff, AccountProof, Block, Header};

use super::{ChainClient, StateDiffClient};

/// Logs every call made through the wrapped client, with how long it took.
#[derive(Clone, Debug)]
pub struct LoggingClient<C> {
    inner: C,
}

impl<C> LoggingClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

async fn logged<T>(
    method: &'static str,
    call: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    let start = Instant::now();
    let res = call.instrument(debug_span!("rpc", method)).await;
    let elapsed = start.elapsed();
    match &res {
        Ok(_) => debug!(method, ?elapsed, "call succeeded"),
        Err(e) => warn!(method, ?elapsed, "call failed: {e:#}"),
    }
    res
}

impl<C: ChainClient> ChainClient for LoggingClient<C> {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        logged("chain_id", self.inner.chain_id()).await
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        logged("block_number", self.inner.block_number()).await
    }

    async fn block_by_number(&self, number: Option<u64>) -> anyhow::Result<Block> {
        logged("block_by_number", self.inner.block_by_number(number)).await
    }

    async fn header_by_hash(&self, hash: H256) -> anyhow::Result<Option<Header>> {
        logged("header_by_hash", self.inner.header_by_hash(hash)).await
    }

    async fn get_proof(
        &self,
        address: Address,
        slots: Vec<H256>,
        block: u64,
    ) -> anyhow::Result<AccountProof> {
        logged("get_proof", self.inner.get_proof(address, slots, block)).await
    }

    async fn storage_at(&self, address: Address, slot: H256, block: u64) -> anyhow::Result<U256> {
        logged("storage_at", self.inner.storage_at(address, slot, block)).await
    }

    async fn code_at(&self, address: Address, block: u64) -> anyhow::Result<Vec<u8>> {
        logged("code_at", self.inner.code_at(address, block)).await
    }
}

impl<C: StateDiffClient> StateDiffClient for LoggingClient<C> {
    async fn state_diff(&self, block: &Block) -> anyhow::Result<BlockStateDiff> {
        logged("state_diff", self.inner.state_diff(block)).await
    }
}
