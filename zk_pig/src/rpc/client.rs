use alloy::{
    network::{eip2718::Encodable2718 as _, Ethereum, Network},
    providers::Provider as _,
    rpc::json_rpc::{RpcParam, RpcReturn},
};
use anyhow::{ensure, Context as _};
use ethereum_types::{Address, H256, U256};
use futures::{StreamExt as _, TryStreamExt as _};
use serde::Deserialize;
use tokio::sync::Semaphore;
use witness::{types::Withdrawal, AccountProof, Block, Header};
use zk_pig_common::Bytes;

use super::{quantity, retry::RetryProvider, ChainClient};

/// A header as returned by `eth_getBlockBy*`, with the hash the node claims
/// for it.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcHeader {
    hash: H256,
    #[serde(flatten)]
    header: Header,
}

impl RpcHeader {
    pub(crate) fn into_header(self) -> anyhow::Result<Header> {
        let Self { hash, header } = self;
        ensure!(
            header.hash() == hash,
            "header of block {} does not hash to {hash:x}",
            header.number
        );
        Ok(header)
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    #[serde(flatten)]
    header: RpcHeader,
    transactions: Vec<alloy::rpc::types::Transaction>,
    #[serde(default)]
    uncles: Vec<H256>,
    #[serde(default)]
    withdrawals: Option<Vec<Withdrawal>>,
}

/// [`ChainClient`] over JSON-RPC.
///
/// The HTTP client keeps an unbounded connection pool, so the number of
/// requests in flight is capped here.
#[derive(Debug)]
pub struct RpcClient {
    provider: RetryProvider,
    semaphore: Semaphore,
}

impl RpcClient {
    pub fn new(provider: RetryProvider, max_concurrent_requests: usize) -> Self {
        Self {
            provider,
            semaphore: Semaphore::new(max_concurrent_requests),
        }
    }

    pub(crate) async fn request<P: RpcParam, R: RpcReturn>(
        &self,
        method: &'static str,
        params: P,
    ) -> anyhow::Result<R> {
        let _permit = self.semaphore.acquire().await?;
        self.provider
            .raw_request::<P, R>(method.into(), params)
            .await
            .with_context(|| format!("{method} failed"))
    }

    async fn uncle(&self, number: u64, index: usize) -> anyhow::Result<Header> {
        self.request::<_, Option<RpcHeader>>(
            "eth_getUncleByBlockNumberAndIndex",
            (quantity(number), quantity(index as u64)),
        )
        .await?
        .with_context(|| format!("uncle {index} of block {number} does not exist"))?
        .into_header()
    }
}

impl ChainClient for RpcClient {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        let _permit = self.semaphore.acquire().await?;
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        let _permit = self.semaphore.acquire().await?;
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_by_number(&self, number: Option<u64>) -> anyhow::Result<Block> {
        let tag = number.map_or_else(|| "latest".to_owned(), quantity);
        let block = self
            .request::<_, Option<RpcBlock>>("eth_getBlockByNumber", (&tag, true))
            .await?
            .with_context(|| format!("block {tag} does not exist"))?;

        let header = block.header.into_header()?;
        let transactions = block
            .transactions
            .into_iter()
            .map(|tx| {
                let envelope = <Ethereum as Network>::TxEnvelope::try_from(tx)?;
                anyhow::Ok(Bytes(envelope.encoded_2718()))
            })
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("unsupported transaction in block {}", header.number))?;
        let uncles = futures::stream::iter(0..block.uncles.len())
            .map(|index| self.uncle(header.number, index))
            .buffered(2)
            .try_collect()
            .await?;

        Ok(Block {
            header,
            transactions,
            uncles,
            withdrawals: block.withdrawals,
        })
    }

    async fn header_by_hash(&self, hash: H256) -> anyhow::Result<Option<Header>> {
        self.request::<_, Option<RpcHeader>>("eth_getBlockByHash", (hash, false))
            .await?
            .map(RpcHeader::into_header)
            .transpose()
    }

    async fn get_proof(
        &self,
        address: Address,
        slots: Vec<H256>,
        block: u64,
    ) -> anyhow::Result<AccountProof> {
        self.request("eth_getProof", (address, slots, quantity(block)))
            .await
    }

    async fn storage_at(&self, address: Address, slot: H256, block: u64) -> anyhow::Result<U256> {
        self.request("eth_getStorageAt", (address, slot, quantity(block)))
            .await
    }

    async fn code_at(&self, address: Address, block: u64) -> anyhow::Result<Vec<u8>> {
        self.request::<_, Bytes>("eth_getCode", (address, quantity(block)))
            .await
            .map(Bytes::into_vec)
    }
}
