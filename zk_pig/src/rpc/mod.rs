//! Access to the archive node.

use std::future::Future;

use ethereum_types::{Address, H256, U256};
use witness::{replay::BlockStateDiff, AccountProof, Block, Header};

mod client;
mod logging;
pub mod retry;
pub mod trace;

pub use client::RpcClient;
pub use logging::LoggingClient;

/// The chain data the pipeline consumes. Blocks are addressed by number, as
/// the node serves state by number rather than by root.
pub trait ChainClient: Send + Sync + 'static {
    fn chain_id(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    fn block_number(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// `None` fetches the latest block.
    fn block_by_number(
        &self,
        number: Option<u64>,
    ) -> impl Future<Output = anyhow::Result<Block>> + Send;

    /// `Ok(None)` if the node does not know the header.
    fn header_by_hash(
        &self,
        hash: H256,
    ) -> impl Future<Output = anyhow::Result<Option<Header>>> + Send;

    fn get_proof(
        &self,
        address: Address,
        slots: Vec<H256>,
        block: u64,
    ) -> impl Future<Output = anyhow::Result<AccountProof>> + Send;

    fn storage_at(
        &self,
        address: Address,
        slot: H256,
        block: u64,
    ) -> impl Future<Output = anyhow::Result<U256>> + Send;

    fn code_at(
        &self,
        address: Address,
        block: u64,
    ) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

/// Reports what a block reads and writes, without running it locally.
pub trait StateDiffClient: Send + Sync + 'static {
    fn state_diff(&self, block: &Block)
        -> impl Future<Output = anyhow::Result<BlockStateDiff>> + Send;
}

/// Block numbers go over the wire as quantities.
fn quantity(number: u64) -> String {
    format!("{number:#x}")
}
