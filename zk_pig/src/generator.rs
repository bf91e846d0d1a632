//! Running the pipeline stages for a block, with the artifacts going through
//! a store between them.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::OnceCell;
use tracing::{info, instrument};
use witness::{ChainConfig, ChainRegistry, PreflightData, ProverInput};

use crate::{
    pipeline,
    rpc::{ChainClient, StateDiffClient},
    store::{ArtifactStore, Store},
};

/// Every stage can be run on its own: one that is not handed the output of
/// the previous stage loads it from the store, so stages of the same block
/// may run in different processes.
pub struct Generator<C, S> {
    client: Arc<C>,
    store: ArtifactStore<S>,
    chains: Arc<ChainRegistry>,
    chain_id: OnceCell<u64>,
}

impl<C: ChainClient + StateDiffClient, S: Store> Generator<C, S> {
    pub fn new(client: Arc<C>, store: ArtifactStore<S>, chains: Arc<ChainRegistry>) -> Self {
        Self {
            client,
            store,
            chains,
            chain_id: OnceCell::new(),
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn store(&self) -> &ArtifactStore<S> {
        &self.store
    }

    /// The chain the client is connected to. Fails if it is not supported.
    pub async fn chain(&self) -> anyhow::Result<(u64, ChainConfig)> {
        let chain_id = *self
            .chain_id
            .get_or_try_init(|| self.client.chain_id())
            .await
            .context("fetching the chain id")?;
        Ok((chain_id, self.chains.get(chain_id)?.clone()))
    }

    #[instrument(skip(self))]
    pub async fn preflight(&self, number: u64) -> anyhow::Result<PreflightData> {
        let (chain_id, chain) = self.chain().await?;
        let data = pipeline::preflight(self.client.clone(), chain, number).await?;
        self.store.store_preflight(chain_id, &data).await?;
        Ok(data)
    }

    #[instrument(skip(self, data))]
    pub async fn prepare(
        &self,
        number: u64,
        data: Option<PreflightData>,
    ) -> anyhow::Result<ProverInput> {
        let (chain_id, _) = self.chain().await?;
        let data = match data {
            Some(data) => data,
            None => self
                .store
                .load_preflight(chain_id, number)
                .await
                .with_context(|| format!("loading the preflight data of block {number}"))?,
        };
        let input = pipeline::prepare(data).await?;
        self.store
            .store_prover_input(chain_id, number, &input)
            .await?;
        Ok(input)
    }

    #[instrument(skip(self, input))]
    pub async fn execute(&self, number: u64, input: Option<ProverInput>) -> anyhow::Result<()> {
        let input = match input {
            Some(input) => input,
            None => {
                let (chain_id, _) = self.chain().await?;
                self.store
                    .load_prover_input(chain_id, number)
                    .await
                    .with_context(|| format!("loading the prover input of block {number}"))?
            }
        };
        pipeline::execute(input).await
    }

    /// All three stages, storing each artifact on the way.
    #[instrument(skip(self))]
    pub async fn generate(&self, number: u64) -> anyhow::Result<ProverInput> {
        let data = self.preflight(number).await?;
        let input = self.prepare(number, Some(data)).await?;
        self.execute(number, Some(input.clone())).await?;
        info!("prover input of block {number} generated");
        Ok(input)
    }
}
