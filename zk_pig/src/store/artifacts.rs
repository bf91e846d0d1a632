use anyhow::Context as _;
use witness::{PreflightData, ProverInput};

use super::{codec, Headers, Store};

/// Typed access to the artifacts of each block, stored under
/// `{chain_id}/{block_number}/`.
#[derive(Clone, Debug)]
pub struct ArtifactStore<S> {
    store: S,
    headers: Headers,
}

fn preflight_path(chain_id: u64, number: u64) -> String {
    format!("{chain_id}/{number}/preflight")
}

fn prover_input_path(chain_id: u64, number: u64) -> String {
    format!("{chain_id}/{number}/prover-input")
}

impl<S: Store> ArtifactStore<S> {
    /// Artifacts are written and read with `headers`.
    pub fn new(store: S, headers: Headers) -> Self {
        Self { store, headers }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub async fn store_preflight(
        &self,
        chain_id: u64,
        data: &PreflightData,
    ) -> anyhow::Result<()> {
        let path = preflight_path(chain_id, data.block.number());
        let bytes = codec::encode(data, self.headers)?;
        self.store
            .store(&path, bytes, self.headers)
            .await
            .with_context(|| format!("storing {path}"))
    }

    pub async fn load_preflight(&self, chain_id: u64, number: u64) -> anyhow::Result<PreflightData> {
        let path = preflight_path(chain_id, number);
        let bytes = self.store.load(&path, self.headers).await?;
        codec::decode(&bytes, self.headers).with_context(|| format!("decoding {path}"))
    }

    pub async fn store_prover_input(
        &self,
        chain_id: u64,
        number: u64,
        input: &ProverInput,
    ) -> anyhow::Result<()> {
        let path = prover_input_path(chain_id, number);
        let bytes = codec::encode(input, self.headers)?;
        self.store
            .store(&path, bytes, self.headers)
            .await
            .with_context(|| format!("storing {path}"))
    }

    pub async fn load_prover_input(
        &self,
        chain_id: u64,
        number: u64,
    ) -> anyhow::Result<ProverInput> {
        let path = prover_input_path(chain_id, number);
        let bytes = self.store.load(&path, self.headers).await?;
        codec::decode(&bytes, self.headers).with_context(|| format!("decoding {path}"))
    }
}
