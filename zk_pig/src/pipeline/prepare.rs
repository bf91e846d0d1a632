use anyhow::Context as _;
use tracing::info;
use witness::{
    input::PROVER_INPUT_VERSION,
    nodeset::build_node_set_with_transition,
    PreflightData, ProverInput, Witness,
};

use super::{execute::execute_blocks, PipelineError};

/// Builds the witness of a preflighted block and checks the block executes
/// from it, with full validation, to its declared state root.
pub async fn prepare(data: PreflightData) -> anyhow::Result<ProverInput> {
    tokio::task::spawn_blocking(move || prepare_blocking(data)).await?
}

fn prepare_blocking(data: PreflightData) -> anyhow::Result<ProverInput> {
    let number = data.block.number();
    let parent = data.parent().context(PipelineError::MissingParentHeader {
        number,
        parent_hash: data.block.header.parent_hash,
    })?;

    let nodes = build_node_set_with_transition(
        parent.state_root,
        data.block.header.state_root,
        &data.pre_state_proofs,
        &data.post_state_proofs,
    )
    .with_context(|| format!("building the node set of block {number}"))?;

    let witness = Witness {
        ancestors: data.ancestors,
        codes: data.codes,
        state: nodes.node_bytes(),
    };
    let blocks = vec![data.block];
    let state_diffs = vec![data.state_diff];
    execute_blocks(&data.chain_config, &blocks, &state_diffs, &witness)?;

    info!(
        nodes = witness.state.len(),
        codes = witness.codes.len(),
        "prover input of block {number} ready"
    );
    Ok(ProverInput {
        version: PROVER_INPUT_VERSION.to_owned(),
        blocks,
        state_diffs,
        chain_config: data.chain_config,
        witness,
    })
}
