use std::{collections::BTreeMap, sync::Arc};

use anyhow::Context as _;
use tracing::info;
use witness::{
    db::MemoryDb,
    evm::{BlockExecutor as _, ExecuteOptions},
    replay::{BlockStateDiff, StateDiffExecutor},
    state::TrieState,
    Block, ChainConfig, ProverInput, Witness,
};

use super::PipelineError;

/// Executes the blocks of `input` from its witness and state diffs alone,
/// checking every resulting state root.
pub async fn execute(input: ProverInput) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || {
        execute_blocks(
            &input.chain_config,
            &input.blocks,
            &input.state_diffs,
            &input.witness,
        )
    })
    .await?
}

pub(super) fn execute_blocks(
    chain: &ChainConfig,
    blocks: &[Block],
    state_diffs: &[BlockStateDiff],
    witness: &Witness,
) -> anyhow::Result<()> {
    if blocks.len() != state_diffs.len() {
        return Err(PipelineError::StateDiffCount {
            blocks: blocks.len(),
            diffs: state_diffs.len(),
        }
        .into());
    }
    let Some(first) = blocks.first() else {
        return Ok(());
    };
    let executor = StateDiffExecutor::new(
        blocks
            .iter()
            .zip(state_diffs)
            .map(|(block, diff)| (block.hash(), diff.clone()))
            .collect::<BTreeMap<_, _>>(),
    );

    let db = Arc::new(MemoryDb::from_witness(witness));
    let parent = db
        .header(&first.header.parent_hash)
        .context(PipelineError::MissingParentHeader {
            number: first.number(),
            parent_hash: first.header.parent_hash,
        })?;
    let mut state = TrieState::open(db.clone(), parent.state_root)
        .with_context(|| format!("opening the parent state of block {}", first.number()))?;

    for block in blocks {
        let number = block.number();
        let outcome = executor
            .execute(chain, block, &mut state, ExecuteOptions { validate: true })
            .with_context(|| format!("executing block {number}"))?;
        if outcome.state_root != block.header.state_root {
            return Err(PipelineError::StateRootMismatch {
                number,
                expected: block.header.state_root,
                computed: outcome.state_root,
            }
            .into());
        }
        info!("block {number} executed from its witness");
    }
    Ok(())
}
