use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use url::Url;
use zk_pig::store::{ContentEncoding, ContentType};

const RPC_HELP_HEADING: &str = "RPC options";
const STORE_HELP_HEADING: &str = "Store options";

/// Generates self-contained prover inputs for Ethereum blocks.
#[derive(Parser)]
#[command(version, propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    #[clap(flatten)]
    pub(crate) rpc: RpcConfig,

    #[clap(flatten)]
    pub(crate) store: StoreConfig,
}

#[derive(Args)]
pub(crate) struct RpcConfig {
    /// The archive node RPC URL.
    #[arg(short = 'u', long, env = "ZK_PIG_RPC_URL", value_hint = ValueHint::Url, help_heading = RPC_HELP_HEADING)]
    pub(crate) rpc_url: Url,
    /// Backoff in milliseconds for retry requests.
    #[arg(long, env = "ZK_PIG_BACKOFF", default_value_t = 0, help_heading = RPC_HELP_HEADING)]
    pub(crate) backoff: u64,
    /// The maximum number of retries.
    #[arg(long, env = "ZK_PIG_MAX_RETRIES", default_value_t = 0, help_heading = RPC_HELP_HEADING)]
    pub(crate) max_retries: u32,
    /// The maximum number of requests in flight.
    #[arg(long, env = "ZK_PIG_MAX_CONCURRENT_REQUESTS", default_value_t = 128, help_heading = RPC_HELP_HEADING)]
    pub(crate) max_concurrent_requests: usize,
}

#[derive(Args)]
pub(crate) struct StoreConfig {
    /// The directory artifacts are stored in.
    #[arg(short = 'd', long, env = "ZK_PIG_DATA_DIR", value_hint = ValueHint::DirPath, default_value = "data", help_heading = STORE_HELP_HEADING)]
    pub(crate) data_dir: PathBuf,
    #[arg(long, env = "ZK_PIG_CONTENT_TYPE", value_enum, default_value_t = ContentType::Json, help_heading = STORE_HELP_HEADING)]
    pub(crate) content_type: ContentType,
    #[arg(long, env = "ZK_PIG_CONTENT_ENCODING", value_enum, default_value_t = ContentEncoding::Plain, help_heading = STORE_HELP_HEADING)]
    pub(crate) content_encoding: ContentEncoding,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Traces a block on the node and fetches proofs for the state it reads.
    Preflight {
        #[arg(short, long, env = "ZK_PIG_BLOCK_NUMBER")]
        block_number: u64,
    },
    /// Builds the prover input of a preflighted block.
    Prepare {
        #[arg(short, long, env = "ZK_PIG_BLOCK_NUMBER")]
        block_number: u64,
    },
    /// Executes a block from its stored prover input.
    Execute {
        #[arg(short, long, env = "ZK_PIG_BLOCK_NUMBER")]
        block_number: u64,
    },
    /// Runs all the stages for a block.
    Generate {
        #[arg(short, long, env = "ZK_PIG_BLOCK_NUMBER")]
        block_number: u64,
    },
    /// Generates prover inputs for new blocks as they are produced.
    Daemon {
        /// Only generate blocks whose number is a multiple of this.
        #[arg(long, env = "ZK_PIG_FILTER_MODULO")]
        filter_modulo: Option<u64>,
        /// How often the chain head is polled, in milliseconds.
        #[arg(long, env = "ZK_PIG_INTERVAL_MS", default_value_t = 1000)]
        interval_ms: u64,
        /// The maximum number of blocks generated at the same time.
        #[arg(long, env = "ZK_PIG_MAX_CONCURRENT_BLOCKS")]
        max_concurrent_blocks: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_a_stage() {
        let cli = Cli::try_parse_from([
            "zk-pig",
            "--rpc-url",
            "http://localhost:8545",
            "--content-type",
            "cbor",
            "prepare",
            "--block-number",
            "12",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Prepare { block_number: 12 }));
        assert!(cli.store.content_type == ContentType::Cbor);
        assert!(cli.rpc.max_concurrent_requests == 128);
    }
}
