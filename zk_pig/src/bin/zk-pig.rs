use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use clap::Parser;
use cli::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;
use witness::ChainRegistry;
use zk_pig::{
    daemon::{BlockFilter, Daemon, DaemonConfig, FilterByModulo, NoFilter},
    env::load_env_file,
    generator::Generator,
    rpc::{retry::build_http_retry_provider, LoggingClient, RpcClient},
    store::{ArtifactStore, FileStore, Headers},
};

#[path = "zk-pig/cli.rs"]
mod cli;

type Client = LoggingClient<RpcClient>;

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = load_env_file(".env")?;
    zk_pig::tracing::init();
    if let Some(path) = env_file {
        info!("loaded settings from {}", path.display());
    }

    let args = cli::Cli::parse();

    let provider = build_http_retry_provider(
        args.rpc.rpc_url,
        Duration::from_millis(args.rpc.backoff),
        args.rpc.max_retries,
    );
    let client = Arc::new(LoggingClient::new(RpcClient::new(
        provider,
        args.rpc.max_concurrent_requests,
    )));
    let store = ArtifactStore::new(
        FileStore::new(args.store.data_dir),
        Headers {
            content_type: args.store.content_type,
            content_encoding: args.store.content_encoding,
        },
    );
    let generator = Generator::new(client, store, Arc::new(ChainRegistry::builtin()));

    // fail fast on unsupported chains
    let (chain_id, _) = generator.chain().await?;
    info!("connected to chain {chain_id}");

    match args.command {
        Command::Preflight { block_number } => {
            generator.preflight(block_number).await?;
        }
        Command::Prepare { block_number } => {
            generator.prepare(block_number, None).await?;
        }
        Command::Execute { block_number } => {
            generator.execute(block_number, None).await?;
        }
        Command::Generate { block_number } => {
            generator.generate(block_number).await?;
        }
        Command::Daemon {
            filter_modulo,
            interval_ms,
            max_concurrent_blocks,
        } => {
            let config = DaemonConfig {
                interval: Duration::from_millis(interval_ms),
                max_concurrent_blocks,
            };
            let generator = Arc::new(generator);
            match filter_modulo {
                None => run_daemon(generator, NoFilter, config).await?,
                Some(modulus) => {
                    let Some(filter) = FilterByModulo::new(modulus) else {
                        bail!("the filter modulus must not be zero");
                    };
                    run_daemon(generator, filter, config).await?
                }
            }
        }
    }
    Ok(())
}

async fn run_daemon<F: BlockFilter>(
    generator: Arc<Generator<Client, FileStore>>,
    filter: F,
    config: DaemonConfig,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let daemon = tokio::spawn(Daemon::new(generator, filter, config).run(cancel.clone()));
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();
    daemon.await?
}
