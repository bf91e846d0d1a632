//! Generating prover inputs for new blocks as the chain advances.

use std::{future::Future, num::NonZeroU64, sync::Arc, time::Duration};

use anyhow::Context as _;
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    generator::Generator,
    rpc::{ChainClient, StateDiffClient},
    store::Store,
};

/// Selects the blocks to generate prover inputs for.
pub trait BlockFilter: Send + Sync + 'static {
    fn filter(&self, number: u64) -> bool;
}

/// Selects every block.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFilter;

impl BlockFilter for NoFilter {
    fn filter(&self, _: u64) -> bool {
        true
    }
}

/// Selects the blocks whose number is a multiple of the modulus.
#[derive(Clone, Copy, Debug)]
pub struct FilterByModulo(pub NonZeroU64);

impl FilterByModulo {
    /// `None` for a zero modulus.
    pub fn new(modulus: u64) -> Option<Self> {
        NonZeroU64::new(modulus).map(Self)
    }
}

impl BlockFilter for FilterByModulo {
    fn filter(&self, number: u64) -> bool {
        number % self.0.get() == 0
    }
}

/// What the daemon drives.
pub trait BlockGenerator: Send + Sync + 'static {
    fn latest_block_number(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    fn generate(&self, number: u64) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl<C: ChainClient + StateDiffClient, S: Store> BlockGenerator for Generator<C, S> {
    async fn latest_block_number(&self) -> anyhow::Result<u64> {
        self.client().block_number().await
    }

    async fn generate(&self, number: u64) -> anyhow::Result<()> {
        Generator::generate(self, number).await.map(drop)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DaemonConfig {
    /// How often the chain head is polled.
    pub interval: Duration,
    /// Blocks generated at the same time. Unbounded if `None`.
    pub max_concurrent_blocks: Option<usize>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_concurrent_blocks: None,
        }
    }
}

/// Polls the chain head and generates every new head the filter selects.
///
/// Only heads are considered: blocks produced between two polls are
/// skipped. A failed generation is logged and does not stop the daemon.
#[derive(Debug)]
pub struct Daemon<G, F> {
    generator: Arc<G>,
    filter: F,
    config: DaemonConfig,
}

impl<G: BlockGenerator, F: BlockFilter> Daemon<G, F> {
    pub fn new(generator: Arc<G>, filter: F, config: DaemonConfig) -> Self {
        Self {
            generator,
            filter,
            config,
        }
    }

    /// Runs until `cancel` fires, then waits for the generations in flight.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let (heads_tx, mut heads) = mpsc::channel(16);
        let watcher = tokio::spawn(watch_heads(
            self.generator.clone(),
            self.config.interval,
            heads_tx,
            cancel.clone(),
        ));
        let permits = self
            .config
            .max_concurrent_blocks
            .map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                head = heads.recv() => {
                    let Some(number) = head else {
                        break;
                    };
                    if !self.filter.filter(number) {
                        debug!("skipping block {number}");
                        continue;
                    }
                    let generator = self.generator.clone();
                    let permits = permits.clone();
                    tasks.spawn(async move {
                        let _permit = match permits {
                            Some(permits) => Some(permits.acquire_owned().await?),
                            None => None,
                        };
                        info!("generating block {number}");
                        generator
                            .generate(number)
                            .await
                            .with_context(|| format!("generating block {number}"))
                    });
                }
                Some(res) = tasks.join_next(), if !tasks.is_empty() => log_outcome(res),
            }
        }

        drop(heads);
        watcher.await.context("head watcher panicked")?;
        info!("waiting for {} block(s) in flight", tasks.len());
        while let Some(res) = tasks.join_next().await {
            log_outcome(res);
        }
        Ok(())
    }
}

fn log_outcome(res: Result<anyhow::Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{e:#}"),
        Err(e) => error!("generation task failed: {e}"),
    }
}

async fn watch_heads<G: BlockGenerator>(
    generator: Arc<G>,
    interval: Duration,
    heads: mpsc::Sender<u64>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = None;
    loop {
        let latest = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => tokio::select! {
                _ = cancel.cancelled() => return,
                latest = generator.latest_block_number() => latest,
            },
        };
        match latest {
            Ok(number) if last.map_or(true, |last| number > last) => {
                last = Some(number);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = heads.send(number) => if sent.is_err() {
                        return;
                    },
                }
            }
            Ok(_) => {}
            Err(e) => warn!("polling the chain head failed: {e:#}"),
        }
    }
}
