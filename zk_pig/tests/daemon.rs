use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use assert2::check;
use tokio_util::sync::CancellationToken;
use zk_pig::daemon::{BlockFilter, BlockGenerator, Daemon, DaemonConfig, FilterByModulo, NoFilter};

const GENERATION_TIME: Duration = Duration::from_secs(5);

/// Reports `heads` one poll at a time, then sticks to the last one.
#[derive(Debug, Default)]
struct Recorder {
    heads: Vec<u64>,
    fail: Option<u64>,
    polls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    done: Mutex<Vec<u64>>,
}

impl Recorder {
    fn new(heads: impl IntoIterator<Item = u64>) -> Self {
        Self {
            heads: heads.into_iter().collect(),
            ..Default::default()
        }
    }

    fn done(&self) -> Vec<u64> {
        let mut done = self.done.lock().unwrap().clone();
        done.sort_unstable();
        done
    }
}

impl BlockGenerator for Recorder {
    async fn latest_block_number(&self) -> anyhow::Result<u64> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.heads[poll.min(self.heads.len() - 1)])
    }

    async fn generate(&self, number: u64) -> anyhow::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(GENERATION_TIME).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        anyhow::ensure!(self.fail != Some(number), "block {number} is cursed");
        self.done.lock().unwrap().push(number);
        Ok(())
    }
}

/// Runs a daemon polling every second, cancelled after `run_for`.
async fn run(
    generator: &Arc<Recorder>,
    filter: impl BlockFilter,
    max_concurrent_blocks: Option<usize>,
    run_for: Duration,
) {
    let config = DaemonConfig {
        interval: Duration::from_secs(1),
        max_concurrent_blocks,
    };
    let cancel = CancellationToken::new();
    let daemon = tokio::spawn(Daemon::new(generator.clone(), filter, config).run(cancel.clone()));
    tokio::time::sleep(run_for).await;
    cancel.cancel();
    daemon.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn generates_the_selected_heads() {
    let generator = Arc::new(Recorder::new(100..200));
    run(
        &generator,
        FilterByModulo::new(2).unwrap(),
        None,
        Duration::from_millis(5_500),
    )
    .await;

    // Cancellation waits for the blocks in flight.
    check!(generator.done() == [100, 102, 104]);
    check!(generator.max_in_flight.load(Ordering::SeqCst) == 3);
}

#[tokio::test(start_paused = true)]
async fn concurrency_cap_is_honored() {
    let generator = Arc::new(Recorder::new(100..200));
    run(&generator, NoFilter, Some(1), Duration::from_millis(3_500)).await;

    check!(generator.done() == [100, 101, 102, 103]);
    check!(generator.max_in_flight.load(Ordering::SeqCst) == 1);
}

#[tokio::test(start_paused = true)]
async fn failures_do_not_stop_the_daemon() {
    let generator = Arc::new(Recorder {
        fail: Some(101),
        ..Recorder::new(100..200)
    });
    run(&generator, NoFilter, None, Duration::from_millis(2_500)).await;

    check!(generator.done() == [100, 102]);
}

#[tokio::test(start_paused = true)]
async fn stale_heads_are_not_generated_again() {
    let generator = Arc::new(Recorder::new([7, 7, 6, 8, 8]));
    run(&generator, NoFilter, None, Duration::from_millis(6_500)).await;

    check!(generator.done() == [7, 8]);
}
