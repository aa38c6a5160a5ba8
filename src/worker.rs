// Tick driver: assemble on a fixed cadence and publish each snapshot whole.
// Receivers only ever see complete snapshots; the previous one is dropped.

use crate::assembler::Assembler;
use crate::models::Snapshot;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::time::{Duration, Instant, interval};
use tracing::Instrument;

pub type SnapshotSender = watch::Sender<Arc<Snapshot>>;
pub type SnapshotReceiver = watch::Receiver<Arc<Snapshot>>;

/// Channel seeded with an empty snapshot (sequence 0) until the first tick lands.
pub fn snapshot_channel() -> (SnapshotSender, SnapshotReceiver) {
    watch::channel(Arc::new(Snapshot::default()))
}

pub struct WorkerDeps {
    pub assembler: Arc<Assembler>,
    pub tx: SnapshotSender,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct WorkerConfig {
    pub tick_interval_ms: u64,
    /// How often to log tick stats (real seconds).
    pub stats_log_interval_secs: u64,
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        assembler,
        tx,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        tick_interval_ms,
        stats_log_interval_secs,
    } = config;

    let worker_span = tracing::span!(tracing::Level::DEBUG, "worker", tick_interval_ms);
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_millis(tick_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First stats tick fires immediately; skip it.
        stats_log_tick.tick().await;

        let mut sequence: u64 = 0;
        let mut budget_overruns_total: u64 = 0;
        let mut slowest_tick = Duration::ZERO;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    sequence += 1;
                    let started = Instant::now();
                    let snapshot = assembler.assemble(sequence).await;
                    let elapsed = started.elapsed();
                    slowest_tick = slowest_tick.max(elapsed);
                    if snapshot.budget_exceeded {
                        budget_overruns_total += 1;
                        tracing::debug!(
                            sequence,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "tick published with components cut short"
                        );
                    }
                    if tx.send(Arc::new(snapshot)).is_err() {
                        tracing::debug!("No snapshot receivers; worker stopping");
                        break;
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Worker shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    let latest = tx.borrow().clone();
                    tracing::info!(
                        ticks_total = sequence,
                        budget_overruns_total,
                        slowest_tick_ms = slowest_tick.as_millis() as u64,
                        devices = latest.devices.len(),
                        processes = latest.process_count(),
                        "tick stats"
                    );
                    slowest_tick = Duration::ZERO;
                }
            }
        }
    }.instrument(worker_span))
}
