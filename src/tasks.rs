//! Orchestrator subtasks: seed ingestion, the retry scanner, and the
//! completion checker.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crawld_controller::paths;
use crawld_core::{urls, MAX_RETRY_BATCH};
use crawld_queue::BoundedQueue;
use crawld_store::{PageRecord, Storage, StoreError};

/// Consecutive zero pending counts required before the crawl is declared
/// finished. A single observation can race a controller holding an
/// uncommitted transaction.
const QUIESCENT_OBSERVATIONS: u32 = 3;

/// Insert every seed-file URL as a Pending record (one startup transaction)
/// and hand the new ones to a detached producer, so startup never blocks on
/// queue capacity. Failures here are fatal: without seeds there is no crawl.
pub async fn ingest_seeds(
    storage: &Storage,
    url_queue: &BoundedQueue<String>,
    seed_file_path: &str,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(seed_file_path)
        .await
        .with_context(|| format!("read seed file {seed_file_path}"))?;
    let seeds = parse_seed_lines(&raw);

    let mut tx = storage.begin().await.context("begin seed transaction")?;
    let mut to_send = Vec::new();
    for seed in seeds {
        let normalized = match urls::shortify(&seed) {
            Ok(normalized) => normalized,
            Err(e) => {
                error!(url = %seed, error = %e, "skipping malformed seed");
                continue;
            }
        };
        match tx.get_for_update(&normalized).await {
            Ok(_) => debug!(url = %normalized, "seed already known"),
            Err(StoreError::NotFound) => {
                let record = PageRecord::new_pending(
                    &normalized,
                    urls::get_domain(&seed).unwrap_or_default(),
                    paths::encode_paths(&[vec![normalized.clone()]])?,
                );
                tx.insert(&record).await.context("insert seed record")?;
                to_send.push(seed);
            }
            Err(e) => return Err(e).context("read seed record"),
        }
    }
    tx.commit().await.context("commit seed transaction")?;
    info!(count = to_send.len(), "seeds ingested");

    let queue = url_queue.clone();
    tokio::spawn(async move {
        for seed in to_send {
            if queue.push(seed).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

pub fn parse_seed_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Periodically re-enqueue records that have sat Pending past the task
/// timeout (lost enqueues, crashed fetches, skipped lock conflicts). State is
/// not touched here; only the controller settles records.
pub fn spawn_retry_scanner(
    storage: Storage,
    url_queue: BoundedQueue<String>,
    scan_period: u32,
    task_timeout: u32,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(u64::from(scan_period.max(1))));
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = rescan_stalled(&storage, &url_queue, task_timeout).await {
                        error!(error = %e, "retry scan failed");
                    }
                }
            }
        }
        debug!("retry scanner stopped");
    })
}

async fn rescan_stalled(
    storage: &Storage,
    url_queue: &BoundedQueue<String>,
    task_timeout: u32,
) -> anyhow::Result<()> {
    let mut tx = storage.begin().await?;
    let cutoff = Utc::now() - chrono::Duration::seconds(i64::from(task_timeout));
    let stalled = tx.pending_older_than(cutoff, MAX_RETRY_BATCH).await?;
    tx.rollback().await?;

    if stalled.is_empty() {
        return Ok(());
    }
    info!(count = stalled.len(), "re-enqueueing stalled records");
    for record in stalled {
        if url_queue.push(record.url).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Periodically poll the pending count; after enough consecutive zero
/// observations, send exactly one finished signal and exit.
pub fn spawn_completion_checker(
    storage: Storage,
    check_period: u32,
    finished: mpsc::Sender<()>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(u64::from(check_period.max(1))));
        let mut zero_streak = 0u32;
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    match count_pending(&storage).await {
                        Ok(0) => {
                            zero_streak += 1;
                            if zero_streak >= QUIESCENT_OBSERVATIONS {
                                info!("no pending records remain, crawl complete");
                                let _ = finished.send(()).await;
                                break;
                            }
                        }
                        Ok(pending) => {
                            zero_streak = 0;
                            debug!(pending, "crawl still active");
                        }
                        Err(e) => {
                            zero_streak = 0;
                            error!(error = %e, "completion check failed");
                        }
                    }
                }
            }
        }
        debug!("completion checker stopped");
    })
}

async fn count_pending(storage: &Storage) -> anyhow::Result<i64> {
    let mut tx = storage.begin().await?;
    let count = tx.pending_count().await?;
    tx.rollback().await?;
    Ok(count)
}
