//! Pipeline assembly: three bounded queues, three worker pools, the
//! orchestrator subtasks, and the shared shutdown path for SIGINT and
//! crawl completion.

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crawld_controller::Controller;
use crawld_core::{AppConfig, PageInfo, ParsedPageInfo};
use crawld_fetch::Downloader;
use crawld_queue::BoundedQueue;
use crawld_store::{FileStore, Storage};

use crate::pool::WorkerPool;
use crate::tasks;

pub async fn run_crawl(config: AppConfig) -> Result<()> {
    // Every controller holds a connection inside its transaction, so the pool
    // scales with the worker count plus headroom for the orchestrator tasks.
    let total_workers = config.downloader.worker + config.analyzer.worker + config.controller.worker;
    let pool_size = (total_workers + 5).max(10);
    let storage = Storage::connect(&config.database.url, pool_size)
        .await
        .context("connect to database")?;
    storage.run_migrations().await.context("run migrations")?;

    let files = FileStore::new(&config.storage.location);

    let url_queue: BoundedQueue<String> =
        BoundedQueue::new(config.core.url_queue_size as usize);
    let page_queue: BoundedQueue<PageInfo> =
        BoundedQueue::new(config.core.page_info_queue_size as usize);
    let parsed_queue: BoundedQueue<ParsedPageInfo> =
        BoundedQueue::new(config.core.parsed_page_info_queue_size as usize);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (finished_tx, mut finished_rx) = mpsc::channel::<()>(1);

    info!(
        downloaders = config.downloader.worker,
        analyzers = config.analyzer.worker,
        controllers = config.controller.worker,
        depth = config.controller.depth,
        "starting pipeline"
    );

    let downloaders = {
        let url_queue = url_queue.clone();
        let page_queue = page_queue.clone();
        let shutdown = shutdown_tx.clone();
        let timeout = config.downloader.timeout;
        let retry = config.downloader.retry;
        WorkerPool::spawn(config.downloader.worker, move |worker_id| {
            let url_queue = url_queue.clone();
            let page_queue = page_queue.clone();
            let mut shutdown = shutdown.subscribe();
            async move {
                let downloader = match Downloader::new(timeout, retry) {
                    Ok(downloader) => downloader,
                    Err(e) => {
                        error!(worker_id, error = %e, "cannot build http client");
                        return;
                    }
                };
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        url = url_queue.pop() => {
                            let Some(url) = url else { break };
                            let page = downloader.download(&url).await;
                            tokio::select! {
                                _ = shutdown.recv() => break,
                                pushed = page_queue.push(page) => {
                                    if pushed.is_err() { break; }
                                }
                            }
                        }
                    }
                }
                debug!(worker_id, "downloader worker stopped");
            }
        })
    };

    let analyzers = {
        let page_queue = page_queue.clone();
        let parsed_queue = parsed_queue.clone();
        let shutdown = shutdown_tx.clone();
        WorkerPool::spawn(config.analyzer.worker, move |worker_id| {
            let page_queue = page_queue.clone();
            let parsed_queue = parsed_queue.clone();
            let mut shutdown = shutdown.subscribe();
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        page = page_queue.pop() => {
                            let Some(page) = page else { break };
                            let parsed = crawld_parser::analyze(page);
                            tokio::select! {
                                _ = shutdown.recv() => break,
                                pushed = parsed_queue.push(parsed) => {
                                    if pushed.is_err() { break; }
                                }
                            }
                        }
                    }
                }
                debug!(worker_id, "analyzer worker stopped");
            }
        })
    };

    let controllers = {
        let parsed_queue = parsed_queue.clone();
        let url_queue = url_queue.clone();
        let shutdown = shutdown_tx.clone();
        let storage = storage.clone();
        let files = files.clone();
        let depth = config.controller.depth;
        WorkerPool::spawn(config.controller.worker, move |worker_id| {
            let parsed_queue = parsed_queue.clone();
            let url_queue = url_queue.clone();
            let mut shutdown = shutdown.subscribe();
            let controller = Controller::new(depth, storage.clone(), files.clone());
            async move {
                'outer: loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        parsed = parsed_queue.pop() => {
                            let Some(parsed) = parsed else { break };
                            // One request fans out into many discovered URLs.
                            let new_urls = controller.process(parsed).await;
                            for url in new_urls {
                                tokio::select! {
                                    _ = shutdown.recv() => break 'outer,
                                    pushed = url_queue.push(url) => {
                                        if pushed.is_err() { break 'outer; }
                                    }
                                }
                            }
                        }
                    }
                }
                debug!(worker_id, "controller worker stopped");
            }
        })
    };

    tasks::ingest_seeds(&storage, &url_queue, &config.core.seed_file_path)
        .await
        .context("ingest seeds")?;

    let scanner = tasks::spawn_retry_scanner(
        storage.clone(),
        url_queue.clone(),
        config.core.retry_task_scan_period,
        config.core.task_timeout,
        shutdown_tx.subscribe(),
    );
    let checker = tasks::spawn_completion_checker(
        storage.clone(),
        config.core.check_completed_period,
        finished_tx,
        shutdown_tx.subscribe(),
    );

    tokio::select! {
        _ = signal::ctrl_c() => warn!("interrupt received, server gonna stop"),
        _ = finished_rx.recv() => info!("task finished, server gonna stop"),
    }

    let _ = shutdown_tx.send(());
    url_queue.close();
    page_queue.close();
    parsed_queue.close();

    downloaders.stop().await;
    analyzers.stop().await;
    controllers.stop().await;
    let _ = scanner.await;
    let _ = checker.await;
    storage.close().await;

    info!("shutdown complete");
    Ok(())
}
