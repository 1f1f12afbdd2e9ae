mod cli;
mod crawl;
mod pool;
mod tasks;

use anyhow::{Context, Result};
use clap::Parser;

// Prevent memory bloat under high worker concurrency (glibc malloc holds on
// to freed pages).
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use crawld_core::config::LogConfig;
use crawld_core::AppConfig;

use crate::cli::Cli;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config))?;

    init_logging(&config.log);

    crawl::run_crawl(config).await
}

fn init_logging(log: &LogConfig) {
    // RUST_LOG wins over the configured level.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log.level_filter()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.context {
        builder.with_file(true).with_line_number(true).init();
    } else {
        builder.init();
    }
}
