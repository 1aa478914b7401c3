//! `aqlabd`: the background daemon that runs the Scheduler and the
//! Analysis/Probe worker pool. No HTTP listener here; the query/mutation
//! API is an external collaborator driven through `aqlab_core::store`.

use aqlab_common::config::Config;
use aqlab_core::analysis::AudioscanExecutor;
use aqlab_core::probe::AnalyzeExecutor;
use aqlab_core::queue::WorkerPool;
use aqlab_core::scanner::Scanner;
use aqlab_core::scheduler::Scheduler;
use aqlab_core::store::{JobType, Store};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "aqlabd", about = "Background scanner, prober, and analysis worker")]
struct Args {
    /// Path to a TOML config file. Defaults to the platform config dir.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let store = Store::connect(std::path::Path::new(&config.database.dsn)).await?;
    tracing::info!(dsn = %config.database.dsn, "store connected");

    let reaped = store.reap_stranded_jobs().await?;
    if reaped > 0 {
        tracing::warn!(count = reaped, "reaped jobs stranded running from a prior crash");
    }

    let mut pool = WorkerPool::new(
        store.clone(),
        config.scanner.worker_count,
        std::time::Duration::from_secs(2),
    );
    pool.register_executor(
        JobType::Analyze,
        Arc::new(AnalyzeExecutor::new(store.clone(), config.tools.prober_path.clone())),
    );
    pool.register_executor(
        JobType::Audioscan,
        Arc::new(AudioscanExecutor::new(
            store.clone(),
            Arc::new(aqlab_core::analysis::decode::ProcessDecodeRunner {
                decoder_path: config.tools.decoder_path.clone(),
            }),
            config.storage.artifacts_path.clone(),
            config.analysis.clone(),
        )),
    );

    let scheduler = Scheduler::new(store.clone(), Scanner::new());
    let cancel = CancellationToken::new();

    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_cancel).await });

    let pool_cancel = cancel.clone();
    let pool_handle = tokio::spawn(async move { pool.run(pool_cancel).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    cancel.cancel();

    let _ = scheduler_handle.await;
    let _ = pool_handle.await;

    Ok(())
}
