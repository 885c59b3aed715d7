//! Worker daemon: loads configuration, opens the store, queues any missing
//! derived work, and runs the job loop until the process is stopped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use lecture_pipeline::{
    AiClient, Config, Database, JobQueue, JobWorker, LocalObjectStore, MediaPipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // fmt's log bridge routes the library's `log` records through tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    log::info!("Opening database at {:?}", db_path);
    let db = Arc::new(Database::new(&db_path)?);

    let store = Arc::new(LocalObjectStore::new(
        config.storage.root.clone(),
        config.storage.public_base_url.clone(),
    ));
    let ai = Arc::new(AiClient::new(&config.ai));

    let runner = Arc::new(MediaPipeline::new(
        db.clone(),
        store.clone(),
        ai,
        config.media.clone(),
        config.vectors.clone(),
    ));

    // Catch up on work that accumulated while the daemon was down
    let queue = JobQueue::new(db.clone(), store);
    match queue.queue_missing_for_all_lectures().await {
        Ok(report) => log::info!(
            "Startup scan queued {} jobs ({} lectures skipped)",
            report.queued.len(),
            report.skipped_missing_video.len()
        ),
        Err(e) => log::warn!("Startup missing-work scan failed: {}", e),
    }

    let worker = Arc::new(JobWorker::new(
        db,
        runner,
        Duration::from_secs(config.worker.poll_interval_secs),
    ));
    worker.start();

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    Ok(())
}
