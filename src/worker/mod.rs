pub mod runner;
pub mod thumbnail;
pub mod transcode;
pub mod transcribe;

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::database::{Database, JobType};
use crate::error::PipelineError;

/// Dispatch seam between the worker loop and the media handlers. A handler
/// receives only the lecture id and reads whatever source data it needs.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job_type: JobType, lecture_id: i64) -> Result<(), PipelineError>;
}

/// Single-process job scheduler: drains pending jobs FIFO, dispatches each
/// to the runner, and records the terminal state.
///
/// The running flag is owned by this object, not a module global; `start`
/// is an idempotent no-op once a loop is live, so a process can never run
/// two loops that double-claim jobs.
pub struct JobWorker {
    db: Arc<Database>,
    runner: Arc<dyn JobRunner>,
    poll_interval: Duration,
    running: AtomicBool,
}

impl JobWorker {
    pub fn new(db: Arc<Database>, runner: Arc<dyn JobRunner>, poll_interval: Duration) -> Self {
        Self {
            db,
            runner,
            poll_interval,
            running: AtomicBool::new(false),
        }
    }

    /// Spawn the background loop. Returns false (and does nothing) if this
    /// worker is already running. There is no stop primitive; the loop ends
    /// with the process.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::info!("Job worker already running, start is a no-op");
            return false;
        }

        let worker = self.clone();
        tokio::spawn(async move {
            log::info!("Job worker started");

            // Recover jobs orphaned in "processing" by a previous run
            if let Err(e) = worker.db.reset_stuck_jobs() {
                log::warn!("Failed to reset stuck jobs: {}", e);
            }

            loop {
                match worker.drain_pending().await {
                    Ok(0) => {}
                    Ok(n) => log::info!("Drain pass processed {} jobs", n),
                    Err(e) => log::error!("Drain pass aborted: {}", e),
                }
                tokio::time::sleep(worker.poll_interval).await;
            }
        });
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One drain pass over the queue. Jobs run sequentially: the downstream
    /// tooling is CPU- and network-heavy, so unbounded fan-out would starve
    /// the box or trip API rate limits.
    ///
    /// Errors returned here are store-level only; a handler failure is
    /// recorded on its job and never aborts the pass.
    pub async fn drain_pending(&self) -> Result<usize, PipelineError> {
        let pending = self.db.get_pending_jobs()?;
        let mut processed = 0usize;

        for job in pending {
            // The claim is the atomic gate: if another pass got here first,
            // the conditional update loses and we move on.
            if !self.db.claim_job(job.id)? {
                continue;
            }
            processed += 1;

            log::info!(
                "Processing {} job {} for lecture {}",
                job.job_type,
                job.id,
                job.lecture_id
            );
            match self.runner.run(job.job_type, job.lecture_id).await {
                Ok(()) => {
                    self.db.complete_job(job.id)?;
                    log::info!("Job {} completed", job.id);
                }
                Err(e) => {
                    log::error!("Job {} failed: {}", job.id, e);
                    self.db.fail_job(job.id, &e.to_string())?;
                }
            }
        }

        Ok(processed)
    }
}

/// Run an external tool with a typed argument list and map a non-zero exit
/// onto the subprocess error kind. Arguments never pass through a shell.
pub(crate) async fn run_tool(
    program: &Path,
    args: &[OsString],
    stage: &str,
) -> Result<(), PipelineError> {
    log::info!("[{}] running {:?}", stage, program);

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| PipelineError::Subprocess {
            stage: stage.to_string(),
            status: "spawn failed".to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Subprocess {
            stage: stage.to_string(),
            status: output.status.to_string(),
            stderr: tail(&stderr, 400),
        });
    }
    Ok(())
}

/// Last `max_chars` characters of a tool's stderr — the useful part.
fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.trim().to_string();
    }
    text.chars()
        .skip(count - max_chars)
        .collect::<String>()
        .trim()
        .to_string()
}
