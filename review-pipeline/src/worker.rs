//! Queue worker loop.
//!
//! Each worker owns one job at a time: claim, run the orchestrator, then ack
//! or fail. Jobs whose attempts are exhausted (and jobs dead-lettered after
//! stalling) mark their review FAILED. Delivery is at-least-once; a job
//! reclaimed after its visibility window may run twice, which the pipeline
//! tolerates.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use storage::queue::{FailOutcome, QueueConfig, ReviewJob};
use storage::repository::ReviewRepository;
use storage::Database;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::orchestrator::Orchestrator;

/// Sleep between polls when the queue is empty.
const IDLE_POLL_MS: u64 = 500;

/// Spawns `count` workers consuming the review queue.
pub fn spawn_workers(
    count: usize,
    db: Arc<Database>,
    orchestrator: Arc<Orchestrator>,
) -> Vec<JoinHandle<()>> {
    let cfg = Arc::new(QueueConfig::default());
    (0..count.max(1))
        .map(|worker| {
            let db = db.clone();
            let orchestrator = orchestrator.clone();
            let cfg = cfg.clone();
            tokio::spawn(async move {
                info!(worker, "review worker started");
                run_worker(worker, &cfg, db, orchestrator).await;
            })
        })
        .collect()
}

async fn run_worker(worker: usize, cfg: &QueueConfig, db: Arc<Database>, orchestrator: Arc<Orchestrator>) {
    loop {
        let now_ms = Utc::now().timestamp_millis();

        match db.reap_dead_jobs(cfg, now_ms) {
            Ok(dead) => {
                for job in dead {
                    warn!(worker, review_id = %job.review_id, "job stalled past budget, failing review");
                    fail_review(&db, &job);
                }
            }
            Err(e) => error!(worker, error = %e, "reaping dead jobs failed"),
        }

        let claimed = match db.claim(cfg, now_ms) {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(IDLE_POLL_MS)).await;
                continue;
            }
            Err(e) => {
                error!(worker, error = %e, "queue claim failed");
                tokio::time::sleep(Duration::from_millis(IDLE_POLL_MS)).await;
                continue;
            }
        };

        debug!(
            worker,
            job_id = %claimed.id,
            attempt = claimed.attempt,
            review_id = %claimed.job.review_id,
            "processing job"
        );

        match orchestrator.process(&claimed.job).await {
            Ok(()) => {
                if let Err(e) = db.complete(&claimed.id) {
                    error!(worker, job_id = %claimed.id, error = %e, "job ack failed");
                }
            }
            Err(e) => {
                warn!(
                    worker,
                    job_id = %claimed.id,
                    attempt = claimed.attempt,
                    error = %e,
                    "job failed"
                );
                let now_ms = Utc::now().timestamp_millis();
                match db.fail(cfg, &claimed.id, now_ms) {
                    Ok(FailOutcome::Retried { run_at }) => {
                        debug!(worker, job_id = %claimed.id, run_at, "job rescheduled");
                    }
                    Ok(FailOutcome::Exhausted { job }) => {
                        warn!(worker, review_id = %job.review_id, "job attempts exhausted, failing review");
                        fail_review(&db, &job);
                    }
                    Err(e) => error!(worker, job_id = %claimed.id, error = %e, "job fail bookkeeping failed"),
                }
            }
        }
    }
}

fn fail_review(db: &Database, job: &ReviewJob) {
    if let Err(e) = db.mark_failed(&job.review_id) {
        // Already terminal (e.g. completed by a concurrent duplicate) is fine.
        debug!(review_id = %job.review_id, error = %e, "could not mark review failed");
    }
}
