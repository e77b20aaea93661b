//! Durable job queue with at-least-once delivery.
//!
//! Jobs live in the same SQLite store as the relational rows, so a process
//! restart loses nothing. Delivery semantics:
//! - a claim locks the job for `lock_ms` (visibility timeout);
//! - a job whose lock expired is reclaimable, at most `max_stalled` times,
//!   after which it is dead-lettered;
//! - a failed attempt is rescheduled with a backoff of `backoff_ms x attempt`
//!   capped at `backoff_cap_ms`, up to `max_attempts` attempts total.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::StoreResult;
use crate::Database;

/// Topic all review jobs are published to.
pub const REVIEW_TOPIC: &str = "review-queue";

/// Name carried by every review job.
pub const REVIEW_JOB_NAME: &str = "process-review";

/// Payload of a review job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewJob {
    pub review_id: String,
    pub project_id: i64,
    pub merge_request_iid: i64,
}

/// A job handed to a worker. The lock is held until `complete` or `fail`.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: String,
    /// 1-based attempt number of this execution.
    pub attempt: i64,
    pub job: ReviewJob,
}

/// Outcome of failing a claimed job.
#[derive(Debug, Clone)]
pub enum FailOutcome {
    /// The job was rescheduled; it becomes runnable at `run_at` (epoch ms).
    Retried { run_at: i64 },
    /// All attempts are used up; the job was removed.
    Exhausted { job: ReviewJob },
}

/// Queue tunables. Lock duration and stalled policy are parameters, not
/// properties of a particular backend.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub topic: String,
    pub lock_ms: i64,
    pub max_stalled: i64,
    pub max_attempts: i64,
    pub backoff_ms: i64,
    pub backoff_cap_ms: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: REVIEW_TOPIC.to_string(),
            lock_ms: 30_000,
            max_stalled: 1,
            max_attempts: 3,
            backoff_ms: 50,
            backoff_cap_ms: 2_000,
        }
    }
}

impl Database {
    /// Enqueues a review job and returns its id.
    pub fn enqueue(&self, cfg: &QueueConfig, job: &ReviewJob) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(job)?;
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO jobs (id, topic, name, payload, attempts, max_attempts, run_at, \
             locked_until, stalled_count, created_at) \
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, NULL, 0, ?7)",
            params![
                id,
                cfg.topic,
                REVIEW_JOB_NAME,
                payload,
                cfg.max_attempts,
                now.timestamp_millis(),
                now.to_rfc3339()
            ],
        )?;
        debug!(job_id = %id, review_id = %job.review_id, "job enqueued");
        Ok(id)
    }

    /// Removes jobs that stalled past their reclaim budget and returns their
    /// payloads so the caller can fail the associated reviews.
    pub fn reap_dead_jobs(&self, cfg: &QueueConfig, now_ms: i64) -> StoreResult<Vec<ReviewJob>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, payload FROM jobs \
             WHERE topic = ?1 AND locked_until IS NOT NULL AND locked_until <= ?2 \
             AND stalled_count >= ?3",
        )?;
        let rows: Vec<(String, String)> = stmt
            .query_map(params![cfg.topic, now_ms, cfg.max_stalled], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        let mut dead = Vec::with_capacity(rows.len());
        for (id, payload) in rows {
            conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
            let job: ReviewJob = serde_json::from_str(&payload)?;
            debug!(job_id = %id, review_id = %job.review_id, "job dead-lettered after stalls");
            dead.push(job);
        }
        Ok(dead)
    }

    /// Claims the oldest runnable job, locking it for `cfg.lock_ms`.
    ///
    /// A job whose previous lock expired counts one stall on reclaim. Returns
    /// `None` when nothing is runnable.
    pub fn claim(&self, cfg: &QueueConfig, now_ms: i64) -> StoreResult<Option<ClaimedJob>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let candidate: Option<(String, String, i64, Option<i64>)> = tx
            .query_row(
                "SELECT id, payload, attempts, locked_until FROM jobs \
                 WHERE topic = ?1 AND run_at <= ?2 \
                 AND (locked_until IS NULL OR locked_until <= ?2) \
                 ORDER BY run_at ASC LIMIT 1",
                params![cfg.topic, now_ms],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((id, payload, attempts, locked_until)) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        let stalled = locked_until.is_some();
        tx.execute(
            "UPDATE jobs SET locked_until = ?2, \
             stalled_count = stalled_count + ?3 \
             WHERE id = ?1",
            params![id, now_ms + cfg.lock_ms, if stalled { 1 } else { 0 }],
        )?;
        tx.commit()?;

        let job: ReviewJob = serde_json::from_str(&payload)?;
        Ok(Some(ClaimedJob {
            id,
            attempt: attempts + 1,
            job,
        }))
    }

    /// Acknowledges a successful job: removes it from the queue.
    pub fn complete(&self, job_id: &str) -> StoreResult<()> {
        self.conn()
            .execute("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
        Ok(())
    }

    /// Records a failed attempt. Either reschedules with backoff or, when the
    /// attempt budget is spent, removes the job and reports exhaustion.
    pub fn fail(&self, cfg: &QueueConfig, job_id: &str, now_ms: i64) -> StoreResult<FailOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let (payload, attempts): (String, i64) = tx.query_row(
            "SELECT payload, attempts FROM jobs WHERE id = ?1",
            params![job_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let attempts = attempts + 1;

        if attempts >= cfg.max_attempts {
            tx.execute("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
            tx.commit()?;
            let job: ReviewJob = serde_json::from_str(&payload)?;
            return Ok(FailOutcome::Exhausted { job });
        }

        let backoff = (cfg.backoff_ms * attempts).min(cfg.backoff_cap_ms);
        let run_at = now_ms + backoff;
        tx.execute(
            "UPDATE jobs SET attempts = ?2, run_at = ?3, locked_until = NULL WHERE id = ?1",
            params![job_id, attempts, run_at],
        )?;
        tx.commit()?;
        Ok(FailOutcome::Retried { run_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn job(review_id: &str) -> ReviewJob {
        ReviewJob {
            review_id: review_id.into(),
            project_id: 42,
            merge_request_iid: 3,
        }
    }

    #[test]
    fn payload_uses_camel_case_wire_names() {
        let json = serde_json::to_value(job("r1")).unwrap();
        assert!(json.get("reviewId").is_some());
        assert!(json.get("projectId").is_some());
        assert!(json.get("mergeRequestIid").is_some());
    }

    #[test]
    fn claim_locks_for_the_visibility_window() {
        let db = db();
        let cfg = QueueConfig::default();
        db.enqueue(&cfg, &job("r1")).unwrap();

        let claimed = db.claim(&cfg, 1_000).unwrap().unwrap();
        assert_eq!(claimed.attempt, 1);
        assert_eq!(claimed.job, job("r1"));

        // Still locked inside the window.
        assert!(db.claim(&cfg, 1_000 + cfg.lock_ms - 1).unwrap().is_none());
        // Reclaimable after the lock expires.
        let reclaimed = db.claim(&cfg, 1_000 + cfg.lock_ms).unwrap().unwrap();
        assert_eq!(reclaimed.id, claimed.id);
    }

    #[test]
    fn one_stalled_reclaim_then_dead_letter() {
        let db = db();
        let cfg = QueueConfig::default();
        db.enqueue(&cfg, &job("r1")).unwrap();

        let t0 = 0;
        db.claim(&cfg, t0).unwrap().unwrap();
        // First stall: reclaim allowed.
        assert!(db.reap_dead_jobs(&cfg, t0 + cfg.lock_ms).unwrap().is_empty());
        db.claim(&cfg, t0 + cfg.lock_ms).unwrap().unwrap();
        // Second stall: over budget, dead-lettered.
        let dead = db.reap_dead_jobs(&cfg, t0 + 2 * cfg.lock_ms).unwrap();
        assert_eq!(dead, vec![job("r1")]);
        assert!(db.claim(&cfg, t0 + 2 * cfg.lock_ms).unwrap().is_none());
    }

    #[test]
    fn fail_backs_off_linearly_and_exhausts_after_max_attempts() {
        let db = db();
        let cfg = QueueConfig::default();
        db.enqueue(&cfg, &job("r1")).unwrap();

        let c1 = db.claim(&cfg, 0).unwrap().unwrap();
        match db.fail(&cfg, &c1.id, 0).unwrap() {
            FailOutcome::Retried { run_at } => assert_eq!(run_at, 50),
            other => panic!("expected retry, got {other:?}"),
        }

        // Not runnable before its backoff elapses.
        assert!(db.claim(&cfg, 49).unwrap().is_none());
        let c2 = db.claim(&cfg, 50).unwrap().unwrap();
        assert_eq!(c2.attempt, 2);
        match db.fail(&cfg, &c2.id, 50).unwrap() {
            FailOutcome::Retried { run_at } => assert_eq!(run_at, 150),
            other => panic!("expected retry, got {other:?}"),
        }

        let c3 = db.claim(&cfg, 200).unwrap().unwrap();
        assert_eq!(c3.attempt, 3);
        match db.fail(&cfg, &c3.id, 200).unwrap() {
            FailOutcome::Exhausted { job: dead } => assert_eq!(dead, job("r1")),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert!(db.claim(&cfg, 10_000).unwrap().is_none());
    }

    #[test]
    fn jobs_survive_a_process_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.db");
        let cfg = QueueConfig::default();
        {
            let db = Database::open(&path).unwrap();
            db.initialize().unwrap();
            db.enqueue(&cfg, &job("r1")).unwrap();
        }

        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        let now = Utc::now().timestamp_millis() + 1_000;
        let claimed = db.claim(&cfg, now).unwrap().unwrap();
        assert_eq!(claimed.job, job("r1"));
    }

    #[test]
    fn completed_jobs_are_gone() {
        let db = db();
        let cfg = QueueConfig::default();
        db.enqueue(&cfg, &job("r1")).unwrap();
        let claimed = db.claim(&cfg, 0).unwrap().unwrap();
        db.complete(&claimed.id).unwrap();
        assert!(db.claim(&cfg, cfg.lock_ms * 10).unwrap().is_none());
    }
}
