//! Repositories over the relational rows.
//!
//! Upserts follow the webhook identity rules: projects by forge project id,
//! developers by username. The intake path runs as one transaction so a
//! webhook either lands completely or not at all.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};
use crate::models::{IntakeOutcome, ReviewCompletion, ReviewRow, ReviewStatus, WebhookIntake};
use crate::Database;

pub trait ProjectRepository {
    /// Upserts a project by its forge project id and returns the internal id.
    /// On create the row is seeded with `webhook_secret` and marked active;
    /// on update only name, namespace, and the timestamp move.
    fn upsert_project(
        &self,
        forge_project_id: i64,
        name: &str,
        namespace: &str,
        webhook_secret: &str,
    ) -> StoreResult<String>;
}

pub trait DeveloperRepository {
    /// Upserts a developer by username and returns the internal id. The forge
    /// user id, display name, email, and avatar are all updatable.
    fn upsert_developer(
        &self,
        forge_user_id: i64,
        username: &str,
        name: &str,
        email: Option<&str>,
        avatar_url: Option<&str>,
    ) -> StoreResult<String>;
}

pub trait ReviewRepository {
    fn find_review(&self, id: &str) -> StoreResult<Option<ReviewRow>>;

    fn find_review_by_merge_request(
        &self,
        merge_request_id: i64,
        project_id: &str,
    ) -> StoreResult<Option<ReviewRow>>;

    /// Moves a review into PROCESSING. Legal from PENDING, and from
    /// PROCESSING itself so a redelivered job can re-enter the pipeline.
    fn mark_processing(&self, id: &str) -> StoreResult<()>;

    /// Terminal transition from PROCESSING with the final scores and content.
    fn mark_completed(&self, id: &str, completion: &ReviewCompletion) -> StoreResult<()>;

    /// Terminal transition from PROCESSING when no review work was done.
    fn mark_skipped(&self, id: &str, content: &serde_json::Value) -> StoreResult<()>;

    /// Terminal failure. Legal from PENDING or PROCESSING so a job that died
    /// before its first transition can still be closed out.
    fn mark_failed(&self, id: &str) -> StoreResult<()>;
}

impl ProjectRepository for Database {
    fn upsert_project(
        &self,
        forge_project_id: i64,
        name: &str,
        namespace: &str,
        webhook_secret: &str,
    ) -> StoreResult<String> {
        let conn = self.conn();
        upsert_project_on(&conn, forge_project_id, name, namespace, webhook_secret)
    }
}

impl DeveloperRepository for Database {
    fn upsert_developer(
        &self,
        forge_user_id: i64,
        username: &str,
        name: &str,
        email: Option<&str>,
        avatar_url: Option<&str>,
    ) -> StoreResult<String> {
        let conn = self.conn();
        upsert_developer_on(&conn, forge_user_id, username, name, email, avatar_url)
    }
}

impl ReviewRepository for Database {
    fn find_review(&self, id: &str) -> StoreResult<Option<ReviewRow>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"),
            params![id],
            map_review_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn find_review_by_merge_request(
        &self,
        merge_request_id: i64,
        project_id: &str,
    ) -> StoreResult<Option<ReviewRow>> {
        let conn = self.conn();
        find_review_by_mr_on(&conn, merge_request_id, project_id)
    }

    fn mark_processing(&self, id: &str) -> StoreResult<()> {
        self.transition(id, ReviewStatus::Processing, &["PENDING", "PROCESSING"])
    }

    fn mark_completed(&self, id: &str, completion: &ReviewCompletion) -> StoreResult<()> {
        let content = serde_json::to_string(&completion.review_content)?;
        let now = Utc::now().to_rfc3339();
        let affected = self.conn().execute(
            "UPDATE reviews SET status = 'COMPLETED', quality_score = ?2, issues_found = ?3, \
             suggestions_count = ?4, review_content = ?5, updated_at = ?6 \
             WHERE id = ?1 AND status = 'PROCESSING'",
            params![
                id,
                completion.quality_score,
                completion.issues_found,
                completion.suggestions_count,
                content,
                now
            ],
        )?;
        self.check_transitioned(id, affected, "COMPLETED")
    }

    fn mark_skipped(&self, id: &str, content: &serde_json::Value) -> StoreResult<()> {
        let content = serde_json::to_string(content)?;
        let now = Utc::now().to_rfc3339();
        let affected = self.conn().execute(
            "UPDATE reviews SET status = 'SKIPPED', review_content = ?2, updated_at = ?3 \
             WHERE id = ?1 AND status = 'PROCESSING'",
            params![id, content, now],
        )?;
        self.check_transitioned(id, affected, "SKIPPED")
    }

    fn mark_failed(&self, id: &str) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let affected = self.conn().execute(
            "UPDATE reviews SET status = 'FAILED', updated_at = ?2 \
             WHERE id = ?1 AND status IN ('PENDING', 'PROCESSING')",
            params![id, now],
        )?;
        self.check_transitioned(id, affected, "FAILED")
    }
}

impl Database {
    /// Records an inbound merge-request webhook in one transaction:
    /// project upsert, developer upsert, then find-or-create of the review.
    /// A review that already exists for `(merge_request_id, project_id)`
    /// short-circuits without creating a duplicate.
    pub fn record_merge_request(&self, intake: &WebhookIntake) -> StoreResult<IntakeOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let project_id = upsert_project_on(
            &tx,
            intake.forge_project_id,
            &intake.project_name,
            &intake.project_namespace,
            &intake.webhook_secret,
        )?;
        let developer_id = upsert_developer_on(
            &tx,
            intake.forge_user_id,
            &intake.username,
            &intake.developer_name,
            intake.email.as_deref(),
            intake.avatar_url.as_deref(),
        )?;

        if let Some(existing) = find_review_by_mr_on(&tx, intake.merge_request_id, &project_id)? {
            tx.commit()?;
            return Ok(IntakeOutcome {
                review_id: existing.id,
                created: false,
            });
        }

        let review_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO reviews (id, merge_request_id, merge_request_iid, project_id, \
             developer_id, title, description, source_url, source_branch, target_branch, \
             status, review_content, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'PENDING', '{}', ?11, ?11)",
            params![
                review_id,
                intake.merge_request_id,
                intake.merge_request_iid,
                project_id,
                developer_id,
                intake.title,
                intake.description,
                intake.source_url,
                intake.source_branch,
                intake.target_branch,
                now
            ],
        )?;
        tx.commit()?;

        Ok(IntakeOutcome {
            review_id,
            created: true,
        })
    }

    fn transition(&self, id: &str, to: ReviewStatus, from: &[&str]) -> StoreResult<()> {
        let placeholders = from
            .iter()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let now = Utc::now().to_rfc3339();
        let affected = self.conn().execute(
            &format!(
                "UPDATE reviews SET status = ?2, updated_at = ?3 \
                 WHERE id = ?1 AND status IN ({placeholders})"
            ),
            params![id, to.as_str(), now],
        )?;
        self.check_transitioned(id, affected, to.as_str())
    }

    fn check_transitioned(&self, id: &str, affected: usize, to: &'static str) -> StoreResult<()> {
        if affected == 1 {
            return Ok(());
        }
        let exists: bool = self.conn().query_row(
            "SELECT COUNT(*) > 0 FROM reviews WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            Err(StoreError::IllegalTransition {
                id: id.to_string(),
                to,
            })
        } else {
            Err(StoreError::NotFound(format!("review {id}")))
        }
    }
}

const REVIEW_COLUMNS: &str = "id, merge_request_id, merge_request_iid, project_id, developer_id, \
     title, source_url, source_branch, target_branch, status, review_content, quality_score, \
     issues_found, suggestions_count";

fn map_review_row(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    let status_text: String = row.get(9)?;
    let content_text: String = row.get(10)?;
    Ok(ReviewRow {
        id: row.get(0)?,
        merge_request_id: row.get(1)?,
        merge_request_iid: row.get(2)?,
        project_id: row.get(3)?,
        developer_id: row.get(4)?,
        title: row.get(5)?,
        source_url: row.get(6)?,
        source_branch: row.get(7)?,
        target_branch: row.get(8)?,
        status: ReviewStatus::parse(&status_text).unwrap_or(ReviewStatus::Pending),
        review_content: serde_json::from_str(&content_text).unwrap_or(serde_json::Value::Null),
        quality_score: row.get(11)?,
        issues_found: row.get(12)?,
        suggestions_count: row.get(13)?,
    })
}

fn upsert_project_on(
    conn: &Connection,
    forge_project_id: i64,
    name: &str,
    namespace: &str,
    webhook_secret: &str,
) -> StoreResult<String> {
    let now = Utc::now().to_rfc3339();
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO projects (id, forge_project_id, name, namespace, webhook_secret, is_active, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6) \
         ON CONFLICT(forge_project_id) DO UPDATE SET \
         name = excluded.name, namespace = excluded.namespace, updated_at = excluded.updated_at",
        params![id, forge_project_id, name, namespace, webhook_secret, now],
    )?;
    let id = conn.query_row(
        "SELECT id FROM projects WHERE forge_project_id = ?1",
        params![forge_project_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn upsert_developer_on(
    conn: &Connection,
    forge_user_id: i64,
    username: &str,
    name: &str,
    email: Option<&str>,
    avatar_url: Option<&str>,
) -> StoreResult<String> {
    let now = Utc::now().to_rfc3339();
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO developers (id, forge_user_id, username, name, email, avatar_url, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
         ON CONFLICT(username) DO UPDATE SET \
         forge_user_id = excluded.forge_user_id, name = excluded.name, \
         email = excluded.email, avatar_url = excluded.avatar_url, \
         updated_at = excluded.updated_at",
        params![id, forge_user_id, username, name, email, avatar_url, now],
    )?;
    let id = conn.query_row(
        "SELECT id FROM developers WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn find_review_by_mr_on(
    conn: &Connection,
    merge_request_id: i64,
    project_id: &str,
) -> StoreResult<Option<ReviewRow>> {
    conn.query_row(
        &format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews \
             WHERE merge_request_id = ?1 AND project_id = ?2"
        ),
        params![merge_request_id, project_id],
        map_review_row,
    )
    .optional()
    .map_err(Into::into)
}
