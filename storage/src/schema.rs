//! Idempotent table creation.

use rusqlite::Connection;

use crate::errors::StoreResult;

pub fn create_tables(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id                TEXT PRIMARY KEY,
            forge_project_id  INTEGER NOT NULL UNIQUE,
            name              TEXT NOT NULL,
            namespace         TEXT NOT NULL,
            webhook_secret    TEXT NOT NULL,
            is_active         INTEGER NOT NULL DEFAULT 1,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS developers (
            id             TEXT PRIMARY KEY,
            forge_user_id  INTEGER NOT NULL,
            username       TEXT NOT NULL UNIQUE,
            name           TEXT NOT NULL,
            email          TEXT,
            avatar_url     TEXT,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reviews (
            id                 TEXT PRIMARY KEY,
            merge_request_id   INTEGER NOT NULL,
            merge_request_iid  INTEGER NOT NULL,
            project_id         TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            developer_id       TEXT NOT NULL REFERENCES developers(id),
            title              TEXT NOT NULL,
            description        TEXT,
            source_url         TEXT NOT NULL,
            source_branch      TEXT NOT NULL,
            target_branch      TEXT NOT NULL,
            status             TEXT NOT NULL DEFAULT 'PENDING',
            review_content     TEXT NOT NULL DEFAULT '{}',
            quality_score      INTEGER,
            issues_found       INTEGER NOT NULL DEFAULT 0,
            suggestions_count  INTEGER NOT NULL DEFAULT 0,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL,
            UNIQUE (merge_request_id, project_id)
        );

        CREATE TABLE IF NOT EXISTS jobs (
            id             TEXT PRIMARY KEY,
            topic          TEXT NOT NULL,
            name           TEXT NOT NULL,
            payload        TEXT NOT NULL,
            attempts       INTEGER NOT NULL DEFAULT 0,
            max_attempts   INTEGER NOT NULL,
            run_at         INTEGER NOT NULL,
            locked_until   INTEGER,
            stalled_count  INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_topic_run_at ON jobs(topic, run_at);
        CREATE INDEX IF NOT EXISTS idx_reviews_project ON reviews(project_id);
        ",
    )?;
    Ok(())
}
