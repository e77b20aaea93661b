//! Per-job review pipeline.
//!
//! Stages, in order: mark PROCESSING, short-circuit when the LLM is
//! disabled, fetch MR details and the cumulative diff, chunk with context,
//! decide batched-vs-individual review, verify every reported issue, post
//! inline discussions for medium+ issues, post the summary note, persist the
//! scored result.
//!
//! Failure layers: inline posts are logged and swallowed; LLM trouble is an
//! empty review (handled upstream); anything else propagates and fails the
//! job, which the queue retries at-least-once. Duplicate comments on
//! re-execution are accepted.

use std::sync::Arc;

use serde_json::json;
use storage::models::ReviewCompletion;
use storage::queue::ReviewJob;
use storage::repository::ReviewRepository;
use storage::Database;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::context::build_file_context;
use crate::diff::{process_diffs, DiffChunk};
use crate::errors::PipelineResult;
use crate::forge::{ForgeClient, InlinePosition};
use crate::review::types::{Issue, ReviewOutcome};
use crate::review::Reviewer;
use crate::summary::{build_summary, quality_score};
use crate::verify::Verifier;

/// At most this many files of a diff are reviewed; the rest only count
/// toward the large-MR warning.
const MAX_FILES: usize = 50;

/// Context radius used for chunking and per-chunk file context.
const CONTEXT_LINES: usize = 10;

/// A merge request at or below this many changed lines (with more than one
/// chunk) is reviewed in a single batched call.
const BATCH_CHANGED_LINES_LIMIT: u32 = 500;

/// How comments are posted.
#[derive(Debug, Clone)]
pub struct PostingConfig {
    /// Log instead of POSTing. For operator rehearsal.
    pub dry_run: bool,
    /// Bound on concurrent inline posts.
    pub max_concurrency: usize,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_concurrency: 4,
        }
    }
}

/// The pipeline step executed per queued job.
pub struct Orchestrator {
    pub db: Arc<Database>,
    pub forge: ForgeClient,
    pub reviewer: Reviewer,
    pub posting: PostingConfig,
}

impl Orchestrator {
    /// Runs the whole pipeline for one job.
    pub async fn process(&self, job: &ReviewJob) -> PipelineResult<()> {
        let review_id = &job.review_id;
        self.db.mark_processing(review_id)?;

        if !self.reviewer.is_enabled() {
            info!(review_id = %review_id, "llm disabled, skipping review");
            self.db
                .mark_skipped(review_id, &json!({"message": "LLM review disabled"}))?;
            return Ok(());
        }

        debug!(review_id = %review_id, "fetch merge request details");
        let details = self
            .forge
            .get_merge_request(job.project_id, job.merge_request_iid)
            .await?;
        let Some(refs) = details.diff_refs else {
            info!(review_id = %review_id, "no diff refs yet, nothing to review");
            self.db.mark_completed(
                review_id,
                &ReviewCompletion {
                    quality_score: 100,
                    issues_found: 0,
                    suggestions_count: 0,
                    review_content: json!({"message": "No changes to review"}),
                },
            )?;
            return Ok(());
        };

        debug!(review_id = %review_id, "fetch diff and refreshed details");
        let (all_diffs, fresh) = tokio::try_join!(
            self.forge
                .compare_commits(job.project_id, &refs.base_sha, &refs.head_sha),
            self.forge
                .get_merge_request(job.project_id, job.merge_request_iid)
        )?;
        let refs = fresh.diff_refs.unwrap_or(refs);

        let skipped_files = all_diffs.len().saturating_sub(MAX_FILES);
        if skipped_files > 0 {
            warn!(
                review_id = %review_id,
                total = all_diffs.len(),
                cap = MAX_FILES,
                "large merge request, capping reviewed files"
            );
        }
        let diffs = &all_diffs[..all_diffs.len().min(MAX_FILES)];

        let mut chunks = process_diffs(diffs, CONTEXT_LINES);
        for chunk in &mut chunks {
            let Some(&first_changed) = chunk.changed_lines.first() else {
                continue;
            };
            match self
                .forge
                .get_file_content(job.project_id, &chunk.filename, &refs.head_sha)
                .await
            {
                Ok(content) => {
                    chunk.file_context = Some(build_file_context(
                        &content,
                        chunk.language,
                        first_changed,
                        CONTEXT_LINES as u32,
                    ));
                }
                Err(e) => {
                    warn!(
                        review_id = %review_id,
                        file = %chunk.filename,
                        error = %e,
                        "context fetch failed, reviewing without context"
                    );
                }
            }
        }

        if chunks.is_empty() {
            info!(review_id = %review_id, "no reviewable chunks");
            self.db
                .mark_skipped(review_id, &json!({"message": "No reviewable changes"}))?;
            return Ok(());
        }

        let total_changed: u32 = chunks.iter().map(|c| c.additions + c.deletions).sum();
        let outcome = if should_batch(total_changed, chunks.len()) {
            debug!(
                review_id = %review_id,
                chunks = chunks.len(),
                total_changed,
                "batched review"
            );
            self.reviewer.review_batched(&chunks).await
        } else {
            debug!(
                review_id = %review_id,
                chunks = chunks.len(),
                total_changed,
                "per-chunk review"
            );
            let mut merged = ReviewOutcome::default();
            let mut summaries = Vec::new();
            for chunk in &chunks {
                let one = self.reviewer.review_single(chunk).await;
                if !one.summary.trim().is_empty() {
                    summaries.push(one.summary);
                }
                merged.issues.extend(one.issues);
            }
            merged.summary = summaries.join(" ");
            merged
        };

        let verifier = Verifier::new(&self.forge, job.project_id, &refs.head_sha);
        let mut retained = Vec::new();
        for issue in outcome.issues {
            let context = chunk_for_issue(&chunks, &issue).and_then(|c| c.file_context.as_ref());
            let verdict = verifier.verify(&issue, context).await;
            if verdict.is_valid {
                retained.push(issue);
            } else {
                debug!(
                    review_id = %review_id,
                    file = %issue.file,
                    line = issue.line,
                    reason = %verdict.reason,
                    "issue dropped as false positive"
                );
            }
        }

        self.post_inline_comments(job, &refs.base_sha, &refs.head_sha, refs.start_sha.as_deref(), &chunks, &retained)
            .await;

        let score = quality_score(&retained);
        let body = build_summary(&outcome.summary, &retained, score, diffs.len(), skipped_files);
        if self.posting.dry_run {
            info!(review_id = %review_id, "dry run: skipping summary note");
        } else {
            self.forge
                .post_note(job.project_id, job.merge_request_iid, &body)
                .await?;
        }

        self.db.mark_completed(
            review_id,
            &ReviewCompletion {
                quality_score: score,
                issues_found: retained.len() as i64,
                suggestions_count: retained.len() as i64,
                review_content: json!({ "issues": retained }),
            },
        )?;
        info!(
            review_id = %review_id,
            score,
            issues = retained.len(),
            "review completed"
        );
        Ok(())
    }

    /// Posts inline discussions for retained medium+ issues, bounded by a
    /// semaphore. Failures are logged and swallowed; the summary and the
    /// review itself never depend on them.
    async fn post_inline_comments(
        &self,
        job: &ReviewJob,
        base_sha: &str,
        head_sha: &str,
        start_sha: Option<&str>,
        chunks: &[DiffChunk],
        retained: &[Issue],
    ) {
        let sem = Arc::new(Semaphore::new(self.posting.max_concurrency.max(1)));
        let mut handles = Vec::new();

        for issue in retained {
            if !issue.severity.warrants_inline_comment() {
                continue;
            }

            let old_path = chunk_for_issue(chunks, issue)
                .map(|c| c.old_path.clone())
                .unwrap_or_else(|| issue.file.clone());
            let position = InlinePosition {
                old_path,
                new_path: issue.file.clone(),
                new_line: issue.line,
                base_sha: base_sha.to_string(),
                head_sha: head_sha.to_string(),
                start_sha: start_sha.map(str::to_string),
            };
            let body = format!(
                "**{}** ({}): {}\n\n**Suggestion:** {}",
                issue.severity.as_str(),
                issue.issue_type.as_str(),
                issue.message,
                issue.suggestion
            );

            if self.posting.dry_run {
                info!(file = %position.new_path, line = position.new_line, "dry run: skipping inline post");
                continue;
            }

            let forge = self.forge.clone();
            let project_id = job.project_id;
            let iid = job.merge_request_iid;
            let sem = sem.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore never closed");
                if let Err(e) = forge
                    .post_inline_discussion(project_id, iid, &body, &position)
                    .await
                {
                    warn!(
                        file = %position.new_path,
                        line = position.new_line,
                        error = %e,
                        "inline post failed, continuing"
                    );
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "inline post task panicked");
            }
        }
    }
}

/// One batched call when the total change volume is small and there is more
/// than one chunk; per-chunk calls otherwise.
pub fn should_batch(total_changed_lines: u32, chunk_count: usize) -> bool {
    total_changed_lines <= BATCH_CHANGED_LINES_LIMIT && chunk_count > 1
}

/// Finds the chunk an issue belongs to by filename.
fn chunk_for_issue<'a>(chunks: &'a [DiffChunk], issue: &Issue) -> Option<&'a DiffChunk> {
    chunks.iter().find(|c| c.filename == issue.file)
}
