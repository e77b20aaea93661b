//! Forge client (REST v4) for MR metadata, diffs, file contents, and notes.
//!
//! Endpoints used:
//! - GET  /projects/:id/repository/compare?from=...&to=...
//! - GET  /projects/:id/merge_requests/:iid
//! - GET  /projects/:id/repository/files/:path?ref=...
//! - POST /projects/:id/merge_requests/:iid/notes
//! - POST /projects/:id/merge_requests/:iid/discussions   (inline)
//!
//! Transient failures (429/5xx, network) are retried with exponential backoff
//! honoring `Retry-After`; everything else surfaces as a typed error.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::errors::ForgeError;
use crate::forge::types::{CompareResponse, FileDiff, MergeRequestDetails, RepositoryFile};

/// Maximum attempts for transient failures (HTTP 5xx / 429 / network).
const MAX_RETRIES: usize = 3;

/// Initial backoff for transient failures.
const INITIAL_BACKOFF_MS: u64 = 400;

/// Position of an inline discussion on the new side of a diff.
#[derive(Debug, Clone)]
pub struct InlinePosition {
    pub old_path: String,
    pub new_path: String,
    pub new_line: u32,
    pub base_sha: String,
    pub head_sha: String,
    pub start_sha: Option<String>,
}

/// Thin adapter over the forge REST surface. Safe to share across tasks.
#[derive(Debug, Clone)]
pub struct ForgeClient {
    http: reqwest::Client,
    base_api: String, // e.g. "https://forge.example.com/api/v4"
    headers: HeaderMap,
}

impl ForgeClient {
    /// Constructs a client for `host` (e.g. `https://forge.example.com`)
    /// authenticated with `token`.
    ///
    /// # Errors
    /// [`ForgeError::InvalidResponse`] when the token is not header-safe;
    /// [`ForgeError::Network`] when the HTTP client cannot be built.
    pub fn new(host: &str, token: &str) -> Result<Self, ForgeError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| ForgeError::Network(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("forge-review/0.1"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "PRIVATE-TOKEN",
            HeaderValue::from_str(token)
                .map_err(|e| ForgeError::InvalidResponse(format!("bad token: {e}")))?,
        );

        Ok(Self {
            http,
            base_api: format!("{}/api/v4", host.trim_end_matches('/')),
            headers,
        })
    }

    /// Cumulative diff between two commits, one entry per changed file.
    pub async fn compare_commits(
        &self,
        project_id: i64,
        from_sha: &str,
        to_sha: &str,
    ) -> Result<Vec<FileDiff>, ForgeError> {
        let url = format!(
            "{}/projects/{}/repository/compare?from={}&to={}",
            self.base_api,
            project_id,
            encode(from_sha),
            encode(to_sha)
        );
        let resp = self.get_with_retries(&url).await?;
        let body: CompareResponse = resp.json().await.map_err(ForgeError::from)?;
        Ok(body.diffs)
    }

    /// MR metadata including `diff_refs` with base/head/start SHAs.
    pub async fn get_merge_request(
        &self,
        project_id: i64,
        iid: i64,
    ) -> Result<MergeRequestDetails, ForgeError> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}",
            self.base_api, project_id, iid
        );
        let resp = self.get_with_retries(&url).await?;
        resp.json().await.map_err(ForgeError::from)
    }

    /// Raw file content at a commit, decoded from the forge's base64 envelope.
    pub async fn get_file_content(
        &self,
        project_id: i64,
        path: &str,
        ref_sha: &str,
    ) -> Result<String, ForgeError> {
        let url = format!(
            "{}/projects/{}/repository/files/{}?ref={}",
            self.base_api,
            project_id,
            encode(path),
            encode(ref_sha)
        );
        let resp = self.get_with_retries(&url).await?;
        let file: RepositoryFile = resp.json().await.map_err(ForgeError::from)?;

        let compact: String = file.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|e| ForgeError::InvalidResponse(format!("bad base64 content: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| ForgeError::InvalidResponse(format!("non-utf8 file content: {e}")))
    }

    /// Creates a general MR note (the summary comment). Returns the note id.
    pub async fn post_note(
        &self,
        project_id: i64,
        iid: i64,
        body: &str,
    ) -> Result<u64, ForgeError> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            self.base_api, project_id, iid
        );

        #[derive(Serialize)]
        struct Req<'a> {
            body: &'a str,
        }

        #[derive(serde::Deserialize)]
        struct NoteResp {
            id: u64,
        }

        let resp = self.post_with_retries(&url, &Req { body }).await?;
        let note: NoteResp = resp.json().await.unwrap_or(NoteResp { id: 0 });
        Ok(note.id)
    }

    /// Creates a positioned inline discussion. Returns the discussion id.
    ///
    /// The forge expects 1-based line numbers and the `new_line` value as a
    /// string. A missing `start_sha` is sent as-is and rejected forge-side;
    /// callers decide whether that failure matters.
    pub async fn post_inline_discussion(
        &self,
        project_id: i64,
        iid: i64,
        body: &str,
        position: &InlinePosition,
    ) -> Result<String, ForgeError> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/discussions",
            self.base_api, project_id, iid
        );

        #[derive(Serialize)]
        struct Position<'a> {
            /// Must be "text" for textual diffs.
            position_type: &'a str,
            old_path: &'a str,
            new_path: &'a str,
            new_line: String,
            base_sha: &'a str,
            head_sha: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            start_sha: Option<&'a str>,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            body: &'a str,
            position: Position<'a>,
        }

        #[derive(serde::Deserialize)]
        struct DiscussionResp {
            id: String,
        }

        let line_1b = position.new_line.max(1);
        debug!(
            path = %position.new_path,
            line = line_1b,
            "inline discussion POST"
        );

        let req = Req {
            body,
            position: Position {
                position_type: "text",
                old_path: &position.old_path,
                new_path: &position.new_path,
                new_line: line_1b.to_string(),
                base_sha: &position.base_sha,
                head_sha: &position.head_sha,
                start_sha: position.start_sha.as_deref(),
            },
        };

        let resp = self.post_with_retries(&url, &req).await?;
        let disc: DiscussionResp = resp
            .json()
            .await
            .unwrap_or(DiscussionResp { id: String::new() });
        Ok(disc.id)
    }

    async fn get_with_retries(&self, url: &str) -> Result<reqwest::Response, ForgeError> {
        self.request_with_retries(|c| c.get(url)).await
    }

    async fn post_with_retries<T: Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, ForgeError> {
        self.request_with_retries(|c| c.post(url).json(body)).await
    }

    /// Shared retry helper. Retries 429/5xx and network failures with
    /// exponential backoff, honoring `Retry-After` when present; other
    /// non-success statuses map straight to typed errors.
    async fn request_with_retries(
        &self,
        mut build: impl FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ForgeError> {
        let mut attempt = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            attempt += 1;
            let req = build(&self.http).headers(self.headers.clone());
            let resp = req.send().await;

            match resp {
                Ok(r) if r.status().is_success() => return Ok(r),
                Ok(r) => {
                    let status = r.status();
                    let headers_snapshot = r.headers().clone();
                    let body = r.text().await.ok();

                    if status.as_u16() == 429 || status.is_server_error() {
                        if attempt >= MAX_RETRIES {
                            return Err(status_error(status.as_u16()));
                        }
                        let retry_after_ms = headers_snapshot
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|h| h.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .map(|secs| secs * 1_000);
                        let sleep_ms = retry_after_ms.unwrap_or(backoff_ms);
                        warn!(
                            status = status.as_u16(),
                            attempt,
                            max = MAX_RETRIES,
                            backoff_ms = sleep_ms,
                            body = ?body,
                            "forge transient status"
                        );
                        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                        backoff_ms = (backoff_ms.saturating_mul(2)).min(8_000);
                        continue;
                    }

                    return Err(status_error(status.as_u16()));
                }
                Err(e) => {
                    let mapped = ForgeError::from(e);
                    if attempt >= MAX_RETRIES || !mapped.is_transient() {
                        return Err(mapped);
                    }
                    warn!(
                        attempt,
                        max = MAX_RETRIES,
                        backoff_ms,
                        error = %mapped,
                        "forge network error"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms.saturating_mul(2)).min(8_000);
                }
            }
        }
    }
}

fn status_error(code: u16) -> ForgeError {
    match code {
        401 => ForgeError::Unauthorized,
        403 => ForgeError::Forbidden,
        404 => ForgeError::NotFound,
        429 => ForgeError::RateLimited {
            retry_after_secs: None,
        },
        500..=599 => ForgeError::Server(code),
        other => ForgeError::HttpStatus(other),
    }
}
