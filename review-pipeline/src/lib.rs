//! Merge-request review pipeline.
//!
//! The pipeline runs once per queued job:
//!
//! 1) **Fetch**: MR details (diff refs, branches) and the cumulative diff
//!    between base and head SHAs, via the forge REST client.
//! 2) **Chunk**: split each file diff into chunks of changed lines with
//!    surrounding context, detect the language, and attach a file-content
//!    window plus scanned imports for each chunk.
//! 3) **Review**: drive the LLM, either one batched call for small MRs or
//!    one call per chunk, with strict-JSON output parsing and retries.
//! 4) **Verify**: filter false positives by checking reported import and
//!    definition claims against the real file contents.
//! 5) **Publish & persist**: inline discussions for medium+ issues, one
//!    summary note, and the final scored review row.
//!
//! Failure layers are deliberate: inline-post failures are swallowed, LLM
//! trouble degrades to an empty review, and only fetch/persistence failures
//! fail the job (which the queue retries).

pub mod context;
pub mod diff;
pub mod errors;
pub mod forge;
pub mod orchestrator;
pub mod review;
pub mod summary;
pub mod verify;
pub mod worker;

pub use errors::{Error, PipelineResult};
pub use orchestrator::{Orchestrator, PostingConfig};
pub use worker::spawn_workers;
