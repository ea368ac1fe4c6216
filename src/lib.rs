//! Download every external script a web page references and keep a
//! queryable record of each run: status, counters, ordered log, per-file
//! outcomes, and combined/manifest artifacts on disk.

pub mod config;
pub mod db;
pub mod discover;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod recorder;
pub mod report;
pub mod sanitize;

pub use db::JobStore;
pub use error::{FetchError, PipelineError, ResourceError};
pub use fetcher::{Fetch, Fetched, HttpFetcher};
pub use models::{Job, JobStatus, LogEntry, LogKind, OutcomeStatus, ResourceOutcome};
pub use pipeline::Extractor;
