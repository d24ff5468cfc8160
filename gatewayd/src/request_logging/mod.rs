//! Non-blocking request-log submission.
//!
//! The proxy handler builds a fully-populated [`RequestLogCreateDBRequest`]
//! and pushes it onto a bounded channel; [`RequestLogWriter`] is the
//! dedicated consumer that drains it in batches and writes them with
//! [`RequestLogs::insert_batch`]. Logs are best-effort observability, never a
//! correctness barrier: a full channel drops the newest entry rather than
//! blocking the hot path, and a batch that fails to write after retrying is
//! dropped with a counter increment instead of being retried forever.

pub mod batcher;

pub use batcher::{RequestLogSender, RequestLogWriter};
