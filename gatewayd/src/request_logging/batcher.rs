//! Bounded-channel request-log writer.
//!
//! The proxy handler never blocks on this: [`RequestLogSender::submit`] is a
//! `try_send`, and a full channel drops the newest entry (with a counter
//! increment) rather than applying backpressure to the hot path. The
//! consumer side follows the wait-then-drain-then-flush shape: block for the
//! first record, non-blocking drain up to `batch_size`, write, repeat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::db::handlers::request_log::RequestLogs;
use crate::db::models::request_log::RequestLogCreateDBRequest;

const CHANNEL_BUFFER_SIZE: usize = 4096;

/// Handle used by the proxy path to submit a completed request log without
/// ever waiting on the database.
#[derive(Clone)]
pub struct RequestLogSender {
    inner: mpsc::Sender<RequestLogCreateDBRequest>,
    dropped: Arc<AtomicU64>,
}

impl RequestLogSender {
    /// Enqueue a log entry. Never blocks: on a full channel the entry is
    /// dropped and `gatewayd_request_log_dropped_total` is incremented.
    pub fn submit(&self, entry: RequestLogCreateDBRequest) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.inner.try_send(entry) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            counter!("gatewayd_request_log_dropped_total").increment(1);
            warn!(total_dropped = dropped, "request log channel full, dropping entry");
        }
    }
}

pub struct RequestLogWriter {
    pool: PgPool,
    receiver: mpsc::Receiver<RequestLogCreateDBRequest>,
    batch_size: usize,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl RequestLogWriter {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_base_delay: Duration) -> (Self, RequestLogSender) {
        let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let writer = Self { pool, receiver, batch_size, max_retries, retry_base_delay };
        (writer, RequestLogSender { inner: sender, dropped: Arc::new(AtomicU64::new(0)) })
    }

    /// Runs the writer's background flush loop. Spawn as a tokio task; on
    /// cancellation, drains whatever is buffered before returning.
    pub async fn run(mut self, shutdown_token: CancellationToken) {
        info!(batch_size = self.batch_size, max_retries = self.max_retries, "request log writer started");

        let mut buffer: Vec<RequestLogCreateDBRequest> = Vec::with_capacity(self.batch_size);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_token.cancelled() => {
                    info!("shutdown received, draining request log channel");
                    self.receiver.close();
                    while let Some(entry) = self.receiver.recv().await {
                        buffer.push(entry);
                        if buffer.len() >= self.batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                    info!("request log writer shutdown complete");
                    break;
                }

                maybe_entry = self.receiver.recv() => {
                    match maybe_entry {
                        Some(entry) => buffer.push(entry),
                        None => {
                            if !buffer.is_empty() {
                                self.flush(&mut buffer).await;
                            }
                            break;
                        }
                    }
                }
            }

            while buffer.len() < self.batch_size {
                match self.receiver.try_recv() {
                    Ok(entry) => buffer.push(entry),
                    Err(_) => break,
                }
            }

            self.flush(&mut buffer).await;
        }
    }

    async fn flush(&self, buffer: &mut Vec<RequestLogCreateDBRequest>) {
        if buffer.is_empty() {
            return;
        }
        let batch_size = buffer.len();
        let span = info_span!("flush_request_log_batch", batch_size);

        async {
            let start = std::time::Instant::now();
            let mut last_error = None;

            for attempt in 0..=self.max_retries {
                let outcome = async {
                    let mut conn = self.pool.acquire().await?;
                    RequestLogs::new(&mut conn).insert_batch(buffer).await
                }
                .await;

                match outcome {
                    Ok(_) => {
                        last_error = None;
                        break;
                    }
                    Err(e) => {
                        last_error = Some(e);
                        if attempt < self.max_retries {
                            let delay = self.retry_base_delay * 2u32.pow(attempt);
                            warn!(error = %last_error.as_ref().unwrap(), attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "request log batch write failed, retrying");
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }

            if let Some(e) = last_error {
                error!(error = %e, batch_size, attempts = self.max_retries + 1, "dropping request log batch after exhausting retries");
                counter!("gatewayd_request_log_write_errors_total").increment(1);
                buffer.clear();
                return;
            }

            let duration = start.elapsed();
            histogram!("gatewayd_request_log_batch_duration_seconds").record(duration.as_secs_f64());
            counter!("gatewayd_request_log_written_total").increment(batch_size as u64);
            debug!(batch_size, duration_ms = duration.as_millis() as u64, "flushed request log batch");
            buffer.clear();
        }
        .instrument(span)
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Users;
    use crate::db::handlers::repository::Repository;
    use crate::db::models::request_log::RequestLogCreateDBRequest;
    use crate::db::models::user::UserCreateDBRequest;
    use crate::types::TaskType;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sample_entry(user_id: crate::types::UserId) -> RequestLogCreateDBRequest {
        RequestLogCreateDBRequest {
            request_id: Uuid::new_v4(),
            user_id,
            api_key_id: None,
            model_name: "claude-sonnet".to_string(),
            endpoint_name: "anthropic-1".to_string(),
            task_type: TaskType::Default,
            input_tokens: 10,
            output_tokens: 5,
            latency_ms: 42,
            cost: Decimal::ONE,
            status_code: 200,
            success: true,
            stream: false,
            message_preview: None,
            routing_method: "rule".to_string(),
            routing_reason: None,
            matched_rule_id: None,
            matched_rule_name: None,
            all_matches: serde_json::json!([]),
            is_inaccurate: false,
            request_body: None,
            response_body: None,
        }
    }

    #[sqlx::test]
    async fn run_flushes_buffered_entries_on_shutdown(pool: sqlx::PgPool) {
        let user_id = {
            let mut conn = pool.acquire().await.unwrap();
            Users::new(&mut conn)
                .create(&UserCreateDBRequest { username: "a".to_string(), email: "a@example.com".to_string(), is_admin: false })
                .await
                .unwrap()
                .id
        };

        let (writer, sender) = RequestLogWriter::new(pool.clone(), 100, 0, Duration::from_millis(1));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(writer.run(shutdown.clone()));

        sender.submit(sample_entry(user_id));
        sender.submit(sample_entry(user_id));
        shutdown.cancel();
        handle.await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let logs = crate::db::handlers::request_log::RequestLogs::new(&mut conn)
            .list(&crate::db::handlers::request_log::RequestLogFilter { user_id: Some(user_id), limit: 10, offset: 0 })
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn submit_on_full_channel_drops_newest_and_counts_it() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (sender, mut receiver) = mpsc::channel(1);
            let wrapped = RequestLogSender { inner: sender, dropped: Arc::new(AtomicU64::new(0)) };
            let user_id = crate::types::UserId::new_v4();
            wrapped.submit(sample_entry(user_id));
            wrapped.submit(sample_entry(user_id));
            assert_eq!(wrapped.dropped.load(Ordering::Relaxed), 1);
            assert!(receiver.try_recv().is_ok());
            assert!(receiver.try_recv().is_err());
        });
    }
}
