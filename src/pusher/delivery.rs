use crate::client::{ClientError, LogClient};
use crate::pusher::batch::LogEventBatch;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sequencing state of the destination stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamToken {
    NoToken,
    HasToken(String),
}

impl StreamToken {
    pub fn as_option(&self) -> Option<String> {
        match self {
            StreamToken::NoToken => None,
            StreamToken::HasToken(token) => Some(token.clone()),
        }
    }
}

/// Sends closed batches one at a time, owns the stream's sequencing token
/// and keeps consecutive requests at least `min_interval` apart.
pub struct Deliverer {
    client: Arc<dyn LogClient>,
    retry_count: usize,
    min_interval: Duration,
    token: StreamToken,
}

impl Deliverer {
    pub fn new(client: Arc<dyn LogClient>, retry_count: usize, min_interval: Duration) -> Self {
        Self {
            client,
            retry_count,
            min_interval,
            token: StreamToken::NoToken,
        }
    }

    pub fn token(&self) -> &StreamToken {
        &self.token
    }

    /// Send one batch. The batch is consumed whatever the outcome; a failed
    /// batch is never queued again.
    pub async fn deliver(&mut self, mut batch: LogEventBatch) -> Result<(), ClientError> {
        let start = Instant::now();
        let result = self.send(&mut batch).await;

        if let Some(remaining) = self.min_interval.checked_sub(start.elapsed()) {
            tokio::time::sleep(remaining).await;
        }
        result
    }

    async fn send(&mut self, batch: &mut LogEventBatch) -> Result<(), ClientError> {
        batch.sort_by_timestamp();

        if self.token == StreamToken::NoToken {
            // The client retries internally. Without a token the request is
            // treated as the first one for the stream.
            match self
                .client
                .create_stream(batch.log_group(), batch.log_stream())
                .await
            {
                Ok(Some(token)) => self.token = StreamToken::HasToken(token),
                Ok(None) => {}
                Err(e) => warn!(
                    log_group = %batch.log_group(),
                    log_stream = %batch.log_stream(),
                    error = %e,
                    "Failed to create log stream, sending without a token"
                ),
            }
        }

        let request = batch.to_request(self.token.as_option());
        let started = Instant::now();
        let next_token = self.client.put_log_events(request, self.retry_count).await?;

        let (source, offset) = batch.checkpoint().unwrap_or(("", 0));
        debug!(
            events = batch.len(),
            size_kb = batch.byte_total() as f64 / 1024.0,
            elapsed_ms = started.elapsed().as_millis() as u64,
            batch_age_ms = batch.created_at().elapsed().as_millis() as u64,
            source = %source,
            offset,
            "Published log events"
        );

        if let Some(token) = next_token {
            self.token = StreamToken::HasToken(token);
        }
        Ok(())
    }
}
