//! In-memory test double for the ingestion API.
//!
//! [`FakeLogClient`] implements [`LogClient`] by recording every call.
//! Successful sends hand out tokens `token-1`, `token-2`, ... so tests can
//! check that each request carries the token returned by the previous one.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::client::{ClientError, LogClient, PutLogEventsRequest, Result};

/// One recorded `put_log_events` call.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub request: PutLogEventsRequest,
    pub retry_count: usize,
    pub sent_at: Instant,
    pub succeeded: bool,
}

#[derive(Default)]
struct Inner {
    create_calls: Vec<(String, String)>,
    sent: Vec<SentRequest>,
    create_failures: usize,
    put_failures: VecDeque<ClientError>,
    issued_tokens: u64,
    put_delay: Duration,
}

#[derive(Default)]
pub struct FakeLogClient {
    inner: Mutex<Inner>,
}

impl FakeLogClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` stream creations fail.
    pub fn fail_next_creates(&self, count: usize) {
        self.lock().create_failures += count;
    }

    /// Make the next send fail with `error`, as if retries were exhausted.
    pub fn fail_next_put(&self, error: ClientError) {
        self.lock().put_failures.push_back(error);
    }

    /// Simulate network latency on every send.
    pub fn set_put_delay(&self, delay: Duration) {
        self.lock().put_delay = delay;
    }

    pub fn create_calls(&self) -> Vec<(String, String)> {
        self.lock().create_calls.clone()
    }

    /// Every send attempt, failed ones included, in call order.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.lock().sent.clone()
    }

    /// Requests that were accepted.
    pub fn delivered(&self) -> Vec<PutLogEventsRequest> {
        self.lock()
            .sent
            .iter()
            .filter(|sent| sent.succeeded)
            .map(|sent| sent.request.clone())
            .collect()
    }

    pub fn delivered_messages(&self) -> Vec<String> {
        self.delivered()
            .into_iter()
            .flat_map(|request| request.log_events.into_iter().map(|event| event.message))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the recorded calls
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LogClient for FakeLogClient {
    async fn create_stream(&self, log_group: &str, log_stream: &str) -> Result<Option<String>> {
        let mut inner = self.lock();
        inner
            .create_calls
            .push((log_group.to_string(), log_stream.to_string()));

        if inner.create_failures > 0 {
            inner.create_failures -= 1;
            return Err(ClientError::Api {
                code: "ServiceUnavailableException".to_string(),
                message: "stream creation failed".to_string(),
            });
        }
        Ok(None)
    }

    async fn put_log_events(
        &self,
        request: PutLogEventsRequest,
        retry_count: usize,
    ) -> Result<Option<String>> {
        let sent_at = Instant::now();
        let delay = self.lock().put_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        let failure = inner.put_failures.pop_front();
        inner.sent.push(SentRequest {
            request,
            retry_count,
            sent_at,
            succeeded: failure.is_none(),
        });

        match failure {
            Some(error) => Err(error),
            None => {
                inner.issued_tokens += 1;
                Ok(Some(format!("token-{}", inner.issued_tokens)))
            }
        }
    }
}
