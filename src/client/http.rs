use crate::client::{ClientError, LogClient, PutLogEventsRequest, Result};
use crate::config::types::ClientConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const TARGET_PREFIX: &str = "Logs_20140328";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

const DATA_ALREADY_ACCEPTED: &str = "DataAlreadyAcceptedException";
const INVALID_SEQUENCE_TOKEN: &str = "InvalidSequenceTokenException";
const RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExistsException";
const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
const THROTTLING: &str = "ThrottlingException";
const SERVICE_UNAVAILABLE: &str = "ServiceUnavailableException";

const MAX_BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// Client for a CloudWatch Logs compatible JSON endpoint.
///
/// Requests are not signed. Point `endpoint` at a signing proxy or a local
/// emulator.
#[derive(Debug)]
pub struct HttpLogClient {
    endpoint: String,
    client: reqwest::Client,
    retry_interval: Duration,
    max_backoff: Duration,
    create_attempts: usize,
}

/// Error body returned by the JSON protocol.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
    #[serde(rename = "expectedSequenceToken", default)]
    expected_sequence_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PutLogEventsResponse {
    next_sequence_token: Option<String>,
    rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RejectedLogEventsInfo {
    too_new_log_event_start_index: Option<i64>,
    too_old_log_event_end_index: Option<i64>,
    expired_log_event_end_index: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Debug, Error)]
enum CallFailure {
    #[error("{0}")]
    Transport(ClientError),

    #[error("{code} (status {status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        expected_sequence_token: Option<String>,
    },
}

/// What to do after a failed PutLogEvents call.
enum Next {
    Accepted(Option<String>),
    RetryNow,
    RecreateStream,
    Backoff,
    Fail,
}

impl CallFailure {
    fn code(&self) -> Option<&str> {
        match self {
            CallFailure::Api { code, .. } => Some(code),
            CallFailure::Transport(_) => None,
        }
    }

    /// Failures that may succeed if the same request is sent again later.
    fn is_transient(&self) -> bool {
        match self {
            CallFailure::Transport(ClientError::Http(_)) => true,
            CallFailure::Transport(_) => false,
            CallFailure::Api { status, code, .. } => {
                *status >= 500 || *status == 429 || code == THROTTLING || code == SERVICE_UNAVAILABLE
            }
        }
    }
}

impl From<CallFailure> for ClientError {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Transport(e) => e,
            CallFailure::Api { code, message, .. } => ClientError::Api { code, message },
        }
    }
}

/// `com.amazonaws.logs#ThrottlingException` -> `ThrottlingException`
fn error_code(error_type: &str) -> &str {
    error_type.rsplit('#').next().unwrap_or(error_type)
}

impl HttpLogClient {
    pub fn new(endpoint: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            retry_interval: config.retry_interval,
            max_backoff: config.max_backoff.min(MAX_BACKOFF_CEILING),
            create_attempts: config.create_stream_attempts.max(1),
        })
    }

    async fn call<B, T>(&self, action: &str, body: &B) -> std::result::Result<T, CallFailure>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| CallFailure::Transport(e.into()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, action))
            .header("Content-Type", CONTENT_TYPE)
            .body(payload)
            .send()
            .await
            .map_err(|e| CallFailure::Transport(e.into()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallFailure::Transport(e.into()))?;

        if !status.is_success() {
            let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let code = if body.error_type.is_empty() {
                format!("HTTP{}", status.as_u16())
            } else {
                error_code(&body.error_type).to_string()
            };
            let message = if body.message.is_empty() { text } else { body.message };
            return Err(CallFailure::Api {
                status: status.as_u16(),
                code,
                message,
                expected_sequence_token: body.expected_sequence_token,
            });
        }

        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| CallFailure::Transport(e.into()))
    }

    async fn create_group(&self, log_group: &str) -> std::result::Result<(), CallFailure> {
        let request = CreateLogGroupRequest {
            log_group_name: log_group,
        };
        match self.call::<_, serde_json::Value>("CreateLogGroup", &request).await {
            Ok(_) => {
                info!(log_group = %log_group, "Created log group");
                Ok(())
            }
            Err(failure) if failure.code() == Some(RESOURCE_ALREADY_EXISTS) => Ok(()),
            Err(failure) => Err(failure),
        }
    }

    fn next_backoff(&self, backoff: Duration) -> Duration {
        std::cmp::min(backoff * 2, self.max_backoff)
    }
}

#[async_trait]
impl LogClient for HttpLogClient {
    async fn create_stream(&self, log_group: &str, log_stream: &str) -> Result<Option<String>> {
        let request = CreateLogStreamRequest {
            log_group_name: log_group,
            log_stream_name: log_stream,
        };
        let mut attempts = 0;
        let mut backoff = self.retry_interval;

        loop {
            attempts += 1;
            let failure = match self.call::<_, serde_json::Value>("CreateLogStream", &request).await {
                Ok(_) => {
                    info!(log_group = %log_group, log_stream = %log_stream, "Created log stream");
                    return Ok(None);
                }
                Err(failure) => failure,
            };

            let code = failure.code().map(str::to_owned);
            match code.as_deref() {
                Some(RESOURCE_ALREADY_EXISTS) => return Ok(None),
                Some(RESOURCE_NOT_FOUND) if attempts < self.create_attempts => {
                    // The group is missing, create it and try the stream again
                    if let Err(group_failure) = self.create_group(log_group).await {
                        if !group_failure.is_transient() {
                            return Err(group_failure.into());
                        }
                    }
                    continue;
                }
                _ if failure.is_transient() && attempts < self.create_attempts => {
                    warn!(
                        log_group = %log_group,
                        log_stream = %log_stream,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %failure,
                        "CreateLogStream failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = self.next_backoff(backoff);
                }
                _ => {
                    error!(
                        log_group = %log_group,
                        log_stream = %log_stream,
                        attempts,
                        error = %failure,
                        "CreateLogStream failed"
                    );
                    return Err(failure.into());
                }
            }
        }
    }

    async fn put_log_events(
        &self,
        mut request: PutLogEventsRequest,
        retry_count: usize,
    ) -> Result<Option<String>> {
        let max_attempts = retry_count.max(1);
        let mut attempts = 0;
        let mut backoff = self.retry_interval;

        loop {
            attempts += 1;
            let failure = match self.call::<_, PutLogEventsResponse>("PutLogEvents", &request).await {
                Ok(response) => {
                    if let Some(rejected) = response.rejected_log_events_info {
                        warn!(
                            log_group = %request.log_group_name,
                            too_new_start = ?rejected.too_new_log_event_start_index,
                            too_old_end = ?rejected.too_old_log_event_end_index,
                            expired_end = ?rejected.expired_log_event_end_index,
                            "Some log events were rejected"
                        );
                    }
                    return Ok(response.next_sequence_token);
                }
                Err(failure) => failure,
            };

            let next = match &failure {
                CallFailure::Api {
                    code,
                    expected_sequence_token,
                    ..
                } if code == DATA_ALREADY_ACCEPTED => Next::Accepted(expected_sequence_token.clone()),
                CallFailure::Api {
                    code,
                    expected_sequence_token,
                    ..
                } if code == INVALID_SEQUENCE_TOKEN => {
                    debug!(
                        expected = ?expected_sequence_token,
                        "Sequence token rejected, retrying with the expected token"
                    );
                    request.sequence_token = expected_sequence_token.clone();
                    Next::RetryNow
                }
                CallFailure::Api { code, .. } if code == RESOURCE_NOT_FOUND => Next::RecreateStream,
                failure if failure.is_transient() => Next::Backoff,
                _ => Next::Fail,
            };

            let retry_now = match next {
                Next::Accepted(token) => {
                    warn!(
                        log_group = %request.log_group_name,
                        log_stream = %request.log_stream_name,
                        "Batch was already accepted, skipping"
                    );
                    return Ok(token);
                }
                Next::Fail => {
                    error!(
                        log_group = %request.log_group_name,
                        log_stream = %request.log_stream_name,
                        error = %failure,
                        "PutLogEvents failed with a non-retryable error"
                    );
                    return Err(failure.into());
                }
                Next::RecreateStream => {
                    if let Err(e) = self
                        .create_stream(&request.log_group_name, &request.log_stream_name)
                        .await
                    {
                        warn!(error = %e, "Failed to recreate missing log stream");
                    }
                    request.sequence_token = None;
                    true
                }
                Next::RetryNow => true,
                Next::Backoff => false,
            };

            if attempts >= max_attempts {
                error!(
                    log_group = %request.log_group_name,
                    log_stream = %request.log_stream_name,
                    attempts,
                    error = %failure,
                    "Max retries exceeded"
                );
                return Err(ClientError::MaxRetriesExceeded {
                    attempts,
                    last_error: failure.to_string(),
                });
            }

            if !retry_now {
                warn!(
                    attempt = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %failure,
                    "PutLogEvents failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = self.next_backoff(backoff);
            }
        }
    }
}
