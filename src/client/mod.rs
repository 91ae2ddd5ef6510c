//! Delivery clients for the log ingestion API.
//!
//! [`LogClient`] is the capability the pusher needs from the outside world:
//! creating the destination stream and sending one batch. [`HttpLogClient`]
//! speaks the CloudWatch Logs JSON protocol, [`fake::FakeLogClient`] records
//! requests in memory for tests.

pub mod fake;
pub mod http;

pub use http::HttpLogClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: usize, last_error: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// One event as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLogEvent {
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
    pub log_events: Vec<InputLogEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_token: Option<String>,
}

#[async_trait]
pub trait LogClient: Send + Sync {
    /// Make sure the stream (and its group) exist.
    ///
    /// Returns the sequencing token to use for the first request, if the
    /// API hands one out.
    async fn create_stream(&self, log_group: &str, log_stream: &str) -> Result<Option<String>>;

    /// Send one batch, retrying up to `retry_count` times.
    ///
    /// Returns the token for the next request to the same stream.
    async fn put_log_events(
        &self,
        request: PutLogEventsRequest,
        retry_count: usize,
    ) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_like_cloudwatch() {
        let request = PutLogEventsRequest {
            log_group_name: "group".to_string(),
            log_stream_name: "stream".to_string(),
            log_events: vec![InputLogEvent {
                timestamp: 42,
                message: "hello".to_string(),
            }],
            sequence_token: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "logGroupName": "group",
                "logStreamName": "stream",
                "logEvents": [{"timestamp": 42, "message": "hello"}]
            })
        );

        let with_token = PutLogEventsRequest {
            sequence_token: Some("abc".to_string()),
            ..request
        };
        let json = serde_json::to_value(&with_token).unwrap();
        assert_eq!(json["sequenceToken"], "abc");
    }
}
