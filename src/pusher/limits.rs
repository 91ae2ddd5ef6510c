use serde::{Deserialize, Serialize};
use std::time::Duration;

// http://docs.aws.amazon.com/AmazonCloudWatch/latest/logs/cloudwatch_limits_cwl.html
// http://docs.aws.amazon.com/AmazonCloudWatchLogs/latest/APIReference/API_PutLogEvents.html

/// Max size of a single event, header included. Must stay larger than
/// `PER_EVENT_HEADER_BYTES + TRUNCATED_SUFFIX.len()`.
pub const MAX_EVENT_PAYLOAD_BYTES: usize = 256 * 1024;
pub const PER_EVENT_HEADER_BYTES: usize = 26;
pub const MAX_REQUEST_EVENT_COUNT: usize = 10_000;
pub const MAX_REQUEST_PAYLOAD_BYTES: usize = 1024 * 1024;

pub const TRUNCATED_SUFFIX: &str = "[Truncated...]";

/// Request limits of the ingestion API.
///
/// The defaults are the CloudWatch Logs values. Override them only when the
/// destination enforces different limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    pub max_event_bytes: usize,
    pub max_request_events: usize,
    pub max_request_bytes: usize,
    /// Max distance between the oldest and newest event of one request.
    #[serde(with = "humantime_serde")]
    pub max_request_span: Duration,
    /// Events older than this (relative to processing time) are discarded.
    #[serde(with = "humantime_serde")]
    pub max_event_age: Duration,
    /// Events further than this in the future are discarded.
    #[serde(with = "humantime_serde")]
    pub max_event_future: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_event_bytes: MAX_EVENT_PAYLOAD_BYTES,
            max_request_events: MAX_REQUEST_EVENT_COUNT,
            max_request_bytes: MAX_REQUEST_PAYLOAD_BYTES,
            max_request_span: Duration::from_secs(24 * 3600),
            max_event_age: Duration::from_secs(14 * 24 * 3600),
            max_event_future: Duration::from_secs(2 * 3600),
        }
    }
}

impl Limits {
    pub fn max_request_span_ms(&self) -> i64 {
        self.max_request_span.as_millis() as i64
    }

    /// Whether `timestamp_ms` falls inside the ingestion window around `now_ms`.
    pub fn accepts_timestamp(&self, timestamp_ms: i64, now_ms: i64) -> bool {
        let age = now_ms.saturating_sub(timestamp_ms);
        let ahead = timestamp_ms.saturating_sub(now_ms);
        age <= self.max_event_age.as_millis() as i64
            && ahead <= self.max_event_future.as_millis() as i64
    }
}
