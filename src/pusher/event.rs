use crate::pusher::limits::{MAX_EVENT_PAYLOAD_BYTES, PER_EVENT_HEADER_BYTES, TRUNCATED_SUFFIX};
use chrono::{DateTime, Utc};
use tracing::warn;

/// A single log record on its way to the ingestion API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Milliseconds since the epoch. 0 means unset.
    pub timestamp: i64,
    pub message: String,
    /// Where the record came from (file name, "stdin", ...)
    pub source_name: String,
    /// Offset of the record inside its source, for checkpointing by the producer
    pub source_offset: i64,
    /// When this record was generated
    pub generated_at: DateTime<Utc>,
}

impl LogEvent {
    /// Create a new log event. A zero timestamp is replaced by the generation time.
    pub fn new(
        timestamp: i64,
        message: impl Into<String>,
        source_name: impl Into<String>,
        source_offset: i64,
    ) -> Self {
        Self::with_generated_at(timestamp, message, source_name, source_offset, Utc::now())
    }

    pub fn with_generated_at(
        timestamp: i64,
        message: impl Into<String>,
        source_name: impl Into<String>,
        source_offset: i64,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut event = Self {
            timestamp,
            message: message.into(),
            source_name: source_name.into(),
            source_offset,
            generated_at,
        };
        event.normalize_timestamp();
        event
    }

    /// Fill an unset timestamp from the generation time.
    pub fn normalize_timestamp(&mut self) {
        if self.timestamp == 0 {
            self.timestamp = self.generated_at.timestamp_millis();
        }
    }

    /// Bytes this event counts for against the request size limit.
    pub fn size_bytes(&self) -> usize {
        self.message.len() + PER_EVENT_HEADER_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }

    pub fn truncate_if_oversize(&mut self) -> bool {
        self.truncate_to(MAX_EVENT_PAYLOAD_BYTES)
    }

    /// Cut the message so the event fits in `max_event_bytes`, appending the
    /// truncation marker. Returns whether the message was cut.
    pub fn truncate_to(&mut self, max_event_bytes: usize) -> bool {
        let size = self.size_bytes();
        if size <= max_event_bytes {
            return false;
        }

        warn!(
            source = %self.source_name,
            size,
            max = max_event_bytes,
            "Log event is larger than the max event payload, truncating"
        );

        let mut keep = max_event_bytes
            .saturating_sub(PER_EVENT_HEADER_BYTES + TRUNCATED_SUFFIX.len())
            .min(self.message.len());
        while !self.message.is_char_boundary(keep) {
            keep -= 1;
        }
        self.message.truncate(keep);
        self.message.push_str(TRUNCATED_SUFFIX);
        true
    }
}
