use crate::client::{InputLogEvent, PutLogEventsRequest};
use crate::pusher::event::LogEvent;
use crate::pusher::limits::Limits;
use std::time::Instant;

/// One request's worth of log events for a single stream.
///
/// Events are kept in arrival order; [`LogEventBatch::sort_by_timestamp`]
/// must run before the batch is turned into a request.
#[derive(Debug)]
pub struct LogEventBatch {
    log_group: String,
    log_stream: String,
    events: Vec<LogEvent>,
    byte_total: usize,
    min_timestamp: i64,
    max_timestamp: i64,
    /// Source name and offset of the most recently added event
    checkpoint: Option<(String, i64)>,
    created_at: Instant,
}

impl LogEventBatch {
    pub fn new(log_group: impl Into<String>, log_stream: impl Into<String>) -> Self {
        Self {
            log_group: log_group.into(),
            log_stream: log_stream.into(),
            events: Vec::new(),
            byte_total: 0,
            min_timestamp: 0,
            max_timestamp: 0,
            checkpoint: None,
            created_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn byte_total(&self) -> usize {
        self.byte_total
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn log_group(&self) -> &str {
        &self.log_group
    }

    pub fn log_stream(&self) -> &str {
        &self.log_stream
    }

    /// When the batch was opened.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Timestamp range covered by the batch, `None` when empty.
    pub fn timestamp_range(&self) -> Option<(i64, i64)> {
        if self.is_empty() {
            None
        } else {
            Some((self.min_timestamp, self.max_timestamp))
        }
    }

    /// Source and offset of the last event pushed, where a producer can resume.
    pub fn checkpoint(&self) -> Option<(&str, i64)> {
        self.checkpoint
            .as_ref()
            .map(|(source, offset)| (source.as_str(), *offset))
    }

    /// A request cannot span more than the configured window (24h for CloudWatch).
    pub fn within_time_span(&self, timestamp: i64, max_span_ms: i64) -> bool {
        if self.is_empty() {
            return true;
        }
        timestamp - self.min_timestamp <= max_span_ms && self.max_timestamp - timestamp <= max_span_ms
    }

    /// Whether `event` can join this batch without breaking any request limit.
    pub fn fits(&self, event: &LogEvent, limits: &Limits) -> bool {
        self.events.len() < limits.max_request_events
            && self.byte_total + event.size_bytes() <= limits.max_request_bytes
            && self.within_time_span(event.timestamp, limits.max_request_span_ms())
    }

    pub fn push(&mut self, event: LogEvent) {
        if self.is_empty() || event.timestamp < self.min_timestamp {
            self.min_timestamp = event.timestamp;
        }
        if self.is_empty() || event.timestamp > self.max_timestamp {
            self.max_timestamp = event.timestamp;
        }
        self.byte_total += event.size_bytes();
        self.checkpoint = Some((event.source_name.clone(), event.source_offset));
        self.events.push(event);
    }

    /// Stable sort by ascending timestamp. PutLogEvents requires events in
    /// chronological order.
    pub fn sort_by_timestamp(&mut self) {
        self.events.sort_by_key(|event| event.timestamp);
    }

    pub fn to_request(&self, sequence_token: Option<String>) -> PutLogEventsRequest {
        PutLogEventsRequest {
            log_group_name: self.log_group.clone(),
            log_stream_name: self.log_stream.clone(),
            log_events: self
                .events
                .iter()
                .map(|event| InputLogEvent {
                    timestamp: event.timestamp,
                    message: event.message.clone(),
                })
                .collect(),
            sequence_token,
        }
    }
}
