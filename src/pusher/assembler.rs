use crate::pusher::batch::LogEventBatch;
use crate::pusher::event::LogEvent;
use crate::pusher::limits::Limits;
use chrono::{DateTime, Utc};
use tracing::{debug, error};

/// Admits events one at a time into the open batch and decides when that
/// batch has to close.
pub struct BatchAssembler {
    log_group: String,
    log_stream: String,
    limits: Limits,
    current: LogEventBatch,
}

impl BatchAssembler {
    pub fn new(log_group: impl Into<String>, log_stream: impl Into<String>, limits: Limits) -> Self {
        let log_group = log_group.into();
        let log_stream = log_stream.into();
        let current = LogEventBatch::new(log_group.clone(), log_stream.clone());
        Self {
            log_group,
            log_stream,
            limits,
            current,
        }
    }

    /// Add an event to the open batch.
    ///
    /// Returns the previous batch when the event could not join it without
    /// breaking a request limit. Empty and out-of-window events are dropped.
    pub fn admit(&mut self, mut event: LogEvent, now: DateTime<Utc>) -> Option<LogEventBatch> {
        if event.is_empty() {
            return None;
        }

        // PutLogEvents rejects events more than 2 hours in the future or
        // older than 14 days, don't pay for a request that is bound to fail.
        if !self.limits.accepts_timestamp(event.timestamp, now.timestamp_millis()) {
            error!(
                log_group = %self.log_group,
                source = %event.source_name,
                timestamp = event.timestamp,
                now = %now,
                "Log event is outside the ingestion window, discarding"
            );
            return None;
        }

        event.truncate_to(self.limits.max_event_bytes);

        // An event always joins an empty batch, whatever the limits say
        let closed = if self.current.is_empty() || self.current.fits(&event, &self.limits) {
            None
        } else {
            debug!(
                events = self.current.len(),
                bytes = self.current.byte_total(),
                "Closing full log event batch"
            );
            Some(self.replace_current())
        };

        self.current.push(event);
        closed
    }

    /// Close the open batch if it holds anything.
    pub fn force_flush(&mut self) -> Option<LogEventBatch> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.replace_current())
        }
    }

    pub fn current(&self) -> &LogEventBatch {
        &self.current
    }

    fn replace_current(&mut self) -> LogEventBatch {
        let fresh = LogEventBatch::new(self.log_group.clone(), self.log_stream.clone());
        std::mem::replace(&mut self.current, fresh)
    }
}
