/// Property tests for batch assembly
///
/// Whatever the input, every closed batch must be a valid request: within
/// the event count, byte and time span limits, with no empty, oversize or
/// out-of-window event, and sorted once prepared for sending.

use chrono::{TimeZone, Utc};
use logpusher::pusher::limits::{PER_EVENT_HEADER_BYTES, TRUNCATED_SUFFIX};
use logpusher::pusher::{BatchAssembler, Limits, LogEvent, LogEventBatch};
use proptest::prelude::*;
use std::time::Duration;

const HOUR_MS: i64 = 3600 * 1000;

fn small_limits(max_events: usize, max_bytes: usize, span_hours: u64) -> Limits {
    Limits {
        max_event_bytes: 200,
        max_request_events: max_events,
        max_request_bytes: max_bytes,
        max_request_span: Duration::from_secs(span_hours * 3600),
        ..Limits::default()
    }
}

fn event_strategy() -> impl Strategy<Value = (i64, String)> {
    // Millisecond offsets from "now", reaching past both ends of the window
    (-15 * 24 * HOUR_MS..3 * HOUR_MS, "[a-z]{0,300}")
}

fn assemble(limits: &Limits, input: &[(i64, String)], now_ms: i64) -> Vec<LogEventBatch> {
    let now = Utc.timestamp_millis_opt(now_ms).unwrap();
    let mut assembler = BatchAssembler::new("group", "stream", limits.clone());
    let mut batches = Vec::new();

    for (offset, message) in input {
        let event = LogEvent::with_generated_at(now_ms + offset, message.clone(), "src", 0, now);
        if let Some(batch) = assembler.admit(event, now) {
            batches.push(batch);
        }
    }
    if let Some(batch) = assembler.force_flush() {
        batches.push(batch);
    }
    batches
}

proptest! {
    #[test]
    fn test_closed_batches_respect_request_limits(
        max_events in 1usize..20,
        max_bytes in 300usize..3000,
        span_hours in 1u64..48,
        input in prop::collection::vec(event_strategy(), 0..200),
    ) {
        let now_ms = 1_800_000_000_000;
        let limits = small_limits(max_events, max_bytes, span_hours);
        let batches = assemble(&limits, &input, now_ms);

        for batch in &batches {
            prop_assert!(!batch.is_empty());
            prop_assert!(batch.len() <= limits.max_request_events);
            prop_assert!(batch.byte_total() <= limits.max_request_bytes);

            let (min, max) = batch.timestamp_range().unwrap();
            prop_assert!(max - min <= limits.max_request_span_ms());

            for event in batch.events() {
                prop_assert!(!event.message.is_empty());
                prop_assert!(event.size_bytes() <= limits.max_event_bytes);
                prop_assert!(limits.accepts_timestamp(event.timestamp, now_ms));
            }
        }
    }

    #[test]
    fn test_every_valid_event_lands_in_exactly_one_batch(
        input in prop::collection::vec(event_strategy(), 0..200),
    ) {
        let now_ms = 1_800_000_000_000;
        let limits = small_limits(7, 1000, 24);
        let batches = assemble(&limits, &input, now_ms);

        let expected: Vec<String> = input
            .iter()
            .filter(|(offset, message)| {
                !message.is_empty() && limits.accepts_timestamp(now_ms + offset, now_ms)
            })
            .map(|(_, message)| {
                if message.len() + PER_EVENT_HEADER_BYTES > limits.max_event_bytes {
                    let keep = limits.max_event_bytes - PER_EVENT_HEADER_BYTES - TRUNCATED_SUFFIX.len();
                    format!("{}{}", &message[..keep], TRUNCATED_SUFFIX)
                } else {
                    message.clone()
                }
            })
            .collect();
        let admitted: Vec<String> = batches
            .iter()
            .flat_map(|batch| batch.events().iter().map(|event| event.message.clone()))
            .collect();

        prop_assert_eq!(admitted, expected);
    }

    #[test]
    fn test_sorted_batches_are_non_decreasing(
        input in prop::collection::vec(event_strategy(), 1..200),
    ) {
        let now_ms = 1_800_000_000_000;
        let limits = small_limits(50, 5000, 24);

        for mut batch in assemble(&limits, &input, now_ms) {
            batch.sort_by_timestamp();
            let request = batch.to_request(None);
            prop_assert!(request
                .log_events
                .windows(2)
                .all(|pair| pair[0].timestamp <= pair[1].timestamp));
        }
    }
}
