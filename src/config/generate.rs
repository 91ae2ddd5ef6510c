pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGPUSHER CONFIGURATION
# =============================================================================
# logpusher reads lines from stdin and ships them, batched, to one log stream
# of a CloudWatch Logs compatible ingestion API.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logpusher/config.yml
#   3. /etc/logpusher/config.yml
#
# Any value may reference an environment variable as $env{VAR_NAME}.
# Durations accept units such as 200ms, 5s, 1m, 24h.

# =============================================================================
# DESTINATION (required)
# =============================================================================

destination:
  # Log group the stream belongs to. Created on first use if missing.
  log_group: /logpusher/default

  # Log stream to write to. Defaults to the host name when omitted.
  # log_stream: web-1

  # Base URL of the ingestion API
  endpoint: https://logs.us-east-1.amazonaws.com

# =============================================================================
# CLIENT
# =============================================================================
# Retry behaviour of individual API calls. Throttling, server errors and
# transport errors are retried with exponential backoff.

client:
  timeout: 30s
  # First backoff, doubled on every retry up to max_backoff
  retry_interval: 200ms
  max_backoff: 60s
  # Attempts made to create the log group / stream before giving up
  create_stream_attempts: 3

# =============================================================================
# PUSHER
# =============================================================================

pusher:
  # Attempts per batch before it is dropped
  retry_count: 5
  # Minimum time between two requests to the same stream
  min_request_interval: 200ms
  # Events waiting to be batched. Producers block when this fills up.
  event_queue_size: 10000
  # Closed batches waiting to be sent
  batch_queue_size: 2
  # Send a partially filled batch after this long. Remove to disable.
  flush_interval: 5s

# =============================================================================
# LIMITS (optional)
# =============================================================================
# Request limits of the ingestion API. The defaults match CloudWatch Logs.
#
# limits:
#   max_event_bytes: 262144
#   max_request_events: 10000
#   max_request_bytes: 1048576
#   max_request_span: 24h
#   max_event_age: 14days
#   max_event_future: 2h

# =============================================================================
# LOGGING
# =============================================================================
# RUST_LOG overrides the level set here.

logging:
  level: info
  # Log to a rotating file instead of stderr
  # file: /var/log/logpusher/logpusher.log
  rotation:
    max_size_mb: 100
    max_backups: 5
    max_age_days: 7
    compress: true

# =============================================================================
# INPUT
# =============================================================================

input:
  # Recorded as the source of every line read from stdin
  source_name: stdin
"#
    .to_string()
}
