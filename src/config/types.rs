use crate::pusher::Limits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub destination: DestinationConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub pusher: PusherSettings,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub log_group: String,
    /// Defaults to the host name when unset
    #[serde(default)]
    pub log_stream: Option<String>,
    pub endpoint: String,
}

impl DestinationConfig {
    /// The configured stream name, or the host name.
    pub fn resolved_log_stream(&self) -> String {
        if let Some(stream) = &self.log_stream {
            return stream.clone();
        }
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "logpusher".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Initial backoff between retries, doubled on each attempt
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    pub create_stream_attempts: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_interval: Duration::from_millis(200),
            max_backoff: Duration::from_secs(60),
            create_stream_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PusherSettings {
    pub retry_count: usize,
    #[serde(with = "humantime_serde")]
    pub min_request_interval: Duration,
    pub event_queue_size: usize,
    pub batch_queue_size: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Option<Duration>,
}

impl Default for PusherSettings {
    fn default() -> Self {
        Self {
            retry_count: crate::pusher::DEFAULT_RETRY_COUNT,
            min_request_interval: crate::pusher::DEFAULT_MIN_REQUEST_INTERVAL,
            event_queue_size: crate::pusher::DEFAULT_EVENT_QUEUE_SIZE,
            batch_queue_size: crate::pusher::DEFAULT_BATCH_QUEUE_SIZE,
            flush_interval: Some(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Write to this file instead of stderr
    pub file: Option<PathBuf>,
    pub rotation: RotationPolicy,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            rotation: RotationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RotationPolicy {
    pub max_size_mb: u64,
    pub max_backups: usize,
    pub max_age_days: u64,
    /// Gzip rotated files
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_mb: 100,
            max_backups: 5,
            max_age_days: 7,
            compress: true,
        }
    }
}

impl RotationPolicy {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_days * 24 * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Recorded as the source of every event read from stdin
    pub source_name: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source_name: "stdin".to_string(),
        }
    }
}
