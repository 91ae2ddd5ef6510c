use super::types::*;
use crate::config::{env_var_pattern, expand_env_vars, expand_tilde};
use crate::logging::filter_directive;
use crate::pusher::limits::{PER_EVENT_HEADER_BYTES, TRUNCATED_SUFFIX};
use std::fs;
use std::path::Path;
use thiserror::Error;

const MAX_NAME_LEN: usize = 512;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate a config document.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = env_var_pattern()
        .captures_iter(yaml_string)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with a literal value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             Set them or replace them in the config file with literal values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn expand_paths(config: &mut Config) {
    if let Some(file) = config.logging.file.as_mut() {
        *file = expand_tilde(file);
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_destination(&config.destination, &mut errors);
    validate_client(&config.client, &mut errors);
    validate_pusher(&config.pusher, &mut errors);
    validate_limits(config, &mut errors);
    validate_logging(&config.logging, &mut errors);

    if config.input.source_name.trim().is_empty() {
        errors.push("input.source_name must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_destination(destination: &DestinationConfig, errors: &mut Vec<String>) {
    let group = &destination.log_group;
    if group.is_empty() {
        errors.push("destination.log_group must not be empty".to_string());
    } else if group.len() > MAX_NAME_LEN {
        errors.push(format!(
            "destination.log_group is longer than {} characters",
            MAX_NAME_LEN
        ));
    } else if let Some(c) = group
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | '#')))
    {
        errors.push(format!(
            "destination.log_group '{}' contains invalid character '{}'",
            group, c
        ));
    }

    if let Some(stream) = &destination.log_stream {
        if stream.is_empty() {
            errors.push("destination.log_stream must not be empty when set".to_string());
        } else if stream.len() > MAX_NAME_LEN {
            errors.push(format!(
                "destination.log_stream is longer than {} characters",
                MAX_NAME_LEN
            ));
        } else if stream.contains(':') || stream.contains('*') {
            errors.push(format!(
                "destination.log_stream '{}' must not contain ':' or '*'",
                stream
            ));
        }
    }

    let endpoint = &destination.endpoint;
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        errors.push(format!(
            "destination.endpoint '{}' must be an http:// or https:// URL",
            endpoint
        ));
    }
}

fn validate_client(client: &ClientConfig, errors: &mut Vec<String>) {
    if client.timeout.is_zero() {
        errors.push("client.timeout must be greater than zero".to_string());
    }
    if client.retry_interval.is_zero() {
        errors.push("client.retry_interval must be greater than zero".to_string());
    }
    if client.max_backoff < client.retry_interval {
        errors.push("client.max_backoff must not be less than client.retry_interval".to_string());
    }
    if client.create_stream_attempts == 0 {
        errors.push("client.create_stream_attempts must be at least 1".to_string());
    }
}

fn validate_pusher(pusher: &PusherSettings, errors: &mut Vec<String>) {
    if pusher.retry_count == 0 {
        errors.push("pusher.retry_count must be at least 1".to_string());
    }
    if pusher.event_queue_size == 0 {
        errors.push("pusher.event_queue_size must be at least 1".to_string());
    }
    if pusher.batch_queue_size == 0 {
        errors.push("pusher.batch_queue_size must be at least 1".to_string());
    }
    if pusher.flush_interval.is_some_and(|d| d.is_zero()) {
        errors.push("pusher.flush_interval must be greater than zero when set".to_string());
    }
}

fn validate_limits(config: &Config, errors: &mut Vec<String>) {
    let limits = &config.limits;
    let min_event_bytes = PER_EVENT_HEADER_BYTES + TRUNCATED_SUFFIX.len();

    if limits.max_event_bytes <= min_event_bytes {
        errors.push(format!(
            "limits.max_event_bytes must be greater than {}",
            min_event_bytes
        ));
    }
    if limits.max_request_bytes < limits.max_event_bytes {
        errors.push("limits.max_request_bytes must not be less than limits.max_event_bytes".to_string());
    }
    if limits.max_request_events == 0 {
        errors.push("limits.max_request_events must be at least 1".to_string());
    }
    if limits.max_request_span.is_zero() {
        errors.push("limits.max_request_span must be greater than zero".to_string());
    }
}

fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<String>) {
    if let Err(e) = tracing_subscriber::EnvFilter::try_new(filter_directive(&logging.level)) {
        errors.push(format!("logging.level '{}' is invalid: {}", logging.level, e));
    }
    if logging.rotation.max_size_mb == 0 {
        errors.push("logging.rotation.max_size_mb must be at least 1".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MINIMAL: &str = r#"
destination:
  log_group: /app/logs
  endpoint: https://logs.us-east-1.amazonaws.com
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();

        assert_eq!(config.destination.log_group, "/app/logs");
        assert_eq!(config.destination.log_stream, None);
        assert_eq!(config.client.timeout, Duration::from_secs(30));
        assert_eq!(config.client.retry_interval, Duration::from_millis(200));
        assert_eq!(config.pusher.retry_count, 5);
        assert_eq!(config.pusher.min_request_interval, Duration::from_millis(200));
        assert_eq!(config.pusher.event_queue_size, 10_000);
        assert_eq!(config.pusher.batch_queue_size, 2);
        assert_eq!(config.pusher.flush_interval, Some(Duration::from_secs(5)));
        assert_eq!(config.limits, crate::pusher::Limits::default());
        assert_eq!(config.logging.rotation.max_backups, 5);
        assert_eq!(config.input.source_name, "stdin");
    }

    #[test]
    fn test_durations_and_limit_overrides() {
        let yaml = r#"
destination:
  log_group: g
  log_stream: s
  endpoint: http://localhost:4566
pusher:
  min_request_interval: 1s
  flush_interval: 250ms
limits:
  max_request_events: 500
  max_request_span: 1h
"#;
        let config = parse_config(yaml).unwrap();

        assert_eq!(config.pusher.min_request_interval, Duration::from_secs(1));
        assert_eq!(config.pusher.flush_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.limits.max_request_events, 500);
        assert_eq!(config.limits.max_request_span, Duration::from_secs(3600));
        // Untouched limits keep their defaults
        assert_eq!(config.limits.max_request_bytes, 1024 * 1024);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let yaml = r#"
destination:
  log_group: "bad group!"
  log_stream: "a:b"
  endpoint: logs.example.com
pusher:
  retry_count: 0
"#;
        match parse_config(yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert_eq!(errors.len(), 4, "{:?}", errors);
                assert!(errors.iter().any(|e| e.contains("log_group")));
                assert!(errors.iter().any(|e| e.contains("log_stream")));
                assert!(errors.iter().any(|e| e.contains("endpoint")));
                assert!(errors.iter().any(|e| e.contains("retry_count")));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_unset_env_var_is_reported() {
        let yaml = r#"
destination:
  log_group: $env{LOGPUSHER_TEST_SURELY_UNSET}
  endpoint: https://example.com
"#;
        match parse_config(yaml) {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains("LOGPUSHER_TEST_SURELY_UNSET"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_destination_is_parse_error() {
        let result = parse_config("pusher:\n  retry_count: 3\n");
        assert!(matches!(result, Err(ConfigError::YamlParse(_))));
    }

    #[test]
    fn test_invalid_log_level() {
        let yaml = format!("{}logging:\n  level: \"logpusher=loud\"\n", MINIMAL);
        assert!(matches!(parse_config(&yaml), Err(ConfigError::ValidationList(_))));
    }
}
