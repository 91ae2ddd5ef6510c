use crate::client::{ClientError, HttpLogClient};
use crate::config::parse::{load_config, ConfigError};
use crate::logging::{self, LoggingError};
use crate::pusher::{LogEvent, PushError, Pusher, PusherConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("push error: {0}")]
    Push(#[from] PushError),

    #[error("failed to read input: {0}")]
    Input(#[from] std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/logpusher/config.yml");
            eprintln!("  /etc/logpusher/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'logpusher config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_pusher(&config_path).await.map_err(|e| e.into())
}

async fn run_pusher(config_path: &Path) -> Result<(), RunError> {
    let config = load_config(config_path)?;
    logging::init(&config.logging)?;

    let log_stream = config.destination.resolved_log_stream();
    info!(
        config_path = %config_path.display(),
        endpoint = %config.destination.endpoint,
        log_group = %config.destination.log_group,
        log_stream = %log_stream,
        "Configuration loaded"
    );

    let client = Arc::new(HttpLogClient::new(
        config.destination.endpoint.clone(),
        &config.client,
    )?);
    let pusher_config = PusherConfig::from_settings(
        &config.destination,
        log_stream,
        &config.pusher,
        &config.limits,
    );
    let pusher = Pusher::new(pusher_config, client);

    let stdin = BufReader::new(tokio::io::stdin());

    info!("Reading log lines from stdin, press Ctrl+C to stop");
    let mut lines = 0u64;
    let forwarded = tokio::select! {
        result = forward_lines(stdin, &pusher, &config.input.source_name, &mut lines) => result,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, flushing pending events");
            Ok(())
        }
    };
    info!(lines, "Input finished");

    let shutdown = pusher.shutdown().await;
    forwarded?;
    shutdown?;
    Ok(())
}

/// Push every line of `reader` as one event until EOF, counting them in `lines`.
///
/// Lines get no timestamp (the pusher stamps them on admission) and the byte
/// offset of their first byte as source offset. Invalid UTF-8 is replaced,
/// not rejected. Delivery failures of earlier batches are logged and reading
/// continues.
pub async fn forward_lines<R>(
    reader: R,
    pusher: &Pusher,
    source_name: &str,
    lines: &mut u64,
) -> Result<(), RunError>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = reader;
    let mut buf = Vec::new();
    let mut offset: i64 = 0;

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).await?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let event = LogEvent::new(0, line.trim_end_matches(['\n', '\r']), source_name, offset);
        offset += read as i64;
        *lines += 1;

        match pusher.add_log_entry(event).await {
            Ok(()) => {}
            Err(PushError::Closed) => return Err(PushError::Closed.into()),
            Err(e) => error!(error = %e, "Earlier log batch was lost"),
        }
    }

    Ok(())
}
