//! Batching and delivery of log events to one destination stream.
//!
//! ```text
//!   producers ──add_log_entry──> [admission queue, 10 000 events]
//!                                        │
//!                                 assembler task ── validate, truncate, close full batches
//!                                        │
//!                                [delivery queue, 2 batches]
//!                                        │
//!                                 delivery task ── sort, create stream, PutLogEvents, rate limit
//! ```
//!
//! The small delivery queue is what pushes back on producers: when sending
//! falls behind, the assembler blocks on it, the admission queue fills up and
//! `add_log_entry` waits.

pub mod assembler;
pub mod batch;
pub mod delivery;
pub mod event;
pub mod limits;

pub use assembler::BatchAssembler;
pub use batch::LogEventBatch;
pub use delivery::{Deliverer, StreamToken};
pub use event::LogEvent;
pub use limits::Limits;

use crate::client::{ClientError, LogClient};
use crate::config::types::{DestinationConfig, PusherSettings};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const DEFAULT_RETRY_COUNT: usize = 5;
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 10_000;
pub const DEFAULT_BATCH_QUEUE_SIZE: usize = 2;
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PushError {
    #[error("log delivery failed: {0}")]
    Delivery(#[from] ClientError),

    #[error("pusher is shut down")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct PusherConfig {
    pub log_group: String,
    pub log_stream: String,
    pub retry_count: usize,
    pub min_request_interval: Duration,
    pub event_queue_size: usize,
    pub batch_queue_size: usize,
    /// Close a non-empty batch at this interval even if it is not full
    pub flush_interval: Option<Duration>,
    pub limits: Limits,
}

impl PusherConfig {
    pub fn new(log_group: impl Into<String>, log_stream: impl Into<String>) -> Self {
        Self {
            log_group: log_group.into(),
            log_stream: log_stream.into(),
            retry_count: DEFAULT_RETRY_COUNT,
            min_request_interval: DEFAULT_MIN_REQUEST_INTERVAL,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            batch_queue_size: DEFAULT_BATCH_QUEUE_SIZE,
            flush_interval: None,
            limits: Limits::default(),
        }
    }

    pub fn from_settings(
        destination: &DestinationConfig,
        log_stream: String,
        settings: &PusherSettings,
        limits: &Limits,
    ) -> Self {
        Self {
            log_group: destination.log_group.clone(),
            log_stream,
            retry_count: if settings.retry_count > 0 {
                settings.retry_count
            } else {
                DEFAULT_RETRY_COUNT
            },
            min_request_interval: settings.min_request_interval,
            event_queue_size: settings.event_queue_size.max(1),
            batch_queue_size: settings.batch_queue_size.max(1),
            flush_interval: settings.flush_interval,
            limits: limits.clone(),
        }
    }
}

enum Admission {
    Entry(LogEvent),
    Flush(oneshot::Sender<Result<(), PushError>>),
}

enum Delivery {
    Batch {
        batch: LogEventBatch,
        ack: Option<oneshot::Sender<Result<(), PushError>>>,
    },
    /// Acknowledged once every batch queued before it has been attempted
    Barrier(oneshot::Sender<Result<(), PushError>>),
}

/// Failure of a batch nobody is waiting on, reported on the next call.
type PendingFailure = Arc<Mutex<Option<PushError>>>;

/// Pushes log events for one log group / stream.
pub struct Pusher {
    admission: mpsc::Sender<Admission>,
    pending_failure: PendingFailure,
    assembler_handle: JoinHandle<()>,
    delivery_handle: JoinHandle<()>,
}

impl Pusher {
    /// Create a pusher and start its assembler and delivery tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PusherConfig, client: Arc<dyn LogClient>) -> Self {
        let (admission_tx, admission_rx) = mpsc::channel(config.event_queue_size);
        let (delivery_tx, delivery_rx) = mpsc::channel(config.batch_queue_size);
        let pending_failure: PendingFailure = Arc::new(Mutex::new(None));

        let assembler = BatchAssembler::new(
            config.log_group.clone(),
            config.log_stream.clone(),
            config.limits.clone(),
        );
        let deliverer = Deliverer::new(client, config.retry_count, config.min_request_interval);

        info!(
            log_group = %config.log_group,
            log_stream = %config.log_stream,
            retry_count = config.retry_count,
            "Starting log pusher"
        );

        let assembler_handle = tokio::spawn(run_assembler(
            admission_rx,
            delivery_tx,
            assembler,
            config.flush_interval,
        ));
        let delivery_handle = tokio::spawn(run_delivery(
            delivery_rx,
            deliverer,
            Arc::clone(&pending_failure),
        ));

        Self {
            admission: admission_tx,
            pending_failure,
            assembler_handle,
            delivery_handle,
        }
    }

    /// Queue one event for delivery.
    ///
    /// Waits while the admission queue is full. The event is accepted even
    /// when an error is returned: errors report an earlier batch that could
    /// not be delivered.
    pub async fn add_log_entry(&self, mut event: LogEvent) -> Result<(), PushError> {
        event.normalize_timestamp();
        event.truncate_if_oversize();

        self.admission
            .send(Admission::Entry(event))
            .await
            .map_err(|_| PushError::Closed)?;

        self.take_pending_failure()
    }

    /// Send whatever is in the open batch and wait until it, and every batch
    /// closed before it, has been attempted.
    pub async fn force_flush(&self) -> Result<(), PushError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.admission
            .send(Admission::Flush(ack_tx))
            .await
            .map_err(|_| PushError::Closed)?;

        ack_rx.await.map_err(|_| PushError::Closed)??;
        self.take_pending_failure()
    }

    /// Flush, stop both tasks and wait for them to finish.
    pub async fn shutdown(self) -> Result<(), PushError> {
        let result = self.force_flush().await;

        drop(self.admission);
        if let Err(e) = self.assembler_handle.await {
            error!(error = %e, "Assembler task failed");
        }
        if let Err(e) = self.delivery_handle.await {
            error!(error = %e, "Delivery task failed");
        }

        info!("Log pusher shutdown complete");
        result
    }

    fn take_pending_failure(&self) -> Result<(), PushError> {
        let failure = match self.pending_failure.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Single writer of the open batch.
async fn run_assembler(
    mut input: mpsc::Receiver<Admission>,
    output: mpsc::Sender<Delivery>,
    mut assembler: BatchAssembler,
    flush_interval: Option<Duration>,
) {
    // An interval that never fires when periodic flushing is off
    let period = flush_interval.unwrap_or(Duration::from_secs(365 * 24 * 3600));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    debug!("Assembler task started");

    loop {
        tokio::select! {
            message = input.recv() => {
                match message {
                    Some(Admission::Entry(event)) => {
                        if let Some(batch) = assembler.admit(event, Utc::now()) {
                            if output.send(Delivery::Batch { batch, ack: None }).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Admission::Flush(ack)) => {
                        let delivery = match assembler.force_flush() {
                            Some(batch) => Delivery::Batch { batch, ack: Some(ack) },
                            None => Delivery::Barrier(ack),
                        };
                        if output.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ticker.tick(), if flush_interval.is_some() => {
                if let Some(batch) = assembler.force_flush() {
                    debug!(events = batch.len(), "Flushing log event batch on interval");
                    if output.send(Delivery::Batch { batch, ack: None }).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // Senders are gone, hand over what is left
    if let Some(batch) = assembler.force_flush() {
        let _ = output.send(Delivery::Batch { batch, ack: None }).await;
    }
    debug!("Assembler task stopped");
}

async fn run_delivery(
    mut input: mpsc::Receiver<Delivery>,
    mut deliverer: Deliverer,
    pending_failure: PendingFailure,
) {
    debug!("Delivery task started");

    while let Some(delivery) = input.recv().await {
        match delivery {
            Delivery::Batch { batch, ack } => {
                let events = batch.len();
                let result = deliverer.deliver(batch).await.map_err(PushError::from);

                if let Err(e) = &result {
                    error!(events, error = %e, "Dropping log event batch after failed delivery");
                }

                match ack {
                    Some(ack) => {
                        let _ = ack.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            match pending_failure.lock() {
                                Ok(mut guard) => *guard = Some(e),
                                Err(poisoned) => *poisoned.into_inner() = Some(e),
                            }
                        }
                    }
                }
            }
            Delivery::Barrier(ack) => {
                let _ = ack.send(Ok(()));
            }
        }
    }

    debug!("Delivery task stopped");
}
