//! Batched, rate-limited delivery of log events to a CloudWatch Logs
//! compatible ingestion API.

pub mod cli;
pub mod client;
pub mod config;
pub mod logging;
pub mod pusher;
