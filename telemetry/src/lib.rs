//! Crawl telemetry - live client for crawler run telemetry
//!
//! This crate subscribes to a run's frame stream, keeps rolling series and
//! an accreting host graph per open view, and polls the run's pull
//! endpoints alongside the stream.

pub mod api;
pub mod config;
pub mod decoder;
pub mod graph;
pub mod personality;
pub mod poller;
pub mod run_view;
pub mod series;
pub mod transport;

pub use api::{ApiClient, ApiError, RunBackend};
pub use config::TelemetryConfig;
pub use run_view::{
    ConnectionStatus, RunView, RunViewError, RunViewEvent, RunViewHandle, RunViewSnapshot,
};
