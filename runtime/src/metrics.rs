//! Prometheus metrics for observability and monitoring.
//!
//! Counters emitted across the workspace:
//! - Scheduler callbacks fired (both schedulers)
//! - Subscriptions cancelled through the registry
//! - Store actions processed and effects started
//! - Retry attempts and exhaustion
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_effects_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::runtime::Handle;

// Re-export metrics macros for use in other modules
pub use metrics::counter;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter or bind its listener
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// No tokio runtime to run the HTTP listener on
    #[error("Metrics server requires a tokio runtime: {0}")]
    NoRuntime(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions, install the Prometheus recorder, and
    /// serve `/metrics` on the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::NoRuntime`] outside a tokio runtime and
    /// [`MetricsError::Build`] if the listener cannot bind.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// succeeds without serving anything and [`render`](Self::render) returns
    /// `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let runtime = Handle::try_current().map_err(|e| MetricsError::NoRuntime(e.to_string()))?;

        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        runtime.spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics listener stopped");
            }
        });
        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Scheduler Metrics
    describe_counter!(
        "scheduler_callbacks_fired_total",
        "Total number of scheduled callbacks fired"
    );

    // Cancellation Metrics
    describe_counter!(
        "cancellation_subscriptions_cancelled_total",
        "Total number of subscriptions disposed by cancelling their id"
    );

    // Store Metrics
    describe_counter!(
        "store_actions_processed_total",
        "Total number of actions reduced by stores"
    );
    describe_counter!(
        "store_effects_started_total",
        "Total number of effects subscribed by stores"
    );

    // Retry Metrics
    describe_counter!(
        "retry_attempts_total",
        "Total number of retry attempts"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of retried effects that exhausted max retries"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action processed.
    pub fn record_action() {
        counter!("store_actions_processed_total").increment(1);
    }

    /// Record an effect started.
    pub fn record_effect_started() {
        counter!("store_effects_started_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
