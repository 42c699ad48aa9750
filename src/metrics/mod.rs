//! Prometheus metrics module
//!
//! Counters and gauges for collection cycles, sends and the socket lifecycle.

use crate::error::SyncError;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Sync metrics collector
///
/// Recording goes through the global `metrics` facade. Only an installed
/// collector owns a Prometheus handle and can render; a detached one
/// records into whatever recorder is installed (none in unit tests).
#[derive(Clone, Default)]
pub struct SyncMetrics {
    handle: Option<Arc<PrometheusHandle>>,
}

impl SyncMetrics {
    /// Install the Prometheus recorder and register metric descriptions.
    ///
    /// Can only succeed once per process.
    pub fn install() -> Result<Self, SyncError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| SyncError::Config(format!("failed to install Prometheus recorder: {e}")))?;

        Self::register_metrics();

        Ok(Self {
            handle: Some(Arc::new(handle)),
        })
    }

    /// A collector without an exporter.
    pub fn detached() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions
    fn register_metrics() {
        describe_counter!(
            "sync_cycles_total",
            Unit::Count,
            "Completed shard collection cycles"
        );
        describe_counter!(
            "sync_updates_sent_total",
            Unit::Count,
            "Session updates handed to the socket"
        );
        describe_counter!(
            "sync_updates_skipped_total",
            Unit::Count,
            "Cycles whose snapshot matched the last sent one"
        );
        describe_counter!(
            "sync_shard_failures_total",
            Unit::Count,
            "Shard queries that failed during collection"
        );
        describe_counter!(
            "sync_emit_dropped_total",
            Unit::Count,
            "Outbound frames dropped because the socket was not connected"
        );
        describe_counter!(
            "sync_reconnect_attempts_total",
            Unit::Count,
            "Automatic reconnection attempts"
        );
        describe_counter!(
            "sync_inbound_events_total",
            Unit::Count,
            "Inbound socket events received"
        );
        describe_counter!(
            "sync_decode_failures_total",
            Unit::Count,
            "Inbound payloads that failed to decode"
        );
        describe_counter!("sync_errors_total", Unit::Count, "Total sync errors");

        describe_histogram!(
            "sync_cycle_duration_seconds",
            Unit::Seconds,
            "Time from cycle start to merged snapshot"
        );

        describe_gauge!(
            "sync_sessions_tracked",
            Unit::Count,
            "Sessions in the most recent merged snapshot"
        );
        describe_gauge!(
            "sync_socket_connected",
            Unit::Count,
            "Socket connection status (1=connected, 0=disconnected)"
        );
    }

    /// Record a completed collection cycle
    pub fn record_cycle(&self, duration: Duration, sessions: usize) {
        counter!("sync_cycles_total").increment(1);
        histogram!("sync_cycle_duration_seconds").record(duration.as_secs_f64());
        gauge!("sync_sessions_tracked").set(sessions as f64);
    }

    pub fn record_update_sent(&self, forced: bool) {
        counter!(
            "sync_updates_sent_total",
            "forced" => if forced { "true" } else { "false" }
        )
        .increment(1);
    }

    pub fn record_update_skipped(&self) {
        counter!("sync_updates_skipped_total").increment(1);
    }

    pub fn record_shard_failure(&self, shard_id: &str) {
        counter!(
            "sync_shard_failures_total",
            "shard_id" => shard_id.to_string()
        )
        .increment(1);
    }

    pub fn record_emit_dropped(&self, event: &str) {
        counter!(
            "sync_emit_dropped_total",
            "event" => event.to_string()
        )
        .increment(1);
    }

    pub fn record_reconnect_attempt(&self) {
        counter!("sync_reconnect_attempts_total").increment(1);
    }

    pub fn record_inbound(&self, event: &str) {
        counter!(
            "sync_inbound_events_total",
            "event" => event.to_string()
        )
        .increment(1);
    }

    pub fn record_decode_failure(&self, event: &str) {
        counter!(
            "sync_decode_failures_total",
            "event" => event.to_string()
        )
        .increment(1);
    }

    /// Record an error by its `error_type_label`
    pub fn record_error(&self, error_type: &'static str) {
        counter!("sync_errors_total", "error_type" => error_type).increment(1);
    }

    pub fn set_socket_connected(&self, connected: bool) {
        gauge!("sync_socket_connected").set(if connected { 1.0 } else { 0.0 });
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(|handle| handle.render())
            .unwrap_or_default()
    }
}
