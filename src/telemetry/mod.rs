//! Telemetry module
//!
//! Metrics and structured logging

mod logging;
mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{
    increment_counter, init_metrics_server, record_latency, set_gauge, CounterMetric, GaugeMetric,
    LatencyMetric,
};

use crate::config::TelemetryConfig;

/// Guard that cleans up telemetry on drop
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level)?;

    if let Some(ref endpoint) = config.otlp_endpoint {
        tracing::info!(endpoint = %endpoint, "OTLP export configured");
    }

    init_metrics_server(config.metrics_port)?;

    Ok(TelemetryGuard { _priv: () })
}
