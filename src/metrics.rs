//! Prometheus metrics for application observability.
//!
//! Metrics are exposed by a dedicated HTTP listener on `METRICS_PORT`; with
//! the port unset or `0` nothing is installed and the recording functions
//! below are no-ops.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gateway_rejections_total` - Requests stopped by a pipeline stage (labels: stage, status)
//! - `gateway_upload_parts_total` - Multipart parts accepted
//!
//! ## Histograms
//! - `gateway_upload_bytes` - Total bytes per accepted upload
//!
//! ## Gauges
//! - `gateway_data_source_status` - Data source reachability (1 = connected, 0 = disconnected)

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::pipeline::Stage;

/// Metric names as constants for consistency.
pub mod names {
    pub const REJECTIONS_TOTAL: &str = "gateway_rejections_total";
    pub const UPLOAD_PARTS_TOTAL: &str = "gateway_upload_parts_total";
    pub const UPLOAD_BYTES: &str = "gateway_upload_bytes";
    pub const DATA_SOURCE_STATUS: &str = "gateway_data_source_status";
}

/// Install the Prometheus exporter and describe every metric.
///
/// # Errors
///
/// Returns a message if the listener cannot be installed, e.g. because a
/// recorder is already registered.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_metrics();

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        names::REJECTIONS_TOTAL,
        "Total number of requests rejected by a pipeline stage"
    );
    describe_counter!(
        names::UPLOAD_PARTS_TOTAL,
        "Total number of multipart parts accepted"
    );
    describe_histogram!(names::UPLOAD_BYTES, "Bytes received per accepted upload");
    describe_gauge!(
        names::DATA_SOURCE_STATUS,
        "Data source status (1 = connected, 0 = disconnected)"
    );
}

/// Record a request rejected by `stage` with `status`.
pub fn record_rejection(stage: Stage, status: u16) {
    counter!(names::REJECTIONS_TOTAL, "stage" => stage.name(), "status" => status.to_string())
        .increment(1);
}

/// Record an accepted upload.
pub fn record_upload(parts: usize, bytes: usize) {
    counter!(names::UPLOAD_PARTS_TOTAL).increment(parts as u64);
    histogram!(names::UPLOAD_BYTES).record(bytes as f64);
}

/// Update the data source gauge.
pub fn set_data_source_status(connected: bool) {
    gauge!(names::DATA_SOURCE_STATUS).set(if connected { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed exporter must not panic.

    #[test]
    fn test_record_rejection() {
        for stage in Stage::ALL {
            record_rejection(stage, 400);
        }
    }

    #[test]
    fn test_record_upload() {
        record_upload(2, 1024);
        record_upload(0, 0);
    }

    #[test]
    fn test_set_data_source_status() {
        set_data_source_status(true);
        set_data_source_status(false);
    }
}
