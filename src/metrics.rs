//! Prometheus metrics HTTP server.
//!
//! Exposes pipeline statistics in Prometheus text format via HTTP endpoint.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::stats::SpotStats;

/// Start the Prometheus metrics HTTP server.
///
/// Runs in the background and serves metrics at `/metrics`.
/// Returns an error if the server fails to bind to the port.
pub async fn start_metrics_server(
    port: u16,
    stats: Arc<SpotStats>,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(addr).await?;
    info!("Prometheus metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, router(stats))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

fn router(stats: Arc<SpotStats>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(stats)
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(stats): State<Arc<SpotStats>>) -> impl IntoResponse {
    let output = format_prometheus_metrics(&stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

/// Append a single-valued metric with its HELP and TYPE lines.
fn push_metric(output: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} {}", name, kind);
    let _ = writeln!(output, "{} {}", name, value);
}

/// Format statistics as Prometheus text format.
fn format_prometheus_metrics(stats: &SpotStats) -> String {
    let summary = stats.summary();
    let mut output = String::with_capacity(4096);

    push_metric(
        &mut output,
        "dxspot_uptime_seconds",
        "gauge",
        "Time since the pipeline started",
        format_args!("{:.3}", summary.elapsed_secs),
    );
    push_metric(
        &mut output,
        "dxspot_lines_total",
        "counter",
        "Lines received from the cluster",
        summary.lines,
    );
    push_metric(
        &mut output,
        "dxspot_bytes_processed_total",
        "counter",
        "Total bytes of raw input processed",
        summary.bytes_processed,
    );
    push_metric(
        &mut output,
        "dxspot_non_spot_lines_total",
        "counter",
        "Number of non-spot lines received",
        summary.non_spot_lines,
    );
    push_metric(
        &mut output,
        "dxspot_parse_failures_total",
        "counter",
        "Number of spot lines that failed to parse",
        summary.parse_failures,
    );
    push_metric(
        &mut output,
        "dxspot_spots_parsed_total",
        "counter",
        "Number of spots parsed",
        summary.parsed_spots,
    );
    push_metric(
        &mut output,
        "dxspot_unresolved_total",
        "counter",
        "Parsed spots whose callsign did not resolve to an entity",
        summary.unresolved,
    );
    push_metric(
        &mut output,
        "dxspot_suppressed_total",
        "counter",
        "Spots hidden because the entity is already confirmed on the band",
        summary.suppressed,
    );
    push_metric(
        &mut output,
        "dxspot_filtered_total",
        "counter",
        "Spots hidden by display filters",
        summary.filtered,
    );
    push_metric(
        &mut output,
        "dxspot_spots_per_second",
        "gauge",
        "Current spot parsing rate",
        format_args!("{:.3}", summary.spots_per_second),
    );

    // Emitted spots by band and mode
    output.push_str("# HELP dxspot_emitted_by_band_total Emitted spots broken down by band\n");
    output.push_str("# TYPE dxspot_emitted_by_band_total counter\n");
    for (band, count) in &summary.spots_by_band {
        let _ = writeln!(output, "dxspot_emitted_by_band_total{{band=\"{}\"}} {}", band, count);
    }

    output.push_str("# HELP dxspot_emitted_by_mode_total Emitted spots broken down by mode\n");
    output.push_str("# TYPE dxspot_emitted_by_mode_total counter\n");
    for (mode, count) in &summary.spots_by_mode {
        let _ = writeln!(output, "dxspot_emitted_by_mode_total{{mode=\"{}\"}} {}", mode, count);
    }
    // Also output total if modes map is empty
    if summary.spots_by_mode.is_empty() {
        let _ = writeln!(output, "dxspot_emitted_by_mode_total {}", summary.emitted);
    }

    if let Some(ref lines) = summary.line_percentiles {
        output.push_str("# HELP dxspot_line_bytes Line length distribution in bytes\n");
        output.push_str("# TYPE dxspot_line_bytes summary\n");
        let _ = writeln!(output, "dxspot_line_bytes{{quantile=\"0.5\"}} {}", lines.p50);
        let _ = writeln!(output, "dxspot_line_bytes{{quantile=\"0.9\"}} {}", lines.p90);
        let _ = writeln!(output, "dxspot_line_bytes{{quantile=\"0.99\"}} {}", lines.p99);
        let _ = writeln!(output, "dxspot_line_bytes_count {}", summary.lines);
    }

    output
}
