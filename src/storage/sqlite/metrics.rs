//! Store operation metrics.

use std::time::Instant;

/// Records `store_operations_total` and `store_operation_duration_ms` for one
/// store call.
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    success: bool,
) {
    let status = if success { "success" } else { "error" };
    metrics::counter!(
        "store_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "store_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
