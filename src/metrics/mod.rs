use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(
        "http_requests_total",
        "Total number of HTTP requests forwarded to an upstream"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "route_not_found_total",
        "Requests answered with 404 because no route matched"
    );
    describe_gauge!("routes_loaded", "Number of routes in the active configuration");
}

/// Start Prometheus metrics server on given address
pub fn start_metrics_server(addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: std::net::SocketAddr = addr.parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    init_metrics();

    Ok(())
}

pub struct Metrics;

impl Metrics {
    #[inline]
    pub fn record_request(
        entrypoint: &str,
        route: &str,
        upstream: &str,
        method: &str,
        status: u16,
        duration: Duration,
    ) {
        let labels = [
            ("entrypoint", entrypoint.to_string()),
            ("route", route.to_string()),
            ("upstream", upstream.to_string()),
            ("method", method.to_string()),
            ("status", status.to_string()),
        ];

        counter!("http_requests_total", &labels).increment(1);
        histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
    }

    #[inline]
    pub fn record_not_found(entrypoint: &str, method: &str) {
        let labels = [
            ("entrypoint", entrypoint.to_string()),
            ("method", method.to_string()),
        ];

        counter!("route_not_found_total", &labels).increment(1);
    }

    #[inline]
    pub fn set_routes_loaded(count: usize) {
        gauge!("routes_loaded").set(count as f64);
    }
}
