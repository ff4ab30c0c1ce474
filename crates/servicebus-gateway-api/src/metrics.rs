//! Prometheus metrics for the API service.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

const NAMESPACE: &str = "servicebus_gateway";

/// Service metrics, registered on a registry owned by this instance
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    // HTTP request metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,

    // Broker operation metrics
    pub broker_operations_total: IntCounterVec,
    pub broker_operation_duration: HistogramVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests")
                .namespace(NAMESPACE),
            &["method", "path", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request processing time",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0]),
            &["method", "path"],
        )?;
        let broker_operations_total = IntCounterVec::new(
            Opts::new(
                "broker_operations_total",
                "Broker operations by operation and outcome",
            )
            .namespace(NAMESPACE),
            &["operation", "outcome"],
        )?;
        let broker_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "broker_operation_duration_seconds",
                "Broker operation latency",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["operation"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(broker_operations_total.clone()))?;
        registry.register(Box::new(broker_operation_duration.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration,
            broker_operations_total,
            broker_operation_duration,
        }))
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, path])
            .observe(elapsed.as_secs_f64());
    }

    /// Count one broker operation; `outcome` is `success`, `empty` or `error`
    pub fn record_broker_operation(&self, operation: &str, outcome: &str, elapsed: Duration) {
        self.broker_operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.broker_operation_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
