//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{Gauge, HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quizgate_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // Auth Metrics
    pub static ref AUTH_FLOW_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quizgate_auth_flow_total", "Total number of auth flow completions by outcome"),
        &["flow", "outcome"]
    ).expect("metric can be created");
    pub static ref ROUTE_GATE_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quizgate_route_gate_decisions_total", "Total number of route gate decisions"),
        &["decision"]
    ).expect("metric can be created");

    // Identity Provider Metrics
    pub static ref PROVIDER_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quizgate_provider_requests_total", "Total number of identity provider requests"),
        &["operation", "status"]
    ).expect("metric can be created");
    pub static ref PROVIDER_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "quizgate_provider_request_duration_seconds",
            "Identity provider request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"]
    ).expect("metric can be created");

    // Database Metrics
    pub static ref DB_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quizgate_db_queries_total", "Total number of database queries"),
        &["operation", "table"]
    ).expect("metric can be created");

    // Application Metrics
    pub static ref APP_UPTIME_SECONDS: Gauge = Gauge::new(
        "quizgate_app_uptime_seconds",
        "Application uptime in seconds"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quizgate_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; repeated registrations are ignored so
/// integration tests can build several servers in one process.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(AUTH_FLOW_TOTAL.clone()),
        Box::new(ROUTE_GATE_DECISIONS_TOTAL.clone()),
        Box::new(PROVIDER_REQUESTS_TOTAL.clone()),
        Box::new(PROVIDER_REQUEST_DURATION_SECONDS.clone()),
        Box::new(DB_QUERIES_TOTAL.clone()),
        Box::new(APP_UPTIME_SECONDS.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(error) => tracing::error!(%error, "Failed to register metric"),
        }
    }

    tracing::info!("Metrics registry initialized");
}

/// Record the outcome of one auth flow run.
pub fn record_auth_flow(flow: &str, outcome: &str) {
    AUTH_FLOW_TOTAL.with_label_values(&[flow, outcome]).inc();
}

/// Record one query against `table`.
pub fn record_db_query(operation: &str, table: &str) {
    DB_QUERIES_TOTAL.with_label_values(&[operation, table]).inc();
}
