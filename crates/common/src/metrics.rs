use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge_vec, CounterVec,
    Encoder, HistogramVec, IntGaugeVec, TextEncoder,
};

lazy_static! {
    // Cache metrics
    pub static ref CACHE_REQUEST_COUNTER: CounterVec = register_counter_vec!(
        "storefront_cache_requests_total",
        "Total number of cache lookups",
        &["cache_type", "status"]
    )
    .expect("metric cannot be created");

    pub static ref CACHE_INVALIDATION_COUNTER: CounterVec = register_counter_vec!(
        "storefront_cache_invalidations_total",
        "Total number of cache keys invalidated after writes",
        &["cache_type", "status"]
    )
    .expect("metric cannot be created");

    // Store metrics
    pub static ref STORE_OPERATIONS: CounterVec = register_counter_vec!(
        "storefront_store_operations_total",
        "Total number of backing store operations",
        &["store", "operation", "status"]
    )
    .expect("metric cannot be created");

    pub static ref STORE_DURATION: HistogramVec = register_histogram_vec!(
        "storefront_store_duration_seconds",
        "Backing store operation duration in seconds",
        &["store", "operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("metric cannot be created");

    // Checkout saga metrics
    pub static ref CHECKOUT_COUNTER: CounterVec = register_counter_vec!(
        "storefront_checkouts_total",
        "Total number of checkout sagas by outcome",
        &["status"]
    )
    .expect("metric cannot be created");

    pub static ref CHECKOUT_DURATION: HistogramVec = register_histogram_vec!(
        "storefront_checkout_duration_seconds",
        "Checkout saga duration in seconds",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("metric cannot be created");

    pub static ref CHECKOUT_STAGE_FAILURES: CounterVec = register_counter_vec!(
        "storefront_checkout_stage_failures_total",
        "Total number of checkout saga stage failures",
        &["stage"]
    )
    .expect("metric cannot be created");

    // Circuit breaker metrics
    pub static ref CIRCUIT_BREAKER_STATE: IntGaugeVec = register_int_gauge_vec!(
        "storefront_circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=open, 2=half-open)",
        &["service"]
    )
    .expect("metric cannot be created");

    pub static ref CIRCUIT_BREAKER_COUNTER: CounterVec = register_counter_vec!(
        "storefront_circuit_breaker_total",
        "Total number of circuit breaker state changes",
        &["service", "from_state", "to_state"]
    )
    .expect("metric cannot be created");
}

/// Get all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Error,
}

impl CacheOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Error => "error",
        }
    }
}

pub fn record_cache_request(cache_type: &str, outcome: CacheOutcome) {
    CACHE_REQUEST_COUNTER
        .with_label_values(&[cache_type, outcome.as_str()])
        .inc();
}

pub fn record_cache_invalidation(cache_type: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    CACHE_INVALIDATION_COUNTER
        .with_label_values(&[cache_type, status])
        .inc();
}

/// Record a backing store call
pub fn record_store_operation(store: &str, operation: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "error" };
    STORE_OPERATIONS
        .with_label_values(&[store, operation, status])
        .inc();
    STORE_DURATION
        .with_label_values(&[store, operation])
        .observe(duration_secs);
}

/// Record a finished checkout saga; `status` is one of
/// `completed`, `aborted`, `partial`, `contended`
pub fn record_checkout(status: &str, duration_secs: f64) {
    CHECKOUT_COUNTER.with_label_values(&[status]).inc();
    CHECKOUT_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

pub fn record_checkout_stage_failure(stage: &str) {
    CHECKOUT_STAGE_FAILURES.with_label_values(&[stage]).inc();
}

pub fn record_circuit_breaker_state(service: &str, state: CircuitBreakerState) {
    let state_value = match state {
        CircuitBreakerState::Closed => 0,
        CircuitBreakerState::Open => 1,
        CircuitBreakerState::HalfOpen => 2,
    };
    CIRCUIT_BREAKER_STATE
        .with_label_values(&[service])
        .set(state_value);
}

pub fn record_circuit_breaker_transition(service: &str, from: CircuitBreakerState, to: CircuitBreakerState) {
    CIRCUIT_BREAKER_COUNTER
        .with_label_values(&[service, &format!("{:?}", from), &format!("{:?}", to)])
        .inc();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}
