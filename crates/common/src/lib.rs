pub mod circuit_breaker;
pub mod config;
pub mod deadline;
pub mod metrics;
pub mod telemetry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use config::AppConfig;
pub use deadline::{Deadline, DeadlineExceeded};
