//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing to stderr
//! - OpenTelemetry metrics for enqueue, dispatch and store failures

pub mod metrics;
pub mod tracing;
