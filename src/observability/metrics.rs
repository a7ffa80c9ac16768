//! OpenTelemetry metrics for dispatch.
//!
//! Key metrics:
//! - cadence_enqueued_total: Counter for payloads accepted into a store
//! - cadence_dispatched_total: Counter for finished sends, by outcome
//! - cadence_send_latency_seconds: Histogram for sender latency
//! - cadence_store_errors_total: Counter for store failures, by operation
//! - cadence_in_flight: Gauge for sends in flight per channel

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Cadence metrics registry.
#[derive(Debug)]
pub struct Metrics {
    pub enqueued_total: Counter<u64>,
    pub dispatched_total: Counter<u64>,
    pub send_latency: Histogram<f64>,
    pub store_errors_total: Counter<u64>,
    pub in_flight: Gauge<i64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            enqueued_total: meter
                .u64_counter("cadence_enqueued_total")
                .with_description("Payloads accepted into a pending store")
                .with_unit("1")
                .init(),
            dispatched_total: meter
                .u64_counter("cadence_dispatched_total")
                .with_description("Finished sends, labelled by outcome")
                .with_unit("1")
                .init(),
            send_latency: meter
                .f64_histogram("cadence_send_latency_seconds")
                .with_description("Time spent inside the sender")
                .with_unit("s")
                .init(),
            store_errors_total: meter
                .u64_counter("cadence_store_errors_total")
                .with_description("Pending store failures, labelled by operation")
                .with_unit("1")
                .init(),
            in_flight: meter
                .i64_gauge("cadence_in_flight")
                .with_description("Sends currently in flight per channel")
                .with_unit("1")
                .init(),
        }
    }
}

fn manual_reader_provider() -> SdkMeterProvider {
    let reader = ManualReader::builder().build();
    SdkMeterProvider::builder().with_reader(reader).build()
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, metrics will not be exported");
                    global::set_meter_provider(manual_reader_provider());
                }
            }
        } else {
            // Recorded but never exported
            global::set_meter_provider(manual_reader_provider());
        }

        let meter = global::meter("cadence");
        Metrics::new(&meter)
    });
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Record a payload accepted into a store.
pub fn record_enqueued(channel: &str) {
    if let Some(m) = METRICS.get() {
        m.enqueued_total
            .add(1, &[KeyValue::new("channel", channel.to_string())]);
    }
}

/// Record a finished send.
pub fn record_send(channel: &str, latency_seconds: f64, succeeded: bool) {
    if let Some(m) = METRICS.get() {
        let attrs = [
            KeyValue::new("channel", channel.to_string()),
            KeyValue::new("outcome", if succeeded { "ok" } else { "error" }),
        ];
        m.dispatched_total.add(1, &attrs);
        m.send_latency.record(latency_seconds, &attrs);
    }
}

/// Record a pending store failure (`enqueue` or `dequeue`).
pub fn record_store_error(operation: &'static str) {
    if let Some(m) = METRICS.get() {
        m.store_errors_total
            .add(1, &[KeyValue::new("operation", operation)]);
    }
}

/// Record the number of sends in flight on a channel.
pub fn record_in_flight(channel: &str, in_flight: u32) {
    if let Some(m) = METRICS.get() {
        m.in_flight.record(
            i64::from(in_flight),
            &[KeyValue::new("channel", channel.to_string())],
        );
    }
}
