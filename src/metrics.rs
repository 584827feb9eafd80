//! Prometheus metrics and tracing spans
//!
//! `METRICS` is available with the `metrics` feature; `tracing_helpers` with the
//! `tracing` feature. Both are on by default.

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{SluiceMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
    };
    use opentelemetry_prometheus::PrometheusExporter;
    use std::time::Duration;

    pub static METRICS: Lazy<SluiceMetrics> = Lazy::new(SluiceMetrics::init);

    pub struct SluiceMetrics {
        pub exporter: Option<PrometheusExporter>,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub connection_wait_duration: Histogram<f64>,
        pub eager_batches_total: Counter<u64>,
    }

    impl SluiceMetrics {
        pub fn init() -> Self {
            let exporter = match opentelemetry_prometheus::exporter().build() {
                Ok(exporter) => Some(exporter),
                Err(e) => {
                    log::warn!("prometheus exporter unavailable: {e}");
                    None
                }
            };
            let meter = global::meter("sluice");

            let queries_total = meter
                .u64_counter("sluice_queries_total")
                .with_description("Total statements executed")
                .build();

            let query_errors_total = meter
                .u64_counter("sluice_query_errors_total")
                .with_description("Statements that returned an error")
                .build();

            let query_duration = meter
                .f64_histogram("sluice_query_duration_seconds")
                .with_description("Duration of statements")
                .build();

            let connection_wait_duration = meter
                .f64_histogram("sluice_connection_wait_seconds")
                .with_description("Time spent establishing connections")
                .build();

            let eager_batches_total = meter
                .u64_counter("sluice_eager_batches_total")
                .with_description("Eager-load loader invocations")
                .build();

            Self {
                exporter,
                queries_total,
                query_errors_total,
                query_duration,
                connection_wait_duration,
                eager_batches_total,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_connection_wait(&self, elapsed: Duration) {
            self.connection_wait_duration
                .record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_eager_batch(&self) {
            self.eager_batches_total.add(1, &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("sluice.execute", db.statement = %query)
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("sluice.connect")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("sluice.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("sluice.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("sluice.transaction.rollback")
    }

    pub fn eager_load_span(relation: &str, batch_size: usize) -> Span {
        info_span!("sluice.eager_load", relation = %relation, batch_size)
    }
}
