// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

use http::request::Parts;

use crate::{Attempt, RetryCause};

/// Name of the meter that reports retry events.
#[cfg(any(feature = "metrics", test))]
pub(crate) const METER_NAME: &str = "retry_transport";

#[cfg(any(feature = "metrics", test))]
const VERSION: &str = "v0.1.0";

#[cfg(any(feature = "metrics", test))]
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

/// Attribute key for the name of the transport.
#[cfg(any(feature = "metrics", test))]
pub(crate) const TRANSPORT_NAME: &str = "resilience.transport.name";

/// Attribute key for the reported event.
#[cfg(any(feature = "metrics", test))]
pub(crate) const EVENT_NAME: &str = "resilience.event.name";

/// Attribute key for the index of the attempt that a retry schedules.
#[cfg(any(feature = "metrics", test))]
pub(crate) const ATTEMPT_INDEX: &str = "resilience.attempt.index";

/// Attribute key for whether the scheduled attempt is the last one allowed.
#[cfg(any(feature = "metrics", test))]
pub(crate) const ATTEMPT_IS_LAST: &str = "resilience.attempt.is_last";

#[cfg(any(feature = "metrics", test))]
pub(crate) const RETRY_EVENT: &str = "retry";

#[cfg(any(feature = "metrics", test))]
pub(crate) fn create_meter(meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> opentelemetry::metrics::Meter {
    meter_provider.meter_with_scope(
        opentelemetry::InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

#[cfg(any(feature = "metrics", test))]
pub(crate) fn create_resilience_event_counter(meter: &opentelemetry::metrics::Meter) -> opentelemetry::metrics::Counter<u64> {
    meter
        .u64_counter("resilience.event")
        .with_description("Emitted upon the occurrence of a resilience event.")
        .with_unit("u64")
        .build()
}

/// Logs and metrics configuration of a single transport.
#[derive(Debug, Clone)]
pub(crate) struct TelemetryHelper {
    #[cfg_attr(
        not(any(feature = "metrics", feature = "logs", test)),
        expect(dead_code, reason = "only read by logs and metrics")
    )]
    pub(crate) name: Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    pub(crate) event_reporter: Option<opentelemetry::metrics::Counter<u64>>,
    #[cfg_attr(not(any(feature = "logs", test)), expect(dead_code, reason = "only read by logs"))]
    pub(crate) logs_enabled: bool,
}

impl TelemetryHelper {
    pub(crate) fn new(name: Cow<'static, str>) -> Self {
        Self {
            name,
            #[cfg(any(feature = "metrics", test))]
            event_reporter: None,
            logs_enabled: false,
        }
    }

    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn metrics_enabled(&self) -> bool {
        self.event_reporter.is_some()
    }

    #[cfg(any(feature = "metrics", test))]
    fn report_metrics(&self, attributes: &[opentelemetry::KeyValue]) {
        if let Some(reporter) = &self.event_reporter {
            reporter.add(1, attributes);
        }
    }

    /// Reports that `scheduled` will be sent after waiting `retry_delay`.
    ///
    /// `cause` is the result of the attempt that asked for the retry.
    #[cfg_attr(
        not(any(feature = "metrics", feature = "logs", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when neither logs nor metrics are used")
    )]
    #[cfg_attr(all(feature = "metrics", not(any(feature = "logs", test))), expect(unused_variables, reason = "only read by logs"))]
    pub(crate) fn report_retry<RB, E>(&self, request: &Parts, scheduled: Attempt, retry_delay: Duration, cause: RetryCause<'_, RB, E>) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            tracing::event!(
                name: "retry_transport.retry",
                tracing::Level::WARN,
                transport.name = %self.name,
                http.request.method = %request.method,
                url.full = %request.uri,
                attempt.index = scheduled.index(),
                attempt.is_last = scheduled.is_last(),
                retry.delay = retry_delay.as_secs_f32(),
                retry.cause = %describe(cause),
            );
        }

        #[cfg(any(feature = "metrics", test))]
        if self.metrics_enabled() {
            self.report_metrics(&[
                opentelemetry::KeyValue::new(TRANSPORT_NAME, self.name.clone()),
                opentelemetry::KeyValue::new(EVENT_NAME, RETRY_EVENT),
                opentelemetry::KeyValue::new(ATTEMPT_INDEX, i64::from(scheduled.index())),
                opentelemetry::KeyValue::new(ATTEMPT_IS_LAST, scheduled.is_last()),
            ]);
        }
    }

    /// Reports that the backoff wait after `attempt` was cut short by cancellation.
    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when logs are not used")
    )]
    pub(crate) fn report_cancelled(&self, request: &Parts, attempt: Attempt) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            tracing::event!(
                name: "retry_transport.cancelled",
                tracing::Level::INFO,
                transport.name = %self.name,
                http.request.method = %request.method,
                url.full = %request.uri,
                attempt.index = attempt.index(),
            );
        }
    }
}

#[cfg(any(feature = "logs", test))]
fn describe<RB, E>(cause: RetryCause<'_, RB, E>) -> Cow<'static, str> {
    match cause.status() {
        Some(status) => format!("status {}", status.as_u16()).into(),
        None => "transport error".into(),
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};

    use super::*;
    use crate::testing::{LogCapture, response};

    type TestCause<'a> = RetryCause<'a, String, std::io::Error>;

    fn parts() -> Parts {
        http::Request::builder()
            .method(http::Method::POST)
            .uri("https://example.com/orders")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn meter_definitions() {
        let exporter = InMemoryMetricExporter::default();
        let meter_provider = SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build();

        let meter = create_meter(&meter_provider);
        create_resilience_event_counter(&meter).add(1, &[]);

        meter_provider.force_flush().unwrap();

        let metrics = format!("{:?}", exporter.get_finished_metrics().unwrap());

        assert!(metrics.contains("resilience.event"));
        assert!(metrics.contains("retry_transport"));
        assert!(metrics.contains("v0.1.0"));
        assert!(metrics.contains("https://opentelemetry.io/schemas/1.47"));
    }

    #[test]
    fn attribute_keys() {
        assert_eq!(TRANSPORT_NAME, "resilience.transport.name");
        assert_eq!(EVENT_NAME, "resilience.event.name");
        assert_eq!(ATTEMPT_INDEX, "resilience.attempt.index");
        assert_eq!(ATTEMPT_IS_LAST, "resilience.attempt.is_last");
    }

    #[test]
    fn report_retry_emits_metrics() {
        let exporter = InMemoryMetricExporter::default();
        let meter_provider = SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build();

        let mut telemetry = TelemetryHelper::new("orders".into());
        telemetry.event_reporter = Some(create_resilience_event_counter(&create_meter(&meter_provider)));
        assert!(telemetry.metrics_enabled());

        let response = response(http::StatusCode::SERVICE_UNAVAILABLE);
        telemetry.report_retry(&parts(), Attempt::new(1, true), Duration::from_millis(750), TestCause::Response(&response));

        meter_provider.force_flush().unwrap();
        let metrics = format!("{:?}", exporter.get_finished_metrics().unwrap());

        assert!(metrics.contains("resilience.transport.name"));
        assert!(metrics.contains("orders"));
        assert!(metrics.contains("resilience.attempt.index"));
        assert!(metrics.contains("resilience.attempt.is_last"));
    }

    #[test]
    fn report_retry_emits_log() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let mut telemetry = TelemetryHelper::new("orders".into());
        telemetry.logs_enabled = true;
        let response = response(http::StatusCode::SERVICE_UNAVAILABLE);
        telemetry.report_retry(&parts(), Attempt::new(2, true), Duration::from_secs(1), TestCause::Response(&response));

        capture.assert_contains("retry_transport::telemetry");
        capture.assert_contains("WARN");
        capture.assert_contains("transport.name=orders");
        capture.assert_contains("http.request.method=POST");
        capture.assert_contains("url.full=https://example.com/orders");
        capture.assert_contains("attempt.index=2");
        capture.assert_contains("attempt.is_last=true");
        capture.assert_contains("retry.delay=1");
        capture.assert_contains("retry.cause=status 503");
    }

    #[test]
    fn report_retry_describes_transport_errors() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let mut telemetry = TelemetryHelper::new("orders".into());
        telemetry.logs_enabled = true;
        let error = std::io::Error::other("reset");
        telemetry.report_retry(&parts(), Attempt::new(1, false), Duration::from_secs(1), TestCause::Transport(&error));

        capture.assert_contains("retry.cause=transport error");
        capture.assert_contains("attempt.is_last=false");
    }

    #[test]
    fn report_cancelled_emits_log() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let mut telemetry = TelemetryHelper::new("orders".into());
        telemetry.logs_enabled = true;
        telemetry.report_cancelled(&parts(), Attempt::new(0, false));

        capture.assert_contains("retry_transport::telemetry");
        capture.assert_contains("INFO");
        capture.assert_contains("attempt.index=0");
    }

    #[test]
    fn disabled_telemetry_is_silent() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let telemetry = TelemetryHelper::new("orders".into());
        assert!(!telemetry.metrics_enabled());
        let response = response(http::StatusCode::SERVICE_UNAVAILABLE);
        telemetry.report_retry(&parts(), Attempt::new(1, false), Duration::ZERO, TestCause::Response(&response));

        assert!(capture.output().is_empty());
    }
}
