// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use http::Response;
use layered::Layer;
use tick::Clock;

use crate::backoff::ExponentialBackoff;
use crate::callbacks::{OnRetry, ShouldRetry};
use crate::telemetry::TelemetryHelper;
use crate::transport::RetryShared;
use crate::{BackoffPolicy, OnRetryArgs, RetryingTransport, ShouldRetryArgs};

/// A flag indicating that the required property is set.
#[non_exhaustive]
#[derive(Debug)]
pub struct Set;

/// A flag indicating that the required property has not been set.
#[non_exhaustive]
#[derive(Debug)]
pub struct NotSet;

/// Builder for a [`RetryingTransport`].
///
/// Created by [`RetryingTransport::layer`]. The retry predicate is mandatory: the builder only
/// implements [`Layer`] once [`should_retry`][RetryingTransportLayer::should_retry] has been
/// called, so forgetting it is a compile-time error.
///
/// `RB` is the response body type and `E` the error type of the wrapped executor.
#[derive(Debug)]
pub struct RetryingTransportLayer<RB, E, PredicateState = Set> {
    clock: Clock,
    policy: BackoffPolicy,
    should_retry: ShouldRetry<RB, E>,
    on_retry: Option<OnRetry<RB, E>>,
    telemetry: TelemetryHelper,
    _state: PhantomData<fn(PredicateState)>,
}

impl<RB, E> RetryingTransportLayer<RB, E, NotSet> {
    pub(crate) fn new(name: Cow<'static, str>, clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            policy: BackoffPolicy::default(),
            // Unreachable through `Layer` until the caller provides a predicate.
            should_retry: ShouldRetry::new(|_, _| false),
            on_retry: None,
            telemetry: TelemetryHelper::new(name),
            _state: PhantomData,
        }
    }
}

impl<RB, E, PredicateState> RetryingTransportLayer<RB, E, PredicateState> {
    /// Sets the predicate that decides whether an attempt is retried.
    ///
    /// It is consulted after every attempt, the first one included, with either the response or
    /// the executor error. Returning `false` ends the call with that result unchanged; returning
    /// `true` retries while the [`BackoffPolicy`] allows it.
    #[must_use]
    pub fn should_retry(
        self,
        predicate: impl Fn(&Result<Response<RB>, E>, ShouldRetryArgs<'_>) -> bool + Send + Sync + 'static,
    ) -> RetryingTransportLayer<RB, E, Set> {
        RetryingTransportLayer {
            should_retry: ShouldRetry::new(predicate),
            ..self.into_state::<Set>()
        }
    }

    /// Registers a callback invoked before every backoff wait.
    ///
    /// The callback is informational: it cannot change the retry decision and is not invoked
    /// after the final attempt. A panic inside it propagates to the caller.
    ///
    /// **Default**: None
    #[must_use]
    pub fn on_retry(mut self, callback: impl Fn(OnRetryArgs<'_, RB, E>) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(OnRetry::new(callback));
        self
    }

    /// Sets the retry cap and backoff schedule.
    ///
    /// **Default**: [`BackoffPolicy::default()`]
    #[must_use]
    pub fn backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Emits a `WARN` event for every retry and an `INFO` event when a wait is cancelled.
    #[must_use]
    #[cfg(any(feature = "logs", test))]
    pub fn use_logs(mut self) -> Self {
        self.telemetry.logs_enabled = true;
        self
    }

    /// Reports every retry to the `resilience.event` counter of the given meter provider.
    #[must_use]
    #[cfg(any(feature = "metrics", test))]
    pub fn use_metrics(mut self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        let meter = crate::telemetry::create_meter(provider);
        self.telemetry.event_reporter = Some(crate::telemetry::create_resilience_event_counter(&meter));
        self
    }

    fn into_state<T>(self) -> RetryingTransportLayer<RB, E, T> {
        RetryingTransportLayer {
            clock: self.clock,
            policy: self.policy,
            should_retry: self.should_retry,
            on_retry: self.on_retry,
            telemetry: self.telemetry,
            _state: PhantomData,
        }
    }
}

impl<RB, E, S> Layer<S> for RetryingTransportLayer<RB, E, Set> {
    type Service = RetryingTransport<RB, E, S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryingTransport {
            shared: Arc::new(RetryShared {
                clock: self.clock.clone(),
                max_attempts: self.policy.max_attempts(),
                backoff: ExponentialBackoff::from(&self.policy),
                should_retry: self.should_retry.clone(),
                on_retry: self.on_retry.clone(),
                telemetry: self.telemetry.clone(),
            }),
            inner,
        }
    }
}

#[cfg(feature = "hyper")]
impl RetryingTransportLayer<hyper::body::Incoming, hyper_util::client::legacy::Error, Set> {
    /// Wraps a new [`DefaultExecutor`][crate::DefaultExecutor].
    #[must_use]
    pub fn with_default_executor(&self) -> RetryingTransport<hyper::body::Incoming, hyper_util::client::legacy::Error, crate::DefaultExecutor> {
        self.layer(crate::DefaultExecutor::new())
    }
}
