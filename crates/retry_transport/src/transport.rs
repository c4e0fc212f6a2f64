// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Debug;
use std::ops::ControlFlow;
#[cfg(any(feature = "tower-service", test))]
use std::pin::Pin;
use std::sync::Arc;
#[cfg(any(feature = "tower-service", test))]
use std::task::{Context, Poll};
use std::time::Duration;

use http::request::Parts;
use http::{Request, Response};
use http_body::Body;
use layered::Service;
use tick::Clock;
use tokio_util::sync::CancellationToken;

use crate::backoff::{DelaysIter, ExponentialBackoff};
use crate::body::buffer_body;
use crate::callbacks::{OnRetry, ShouldRetry};
use crate::cancel::{Wait, delay_or_cancel};
use crate::telemetry::TelemetryHelper;
use crate::{Attempt, NotSet, OnRetryArgs, ReplayBody, RetryCause, RetryError, RetryOutcome, RetryingTransportLayer, ShouldRetryArgs};

/// HTTP transport that retries requests on behalf of an inner executor.
///
/// The request body is read once and replayed on every attempt. After every attempt the
/// configured predicate decides whether to retry; retries wait an exponentially growing,
/// jittered delay taken from the [`BackoffPolicy`][crate::BackoffPolicy], and stop once the
/// policy's `max_retries` is used up.
///
/// A [`CancellationToken`] stored in the request extensions interrupts the backoff wait, in
/// which case the call fails with [`RetryError::Cancelled`].
///
/// `RetryingTransport` is configured by calling [`RetryingTransport::layer`] and using the
/// builder methods on the returned [`RetryingTransportLayer`]. Clones share the same
/// configuration and can serve concurrent calls.
///
/// # Examples
///
/// ```
/// use std::io;
///
/// use bytes::Bytes;
/// use http::{Request, Response, StatusCode};
/// use http_body_util::Full;
/// use layered::{Execute, Layer, Service};
/// use retry_transport::{ReplayBody, RetryingTransport};
/// use tick::Clock;
///
/// # async fn example(clock: Clock) -> Result<(), Box<dyn std::error::Error>> {
/// let transport = RetryingTransport::layer("orders", &clock)
///     .should_retry(|result: &Result<Response<String>, io::Error>, _args| match result {
///         Ok(response) => response.status() == StatusCode::TOO_MANY_REQUESTS,
///         Err(_) => true,
///     })
///     .layer(Execute::new(|_request: Request<ReplayBody>| async move {
///         Ok::<_, io::Error>(Response::new("created".to_string()))
///     }));
///
/// let request = Request::post("http://localhost/orders").body(Full::new(Bytes::from_static(b"{}")))?;
/// let response = transport.execute(request).await?;
/// assert_eq!(response.body(), "created");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RetryingTransport<RB, E, S> {
    pub(crate) shared: Arc<RetryShared<RB, E>>,
    pub(crate) inner: S,
}

/// Immutable configuration shared by all clones of a [`RetryingTransport`].
#[derive(Debug)]
pub(crate) struct RetryShared<RB, E> {
    pub(crate) clock: Clock,
    pub(crate) max_attempts: u32,
    pub(crate) backoff: ExponentialBackoff,
    pub(crate) should_retry: ShouldRetry<RB, E>,
    pub(crate) on_retry: Option<OnRetry<RB, E>>,
    pub(crate) telemetry: TelemetryHelper,
}

impl<RB, E, S: Clone> Clone for RetryingTransport<RB, E, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inner: self.inner.clone(),
        }
    }
}

impl<RB, E> RetryingTransport<RB, E, ()> {
    /// Starts configuring a retrying transport.
    ///
    /// `name` identifies the transport in logs and metrics; `clock` drives the backoff waits.
    /// The returned builder needs a [`should_retry`][RetryingTransportLayer::should_retry]
    /// predicate before it can wrap an executor.
    pub fn layer(name: impl Into<Cow<'static, str>>, clock: impl AsRef<Clock>) -> RetryingTransportLayer<RB, E, NotSet> {
        RetryingTransportLayer::new(name.into(), clock.as_ref())
    }
}

impl<RB, E, S> RetryingTransport<RB, E, S>
where
    RB: Send,
    E: Send,
    S: Service<Request<ReplayBody>, Out = Result<Response<RB>, E>>,
{
    /// Sends `request`, retrying as configured, and reports how the call ended.
    ///
    /// [`execute`][Service::execute] returns the same result without the extra detail.
    pub async fn execute_with_outcome<B>(&self, request: Request<B>) -> RetryOutcome<RB, E>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.shared.drive(request, LayeredSender(&self.inner)).await
    }
}

// The `layered::Service` impl below and the `tower_service::Service` impl further down share the
// retry loop in `RetryShared::drive`; keep their adapters in sync.
impl<B, RB, E, S> Service<Request<B>> for RetryingTransport<RB, E, S>
where
    B: Body + Send,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    RB: Send,
    E: Send,
    S: Service<Request<ReplayBody>, Out = Result<Response<RB>, E>>,
{
    type Out = Result<Response<RB>, RetryError<E, RB>>;

    async fn execute(&self, input: Request<B>) -> Self::Out {
        self.execute_with_outcome(input).await.into_result()
    }
}

impl<RB, E> RetryShared<RB, E> {
    async fn drive<B>(&self, request: Request<B>, mut sender: impl AttemptSender<RB, E>) -> RetryOutcome<RB, E>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();

        let body = match buffer_body(body).await {
            Ok(body) => body,
            Err(error) => return RetryOutcome::new(Err(RetryError::Body(error)), 0, false),
        };

        let cancellation = parts.extensions.get::<CancellationToken>().cloned();
        let mut attempt = Attempt::first(self.max_attempts);
        let mut delays = self.backoff.delays();

        loop {
            let attempt_request = Request::from_parts(parts.clone(), ReplayBody::new(body.clone()));

            let result = sender.send(attempt_request).await;

            let next = match self.evaluate_attempt(&parts, cancellation.as_ref(), result, attempt, &mut delays) {
                ControlFlow::Continue(next) => next,
                ControlFlow::Break(outcome) => return outcome,
            };

            if delay_or_cancel(&self.clock, next.delay, cancellation.as_ref()).await == Wait::Cancelled {
                self.telemetry.report_cancelled(&parts, attempt);
                return RetryOutcome::new(Err(RetryError::Cancelled), attempt.index().saturating_add(1), false);
            }

            attempt = next.attempt;
        }
    }

    fn evaluate_attempt(
        &self,
        parts: &Parts,
        cancellation: Option<&CancellationToken>,
        result: Result<Response<RB>, E>,
        attempt: Attempt,
        delays: &mut DelaysIter,
    ) -> ControlFlow<RetryOutcome<RB, E>, ContinueRetry> {
        let attempts = attempt.index().saturating_add(1);

        if !self.should_retry.call(&result, ShouldRetryArgs { request: parts, attempt }) {
            return ControlFlow::Break(RetryOutcome::new(result.map_err(RetryError::Transport), attempts, false));
        }

        let Some(next_attempt) = attempt.increment(self.max_attempts) else {
            let result = match result {
                Ok(response) => Err(RetryError::RetryableResponse(response)),
                Err(error) => Err(RetryError::Transport(error)),
            };
            return ControlFlow::Break(RetryOutcome::new(result, attempts, true));
        };

        let retry_delay = delays.next().unwrap_or(Duration::ZERO);
        let cause = match &result {
            Ok(response) => RetryCause::Response(response),
            Err(error) => RetryCause::Transport(error),
        };

        self.telemetry.report_retry(parts, next_attempt, retry_delay, cause);

        if let Some(on_retry) = &self.on_retry {
            on_retry.call(OnRetryArgs {
                request: parts,
                cancellation,
                cause,
                retry_delay,
                attempt,
            });
        }

        // The response of a retried attempt is released before the backoff wait starts.
        drop(result);

        ControlFlow::Continue(ContinueRetry {
            attempt: next_attempt,
            delay: retry_delay,
        })
    }
}

/// Hands the attempts of one call to the wrapped executor.
trait AttemptSender<RB, E> {
    fn send(&mut self, request: Request<ReplayBody>) -> impl Future<Output = Result<Response<RB>, E>> + Send;
}

struct LayeredSender<'a, S>(&'a S);

impl<RB, E, S> AttemptSender<RB, E> for LayeredSender<'_, S>
where
    S: Service<Request<ReplayBody>, Out = Result<Response<RB>, E>>,
{
    fn send(&mut self, request: Request<ReplayBody>) -> impl Future<Output = Result<Response<RB>, E>> + Send {
        self.0.execute(request)
    }
}

/// Owns the tower service of one call and drives it to readiness before every attempt.
#[cfg(any(feature = "tower-service", test))]
struct TowerSender<S>(S);

#[cfg(any(feature = "tower-service", test))]
impl<RB, E, S> AttemptSender<RB, E> for TowerSender<S>
where
    S: tower_service::Service<Request<ReplayBody>, Response = Response<RB>, Error = E> + Send,
    S::Future: Send,
{
    fn send(&mut self, request: Request<ReplayBody>) -> impl Future<Output = Result<Response<RB>, E>> + Send {
        async move {
            std::future::poll_fn(|cx| self.0.poll_ready(cx)).await?;
            self.0.call(request).await
        }
    }
}

/// State carried into the next iteration of the retry loop.
struct ContinueRetry {
    attempt: Attempt,
    delay: Duration,
}

/// Future returned by [`RetryingTransport`] when used as a tower [`Service`](tower_service::Service).
#[cfg(any(feature = "tower-service", test))]
pub struct RetryFuture<Out> {
    inner: Pin<Box<dyn Future<Output = Out> + Send>>,
}

#[cfg(any(feature = "tower-service", test))]
impl<Out> Debug for RetryFuture<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryFuture").finish_non_exhaustive()
    }
}

#[cfg(any(feature = "tower-service", test))]
impl<Out> Future for RetryFuture<Out> {
    type Output = Out;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

/// The service made ready by `poll_ready` carries the whole call and is driven to readiness
/// again before every attempt; a fresh clone takes its place in `self`.
#[cfg(any(feature = "tower-service", test))]
impl<B, RB, E, S> tower_service::Service<Request<B>> for RetryingTransport<RB, E, S>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    RB: Send + 'static,
    E: Send + 'static,
    S: tower_service::Service<Request<ReplayBody>, Response = Response<RB>, Error = E> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<RB>;
    type Error = RetryError<E, RB>;
    type Future = RetryFuture<Result<Response<RB>, RetryError<E, RB>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RetryError::Transport)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        RetryFuture {
            inner: Box::pin(async move { shared.drive(req, TowerSender(inner)).await.into_result() }),
        }
    }
}
