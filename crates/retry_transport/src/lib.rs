// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Retrying HTTP transport with body replay and exponential backoff.
//!
//! [`RetryingTransport`] wraps any executor that turns an [`http::Request`] into an
//! [`http::Response`] and transparently retries requests according to a caller-supplied
//! predicate. Callers keep using the plain executor contract, so any client that accepts a
//! pluggable transport can use it without changes.
//!
//! # How a call proceeds
//!
//! 1. The request body is read once into memory. If reading fails, the call ends with
//!    [`RetryError::Body`] and nothing is sent.
//! 2. Every attempt gets a copy of the request head and a [`ReplayBody`] over the same bytes.
//! 3. After every attempt, the first one included, the predicate sees the response or the
//!    executor error and decides whether to retry.
//! 4. A retry waits for the next delay of the [`BackoffPolicy`] (500 ms growing by 1.5x, with
//!    ±50% jitter, capped at 60 s by default). The `on_retry` callback runs just before the
//!    wait.
//! 5. After `max_retries` retries (3 by default) the last result is returned. A response that
//!    the predicate still wanted to retry comes back as [`RetryError::RetryableResponse`].
//!
//! # Quick Start
//!
//! ```
//! use std::io;
//!
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use http_body_util::Full;
//! use layered::{Execute, Layer};
//! use retry_transport::{BackoffPolicy, ReplayBody, RetryingTransport};
//! use tick::Clock;
//!
//! # async fn example(clock: Clock) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = RetryingTransport::layer("inventory", &clock)
//!     .should_retry(|result: &Result<Response<String>, io::Error>, _args| match result {
//!         Ok(response) => response.status().is_server_error(),
//!         Err(error) => error.kind() == io::ErrorKind::ConnectionReset,
//!     })
//!     .on_retry(|args| println!("retrying attempt {} in {:?}", args.attempt(), args.retry_delay()))
//!     .backoff_policy(BackoffPolicy::default().max_retries(5))
//!     .layer(Execute::new(|request: Request<ReplayBody>| async move {
//!         // Send `request` over the network here.
//!         Ok::<_, io::Error>(Response::new(format!("{} {}", request.method(), request.uri())))
//!     }));
//!
//! let request = Request::put("http://localhost/items/7").body(Full::new(Bytes::from_static(b"{\"count\":3}")))?;
//! let outcome = transport.execute_with_outcome(request).await;
//!
//! println!("sent {} request(s)", outcome.attempts());
//! let response = outcome.into_result()?;
//! assert_eq!(response.status(), StatusCode::OK);
//! # Ok(())
//! # }
//! ```
//!
//! # Cancellation
//!
//! Insert a [`CancellationToken`][tokio_util::sync::CancellationToken] into the request
//! extensions to interrupt backoff waits. Once the token fires, the call ends with
//! [`RetryError::Cancelled`] without waiting for the delay to elapse. Dropping the future
//! returned by `execute` also stops the loop.
//!
//! # Tower Integration
//!
//! With the `tower-service` feature, [`RetryingTransport`] also implements
//! [`tower_service::Service`] when the inner executor does. The executor instance made ready by
//! `poll_ready` carries the whole call and is driven to readiness again before every attempt.
//!
//! # Telemetry
//!
//! - `logs`: [`use_logs`][RetryingTransportLayer::use_logs] emits a `WARN` event for every retry
//!   and an `INFO` event when a wait is cancelled.
//! - `metrics`: [`use_metrics`][RetryingTransportLayer::use_metrics] reports every retry to the
//!   `resilience.event` counter of the `retry_transport` meter.
//!
//! # Features
//!
//! - `hyper`: [`DefaultExecutor`], a pooled HTTP/1 client from `hyper-util`.
//! - `tower-service`: [`tower_service::Service`] implementation.
//! - `logs`: structured logging through `tracing`.
//! - `metrics`: OpenTelemetry metrics.
//! - `serde`: `Serialize`/`Deserialize` for [`BackoffPolicy`].

mod args;
mod attempt;
mod backoff;
mod body;
mod callbacks;
mod cancel;
mod define_fn_wrapper;
mod error;
mod layer;
mod outcome;
mod policy;
mod rnd;
mod telemetry;
mod transport;

#[cfg(feature = "hyper")]
mod executor;

pub use args::{OnRetryArgs, RetryCause, ShouldRetryArgs};
pub use attempt::Attempt;
pub use body::{BodyError, ReplayBody};
pub use error::RetryError;
#[cfg(feature = "hyper")]
#[cfg_attr(docsrs, doc(cfg(feature = "hyper")))]
pub use executor::DefaultExecutor;
pub use layer::{NotSet, RetryingTransportLayer, Set};
pub use outcome::RetryOutcome;
pub use policy::BackoffPolicy;
#[cfg(any(feature = "tower-service", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "tower-service")))]
pub use transport::RetryFuture;
pub use transport::RetryingTransport;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;
