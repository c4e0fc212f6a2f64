// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use http::request::Parts;
use http::{Extensions, Response};
use tokio_util::sync::CancellationToken;

use crate::Attempt;

/// Arguments for the [`should_retry`][crate::RetryingTransportLayer::should_retry] predicate.
#[derive(Debug)]
pub struct ShouldRetryArgs<'a> {
    pub(crate) request: &'a Parts,
    pub(crate) attempt: Attempt,
}

impl ShouldRetryArgs<'_> {
    /// Returns the head of the request that produced the result.
    #[must_use]
    pub fn request(&self) -> &Parts {
        self.request
    }

    /// Returns the attempt that produced the result.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }
}

/// Why a retry is about to happen.
#[derive(Debug)]
pub enum RetryCause<'a, RB, E> {
    /// The executor returned an error.
    Transport(&'a E),

    /// The executor returned a response that the predicate asked to retry.
    Response(&'a Response<RB>),
}

impl<RB, E> Clone for RetryCause<'_, RB, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<RB, E> Copy for RetryCause<'_, RB, E> {}

impl<RB, E> RetryCause<'_, RB, E> {
    /// Returns the response status when the cause is a response.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::Transport(_) => None,
            Self::Response(response) => Some(response.status()),
        }
    }
}

/// Arguments for the [`on_retry`][crate::RetryingTransportLayer::on_retry] callback.
///
/// The callback runs after a retry has been decided and before the backoff wait starts. It is
/// not invoked after the final attempt.
#[derive(Debug)]
pub struct OnRetryArgs<'a, RB, E> {
    pub(crate) request: &'a Parts,
    pub(crate) cancellation: Option<&'a CancellationToken>,
    pub(crate) cause: RetryCause<'a, RB, E>,
    pub(crate) retry_delay: Duration,
    pub(crate) attempt: Attempt,
}

impl<'a, RB, E> OnRetryArgs<'a, RB, E> {
    /// Returns the head of the request being retried.
    #[must_use]
    pub fn request(&self) -> &'a Parts {
        self.request
    }

    /// Returns the request extensions.
    #[must_use]
    pub fn extensions(&self) -> &'a Extensions {
        &self.request.extensions
    }

    /// Returns the cancellation token attached to the request, if any.
    #[must_use]
    pub fn cancellation(&self) -> Option<&'a CancellationToken> {
        self.cancellation
    }

    /// Returns the error or response that triggered the retry.
    #[must_use]
    pub fn cause(&self) -> RetryCause<'a, RB, E> {
        self.cause
    }

    /// Returns how long the transport waits before the next attempt.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Returns the attempt that failed.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }
}
