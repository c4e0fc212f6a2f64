// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use http::Response;

use crate::BodyError;

/// Error returned by a [`RetryingTransport`][crate::RetryingTransport].
///
/// `E` is the error type of the wrapped executor and `RB` its response body type.
///
/// # Retryable responses
///
/// When the retry predicate keeps asking for a retry on a response that the executor delivered
/// successfully (for example `429 Too Many Requests`) and no retries remain, the call fails with
/// [`RetryError::RetryableResponse`] carrying that last response. Use
/// [`into_response`][RetryError::into_response] to get it back, or
/// [`RetryingTransport::execute_with_outcome`][crate::RetryingTransport::execute_with_outcome]
/// to inspect the terminal state without matching on this enum.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RetryError<E, RB> {
    /// The request body could not be read. Nothing was sent.
    #[error(transparent)]
    Body(#[from] BodyError),

    /// The executor failed on the final attempt.
    #[error(transparent)]
    Transport(E),

    /// Retries were exhausted while the predicate still asked to retry a received response.
    #[error("retries exhausted, last response status: {}", .0.status())]
    RetryableResponse(Response<RB>),

    /// The request's cancellation token fired while waiting for the next attempt.
    #[error("request cancelled while waiting to retry")]
    Cancelled,
}

impl<E, RB> RetryError<E, RB> {
    /// Returns true if retries were exhausted on a received response.
    #[must_use]
    pub fn is_retryable_response(&self) -> bool {
        matches!(self, Self::RetryableResponse(_))
    }

    /// Returns true if the call was cancelled during a backoff wait.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the executor error, if that is what ended the call.
    #[must_use]
    pub fn transport_error(&self) -> Option<&E> {
        match self {
            Self::Transport(error) => Some(error),
            _ => None,
        }
    }

    /// Converts into the executor error, if that is what ended the call.
    pub fn into_transport_error(self) -> Result<E, Self> {
        match self {
            Self::Transport(error) => Ok(error),
            other => Err(other),
        }
    }

    /// Converts into the last received response, if retries were exhausted on one.
    pub fn into_response(self) -> Result<Response<RB>, Self> {
        match self {
            Self::RetryableResponse(response) => Ok(response),
            other => Err(other),
        }
    }
}
