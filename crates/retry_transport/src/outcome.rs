// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use http::Response;

use crate::RetryError;

/// Final result of a call together with how it ended.
///
/// Returned by [`RetryingTransport::execute_with_outcome`][crate::RetryingTransport::execute_with_outcome].
/// Unlike the plain result, it tells how many requests were sent and whether the loop stopped
/// because no retries were left.
#[derive(Debug)]
pub struct RetryOutcome<RB, E> {
    result: Result<Response<RB>, RetryError<E, RB>>,
    attempts: u32,
    exhausted: bool,
}

impl<RB, E> RetryOutcome<RB, E> {
    pub(crate) fn new(result: Result<Response<RB>, RetryError<E, RB>>, attempts: u32, exhausted: bool) -> Self {
        Self {
            result,
            attempts,
            exhausted,
        }
    }

    /// Number of requests handed to the executor.
    ///
    /// `0` when the request body could not be read.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns true if the predicate still asked for a retry after the last allowed attempt.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Returns the final result.
    #[must_use]
    pub fn result(&self) -> &Result<Response<RB>, RetryError<E, RB>> {
        &self.result
    }

    /// Converts into the final result.
    pub fn into_result(self) -> Result<Response<RB>, RetryError<E, RB>> {
        self.result
    }
}
