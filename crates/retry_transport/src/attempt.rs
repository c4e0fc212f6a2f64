// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

/// A single attempt made by a [`RetryingTransport`][crate::RetryingTransport].
///
/// Attempts are 0-based: index `0` is the original request and every following index is a
/// retry. The last attempt allowed by the [`BackoffPolicy`][crate::BackoffPolicy] is flagged
/// with [`is_last`][Attempt::is_last].
///
/// # Examples
///
/// ```
/// use retry_transport::Attempt;
///
/// let attempt = Attempt::new(0, false);
/// assert!(attempt.is_first());
/// assert!(!attempt.is_last());
///
/// let last = Attempt::new(3, true);
/// assert_eq!(last.index(), 3);
/// assert!(last.is_last());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    index: u32,
    is_last: bool,
}

impl Attempt {
    /// Creates an attempt with the given index.
    #[must_use]
    pub fn new(index: u32, is_last: bool) -> Self {
        Self { index, is_last }
    }

    /// Returns true for the original request (index 0).
    #[must_use]
    pub fn is_first(self) -> bool {
        self.index == 0
    }

    /// Returns true if no further attempts are allowed after this one.
    #[must_use]
    pub fn is_last(self) -> bool {
        self.is_last
    }

    /// Returns the 0-based attempt index.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    pub(crate) fn first(max_attempts: u32) -> Self {
        Self::new(0, max_attempts <= 1)
    }

    /// Moves to the next attempt, or returns `None` once `max_attempts` have been made.
    pub(crate) fn increment(self, max_attempts: u32) -> Option<Self> {
        let next = self.index.saturating_add(1);

        if next >= max_attempts {
            return None;
        }

        Some(Self::new(next, next == max_attempts.saturating_sub(1)))
    }
}

impl Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.index.fmt(f)
    }
}
