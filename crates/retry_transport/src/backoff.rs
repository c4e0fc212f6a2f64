// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::BackoffPolicy;
use crate::rnd::Rnd;

/// Exponential backoff schedule derived from a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub(crate) struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
    rnd: Rnd,
}

impl From<&BackoffPolicy> for ExponentialBackoff {
    fn from(policy: &BackoffPolicy) -> Self {
        Self {
            initial_interval: policy.get_initial_interval(),
            multiplier: policy.get_multiplier(),
            randomization_factor: policy.get_randomization_factor(),
            max_interval: policy.get_max_interval(),
            rnd: Rnd::default(),
        }
    }
}

impl ExponentialBackoff {
    #[cfg(test)]
    pub(crate) fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }

    /// Starts a fresh schedule; every call to `execute` gets its own.
    pub(crate) fn delays(&self) -> DelaysIter {
        DelaysIter {
            current: self.initial_interval.min(self.max_interval),
            backoff: self.clone(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct DelaysIter {
    backoff: ExponentialBackoff,
    current: Duration,
}

impl Iterator for DelaysIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let delay = randomize(self.current, self.backoff.randomization_factor, &self.backoff.rnd);

        let grown = secs_to_duration_saturating(self.current.as_secs_f64() * self.backoff.multiplier);
        self.current = grown.min(self.backoff.max_interval);

        Some(delay)
    }
}

/// Picks a delay uniformly from `[interval × (1 - factor), interval × (1 + factor)]`.
fn randomize(interval: Duration, factor: f64, rnd: &Rnd) -> Duration {
    if factor <= 0.0 {
        return interval;
    }

    let secs = interval.as_secs_f64();
    let delta = secs * factor;
    let low = secs - delta;

    secs_to_duration_saturating(low + rnd.next_f64() * 2.0 * delta)
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
