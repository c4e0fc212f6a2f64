// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default number of retries after the original request.
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub(crate) const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);

/// Default growth factor applied to the interval after every retry.
pub(crate) const DEFAULT_MULTIPLIER: f64 = 1.5;

/// Default relative spread of the jitter applied to every delay.
pub(crate) const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Default upper bound of the (pre-jitter) interval.
pub(crate) const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Retry cap and exponential backoff schedule of a [`RetryingTransport`][crate::RetryingTransport].
///
/// The n-th retry (0-based) waits a delay drawn uniformly from
/// `[interval × (1 - randomization_factor), interval × (1 + randomization_factor)]`, where
/// `interval = min(initial_interval × multiplierⁿ, max_interval)`.
///
/// At most `max_retries + 1` requests are sent in total.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use retry_transport::BackoffPolicy;
///
/// let policy = BackoffPolicy::default()
///     .max_retries(5)
///     .initial_interval(Duration::from_millis(100))
///     .randomization_factor(0.0);
///
/// assert_eq!(policy.get_max_retries(), 5);
/// assert_eq!(policy.get_multiplier(), 1.5);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BackoffPolicy {
    max_retries: u32,
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

impl BackoffPolicy {
    /// Sets the number of retries made after the original request.
    ///
    /// `0` disables retries: the request is sent once and the predicate is still consulted.
    ///
    /// **Default**: 3
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry, before jitter.
    ///
    /// **Default**: 500 ms
    #[must_use]
    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Sets the factor by which the interval grows after every retry.
    ///
    /// Values below `1.0` (and NaN) are raised to `1.0`.
    ///
    /// **Default**: 1.5
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = sanitize_multiplier(multiplier);
        self
    }

    /// Sets the relative jitter applied to every delay.
    ///
    /// The value is clamped to `[0.0, 1.0]`; `0.0` disables jitter.
    ///
    /// **Default**: 0.5
    #[must_use]
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = sanitize_randomization_factor(factor);
        self
    }

    /// Caps the interval; jitter is still applied on top of the capped value.
    ///
    /// **Default**: 60 s
    #[must_use]
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Returns the number of retries made after the original request.
    #[must_use]
    pub fn get_max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the delay before the first retry, before jitter.
    #[must_use]
    pub fn get_initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Returns the interval growth factor.
    #[must_use]
    pub fn get_multiplier(&self) -> f64 {
        sanitize_multiplier(self.multiplier)
    }

    /// Returns the relative jitter applied to every delay.
    #[must_use]
    pub fn get_randomization_factor(&self) -> f64 {
        sanitize_randomization_factor(self.randomization_factor)
    }

    /// Returns the upper bound of the interval.
    #[must_use]
    pub fn get_max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Total number of requests the policy allows, the original one included.
    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

// Deserialized values bypass the builder, so the getters sanitize as well.
fn sanitize_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_nan() { 1.0 } else { multiplier.max(1.0) }
}

fn sanitize_randomization_factor(factor: f64) -> f64 {
    if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(BackoffPolicy: Send, Sync, Clone, std::fmt::Debug, PartialEq);

    #[test]
    fn defaults() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.get_max_retries(), 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.get_initial_interval(), Duration::from_millis(500));
        assert!((policy.get_multiplier() - 1.5).abs() < f64::EPSILON);
        assert!((policy.get_randomization_factor() - 0.5).abs() < f64::EPSILON);
        assert_eq!(policy.get_max_interval(), Duration::from_secs(60));
    }

    #[test]
    fn builder_sets_values() {
        let policy = BackoffPolicy::default()
            .max_retries(7)
            .initial_interval(Duration::from_millis(10))
            .multiplier(3.0)
            .randomization_factor(0.2)
            .max_interval(Duration::from_secs(1));

        assert_eq!(policy.get_max_retries(), 7);
        assert_eq!(policy.get_initial_interval(), Duration::from_millis(10));
        assert!((policy.get_multiplier() - 3.0).abs() < f64::EPSILON);
        assert!((policy.get_randomization_factor() - 0.2).abs() < f64::EPSILON);
        assert_eq!(policy.get_max_interval(), Duration::from_secs(1));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let policy = BackoffPolicy::default().multiplier(0.5).randomization_factor(2.0);
        assert!((policy.get_multiplier() - 1.0).abs() < f64::EPSILON);
        assert!((policy.get_randomization_factor() - 1.0).abs() < f64::EPSILON);

        let policy = BackoffPolicy::default().multiplier(f64::NAN).randomization_factor(-1.0);
        assert!((policy.get_multiplier() - 1.0).abs() < f64::EPSILON);
        assert!(policy.get_randomization_factor().abs() < f64::EPSILON);

        let policy = BackoffPolicy::default().randomization_factor(f64::NAN);
        assert!(policy.get_randomization_factor().abs() < f64::EPSILON);
    }

    #[test]
    fn max_attempts_saturates() {
        assert_eq!(BackoffPolicy::default().max_retries(0).max_attempts(), 1);
        assert_eq!(BackoffPolicy::default().max_retries(u32::MAX).max_attempts(), u32::MAX);
    }

    #[test]
    #[cfg(feature = "serde")]
    fn deserialize_fills_missing_fields_with_defaults() {
        let policy: BackoffPolicy = serde_json::from_str(r#"{ "max_retries": 1 }"#).unwrap();

        assert_eq!(policy, BackoffPolicy::default().max_retries(1));
    }

    #[test]
    #[cfg(feature = "serde")]
    fn serialize_deserialize() {
        let policy = BackoffPolicy::default().max_retries(9).initial_interval(Duration::from_millis(250));

        let serialized = serde_json::to_string(&policy).unwrap();
        let deserialized: BackoffPolicy = serde_json::from_str(&serialized).unwrap();

        assert_eq!(policy, deserialized);
    }

    #[test]
    #[cfg(feature = "serde")]
    fn deserialized_values_are_sanitized() {
        let policy: BackoffPolicy = serde_json::from_str(r#"{ "multiplier": 0.1, "randomization_factor": 4.0 }"#).unwrap();

        assert!((policy.get_multiplier() - 1.0).abs() < f64::EPSILON);
        assert!((policy.get_randomization_factor() - 1.0).abs() < f64::EPSILON);
    }
}
