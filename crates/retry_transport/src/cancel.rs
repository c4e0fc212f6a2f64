// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use futures_util::future::{Either, select};
use tick::Clock;
use tokio_util::sync::CancellationToken;

/// How a backoff wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    Elapsed,
    Cancelled,
}

/// Waits for `delay` unless `token` is (or becomes) cancelled first.
pub(crate) async fn delay_or_cancel(clock: &Clock, delay: Duration, token: Option<&CancellationToken>) -> Wait {
    let Some(token) = token else {
        clock.delay(delay).await;
        return Wait::Elapsed;
    };

    if token.is_cancelled() {
        return Wait::Cancelled;
    }

    let cancelled = std::pin::pin!(token.cancelled());
    let elapsed = std::pin::pin!(clock.delay(delay));

    match select(cancelled, elapsed).await {
        Either::Left(((), _)) => Wait::Cancelled,
        Either::Right(((), _)) => Wait::Elapsed,
    }
}
