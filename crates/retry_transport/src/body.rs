// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;

/// The request body could not be read before the first attempt.
///
/// The body is drained once so that it can be replayed on every attempt; a failure while
/// draining aborts the call without sending anything.
#[ohno::error]
#[display("failed to read the request body")]
pub struct BodyError;

/// Request body handed to the inner executor on every attempt.
///
/// Each attempt receives its own `ReplayBody` over the same immutable buffer, so every attempt
/// sends exactly the bytes the caller provided. A request that had no body (or an empty one)
/// yields a body that is at its end from the start.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use http_body::Body;
/// use retry_transport::ReplayBody;
///
/// let body = ReplayBody::new(Bytes::from_static(b"payload"));
/// assert_eq!(body.size_hint().exact(), Some(7));
///
/// assert!(ReplayBody::empty().is_end_stream());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReplayBody {
    data: Option<Bytes>,
}

impl ReplayBody {
    /// Creates a body that yields `data` as a single frame.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self {
            data: (!data.is_empty()).then_some(data),
        }
    }

    /// Creates a body without content.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<Bytes> for ReplayBody {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl Body for ReplayBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().data.take().map(|data| Ok(Frame::data(data))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        self.data
            .as_ref()
            .map_or_else(|| SizeHint::with_exact(0), |data| SizeHint::with_exact(data.len() as u64))
    }
}

/// Drains `body` into a single contiguous buffer.
pub(crate) async fn buffer_body<B>(body: B) -> Result<Bytes, BodyError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let collected = body.collect().await.map_err(BodyError::caused_by)?;
    Ok(collected.to_bytes())
}
