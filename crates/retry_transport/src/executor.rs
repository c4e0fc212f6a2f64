// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error};
use hyper_util::rt::TokioExecutor;
use layered::Service;

use crate::ReplayBody;

/// Executor backed by the pooled HTTP/1 client of `hyper-util`.
///
/// Connections are pooled across calls and clones. Requests must run inside a Tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use hyper::body::Incoming;
/// use hyper_util::client::legacy::Error;
/// use http::Response;
/// use layered::Service;
/// use retry_transport::RetryingTransport;
/// use tick::Clock;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = RetryingTransport::layer("default", Clock::new_tokio())
///     .should_retry(|result: &Result<Response<Incoming>, Error>, _args| result.is_err())
///     .with_default_executor();
///
/// let request = http::Request::get("http://localhost:8080/").body(http_body_util::Empty::<bytes::Bytes>::new())?;
/// let response = transport.execute(request).await?;
/// println!("status: {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DefaultExecutor {
    client: Client<HttpConnector, ReplayBody>,
}

impl DefaultExecutor {
    /// Creates an executor with a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self::from_client(Client::builder(TokioExecutor::new()).build_http())
    }

    /// Uses an already configured client.
    #[must_use]
    pub fn from_client(client: Client<HttpConnector, ReplayBody>) -> Self {
        Self { client }
    }
}

impl Default for DefaultExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<ReplayBody>> for DefaultExecutor {
    type Out = Result<Response<Incoming>, Error>;

    fn execute(&self, input: Request<ReplayBody>) -> impl Future<Output = Self::Out> + Send {
        self.client.request(input)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(DefaultExecutor: Send, Sync, Clone, std::fmt::Debug);

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let executor = DefaultExecutor::default();

        // Nothing listens on a port that was just released.
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let request = Request::get(format!("http://127.0.0.1:{port}/")).body(ReplayBody::empty()).unwrap();
        let error = executor.execute(request).await.unwrap_err();

        assert!(error.is_connect());
    }
}
