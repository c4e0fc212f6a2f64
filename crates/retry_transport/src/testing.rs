// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, Uri};
use http_body_util::BodyExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

use crate::ReplayBody;

/// Captures formatted log output for assertions.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
    }

    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(output.contains(expected), "log output does not contain '{expected}', got:\n{output}");
    }

    /// Use with `tracing::subscriber::set_default` for thread-local capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

#[derive(Debug)]
pub(crate) struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What an executor saw for one attempt.
#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub method: Method,
    pub uri: Uri,
    pub body: Bytes,
}

type Script = Arc<dyn Fn(usize) -> Result<Response<String>, io::Error> + Send + Sync>;

/// Executor that records every request and answers from a script indexed by call number.
#[derive(Clone)]
pub(crate) struct ScriptedExecutor {
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    script: Script,
}

impl std::fmt::Debug for ScriptedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedExecutor").finish_non_exhaustive()
    }
}

impl ScriptedExecutor {
    pub fn new(script: impl Fn(usize) -> Result<Response<String>, io::Error> + Send + Sync + 'static) -> Self {
        Self {
            seen: Arc::default(),
            script: Arc::new(script),
        }
    }

    /// Always answers with `status`.
    pub fn status(status: StatusCode) -> Self {
        Self::new(move |_| Ok(response(status)))
    }

    /// Always fails with a connection reset.
    pub fn reset() -> Self {
        Self::new(|_| Err(io::Error::from(io::ErrorKind::ConnectionReset)))
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    async fn handle(&self, request: Request<ReplayBody>) -> Result<Response<String>, io::Error> {
        let (parts, body) = request.into_parts();
        let body = body.collect().await.map(http_body_util::Collected::to_bytes).unwrap_or_default();

        let index = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(SeenRequest {
                method: parts.method,
                uri: parts.uri,
                body,
            });
            seen.len() - 1
        };

        (self.script)(index)
    }
}

impl layered::Service<Request<ReplayBody>> for ScriptedExecutor {
    type Out = Result<Response<String>, io::Error>;

    async fn execute(&self, input: Request<ReplayBody>) -> Self::Out {
        self.handle(input).await
    }
}

impl tower_service::Service<Request<ReplayBody>> for ScriptedExecutor {
    type Response = Response<String>;
    type Error = io::Error;
    type Future = std::pin::Pin<Box<dyn Future<Output = Result<Response<String>, io::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<ReplayBody>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.handle(req).await })
    }
}

/// A tower executor whose `poll_ready` always fails.
#[derive(Clone, Debug)]
pub(crate) struct FailReadyExecutor;

impl tower_service::Service<Request<ReplayBody>> for FailReadyExecutor {
    type Response = Response<String>;
    type Error = io::Error;
    type Future = std::pin::Pin<Box<dyn Future<Output = Result<Response<String>, io::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Err(io::Error::other("executor unavailable")))
    }

    fn call(&mut self, _req: Request<ReplayBody>) -> Self::Future {
        unreachable!("call should not be invoked when poll_ready fails")
    }
}

pub(crate) fn response(status: StatusCode) -> Response<String> {
    Response::builder().status(status).body(status.as_str().to_string()).unwrap()
}

pub(crate) fn request(body: &'static str) -> Request<http_body_util::Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri("http://localhost/echo")
        .body(http_body_util::Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}
