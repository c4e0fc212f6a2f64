// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retries against an executor that is permanently unavailable and cancels the call from
//! another task while the transport waits between attempts.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use layered::{Execute, Layer};
use ohno::AppError;
use retry_transport::{ReplayBody, RetryError, RetryingTransport};
use tick::Clock;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let clock = Clock::new_tokio();

    let transport = RetryingTransport::layer("unavailable", &clock)
        .should_retry(|result: &Result<Response<String>, io::Error>, _args| match result {
            Ok(response) => response.status() == StatusCode::SERVICE_UNAVAILABLE,
            Err(_) => true,
        })
        .on_retry(|args| println!("attempt {} failed, waiting {:?}", args.attempt(), args.retry_delay()))
        .layer(Execute::new(send));

    let token = CancellationToken::new();
    let mut request = Request::get("http://localhost/status").body(Full::new(Bytes::new()))?;
    request.extensions_mut().insert(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(800)).await;
        println!("cancelling");
        token.cancel();
    });

    let outcome = transport.execute_with_outcome(request).await;
    println!("gave up after {} attempt(s)", outcome.attempts());

    match outcome.into_result() {
        Err(RetryError::Cancelled) => println!("call was cancelled during backoff"),
        Err(error) => println!("call failed: {error}"),
        Ok(response) => println!("call succeeded: {}", response.status()),
    }

    canceller.await?;
    Ok(())
}

async fn send(request: Request<ReplayBody>) -> Result<Response<String>, io::Error> {
    println!("sending {} {}", request.method(), request.uri());

    let mut response = Response::new("maintenance".to_string());
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    Ok(response)
}
