// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sends a request to a local server that throttles the first two attempts with
//! `429 Too Many Requests`. The transport retries with exponential backoff, replaying the same
//! body every time, and logs each retry.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use layered::Service;
use ohno::AppError;
use retry_transport::{BackoffPolicy, RetryingTransport};
use tick::Clock;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).init();

    let address = spawn_throttling_server().await?;
    let clock = Clock::new_tokio();

    let transport = RetryingTransport::layer("rate_limited", &clock)
        // Required: decide which results are worth another attempt
        .should_retry(|result: &Result<Response<Incoming>, hyper_util::client::legacy::Error>, _args| match result {
            Ok(response) => response.status() == StatusCode::TOO_MANY_REQUESTS,
            Err(error) => error.is_connect(),
        })
        .on_retry(|args| {
            println!(
                "attempt {} failed ({:?}), retrying in {:?}",
                args.attempt(),
                args.cause().status(),
                args.retry_delay()
            );
        })
        .backoff_policy(BackoffPolicy::default().max_retries(4))
        .use_logs()
        .with_default_executor();

    let request = Request::post(format!("http://{address}/orders")).body(Full::new(Bytes::from_static(b"{\"item\":42}")))?;

    match transport.execute(request).await {
        Ok(response) => {
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();
            println!("request succeeded with {status}: {}", String::from_utf8_lossy(&body));
        }
        Err(error) => println!("request failed: {error}"),
    }

    Ok(())
}

async fn spawn_throttling_server() -> Result<std::net::SocketAddr, AppError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let served = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let served = Arc::clone(&served);
            let service = service_fn(move |request: Request<Incoming>| {
                let served = Arc::clone(&served);
                async move {
                    let body = request.into_body().collect().await.map(|body| body.to_bytes()).unwrap_or_default();
                    let response = if served.fetch_add(1, Ordering::SeqCst) < 2 {
                        Response::builder().status(StatusCode::TOO_MANY_REQUESTS).body(Full::new(Bytes::new()))
                    } else {
                        Response::builder().status(StatusCode::CREATED).body(Full::new(body))
                    };
                    Ok::<_, Infallible>(response.unwrap_or_default())
                }
            });

            tokio::spawn(http1::Builder::new().serve_connection(TokioIo::new(stream), service));
        }
    });

    Ok(address)
}
