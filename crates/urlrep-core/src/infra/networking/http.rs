// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{Retryable, RetryableStrategy, RetryTransientMiddleware, default_on_request_failure};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub type HTTPClient = ClientWithMiddleware;

pub static MAX_HTTP_RETRY_ATTEMPTS: u32 = 2;

/// Retries requests that never got an answer. HTTP statuses are always surfaced as they come.
struct TransportFailuresOnly;

impl RetryableStrategy for TransportFailuresOnly {
    fn handle(&self, res: &Result<reqwest::Response, reqwest_middleware::Error>) -> Option<Retryable> {
        match res {
            Ok(_) => None,
            Err(error) => default_on_request_failure(error),
        }
    }
}

pub static HTTP_CLIENT: LazyLock<Arc<HTTPClient>> = LazyLock::new(|| {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(&user_agent).expect("valid user agent"),
    );
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

    let base_http_client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()
        .expect("cannot build HTTP client");

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_HTTP_RETRY_ATTEMPTS);
    let retry_middleware = RetryTransientMiddleware::new_with_policy_and_strategy(retry_policy, TransportFailuresOnly);

    let retrier_http_client = reqwest_middleware::ClientBuilder::new(base_http_client)
        .with(retry_middleware)
        .build();
    Arc::new(retrier_http_client)
});
