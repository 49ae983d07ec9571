//! Cancelable requests.
//!
//! A [`CancelableRequest`] issues exactly one outbound call per
//! [`start`](CancelableRequest::start) and resolves to an [`Outcome`].
//! Firing the supplied [`CancellationToken`] at any point (before the call
//! is sent, while it is in flight, or after the response arrived but before
//! it was handed back) resolves to [`Outcome::Canceled`], never to data.

use std::future::Future;
use std::marker::PhantomData;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RequestError;

/// How a single request settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Ok(T),
    Canceled,
    Err(RequestError),
}

impl<T> Outcome<T> {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Outcome::Canceled)
    }
}

impl<T> From<Result<T, RequestError>> for Outcome<T> {
    fn from(result: Result<T, RequestError>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(err) => Outcome::Err(err),
        }
    }
}

/// One outbound call paired with a cancellation signal.
pub trait CancelableRequest: Send + 'static {
    type Output: Send + 'static;

    /// Issue the call. The returned future owns everything it needs so it
    /// can run on a spawned task.
    fn start(self, signal: CancellationToken) -> BoxFuture<'static, Outcome<Self::Output>>;
}

/// Drive `fut` to completion unless `signal` fires first.
///
/// `fut` is never polled when the signal has already fired, and a result
/// that arrives together with (or after) the signal is discarded.
pub async fn run_cancelable<T, F>(signal: &CancellationToken, fut: F) -> Outcome<T>
where
    F: Future<Output = Result<T, RequestError>>,
{
    if signal.is_cancelled() {
        return Outcome::Canceled;
    }

    let result = tokio::select! {
        biased;
        _ = signal.cancelled() => return Outcome::Canceled,
        result = fut => result,
    };

    if signal.is_cancelled() {
        return Outcome::Canceled;
    }
    result.into()
}

// ============================================================================
// Closure-backed requests
// ============================================================================

/// Adapts any future-producing closure into a [`CancelableRequest`].
///
/// The closure receives the signal too, for protocols that can forward it.
pub struct FutureRequest<F> {
    make: F,
}

/// Build a request from a closure returning the call's future.
pub fn from_fn<F, Fut, T>(make: F) -> FutureRequest<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    T: Send + 'static,
{
    FutureRequest { make }
}

impl<F, Fut, T> CancelableRequest for FutureRequest<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn start(self, signal: CancellationToken) -> BoxFuture<'static, Outcome<T>> {
        async move {
            if signal.is_cancelled() {
                return Outcome::Canceled;
            }
            let fut = (self.make)(signal.clone());
            run_cancelable(&signal, fut).await
        }
        .boxed()
    }
}

// ============================================================================
// HTTP requests
// ============================================================================

/// A JSON GET request sharing the caller's connection pool.
pub struct HttpRequest<T> {
    client: Client,
    url: String,
    headers: header::HeaderMap,
    bearer: Option<String>,
    _output: PhantomData<fn() -> T>,
}

impl<T> HttpRequest<T> {
    pub fn get(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            headers: header::HeaderMap::new(),
            bearer: None,
            _output: PhantomData,
        }
    }

    /// Attach a static header, e.g. `Accept: application/json`
    pub fn header(mut self, name: header::HeaderName, value: &'static str) -> Self {
        self.headers
            .insert(name, header::HeaderValue::from_static(value));
        self
    }

    /// Send the session token as a bearer credential
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<T: DeserializeOwned> HttpRequest<T> {
    async fn fetch(self) -> Result<T, RequestError> {
        let mut request = self.client.get(&self.url).headers(self.headers);
        if let Some(ref token) = self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let response = check_response(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl<T> CancelableRequest for HttpRequest<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn start(self, signal: CancellationToken) -> BoxFuture<'static, Outcome<T>> {
        async move {
            let url = self.url.clone();
            let outcome = run_cancelable(&signal, self.fetch()).await;
            if outcome.is_canceled() {
                debug!(url = %url, "Request canceled");
            }
            outcome
        }
        .boxed()
    }
}

/// Check if response is successful, returning an error with body if not.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, RequestError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(RequestError::from_status(status, &body))
    }
}
