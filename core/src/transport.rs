//! The network boundary of the pipeline.
//!
//! # Design
//! A [`Transport`] turns an [`HttpRequest`] into a [`TransportResponse`]: the
//! status and headers as soon as they arrive, and a deferred body the client
//! reads after the interceptors have seen the head. The per-call timeout is
//! an argument of `send`, so concurrent calls with different timeouts never
//! touch shared state.
//!
//! [`TransportClient`] pairs a shared transport with the default headers the
//! credentials installed (e.g. `Authorization`) and the timeout used when a
//! call names none. One is built per client and reused for every call so the
//! underlying connection pool is shared.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::{Error, Result, TransportError};
use crate::http::{HttpMethod, HttpRequest, ResponseHead};

/// Deferred response body.
pub type BodyFuture = BoxFuture<'static, std::result::Result<Bytes, TransportError>>;

/// A response whose head is available and whose body has not been read yet.
pub struct TransportResponse {
    pub head: ResponseHead,
    body: BodyFuture,
}

impl TransportResponse {
    pub fn new<F>(head: ResponseHead, body: F) -> Self
    where
        F: Future<Output = std::result::Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            head,
            body: Box::pin(body),
        }
    }

    /// A response with an already buffered body.
    pub fn buffered(head: ResponseHead, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::new(head, async move { Ok(body) })
    }

    pub fn into_parts(self) -> (ResponseHead, BodyFuture) {
        (self.head, self.body)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Sends requests over the network (or anywhere else, for tests).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Option<Duration>,
    ) -> std::result::Result<TransportResponse, TransportError>;

    /// Release pooled resources. Called once when the owning client is disposed.
    fn close(&self) {}
}

/// A shared transport plus the default headers applied to every request.
#[derive(Clone)]
pub struct TransportClient {
    transport: Arc<dyn Transport>,
    default_headers: Vec<(String, String)>,
    default_timeout: Option<Duration>,
}

impl TransportClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            default_headers: Vec::new(),
            default_timeout: None,
        }
    }

    /// Timeout applied to sends that do not carry their own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.default_headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.default_headers.push((name, value.into()));
        self
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    /// Send `request`, adding default headers it does not already carry.
    /// Without an explicit `timeout` the default timeout applies.
    pub async fn send(
        &self,
        request: &HttpRequest,
        timeout: Option<Duration>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let timeout = timeout.or(self.default_timeout);
        let missing: Vec<_> = self
            .default_headers
            .iter()
            .filter(|(name, _)| request.header(name).is_none())
            .collect();
        if missing.is_empty() {
            return self.transport.send(request, timeout).await;
        }

        let mut outgoing = request.clone();
        for (name, value) in missing {
            outgoing.headers.push((name.clone(), value.clone()));
        }
        self.transport.send(&outgoing, timeout).await
    }

    pub fn close(&self) {
        self.transport.close();
    }
}

impl fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header values may hold bearer tokens.
        let names: Vec<&str> = self.default_headers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("TransportClient")
            .field("default_headers", &names)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    closed: Arc<AtomicBool>,
}

impl ReqwestTransport {
    /// Build a transport. With `https_only`, plain-http URLs are refused.
    pub fn new(https_only: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .https_only(https_only)
            .build()
            .map_err(|e| Error::InvalidConfiguration(describe(&e)))?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Option<Duration>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let mut builder = self.client.request(to_reqwest_method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(map_error)?;
        let head = ResponseHead {
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        };
        Ok(TransportResponse::new(head, async move {
            response.bytes().await.map_err(map_error)
        }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(describe(&err))
    } else if err.is_body() || err.is_decode() {
        TransportError::Body(describe(&err))
    } else {
        TransportError::Other(describe(&err))
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
