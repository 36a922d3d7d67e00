//! Verb-oriented HTTP client over a pluggable transport.
//!
//! # Design
//! Every public operation funnels into one async routine: build the request,
//! run `on_request` hooks, send with the per-call timeout, run `on_response`
//! hooks, buffer the body, classify the status, and optionally deserialize.
//! The `_blocking` twins drive that same routine on a runtime owned by the
//! client, so both surfaces share request assembly, interception and error
//! handling exactly.
//!
//! The transport client is built once, from the configuration's credentials,
//! when the client is constructed and is shared by every call.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::config::Configuration;
use crate::error::{Error, Result, TransportError};
use crate::http::{HttpMethod, HttpRequest};
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::query::{FlatQueryStringBuilder, QueryStringBuilder};
use crate::response::{Response, TypedResponse};
use crate::serializer::{JsonSerializer, Serializer};
use crate::transport::TransportClient;

const USER_AGENT: &str = "Httwrap";

/// Decides whether a received status/body pair is a failure.
pub type ErrorHandler = Arc<dyn Fn(u16, &str) -> Result<()> + Send + Sync>;

/// Default policy: any status below 200 or at/above 400 is an [`Error::Http`].
pub fn default_error_handler(status: u16, body: &str) -> Result<()> {
    if (200..400).contains(&status) {
        return Ok(());
    }
    Err(Error::Http {
        status,
        body: body.to_string(),
    })
}

/// Per-call overrides.
#[derive(Clone, Default)]
pub struct RequestOptions {
    error_handler: Option<ErrorHandler>,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default error policy for this call.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(u16, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Accept every status.
    pub fn ignore_errors(self) -> Self {
        self.error_handler(|_, _| Ok(()))
    }

    /// Add a header, overriding a default header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the call when `token` is cancelled. Only the async operations
    /// observe it.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("RequestOptions")
            .field("custom_error_handler", &self.error_handler.is_some())
            .field("headers", &names)
            .field("timeout", &self.timeout)
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

/// HTTP client bound to one [`Configuration`].
///
/// Safe to share across tasks; concurrent calls reuse the same transport.
pub struct Client<S = JsonSerializer> {
    config: Configuration<S>,
    transport: TransportClient,
    interceptors: InterceptorChain,
    query_builder: Box<dyn QueryStringBuilder>,
    runtime: OnceLock<Runtime>,
}

impl<S: Serializer> Client<S> {
    /// Build a client, authenticating on the caller's runtime.
    pub async fn connect(config: Configuration<S>) -> Result<Self> {
        let transport = config.transport_client().await?;
        Ok(Self::assemble(config, transport, OnceLock::new()))
    }

    /// Build a client, blocking until any token exchange has completed.
    ///
    /// Fails with [`Error::BlockingInAsyncContext`] inside an async runtime;
    /// use [`connect`](Self::connect) there.
    pub fn new(config: Configuration<S>) -> Result<Self> {
        ensure_blocking_allowed()?;
        let runtime = blocking_runtime()
            .map_err(|e| Error::InvalidConfiguration(format!("cannot start blocking runtime: {e}")))?;
        let transport = runtime.block_on(config.transport_client())?;
        Ok(Self::assemble(config, transport, OnceLock::from(runtime)))
    }

    fn assemble(config: Configuration<S>, transport: TransportClient, runtime: OnceLock<Runtime>) -> Self {
        tracing::debug!(base_path = %config.base_path(), "client ready");
        Self {
            config,
            transport,
            interceptors: InterceptorChain::new(),
            query_builder: Box::new(FlatQueryStringBuilder),
            runtime,
        }
    }

    pub fn with_query_builder(mut self, builder: impl QueryStringBuilder + 'static) -> Self {
        self.query_builder = Box::new(builder);
        self
    }

    pub fn add_interceptor(&mut self, interceptor: impl Interceptor + 'static) {
        self.interceptors.add(Arc::new(interceptor));
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    pub fn configuration(&self) -> &Configuration<S> {
        &self.config
    }

    /// Release the transport and the blocking runtime.
    pub fn dispose(self) {
        drop(self);
    }

    // -----------------------------------------------------------------------
    // Async operations
    // -----------------------------------------------------------------------

    pub async fn get(&self, path: &str, options: &RequestOptions) -> Result<Response> {
        self.run(HttpMethod::Get, path, None, options, options.cancellation.as_ref())
            .await
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<TypedResponse<T>> {
        let response = self.get(path, options).await?;
        self.decode(response)
    }

    /// GET `path?query`, with the query built from `payload`.
    pub async fn get_with_query<P: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &P,
        options: &RequestOptions,
    ) -> Result<Response> {
        let path = self.query_path(path, payload)?;
        self.get(&path, options).await
    }

    pub async fn get_with_query_as<T: DeserializeOwned, P: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &P,
        options: &RequestOptions,
    ) -> Result<TypedResponse<T>> {
        let response = self.get_with_query(path, payload, options).await?;
        self.decode(response)
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(HttpMethod::Post, path, Some(body), options).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(HttpMethod::Put, path, Some(body), options).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(HttpMethod::Patch, path, Some(body), options).await
    }

    pub async fn delete(&self, path: &str, options: &RequestOptions) -> Result<Response> {
        self.run(HttpMethod::Delete, path, None, options, options.cancellation.as_ref())
            .await
    }

    /// Any method, with an optional body.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<Response> {
        let body = self.encode(body)?;
        self.run(method, path, body, options, options.cancellation.as_ref())
            .await
    }

    pub async fn request_as<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<TypedResponse<T>> {
        let response = self.request(method, path, body, options).await?;
        self.decode(response)
    }

    // -----------------------------------------------------------------------
    // Blocking operations
    //
    // These park the calling thread on the client's own runtime and return
    // Error::BlockingInAsyncContext inside an async runtime. Cancellation
    // tokens are ignored.
    // -----------------------------------------------------------------------

    pub fn get_blocking(&self, path: &str, options: &RequestOptions) -> Result<Response> {
        self.block_on(HttpMethod::Get, path, self.run(HttpMethod::Get, path, None, options, None))
    }

    pub fn get_as_blocking<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<TypedResponse<T>> {
        let response = self.get_blocking(path, options)?;
        self.decode(response)
    }

    pub fn get_with_query_blocking<P: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &P,
        options: &RequestOptions,
    ) -> Result<Response> {
        let path = self.query_path(path, payload)?;
        self.get_blocking(&path, options)
    }

    pub fn get_with_query_as_blocking<T: DeserializeOwned, P: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &P,
        options: &RequestOptions,
    ) -> Result<TypedResponse<T>> {
        let response = self.get_with_query_blocking(path, payload, options)?;
        self.decode(response)
    }

    pub fn post_blocking<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request_blocking(HttpMethod::Post, path, Some(body), options)
    }

    pub fn put_blocking<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request_blocking(HttpMethod::Put, path, Some(body), options)
    }

    pub fn patch_blocking<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request_blocking(HttpMethod::Patch, path, Some(body), options)
    }

    pub fn delete_blocking(&self, path: &str, options: &RequestOptions) -> Result<Response> {
        self.block_on(
            HttpMethod::Delete,
            path,
            self.run(HttpMethod::Delete, path, None, options, None),
        )
    }

    pub fn request_blocking<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<Response> {
        let body = self.encode(body)?;
        self.block_on(method, path, self.run(method, path, body, options, None))
    }

    pub fn request_as_blocking<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<TypedResponse<T>> {
        let response = self.request_blocking(method, path, body, options)?;
        self.decode(response)
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    async fn run(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
        options: &RequestOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response> {
        let failed = |source: TransportError| {
            tracing::debug!(method = %method, path, error = %source, "request failed");
            Error::RequestFailed {
                method,
                path: path.to_string(),
                source,
            }
        };

        let mut request = self.prepare(method, path, body, &options.headers);
        self.interceptors.before_send(&mut request);

        tracing::trace!(method = %method, url = %request.url, "dispatching request");
        let response = cancellable(cancel, self.transport.send(&request, options.timeout))
            .await
            .map_err(failed)?;
        let (head, body) = response.into_parts();
        self.interceptors.after_receive(&request, &head);

        let body = cancellable(cancel, body).await.map_err(failed)?;
        let body = String::from_utf8_lossy(&body).into_owned();
        tracing::trace!(method = %method, url = %request.url, status = head.status, "response buffered");

        match &options.error_handler {
            Some(handler) => handler(head.status, &body)?,
            None => default_error_handler(head.status, &body)?,
        }
        Ok(Response::from_exchange(head, body))
    }

    fn prepare(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
        headers: &[(String, String)],
    ) -> HttpRequest {
        let mut request = HttpRequest::new(method, format!("{}{}", self.config.base_path(), path));
        request.set_header("User-Agent", USER_AGENT);
        request.set_header("Accept", "application/json");
        if let Some(body) = body {
            request.set_header("Content-Type", self.config.serializer().content_type());
            request.body = Some(body);
        }
        for (name, value) in headers {
            request.set_header(name.clone(), value.clone());
        }
        request
    }

    fn encode<B: Serialize + ?Sized>(&self, body: Option<&B>) -> Result<Option<Vec<u8>>> {
        body.map(|b| self.config.serializer().serialize(b)).transpose()
    }

    fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<TypedResponse<T>> {
        let data = response.read_with(self.config.serializer())?;
        Ok(TypedResponse::new(response, data))
    }

    fn query_path<P: Serialize + ?Sized>(&self, path: &str, payload: &P) -> Result<String> {
        let payload = serde_json::to_value(payload).map_err(|e| Error::Serialization(e.to_string()))?;
        let query = self.query_builder.build(&payload)?;
        Ok(format!("{path}?{query}"))
    }

    fn block_on<T>(&self, method: HttpMethod, path: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        ensure_blocking_allowed()?;
        let runtime = match self.runtime.get() {
            Some(runtime) => runtime,
            None => {
                let runtime = blocking_runtime().map_err(|e| Error::RequestFailed {
                    method,
                    path: path.to_string(),
                    source: TransportError::Other(format!("cannot start blocking runtime: {e}")),
                })?;
                // A concurrent caller may have won the race; either runtime works.
                let _ = self.runtime.set(runtime);
                self.runtime.get().ok_or_else(|| Error::RequestFailed {
                    method,
                    path: path.to_string(),
                    source: TransportError::Closed,
                })?
            }
        };
        runtime.block_on(call)
    }
}

impl<S> Drop for Client<S> {
    fn drop(&mut self) {
        self.transport.close();
        // Background shutdown never blocks, so dropping inside async code is fine.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl<S> fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}

/// Parking a runtime thread would deadlock or panic inside `block_on`.
fn ensure_blocking_allowed() -> Result<()> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::BlockingInAsyncContext);
    }
    Ok(())
}

/// One worker keeps pooled connections driven between blocking calls.
fn blocking_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("httwrap-blocking")
        .enable_all()
        .build()
}

async fn cancellable<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = std::result::Result<T, TransportError>>,
) -> std::result::Result<T, TransportError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}
