//! Typed HTTP request/response wrapper.
//!
//! # Overview
//! Callers issue verb-named operations (`get`, `post`, `put`, `patch`,
//! `delete`, each with a `_blocking` twin) against a path relative to a
//! configured base path, and receive a [`Response`] carrying the status, the
//! buffered body and the raw response head, or a [`TypedResponse`] whose body
//! has been deserialized.
//!
//! # Design
//! - [`Credentials`] build the shared [`TransportClient`]; password grants
//!   exchange credentials for a token once, at client construction.
//! - [`Interceptor`]s see every request before it is sent and every response
//!   head after it arrives, in registration order.
//! - Non-2xx/3xx statuses become [`Error::Http`] unless the call supplies its
//!   own error handler; transport failures become [`Error::RequestFailed`].
//! - Calls without their own timeout use the configuration's default
//!   ([`DEFAULT_TIMEOUT`] unless changed), as does the token exchange.
//! - [`Transport`], [`Serializer`] and [`QueryStringBuilder`] are traits with
//!   reqwest, serde_json and flat-query defaults.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod query;
pub mod response;
pub mod serializer;
pub mod transport;

pub use client::{default_error_handler, Client, ErrorHandler, RequestOptions};
pub use config::{Configuration, DEFAULT_TIMEOUT};
pub use credentials::Credentials;
pub use error::{Error, Result, TransportError};
pub use http::{HttpMethod, HttpRequest, ResponseHead};
pub use interceptor::{Interceptor, InterceptorChain, LoggingInterceptor};
pub use query::{FlatQueryStringBuilder, QueryStringBuilder};
pub use response::{Response, TypedResponse};
pub use serializer::{JsonSerializer, Serializer};
pub use tokio_util::sync::CancellationToken;
pub use transport::{ReqwestTransport, Transport, TransportClient, TransportResponse};
