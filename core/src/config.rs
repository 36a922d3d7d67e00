//! Client configuration: where to send requests and how.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::serializer::{JsonSerializer, Serializer};
use crate::transport::{Transport, TransportClient};

/// Timeout for calls and token exchanges that do not set their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Immutable settings owned by a [`Client`](crate::Client).
///
/// `base_path` is used as a literal prefix: request paths are appended
/// without inserting or collapsing `/`, so `"http://host/api/"` pairs with
/// `"products"`.
pub struct Configuration<S = JsonSerializer> {
    base_path: String,
    credentials: Credentials,
    serializer: S,
    transport: Option<Arc<dyn Transport>>,
    default_timeout: Option<Duration>,
}

impl Configuration<JsonSerializer> {
    /// Anonymous, JSON configuration rooted at `base_path`.
    pub fn new(base_path: impl Into<String>) -> Result<Self> {
        let base_path = base_path.into();
        if base_path.is_empty() {
            return Err(Error::InvalidConfiguration("base path must not be empty".to_string()));
        }
        Ok(Self {
            base_path,
            credentials: Credentials::Anonymous,
            serializer: JsonSerializer,
            transport: None,
            default_timeout: Some(DEFAULT_TIMEOUT),
        })
    }
}

impl<S: Serializer> Configuration<S> {
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_serializer<T: Serializer>(self, serializer: T) -> Configuration<T> {
        Configuration {
            base_path: self.base_path,
            credentials: self.credentials,
            serializer,
            transport: self.transport,
            default_timeout: self.default_timeout,
        }
    }

    /// Replace the default reqwest transport, e.g. with an in-memory fake.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Bound every call and the token exchange by `timeout` unless the call
    /// sets its own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Let calls without their own timeout wait indefinitely.
    pub fn without_default_timeout(mut self) -> Self {
        self.default_timeout = None;
        self
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    pub fn transport_override(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Build a ready-to-use transport client from the credentials.
    pub async fn transport_client(&self) -> Result<TransportClient> {
        self.credentials
            .build_client(self.transport.clone(), self.default_timeout)
            .await
    }
}

impl<S> fmt::Debug for Configuration<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("base_path", &self.base_path)
            .field("credentials", &self.credentials)
            .field("custom_transport", &self.transport.is_some())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
