//! Credential strategies that produce an authenticated [`TransportClient`].
//!
//! # Design
//! Each strategy answers two questions: how to build the transport client,
//! and whether it insists on TLS. `PasswordGrant` exchanges a username and
//! password for an access token the first time a client is built and keeps
//! that token for as long as the credentials live; there is no refresh.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest};
use crate::response::Response;
use crate::transport::{ReqwestTransport, Transport, TransportClient};

/// How the client authenticates.
#[derive(Debug, Default)]
pub enum Credentials {
    #[default]
    Anonymous,
    BearerToken(BearerToken),
    PasswordGrant(PasswordGrant),
}

/// A pre-issued bearer token.
#[derive(Debug)]
pub struct BearerToken {
    token: SecretString,
    requires_tls: bool,
}

/// Resource-owner password grant against a token endpoint.
#[derive(Debug)]
pub struct PasswordGrant {
    username: String,
    password: SecretString,
    endpoint: String,
    token: OnceCell<SecretString>,
}

#[derive(Deserialize)]
struct Token {
    #[serde(rename = "access_token", alias = "accessToken", alias = "AccessToken")]
    access_token: String,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Credentials::Anonymous
    }

    pub fn bearer(token: impl Into<String>, requires_tls: bool) -> Result<Self> {
        let token = non_empty(token.into(), "token")?;
        Ok(Credentials::BearerToken(BearerToken {
            token: SecretString::from(token),
            requires_tls,
        }))
    }

    pub fn password_grant(
        username: impl Into<String>,
        password: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self> {
        Ok(Credentials::PasswordGrant(PasswordGrant {
            username: non_empty(username.into(), "username")?,
            password: SecretString::from(non_empty(password.into(), "password")?),
            endpoint: non_empty(endpoint.into(), "endpoint")?,
            token: OnceCell::new(),
        }))
    }

    pub fn requires_secure_channel(&self) -> bool {
        match self {
            Credentials::BearerToken(bearer) => bearer.requires_tls,
            Credentials::Anonymous | Credentials::PasswordGrant(_) => false,
        }
    }

    /// Build a transport client, authenticating first if needed.
    ///
    /// Without an override the default [`ReqwestTransport`] is used, restricted
    /// to https when [`requires_secure_channel`](Self::requires_secure_channel)
    /// holds. `timeout` bounds the token exchange and becomes the client's
    /// default for later calls. A failed or timed-out token exchange is
    /// reported as [`Error::Authentication`] and is not retried.
    pub async fn build_client(
        &self,
        transport: Option<Arc<dyn Transport>>,
        timeout: Option<Duration>,
    ) -> Result<TransportClient> {
        let transport = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.requires_secure_channel())?),
        };
        let client = TransportClient::new(transport).with_default_timeout(timeout);

        match self {
            Credentials::Anonymous => Ok(client),
            Credentials::BearerToken(bearer) => Ok(with_bearer(client, &bearer.token)),
            Credentials::PasswordGrant(grant) => {
                let token = grant.access_token(&client).await?;
                Ok(with_bearer(client, token))
            }
        }
    }
}

impl PasswordGrant {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether a token has already been obtained.
    pub fn has_token(&self) -> bool {
        self.token.initialized()
    }

    async fn access_token(&self, client: &TransportClient) -> Result<&SecretString> {
        self.token.get_or_try_init(|| self.exchange(client)).await
    }

    async fn exchange(&self, client: &TransportClient) -> Result<SecretString> {
        tracing::debug!(endpoint = %self.endpoint, username = %self.username, "requesting access token");

        let form = [
            ("username", self.username.as_str()),
            ("password", self.password.expose_secret()),
            ("grant_type", "password"),
        ]
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

        let mut request = HttpRequest::new(HttpMethod::Post, self.endpoint.clone());
        request.set_header("Accept", "application/json");
        request.set_header("Content-Type", "application/x-www-form-urlencoded");
        request.body = Some(form.into_bytes());

        let failed = |reason: String| {
            Error::Authentication(format!("token request to {} failed: {reason}", self.endpoint))
        };

        let response = client.send(&request, None).await.map_err(|e| failed(e.to_string()))?;
        let (head, body) = response.into_parts();
        let body = body.await.map_err(|e| failed(e.to_string()))?;

        let response = Response::new(head.status, String::from_utf8_lossy(&body));
        if !(200..300).contains(&response.status()) {
            return Err(failed(format!("HTTP {}: {}", response.status(), response.body())));
        }

        let token: Token = response
            .read_as()
            .map_err(|e| failed(format!("unreadable token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(failed("empty access token".to_string()));
        }

        tracing::debug!(endpoint = %self.endpoint, "access token acquired");
        Ok(SecretString::from(token.access_token))
    }
}

fn with_bearer(client: TransportClient, token: &SecretString) -> TransportClient {
    client.with_default_header("Authorization", format!("Bearer {}", token.expose_secret()))
}

fn non_empty(value: String, field: &str) -> Result<String> {
    if value.is_empty() {
        return Err(Error::InvalidConfiguration(format!("{field} must not be empty")));
    }
    Ok(value)
}
