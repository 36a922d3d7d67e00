//! Normalized call results.
//!
//! `success()` is deliberately narrower than the default error policy: only
//! `200 OK` counts as success, while the policy accepts anything in
//! `[200, 400)`. A `201 Created` is therefore returned without error and
//! still reports `success() == false`.

use std::ops::Deref;

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::http::ResponseHead;
use crate::serializer::{JsonSerializer, Serializer};

/// Status, buffered body and raw head of a completed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    body: String,
    raw: Option<ResponseHead>,
}

impl Response {
    /// A detached response with no raw head.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            raw: None,
        }
    }

    pub(crate) fn from_exchange(head: ResponseHead, body: String) -> Self {
        Self {
            status: head.status,
            body,
            raw: Some(head),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// True only for `200 OK`.
    pub fn success(&self) -> bool {
        self.status == 200
    }

    /// The head reported by the transport, when the response came from one.
    pub fn raw(&self) -> Option<&ResponseHead> {
        self.raw.as_ref()
    }

    pub fn into_body(self) -> String {
        self.body
    }

    /// Decode the buffered body as JSON.
    pub fn read_as<T: DeserializeOwned>(&self) -> Result<T> {
        self.read_with(&JsonSerializer)
    }

    /// Decode the buffered body with `serializer`.
    pub fn read_with<T: DeserializeOwned, S: Serializer>(&self, serializer: &S) -> Result<T> {
        serializer.deserialize(self.body.as_bytes())
    }
}

/// A [`Response`] whose body was deserialized into `T`.
///
/// Derefs to the untyped response for `status()`, `body()` and friends.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedResponse<T> {
    response: Response,
    pub data: T,
}

impl<T> TypedResponse<T> {
    pub fn new(response: Response, data: T) -> Self {
        Self { response, data }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn into_parts(self) -> (Response, T) {
        (self.response, self.data)
    }
}

impl<T> Deref for TypedResponse<T> {
    type Target = Response;

    fn deref(&self) -> &Response {
        &self.response
    }
}
