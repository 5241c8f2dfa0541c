//! Sending signed invocations.

use crate::sign::SignedInvocation;
use kms_common::{ConditionalSend, ConditionalSync};
use reqwest::{Client, Method};
use std::{future::Future, sync::Arc};
use thiserror::Error;

/// Status and body of the answer to an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl InvocationResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers signed invocations to the service that verifies them.
pub trait Transport: ConditionalSync {
    /// Error type for delivery failures.
    type Error: std::error::Error + ConditionalSend + 'static;

    /// Send `invocation` and wait for the response.
    fn send(
        &self,
        invocation: SignedInvocation,
    ) -> impl Future<Output = Result<InvocationResponse, Self::Error>> + ConditionalSend;
}

impl<T: Transport> Transport for Arc<T> {
    type Error = T::Error;

    fn send(
        &self,
        invocation: SignedInvocation,
    ) -> impl Future<Output = Result<InvocationResponse, Self::Error>> + ConditionalSend {
        (**self).send(invocation)
    }
}

/// Errors raised by [`HttpTransport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request method is not a valid HTTP method.
    #[error("Invalid HTTP method {0}")]
    InvalidMethod(String),

    /// The request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A [`Transport`] that sends invocations over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// A transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport sending through `client`.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    type Error = TransportError;

    async fn send(&self, invocation: SignedInvocation) -> Result<InvocationResponse, Self::Error> {
        let request = invocation.request;
        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method().to_string()))?;

        let mut builder = self.client.request(method, request.url().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().to_vec());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        tracing::debug!(
            capability = %invocation.capability_id,
            action = %invocation.action,
            status = status.as_u16(),
            "Sent capability invocation"
        );

        Ok(InvocationResponse {
            status: status.as_u16(),
            body,
        })
    }
}
