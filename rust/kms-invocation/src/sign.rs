//! Signing capability invocations.

use crate::{
    header::{CAPABILITY_INVOCATION_HEADER, CapabilityInvocation, HeaderError},
    http_signature::{
        DATE_HEADER, DIGEST_HEADER, HOST_HEADER, REQUEST_TARGET, SIGNATURE_HEADER,
        SignatureHeader, content_digest, signing_string,
    },
    request::InvocationRequest,
};
use kms_common::time;
use kms_credentials::{Authority, Signature};
use kms_metrics::KmsMetrics;
use kms_zcap::{Capability, CompressionError, CompressionSettings};
use serde::Deserialize;
use std::time::Instant;
use thiserror::Error;

/// Errors raised while signing an invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The capability does not grant the requested action.
    #[error("Capability {capability} does not allow action {action}")]
    ActionNotAllowed {
        /// The invoked capability.
        capability: String,
        /// The requested action.
        action: String,
    },

    /// The action name cannot be carried in the invocation header.
    #[error("Invalid action name {0:?}")]
    InvalidAction(String),

    /// The capability could not be compressed.
    #[error(transparent)]
    Compression(#[from] CompressionError),

    /// The request URL has no host to sign.
    #[error("Request URL has no host")]
    MissingHost,

    /// A covered header is missing.
    #[error(transparent)]
    Header(#[from] HeaderError),

    /// The signer refused to sign.
    #[error("Failed to sign invocation: {0}")]
    Signing(#[source] signature::Error),
}

/// Tuning for invocation signatures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InvocationSettings {
    /// Headers covered by every signature, in signing string order.
    pub covered_headers: Vec<String>,
    /// Algorithm label to write instead of the signature suite's own.
    pub algorithm: Option<String>,
    /// Add and cover a `digest` header when the request has a body.
    pub include_digest: bool,
    /// How the capability is packed into its header.
    pub compression: CompressionSettings,
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self {
            covered_headers: vec![
                REQUEST_TARGET.to_string(),
                HOST_HEADER.to_string(),
                DATE_HEADER.to_string(),
                CAPABILITY_INVOCATION_HEADER.to_string(),
            ],
            algorithm: None,
            include_digest: true,
            compression: CompressionSettings::default(),
        }
    }
}

/// A request ready to send, tagged with what it invokes.
#[derive(Debug, Clone)]
pub struct SignedInvocation {
    /// The request with its invocation and signature headers.
    pub request: InvocationRequest,
    /// Identifier of the invoked capability.
    pub capability_id: String,
    /// The requested action.
    pub action: String,
}

/// Signs invocation requests on behalf of an [`Authority`].
#[derive(Debug)]
pub struct InvocationSigner<'a, A> {
    authority: &'a A,
    key_id: String,
    settings: InvocationSettings,
    metrics: Option<KmsMetrics>,
}

impl<'a, A: Authority> InvocationSigner<'a, A> {
    /// A signer that identifies its key through the authority's
    /// verification method.
    pub fn new(authority: &'a A) -> Self {
        Self {
            authority,
            key_id: authority.verification_method(),
            settings: InvocationSettings::default(),
            metrics: None,
        }
    }

    /// Write `key_id` into signatures instead.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// Apply `settings`.
    pub fn with_settings(mut self, settings: InvocationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Record signing latency in `metrics`.
    pub fn with_metrics(mut self, metrics: KmsMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach the invocation of `capability` for `action` to `request` and
    /// sign it.
    ///
    /// Fails before anything is signed when the capability does not grant
    /// `action`. `host` and `date` are filled in when absent, and a `digest`
    /// is added for non-empty bodies unless disabled.
    pub async fn sign(
        &self,
        request: InvocationRequest,
        capability: &Capability,
        action: &str,
    ) -> Result<SignedInvocation, InvocationError> {
        if !capability.allows(action) {
            return Err(InvocationError::ActionNotAllowed {
                capability: capability.id().to_string(),
                action: action.to_string(),
            });
        }
        if action.is_empty() || action.contains(['"', ',']) || action.contains(char::is_whitespace)
        {
            return Err(InvocationError::InvalidAction(action.to_string()));
        }

        if &self.authority.did() != capability.invoker() {
            tracing::warn!(
                capability = capability.id(),
                signer = %self.authority.did(),
                invoker = %capability.invoker(),
                "Signing an invocation for a capability the signer is not the invoker of"
            );
        }

        let invocation = CapabilityInvocation {
            capability: self.settings.compression.encode(capability)?,
            action: action.to_string(),
        };
        self.seal(request, capability.id(), invocation).await
    }

    /// Attach `invocation` and the message signature to `request` without
    /// looking at the capability.
    pub(crate) async fn seal(
        &self,
        mut request: InvocationRequest,
        capability_id: &str,
        invocation: CapabilityInvocation,
    ) -> Result<SignedInvocation, InvocationError> {
        if request.header(HOST_HEADER).is_none() {
            let host = request.host().ok_or(InvocationError::MissingHost)?;
            request.set_header(HOST_HEADER, host);
        }
        if request.header(DATE_HEADER).is_none() {
            request.set_header(DATE_HEADER, time::to_http_date(time::now()));
        }
        request.set_header(CAPABILITY_INVOCATION_HEADER, invocation.to_string());

        let mut covered = self.settings.covered_headers.clone();
        if self.settings.include_digest && !request.body().is_empty() {
            let digest = content_digest(request.body());
            request.set_header(DIGEST_HEADER, digest);
            if !covered.iter().any(|name| name == DIGEST_HEADER) {
                covered.push(DIGEST_HEADER.to_string());
            }
        }

        let payload = signing_string(&request, &covered)?;
        let started = Instant::now();
        let signature = self
            .authority
            .sign(payload.as_bytes())
            .await
            .map_err(InvocationError::Signing)?;
        if let Some(metrics) = &self.metrics {
            metrics.crypto_sign_time(started.elapsed());
        }

        let header = SignatureHeader {
            key_id: self.key_id.clone(),
            algorithm: self
                .settings
                .algorithm
                .clone()
                .unwrap_or_else(|| <A::Signature as Signature>::ALGORITHM.to_string()),
            headers: covered,
            signature: signature.to_vec(),
        };
        request.set_header(SIGNATURE_HEADER, header.to_string());

        tracing::debug!(
            capability = capability_id,
            action = %invocation.action,
            target = %request.request_target(),
            "Signed capability invocation"
        );

        Ok(SignedInvocation {
            request,
            capability_id: capability_id.to_string(),
            action: invocation.action,
        })
    }
}

/// Sign an invocation of `capability` for `action` with default settings.
pub async fn sign_invocation<A: Authority>(
    request: InvocationRequest,
    capability: &Capability,
    action: &str,
    signer: &A,
) -> Result<SignedInvocation, InvocationError> {
    InvocationSigner::new(signer)
        .sign(request, capability, action)
        .await
}
