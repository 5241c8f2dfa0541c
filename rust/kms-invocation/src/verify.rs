//! Verifying capability invocations.
//!
//! [`InvocationVerifier::verify`] checks a received request in this order:
//! 1. Both the invocation and signature headers are present and well formed
//! 2. The signature covers every required header, plus `digest` when there
//!    is a body, and the digest matches the body
//! 3. The `date` header is within the accepted clock skew, if one is set
//! 4. The capability decodes and the signing key belongs to its invoker
//! 5. The message signature verifies
//! 6. The capability grants the action and targets the expected resource
//! 7. The capability chain verifies back to a trusted root
//!
//! Any failure is a rejection; [`InvocationVerifier::authorize`] logs the
//! precise cause and reports a uniform [`Rejection`].

use crate::{
    error::Rejection,
    header::{CAPABILITY_INVOCATION_HEADER, CapabilityInvocation, HeaderError},
    http_signature::{
        DATE_HEADER, DIGEST_HEADER, HOST_HEADER, REQUEST_TARGET, SIGNATURE_HEADER,
        SignatureHeader, content_digest, signing_string,
    },
    request::InvocationRequest,
};
use kms_common::time;
use kms_credentials::{Did, Resolver, Signature, Verifier};
use kms_zcap::{
    CapabilityResolver, ChainError, ChainSettings, ChainVerifier, CompressionSettings,
    DecompressionError, DocumentLoader, InvocationTarget, StaticDocumentLoader,
};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while verifying an invocation.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// A required header is absent.
    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    /// A header could not be parsed.
    #[error("Malformed header: {0}")]
    MalformedHeader(#[from] HeaderError),

    /// The invoked capability could not be decoded.
    #[error("Invalid capability: {0}")]
    Decompression(#[from] DecompressionError),

    /// The signature leaves a required header unsigned.
    #[error("Signature does not cover {0}")]
    UncoveredHeader(String),

    /// The signature uses an algorithm this verifier does not handle.
    #[error("Unsupported signature algorithm {0}")]
    UnsupportedAlgorithm(String),

    /// The body does not match its digest.
    #[error("Body does not match its digest")]
    DigestMismatch,

    /// The `date` header is outside the accepted clock skew.
    #[error("Request date is outside the accepted clock skew")]
    StaleRequest,

    /// The signing key does not belong to the capability's invoker.
    #[error("Invocation signed by {key_id}, but the capability's invoker is {invoker}")]
    InvokerMismatch {
        /// The key that signed the request.
        key_id: String,
        /// The capability's invoker.
        invoker: Did,
    },

    /// The signing key could not be resolved.
    #[error("Failed to resolve signing key: {0}")]
    KeyResolution(String),

    /// The message signature does not verify.
    #[error("Invocation signature does not verify")]
    InvalidSignature,

    /// The capability does not grant the requested action.
    #[error("Capability does not allow action {0}")]
    ActionNotAllowed(String),

    /// The capability is for a different resource.
    #[error("Capability targets {found}, expected {expected}")]
    TargetMismatch {
        /// The resource the request is for.
        expected: String,
        /// The capability's target.
        found: InvocationTarget,
    },

    /// The capability chain does not verify.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Tuning for an [`InvocationVerifier`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// Largest accepted difference between the `date` header and the local
    /// clock, in seconds. Freshness is not checked when unset.
    pub max_clock_skew_secs: Option<u64>,
    /// Headers every signature must cover.
    pub required_headers: Vec<String>,
    /// Chain verification limits.
    pub chain: ChainSettings,
    /// Limits applied when decoding the capability.
    pub compression: CompressionSettings,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            max_clock_skew_secs: None,
            required_headers: vec![
                REQUEST_TARGET.to_string(),
                HOST_HEADER.to_string(),
                DATE_HEADER.to_string(),
                CAPABILITY_INVOCATION_HEADER.to_string(),
            ],
            chain: ChainSettings::default(),
            compression: CompressionSettings::default(),
        }
    }
}

/// What a verified invocation is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedInvocation {
    /// Identifier of the invoked capability.
    pub capability_id: String,
    /// The principal that signed the request.
    pub invoker: Did,
    /// The authorized action.
    pub action: String,
    /// The resource the action applies to.
    pub target: InvocationTarget,
    /// Identifier of the root the chain starts at.
    pub root_id: String,
}

/// Verifies signed invocations against trusted root capabilities.
#[derive(Debug)]
pub struct InvocationVerifier<S, C, R, L = StaticDocumentLoader> {
    chain: ChainVerifier<S, C, R, L>,
    settings: VerifierSettings,
}

impl<S, C, R> InvocationVerifier<S, C, R, StaticDocumentLoader>
where
    S: Signature,
    C: CapabilityResolver,
    R: Resolver<S>,
{
    /// A verifier trusting the roots `capabilities` resolves and resolving
    /// keys through `keys`.
    pub fn new(capabilities: C, keys: R) -> Self {
        Self {
            chain: ChainVerifier::new(capabilities, keys),
            settings: VerifierSettings::default(),
        }
    }
}

impl<S, C, R, L> InvocationVerifier<S, C, R, L>
where
    S: Signature,
    C: CapabilityResolver,
    R: Resolver<S>,
    L: DocumentLoader,
{
    /// Resolve contexts through `loader` instead.
    pub fn with_loader<M: DocumentLoader>(self, loader: M) -> InvocationVerifier<S, C, R, M> {
        InvocationVerifier {
            chain: self.chain.with_loader(loader),
            settings: self.settings,
        }
    }

    /// Apply `settings`.
    pub fn with_settings(self, settings: VerifierSettings) -> Self {
        Self {
            chain: self.chain.with_settings(settings.chain),
            settings,
        }
    }

    /// The active settings.
    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    /// The verifier used for capability chains.
    pub fn chain(&self) -> &ChainVerifier<S, C, R, L> {
        &self.chain
    }

    /// Verify `request` as an invocation on the resource `expected_target`.
    pub async fn verify(
        &self,
        request: &InvocationRequest,
        expected_target: &str,
    ) -> Result<VerifiedInvocation, VerificationError> {
        let invocation: CapabilityInvocation = request
            .header(CAPABILITY_INVOCATION_HEADER)
            .ok_or(VerificationError::MissingHeader(CAPABILITY_INVOCATION_HEADER))?
            .parse()?;
        let signature: SignatureHeader = request
            .header(SIGNATURE_HEADER)
            .ok_or(VerificationError::MissingHeader(SIGNATURE_HEADER))?
            .parse()?;

        for required in &self.settings.required_headers {
            if !signature.covers(required) {
                return Err(VerificationError::UncoveredHeader(required.clone()));
            }
        }
        if !request.body().is_empty() {
            if !signature.covers(DIGEST_HEADER) {
                return Err(VerificationError::UncoveredHeader(DIGEST_HEADER.to_string()));
            }
            let digest = request
                .header(DIGEST_HEADER)
                .ok_or(VerificationError::MissingHeader(DIGEST_HEADER))?;
            if digest.trim() != content_digest(request.body()) {
                return Err(VerificationError::DigestMismatch);
            }
        }

        if signature.algorithm != S::ALGORITHM {
            return Err(VerificationError::UnsupportedAlgorithm(signature.algorithm));
        }
        if let Some(skew) = self.settings.max_clock_skew_secs {
            self.check_freshness(request, skew)?;
        }

        let capability = self.settings.compression.decode(&invocation.capability)?;

        let signer = Did::from_verification_method(&signature.key_id)
            .map_err(|error| VerificationError::KeyResolution(error.to_string()))?;
        if &signer != capability.invoker() {
            return Err(VerificationError::InvokerMismatch {
                key_id: signature.key_id,
                invoker: capability.invoker().clone(),
            });
        }

        let payload = signing_string(request, &signature.headers)?;
        let value =
            S::from_slice(&signature.signature).map_err(|_| VerificationError::InvalidSignature)?;
        let key = signer.clone();
        let verifier = self
            .chain
            .keys()
            .resolve(&key)
            .await
            .map_err(|error| VerificationError::KeyResolution(error.to_string()))?;
        verifier
            .verify(payload.as_bytes(), &value)
            .await
            .map_err(|_| VerificationError::InvalidSignature)?;

        if !capability.allows(&invocation.action) {
            return Err(VerificationError::ActionNotAllowed(invocation.action));
        }
        if capability.invocation_target().id != expected_target {
            return Err(VerificationError::TargetMismatch {
                expected: expected_target.to_string(),
                found: capability.invocation_target().clone(),
            });
        }

        let verified = self.chain.verify(&capability).await?;

        tracing::debug!(
            capability = capability.id(),
            action = %invocation.action,
            invoker = %signer,
            depth = capability.capability_chain().len(),
            "Verified capability invocation"
        );

        Ok(VerifiedInvocation {
            capability_id: capability.id().to_string(),
            invoker: signer,
            action: invocation.action,
            target: capability.invocation_target().clone(),
            root_id: verified.root.id().to_string(),
        })
    }

    /// Verify `request`, logging the precise reason for a failure and
    /// returning a uniform [`Rejection`].
    pub async fn authorize(
        &self,
        request: &InvocationRequest,
        expected_target: &str,
    ) -> Result<VerifiedInvocation, Rejection> {
        self.verify(request, expected_target)
            .await
            .map_err(|error| {
                tracing::warn!(
                    reason = %error,
                    target = %request.request_target(),
                    "Rejecting capability invocation"
                );
                Rejection::from(error)
            })
    }

    fn check_freshness(
        &self,
        request: &InvocationRequest,
        skew: u64,
    ) -> Result<(), VerificationError> {
        let value = request
            .header(DATE_HEADER)
            .ok_or(VerificationError::MissingHeader(DATE_HEADER))?;
        let date = time::parse_http_date(value)
            .ok_or_else(|| HeaderError::Malformed(format!("date {value:?}")))?;

        let now = time::now();
        let drift = now
            .duration_since(date)
            .or_else(|_| date.duration_since(now))
            .unwrap_or_default();
        if drift > time::Duration::from_secs(skew) {
            return Err(VerificationError::StaleRequest);
        }
        Ok(())
    }
}
