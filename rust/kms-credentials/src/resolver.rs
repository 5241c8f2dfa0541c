//! DID-to-verifier resolution.

use crate::{
    did::Did,
    suite::{Signature, Verifier},
};
use kms_common::{ConditionalSend, ConditionalSync};
use std::future::Future;

/// Resolves a DID to a [`Verifier`] for signature type `S`.
///
/// Async to support network based DID methods. Verification of capability
/// proofs and invocation signatures goes through this trait, so a verifier
/// never needs to know how keys are stored.
pub trait Resolver<S: Signature>: ConditionalSync {
    /// Error type for resolution failures.
    type Error: std::error::Error + ConditionalSend + 'static;

    /// Resolve a DID to a verifier for signature type `S`.
    fn resolve(
        &self,
        did: &Did,
    ) -> impl Future<
        Output = Result<impl Verifier<S> + ConditionalSend + ConditionalSync, Self::Error>,
    > + ConditionalSend;
}
