//! Ed25519 DID key resolver.

use super::{Ed25519Signature, error::Ed25519ResolveError, verifier::Ed25519Verifier};
use crate::{did::Did, resolver::Resolver, suite::Verifier};
use kms_common::{ConditionalSend, ConditionalSync};

/// Resolves `did:key` strings to Ed25519 verifiers. The key is carried in the
/// identifier itself, so resolution never leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519KeyResolver;

impl Resolver<Ed25519Signature> for Ed25519KeyResolver {
    type Error = Ed25519ResolveError;

    async fn resolve(
        &self,
        did: &Did,
    ) -> Result<impl Verifier<Ed25519Signature> + ConditionalSend + ConditionalSync, Self::Error> {
        let verifier: Ed25519Verifier = did.as_str().parse()?;
        Ok(verifier)
    }
}
