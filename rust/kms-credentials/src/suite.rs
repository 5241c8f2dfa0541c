//! Signature suites and the traits that produce and check them.

use kms_common::{ConditionalSend, ConditionalSync};
use std::future::Future;

/// A signature value belonging to a single signature suite.
pub trait Signature: Sized + Clone + std::fmt::Debug + ConditionalSync + 'static {
    /// Linked data proof type written into capability proofs.
    const PROOF_TYPE: &'static str;

    /// Algorithm label written into HTTP message signatures.
    const ALGORITHM: &'static str;

    /// Raw signature bytes.
    fn to_vec(&self) -> Vec<u8>;

    /// Decode raw signature bytes.
    fn from_slice(bytes: &[u8]) -> Result<Self, signature::Error>;
}

/// Produces a cryptographic signature over a payload.
pub trait Signer<S: Signature> {
    /// Sign `payload` and return the signature.
    fn sign(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<S, signature::Error>> + ConditionalSend;
}

/// Verifies that a cryptographic signature is valid for a given payload.
pub trait Verifier<S: Signature> {
    /// Verify that `signature` is valid for `payload`.
    fn verify(
        &self,
        payload: &[u8],
        signature: &S,
    ) -> impl Future<Output = Result<(), signature::Error>> + ConditionalSend;
}
