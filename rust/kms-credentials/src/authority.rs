use crate::{
    principal::Principal,
    suite::{Signature, Signer},
};
use kms_common::ConditionalSync;

/// A principal able to sign on its own behalf.
///
/// Capability proofs and invocation signatures reference the signing key
/// through [`Authority::verification_method`]. The default is the bare DID,
/// which verifiers reduce back to the DID before resolving the key.
pub trait Authority: Principal + Signer<Self::Signature> + ConditionalSync {
    /// The signature suite this authority produces.
    type Signature: Signature;

    /// Reference to the key that verifies this authority's signatures.
    fn verification_method(&self) -> String {
        self.did().to_string()
    }
}
