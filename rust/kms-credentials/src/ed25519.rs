//! Ed25519 `did:key` signer, verifier and resolver.

mod error;
mod resolver;
mod signer;
mod verifier;

pub use error::{Ed25519DidFromStrError, Ed25519KeyError, Ed25519ResolveError};
pub use resolver::Ed25519KeyResolver;
pub use signer::Ed25519Signer;
pub use verifier::Ed25519Verifier;

use crate::suite::Signature;

/// Multicodec header of an `ed25519-pub` key inside a `did:key`.
pub(crate) const ED25519_PUB: [u8; 2] = [0xed, 0x01];

/// Prefix of a base58btc encoded `did:key`.
pub(crate) const DID_KEY_PREFIX: &str = "did:key:z";

/// An Ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(ed25519_dalek::Signature);

impl From<ed25519_dalek::Signature> for Ed25519Signature {
    fn from(signature: ed25519_dalek::Signature) -> Self {
        Self(signature)
    }
}

impl AsRef<ed25519_dalek::Signature> for Ed25519Signature {
    fn as_ref(&self) -> &ed25519_dalek::Signature {
        &self.0
    }
}

impl Signature for Ed25519Signature {
    const PROOF_TYPE: &'static str = "Ed25519Signature2018";
    const ALGORITHM: &'static str = "ed25519";

    fn to_vec(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, signature::Error> {
        Ok(Self(ed25519_dalek::Signature::from_slice(bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_roundtrips_signature_bytes() {
        let signature = Ed25519Signature::from(ed25519_dalek::Signature::from_bytes(&[7; 64]));
        let bytes = signature.to_vec();
        assert_eq!(bytes.len(), 64);
        assert_eq!(Ed25519Signature::from_slice(&bytes).unwrap(), signature);
    }

    #[test]
    fn it_rejects_truncated_signatures() {
        assert!(Ed25519Signature::from_slice(&[7; 12]).is_err());
    }
}
