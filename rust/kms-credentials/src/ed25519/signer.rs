//! Ed25519 signer implementation.

use super::{Ed25519Signature, error::Ed25519KeyError, verifier::Ed25519Verifier};
use crate::{authority::Authority, did::Did, principal::Principal, suite::Signer};
use ed25519_dalek::Signer as _;
use serde::Serialize;

/// An `Ed25519` `did:key` signer.
///
/// Wraps an `ed25519_dalek::SigningKey` together with the `did:key` it
/// verifies under.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    did: Ed25519Verifier,
    signer: ed25519_dalek::SigningKey,
}

impl From<ed25519_dalek::SigningKey> for Ed25519Signer {
    fn from(signer: ed25519_dalek::SigningKey) -> Self {
        let did = Ed25519Verifier::from(&signer);
        Self { did, signer }
    }
}

impl Ed25519Signer {
    /// Generate a new Ed25519 keypair from operating system randomness.
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG fails.
    pub fn generate() -> Result<Self, Ed25519KeyError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(Ed25519KeyError::Rng)?;
        Ok(ed25519_dalek::SigningKey::from_bytes(&seed).into())
    }

    /// Import a keypair from its 32 byte seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed has the wrong length.
    pub fn import(seed: &[u8]) -> Result<Self, Ed25519KeyError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| Ed25519KeyError::InvalidSeedLength(seed.len()))?;
        Ok(ed25519_dalek::SigningKey::from_bytes(&seed).into())
    }

    /// Export the 32 byte seed.
    #[must_use]
    pub fn export(&self) -> [u8; 32] {
        self.signer.to_bytes()
    }

    /// Get the associated Ed25519 DID (verifier).
    #[must_use]
    pub const fn verifier(&self) -> &Ed25519Verifier {
        &self.did
    }

    /// Sign synchronously.
    pub fn sign_bytes(&self, payload: &[u8]) -> Ed25519Signature {
        self.signer.sign(payload).into()
    }
}

impl std::fmt::Display for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.did)
    }
}

impl Signer<Ed25519Signature> for Ed25519Signer {
    async fn sign(&self, payload: &[u8]) -> Result<Ed25519Signature, signature::Error> {
        Ok(self.sign_bytes(payload))
    }
}

impl Principal for Ed25519Signer {
    fn did(&self) -> Did {
        self.did.did()
    }
}

impl Authority for Ed25519Signer {
    type Signature = Ed25519Signature;
}

impl Serialize for Ed25519Signer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.did.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::Verifier;
    use pretty_assertions::{assert_eq, assert_ne};
    use testresult::TestResult;

    #[test_log::test(tokio::test)]
    async fn it_produces_verifiable_signatures() -> TestResult {
        let signer = Ed25519Signer::import(&[42; 32])?;
        let msg = b"test message for async signing";

        let signature = signer.sign(msg).await?;
        signer.verifier().verify(msg, &signature).await?;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn different_messages_produce_different_signatures() -> TestResult {
        let signer = Ed25519Signer::import(&[7; 32])?;

        let sig1 = signer.sign(b"first message").await?;
        let sig2 = signer.sign(b"second message").await?;

        assert_ne!(sig1, sig2);
        Ok(())
    }

    #[test]
    fn export_import_roundtrip_preserves_did() -> TestResult {
        let signer = Ed25519Signer::import(&[77; 32])?;
        let restored = Ed25519Signer::import(&signer.export())?;

        assert_eq!(restored.did(), signer.did());
        assert_eq!(signer.export(), [77; 32]);
        Ok(())
    }

    #[test]
    fn it_rejects_short_seeds() {
        assert!(matches!(
            Ed25519Signer::import(&[1; 16]),
            Err(Ed25519KeyError::InvalidSeedLength(16))
        ));
    }

    #[test]
    fn it_reports_rng_failures() {
        let error = Ed25519KeyError::from(getrandom::Error::UNSUPPORTED);
        assert!(matches!(error, Ed25519KeyError::Rng(_)));
        assert!(error.to_string().starts_with("RNG error: "));
    }

    #[test]
    fn generated_signers_are_distinct() -> TestResult {
        let a = Ed25519Signer::generate()?;
        let b = Ed25519Signer::generate()?;
        assert_ne!(a.did(), b.did());
        assert_eq!(a.verification_method(), a.did().to_string());
        Ok(())
    }
}
