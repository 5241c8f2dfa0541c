//! Capability chain verification.
//!
//! Given the leaf capability a request presents, [`ChainVerifier::verify`]:
//! 1. Bounds the chain length and rejects repeated identifiers
//! 2. Resolves every ancestor named by the leaf's chain
//! 3. Checks that the first document is a trusted root
//! 4. Walks root to leaf, checking for each hop that the chain extends the
//!    parent's chain by the parent's id, that actions only narrow and that the
//!    invocation target never changes
//! 5. Verifies each delegation proof under the key its verification method
//!    names, and that every delegated hop was signed by the parent's invoker

use crate::{
    canonical::{DocumentLoader, StaticDocumentLoader},
    capability::{Capability, InvocationTarget, ProofPurpose},
    resolver::CapabilityResolver,
    signer::signing_input,
};
use kms_credentials::{Did, Resolver, Signature, Verifier};
use serde::Deserialize;
use std::{collections::HashSet, marker::PhantomData};
use thiserror::Error;

/// Errors raised while verifying a capability chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// An ancestor named in the chain could not be found.
    #[error("Capability {0} not found")]
    NotFound(String),

    /// The capability resolver failed.
    #[error("Capability resolution failed: {0}")]
    Resolution(String),

    /// The chain is longer than the verifier accepts.
    #[error("Capability chain is longer than {0}")]
    TooDeep(usize),

    /// An identifier appears more than once in the chain.
    #[error("Capability {0} appears more than once in its chain")]
    Cycle(String),

    /// The first document of the chain is not a root capability.
    #[error("Capability {id} is not a well formed root: {reason}")]
    MalformedRoot {
        /// The offending capability.
        id: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A presented root differs from the trusted copy.
    #[error("Presented root capability {0} differs from the trusted copy")]
    RootMismatch(String),

    /// A hop does not extend its parent's chain by the parent's id.
    #[error("Capability chain of {id} is broken: expected {expected:?}, found {found:?}")]
    BrokenChain {
        /// The offending capability.
        id: String,
        /// The chain implied by the parent.
        expected: Vec<String>,
        /// The chain the capability carries.
        found: Vec<String>,
    },

    /// A hop grants actions its parent does not have.
    #[error("Capability {id} grants {excess:?} beyond its parent")]
    NotAttenuated {
        /// The offending capability.
        id: String,
        /// Actions the parent does not grant.
        excess: Vec<String>,
    },

    /// A hop changes the invocation target.
    #[error("Capability {id} targets {found} but its parent targets {expected}")]
    TargetMismatch {
        /// The offending capability.
        id: String,
        /// The parent's target.
        expected: InvocationTarget,
        /// The capability's target.
        found: InvocationTarget,
    },

    /// A delegation proof is missing or does not verify.
    #[error("Capability {id} has no valid delegation proof: {reason}")]
    InvalidProof {
        /// The offending capability.
        id: String,
        /// Why the proof was rejected.
        reason: String,
    },

    /// A hop was signed by someone other than the parent's invoker.
    #[error("Capability {id} was delegated by {signer}, but only {expected} may delegate it")]
    UnauthorizedDelegator {
        /// The offending capability.
        id: String,
        /// The DID that signed the hop.
        signer: Did,
        /// The parent's invoker.
        expected: Did,
    },
}

/// Limits applied by a [`ChainVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Maximum number of ancestors a capability may have.
    pub max_chain_length: usize,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            max_chain_length: 10,
        }
    }
}

/// Outcome of a successful chain verification.
#[derive(Debug, Clone)]
pub struct VerifiedChain {
    /// The trusted root the chain starts at.
    pub root: Capability,

    /// Identifiers from root to leaf, inclusive.
    pub path: Vec<String>,

    /// The DID that signed each hop, root first.
    pub signers: Vec<Did>,
}

/// Verifies capability chains back to trusted roots.
///
/// `S` selects the signature suite proofs are checked with; `C` supplies the
/// trusted documents and `R` turns verification methods into keys.
#[derive(Debug)]
pub struct ChainVerifier<S, C, R, L = StaticDocumentLoader> {
    capabilities: C,
    keys: R,
    loader: L,
    settings: ChainSettings,
    suite: PhantomData<fn() -> S>,
}

impl<S, C, R> ChainVerifier<S, C, R, StaticDocumentLoader>
where
    S: Signature,
    C: CapabilityResolver,
    R: Resolver<S>,
{
    /// A verifier trusting the roots `capabilities` resolves and resolving
    /// keys through `keys`.
    pub fn new(capabilities: C, keys: R) -> Self {
        Self {
            capabilities,
            keys,
            loader: StaticDocumentLoader::default(),
            settings: ChainSettings::default(),
            suite: PhantomData,
        }
    }
}

impl<S, C, R, L> ChainVerifier<S, C, R, L>
where
    S: Signature,
    C: CapabilityResolver,
    R: Resolver<S>,
    L: DocumentLoader,
{
    /// Resolve contexts through `loader` instead.
    pub fn with_loader<M: DocumentLoader>(self, loader: M) -> ChainVerifier<S, C, R, M> {
        ChainVerifier {
            capabilities: self.capabilities,
            keys: self.keys,
            loader,
            settings: self.settings,
            suite: PhantomData,
        }
    }

    /// Apply `settings`.
    pub fn with_settings(mut self, settings: ChainSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The trusted capability source.
    pub fn capabilities(&self) -> &C {
        &self.capabilities
    }

    /// The key resolver.
    pub fn keys(&self) -> &R {
        &self.keys
    }

    /// Verify `leaf` and every ancestor it names.
    pub async fn verify(&self, leaf: &Capability) -> Result<VerifiedChain, ChainError> {
        let chain = leaf.capability_chain();
        if chain.len() > self.settings.max_chain_length {
            return Err(ChainError::TooDeep(self.settings.max_chain_length));
        }

        let mut seen = HashSet::new();
        for id in chain.iter().map(String::as_str).chain([leaf.id()]) {
            if !seen.insert(id) {
                return Err(ChainError::Cycle(id.to_string()));
            }
        }

        if leaf.is_root() {
            return self.verify_root(leaf).await;
        }

        let parent = leaf.parent().unwrap_or_default();
        if chain.last().map(String::as_str) != Some(parent) {
            return Err(ChainError::BrokenChain {
                id: leaf.id().to_string(),
                expected: vec![parent.to_string()],
                found: chain.to_vec(),
            });
        }

        let mut documents = Vec::with_capacity(chain.len() + 1);
        for id in chain {
            let document = self
                .capabilities
                .resolve(id)
                .await
                .map_err(|error| ChainError::Resolution(error.to_string()))?
                .ok_or_else(|| ChainError::NotFound(id.clone()))?;
            documents.push(document);
        }
        documents.push(leaf.clone());

        let mut verified = self.verify_root(&documents[0]).await?;
        for pair in documents.windows(2) {
            let (parent, child) = (&pair[0], &pair[1]);
            self.check_hop(parent, child)?;

            let signer = self.verify_proof(child).await?;
            if &signer != parent.invoker() {
                return Err(ChainError::UnauthorizedDelegator {
                    id: child.id().to_string(),
                    signer,
                    expected: parent.invoker().clone(),
                });
            }

            verified.path.push(child.id().to_string());
            verified.signers.push(signer);
        }

        Ok(verified)
    }

    async fn verify_root(&self, root: &Capability) -> Result<VerifiedChain, ChainError> {
        if !root.is_root() {
            return Err(ChainError::MalformedRoot {
                id: root.id().to_string(),
                reason: "it names a parent",
            });
        }
        if !root.capability_chain().is_empty() {
            return Err(ChainError::MalformedRoot {
                id: root.id().to_string(),
                reason: "its capability chain is not empty",
            });
        }

        let trusted = self
            .capabilities
            .resolve(root.id())
            .await
            .map_err(|error| ChainError::Resolution(error.to_string()))?
            .ok_or_else(|| ChainError::NotFound(root.id().to_string()))?;
        if &trusted != root {
            return Err(ChainError::RootMismatch(root.id().to_string()));
        }

        let signer = self.verify_proof(root).await?;
        Ok(VerifiedChain {
            root: trusted,
            path: vec![root.id().to_string()],
            signers: vec![signer],
        })
    }

    fn check_hop(&self, parent: &Capability, child: &Capability) -> Result<(), ChainError> {
        let mut expected = parent.capability_chain().to_vec();
        expected.push(parent.id().to_string());

        if child.parent() != Some(parent.id()) || child.capability_chain() != expected.as_slice()
        {
            return Err(ChainError::BrokenChain {
                id: child.id().to_string(),
                expected,
                found: child.capability_chain().to_vec(),
            });
        }

        if child.invocation_target() != parent.invocation_target() {
            return Err(ChainError::TargetMismatch {
                id: child.id().to_string(),
                expected: parent.invocation_target().clone(),
                found: child.invocation_target().clone(),
            });
        }

        let excess = child.allowed_actions().excess_over(parent.allowed_actions());
        if !excess.is_empty() {
            return Err(ChainError::NotAttenuated {
                id: child.id().to_string(),
                excess,
            });
        }

        Ok(())
    }

    /// Verifies the delegation proof of `capability` and returns the DID
    /// that produced it.
    async fn verify_proof(&self, capability: &Capability) -> Result<Did, ChainError> {
        let invalid = |reason: String| ChainError::InvalidProof {
            id: capability.id().to_string(),
            reason,
        };

        let proof = capability
            .proofs()
            .iter()
            .find(|proof| proof.proof_purpose() == ProofPurpose::CapabilityDelegation)
            .ok_or_else(|| invalid("no capabilityDelegation proof".into()))?;

        if proof.proof_type() != S::PROOF_TYPE {
            return Err(invalid(format!(
                "unsupported proof type {}",
                proof.proof_type()
            )));
        }
        if proof.capability_chain() != capability.capability_chain() {
            return Err(invalid(
                "proof was made over a different capability chain".into(),
            ));
        }

        let signature =
            S::from_slice(proof.proof_value()).map_err(|error| invalid(error.to_string()))?;
        let signer = Did::from_verification_method(proof.verification_method())
            .map_err(|error| invalid(error.to_string()))?;
        let payload = signing_input(
            &self.loader,
            capability,
            &proof.options(capability.context()),
        )
        .map_err(|error| invalid(error.to_string()))?;

        let key = signer.clone();
        let verifier = self
            .keys
            .resolve(&key)
            .await
            .map_err(|error| invalid(error.to_string()))?;
        verifier
            .verify(&payload, &signature)
            .await
            .map_err(|_| invalid("signature does not verify".into()))?;

        Ok(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        action::{Actions, CREATE_KEY, SIGN},
        resolver::MemoryCapabilityResolver,
        signer::CapabilitySigner,
    };
    use kms_credentials::{Ed25519KeyResolver, Ed25519Signature, Ed25519Signer, Principal};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn keystore() -> InvocationTarget {
        InvocationTarget::new("https://kms.example.com/kms/keystores/ks-1", "urn:kms:keystore")
    }

    fn verifier(
        roots: MemoryCapabilityResolver,
    ) -> ChainVerifier<Ed25519Signature, MemoryCapabilityResolver, Ed25519KeyResolver> {
        ChainVerifier::new(roots, Ed25519KeyResolver)
    }

    /// Re-encode a capability through JSON with `edit` applied.
    fn tamper(
        capability: &Capability,
        edit: impl FnOnce(&mut serde_json::Value),
    ) -> TestResult<Capability> {
        let mut json = serde_json::to_value(capability)?;
        edit(&mut json);
        Ok(serde_json::from_value(json)?)
    }

    #[test_log::test(tokio::test)]
    async fn it_verifies_a_trusted_root() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;
        let roots = MemoryCapabilityResolver::default();
        roots.insert(root.clone()).await;

        let verified = verifier(roots).verify(&root).await?;
        assert_eq!(verified.path, vec![root.id().to_string()]);
        assert_eq!(verified.signers, vec![owner.did()]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_unknown_roots() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;

        let result = verifier(MemoryCapabilityResolver::default())
            .verify(&root)
            .await;
        assert!(matches!(result, Err(ChainError::NotFound(_))));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_roots_that_differ_from_the_trusted_copy() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::new([SIGN]))
            .await?;
        let roots = MemoryCapabilityResolver::default();
        roots.insert(root.clone()).await;

        let widened = tamper(&root, |json| {
            json["allowedAction"] = serde_json::json!([SIGN, CREATE_KEY]);
        })?;
        let result = verifier(roots).verify(&widened).await;
        assert!(matches!(result, Err(ChainError::RootMismatch(_))));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_verifies_a_two_hop_chain() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let service = Ed25519Signer::import(&[2; 32])?;
        let worker = Ed25519Signer::import(&[3; 32])?;

        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;
        let middle = CapabilitySigner::new(&owner)
            .delegate(&root, service.did(), Actions::new([CREATE_KEY, SIGN]))
            .await?;
        let leaf = CapabilitySigner::new(&service)
            .delegate(&middle, worker.did(), Actions::new([SIGN]))
            .await?;

        let trusted = MemoryCapabilityResolver::default();
        trusted.insert(root.clone()).await;
        trusted.insert(middle.clone()).await;

        let verified = verifier(trusted).verify(&leaf).await?;
        assert_eq!(
            verified.path,
            vec![
                root.id().to_string(),
                middle.id().to_string(),
                leaf.id().to_string()
            ]
        );
        assert_eq!(verified.signers, vec![owner.did(), owner.did(), service.did()]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_delegation_by_someone_other_than_the_invoker() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let mallory = Ed25519Signer::import(&[4; 32])?;

        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;
        let stolen = CapabilitySigner::new(&mallory)
            .delegate(&root, mallory.did(), Actions::new([SIGN]))
            .await?;

        let roots = MemoryCapabilityResolver::default();
        roots.insert(root).await;

        let result = verifier(roots).verify(&stolen).await;
        assert!(matches!(
            result,
            Err(ChainError::UnauthorizedDelegator { .. })
        ));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_a_forged_target() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let delegate = Ed25519Signer::import(&[2; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;
        let child = CapabilitySigner::new(&owner)
            .delegate(&root, delegate.did(), Actions::new([SIGN]))
            .await?;
        let forged = tamper(&child, |json| {
            json["invocationTarget"]["id"] = "https://kms.example.com/kms/keystores/ks-2".into();
        })?;

        let roots = MemoryCapabilityResolver::default();
        roots.insert(root).await;

        let result = verifier(roots).verify(&forged).await;
        assert!(matches!(result, Err(ChainError::TargetMismatch { .. })));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_forged_actions() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let delegate = Ed25519Signer::import(&[2; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::new([SIGN, CREATE_KEY]))
            .await?;
        let child = CapabilitySigner::new(&owner)
            .delegate(&root, delegate.did(), Actions::new([SIGN]))
            .await?;

        let roots = MemoryCapabilityResolver::default();
        roots.insert(root).await;
        let verifier = verifier(roots);

        let escalated = tamper(&child, |json| {
            json["allowedAction"] = serde_json::json!([SIGN, "admin"]);
        })?;
        assert!(matches!(
            verifier.verify(&escalated).await,
            Err(ChainError::NotAttenuated { .. })
        ));

        let resigned = tamper(&child, |json| {
            json["allowedAction"] = serde_json::json!([CREATE_KEY]);
        })?;
        assert!(matches!(
            verifier.verify(&resigned).await,
            Err(ChainError::InvalidProof { .. })
        ));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_a_chain_missing_the_parent() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let delegate = Ed25519Signer::import(&[2; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;
        let child = CapabilitySigner::new(&owner)
            .delegate(&root, delegate.did(), Actions::new([SIGN]))
            .await?;
        let corrupted = tamper(&child, |json| {
            json["capabilityChain"] = serde_json::json!([]);
        })?;

        let roots = MemoryCapabilityResolver::default();
        roots.insert(root).await;

        let result = verifier(roots).verify(&corrupted).await;
        assert!(matches!(result, Err(ChainError::BrokenChain { .. })));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_repeated_identifiers() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let delegate = Ed25519Signer::import(&[2; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;
        let child = CapabilitySigner::new(&owner)
            .delegate(&root, delegate.did(), Actions::new([SIGN]))
            .await?;
        let root_id = root.id().to_string();
        let looped = tamper(&child, |json| {
            json["capabilityChain"] = serde_json::json!([root_id.clone(), root_id]);
        })?;

        let result = verifier(MemoryCapabilityResolver::default())
            .verify(&looped)
            .await;
        assert!(matches!(result, Err(ChainError::Cycle(_))));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_bounds_the_chain_length() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;
        let roots = MemoryCapabilityResolver::default();
        roots.insert(root.clone()).await;

        let mut current = root;
        for _ in 0..3 {
            current = CapabilitySigner::new(&owner)
                .delegate(&current, owner.did(), Actions::new([SIGN]))
                .await?;
            roots.insert(current.clone()).await;
        }

        let strict = verifier(roots.clone()).with_settings(ChainSettings {
            max_chain_length: 2,
        });
        assert!(matches!(
            strict.verify(&current).await,
            Err(ChainError::TooDeep(2))
        ));
        verifier(roots).verify(&current).await?;
        Ok(())
    }
}
