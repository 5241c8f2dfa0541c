//! Minting capabilities: root issuance and delegation.

use crate::{
    action::Actions,
    canonical::{CanonicalBytes, CanonicalizationError, DocumentLoader, StaticDocumentLoader},
    capability::{Capability, InvocationTarget, Proof, ProofOptions, ProofPurpose},
    error::{DelegationError, IssuanceError},
};
use kms_common::time;
use kms_credentials::{Authority, Did, Signature};

/// Signs capabilities on behalf of an [`Authority`].
///
/// Every proof written by this signer references
/// [`CapabilitySigner::verification_method`], which defaults to the
/// authority's own verification method. JSON-LD contexts are resolved through
/// the configured [`DocumentLoader`].
#[derive(Debug)]
pub struct CapabilitySigner<'a, A, L = StaticDocumentLoader> {
    authority: &'a A,
    verification_method: String,
    loader: L,
}

impl<'a, A: Authority> CapabilitySigner<'a, A, StaticDocumentLoader> {
    /// A signer for `authority` using the built-in context loader.
    pub fn new(authority: &'a A) -> Self {
        Self {
            verification_method: authority.verification_method(),
            authority,
            loader: StaticDocumentLoader::default(),
        }
    }
}

impl<'a, A: Authority, L: DocumentLoader> CapabilitySigner<'a, A, L> {
    /// Resolve contexts through `loader` instead.
    pub fn with_loader<M: DocumentLoader>(self, loader: M) -> CapabilitySigner<'a, A, M> {
        CapabilitySigner {
            authority: self.authority,
            verification_method: self.verification_method,
            loader,
        }
    }

    /// Reference a specific key in written proofs.
    pub fn with_verification_method(mut self, verification_method: impl Into<String>) -> Self {
        self.verification_method = verification_method.into();
        self
    }

    /// The key reference written into proofs.
    pub fn verification_method(&self) -> &str {
        &self.verification_method
    }

    /// The principal signing.
    pub fn did(&self) -> Did {
        self.authority.did()
    }

    /// Mint a root capability binding `target` to `invoker`.
    ///
    /// The result has an empty capability chain, no parent and exactly one
    /// `capabilityDelegation` proof.
    pub async fn issue(
        &self,
        invoker: Did,
        target: InvocationTarget,
        actions: Actions,
    ) -> Result<Capability, IssuanceError> {
        if actions.is_empty() {
            return Err(IssuanceError::NoActions);
        }

        let capability = Capability::unsigned(None, invoker, target, actions);
        let capability = self.sign(capability).await.map_err(|error| match error {
            ProofError::Canonicalization(error) => IssuanceError::Canonicalization(error),
            ProofError::Signing(error) => IssuanceError::Signing(error),
        })?;

        tracing::debug!(
            id = capability.id(),
            invoker = %capability.invoker(),
            target = %capability.invocation_target(),
            "Issued root capability"
        );
        Ok(capability)
    }

    /// Derive a capability from `parent` that grants `actions` to `invoker`.
    ///
    /// The invocation target is copied from the parent and the chain becomes
    /// the parent's chain followed by the parent's id. `actions` must be a
    /// non-empty subset of the parent's actions.
    pub async fn delegate(
        &self,
        parent: &Capability,
        invoker: Did,
        actions: Actions,
    ) -> Result<Capability, DelegationError> {
        if actions.is_empty() {
            return Err(DelegationError::NoActions);
        }
        if parent.proofs().is_empty() {
            return Err(DelegationError::UnsignedParent(parent.id().to_string()));
        }
        if parent
            .capability_chain()
            .iter()
            .any(|ancestor| ancestor == parent.id())
        {
            return Err(DelegationError::CyclicChain(parent.id().to_string()));
        }
        let excess = actions.excess_over(parent.allowed_actions());
        if !excess.is_empty() {
            return Err(DelegationError::NotAttenuated { excess });
        }

        if &invoker == parent.invoker() {
            tracing::debug!(
                parent = parent.id(),
                "Delegating to the parent's own invoker"
            );
        }
        if &self.authority.did() != parent.invoker() {
            tracing::warn!(
                parent = parent.id(),
                signer = %self.authority.did(),
                "Delegating a capability the signer is not the invoker of"
            );
        }

        let capability = Capability::unsigned(
            Some(parent),
            invoker,
            parent.invocation_target().clone(),
            actions,
        );
        let capability = self.sign(capability).await.map_err(|error| match error {
            ProofError::Canonicalization(error) => DelegationError::Canonicalization(error),
            ProofError::Signing(error) => DelegationError::Signing(error),
        })?;

        tracing::debug!(
            id = capability.id(),
            parent = parent.id(),
            depth = capability.capability_chain().len(),
            invoker = %capability.invoker(),
            "Delegated capability"
        );
        Ok(capability)
    }

    async fn sign(&self, capability: Capability) -> Result<Capability, ProofError> {
        let created = time::to_rfc3339(time::now());
        let options = ProofOptions {
            context: capability.context(),
            proof_type: <A::Signature as Signature>::PROOF_TYPE,
            created: &created,
            verification_method: &self.verification_method,
            proof_purpose: ProofPurpose::CapabilityDelegation,
            capability_chain: capability.capability_chain(),
        };

        let payload = signing_input(&self.loader, &capability, &options)?;
        let signature = self
            .authority
            .sign(&payload)
            .await
            .map_err(ProofError::Signing)?;

        let proof = Proof::new(options, signature.to_vec());
        Ok(capability.with_proof(proof))
    }
}

enum ProofError {
    Canonicalization(CanonicalizationError),
    Signing(signature::Error),
}

impl From<CanonicalizationError> for ProofError {
    fn from(error: CanonicalizationError) -> Self {
        Self::Canonicalization(error)
    }
}

/// The bytes a proof signs: the digest of the canonical proof options
/// followed by the digest of the canonical document without proofs.
pub(crate) fn signing_input<L: DocumentLoader>(
    loader: &L,
    capability: &Capability,
    options: &ProofOptions<'_>,
) -> Result<Vec<u8>, CanonicalizationError> {
    let options = CanonicalBytes::new(loader, capability.context(), options)?;
    let document = CanonicalBytes::new(loader, capability.context(), &capability.without_proofs())?;

    let mut payload = Vec::with_capacity(64);
    payload.extend_from_slice(&options.digest());
    payload.extend_from_slice(&document.digest());
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{CREATE_KEY, SIGN};
    use kms_credentials::{Ed25519Signature, Ed25519Signer, Principal, Signer};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    /// Holds an identity but cannot produce signatures.
    struct Locked(Ed25519Signer);

    impl Principal for Locked {
        fn did(&self) -> Did {
            self.0.did()
        }
    }

    impl Signer<Ed25519Signature> for Locked {
        async fn sign(&self, _payload: &[u8]) -> Result<Ed25519Signature, signature::Error> {
            Err(signature::Error::new())
        }
    }

    impl Authority for Locked {
        type Signature = Ed25519Signature;
    }

    fn keystore() -> InvocationTarget {
        InvocationTarget::new("https://kms.example.com/kms/keystores/ks-1", "urn:kms:keystore")
    }

    #[test_log::test(tokio::test)]
    async fn it_issues_a_root_with_a_single_delegation_proof() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::kms())
            .await?;

        assert!(root.is_root());
        assert!(root.capability_chain().is_empty());
        assert_eq!(root.proofs().len(), 1);

        let proof = &root.proofs()[0];
        assert_eq!(proof.proof_type(), "Ed25519Signature2018");
        assert_eq!(proof.verification_method(), owner.did().as_str());
        assert_eq!(proof.proof_purpose(), ProofPurpose::CapabilityDelegation);
        assert!(proof.capability_chain().is_empty());
        assert_eq!(proof.proof_value().len(), 64);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_refuses_to_issue_without_actions() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let result = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::default())
            .await;
        assert!(matches!(result, Err(IssuanceError::NoActions)));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_fails_issuance_when_contexts_cannot_load() -> TestResult {
        struct EmptyLoader;
        impl DocumentLoader for EmptyLoader {
            fn load(&self, url: &str) -> Result<serde_json::Value, CanonicalizationError> {
                Err(CanonicalizationError::UnresolvableContext {
                    url: url.to_string(),
                    reason: "offline".into(),
                })
            }
        }

        let owner = Ed25519Signer::import(&[1; 32])?;
        let result = CapabilitySigner::new(&owner)
            .with_loader(EmptyLoader)
            .issue(owner.did(), keystore(), Actions::new([SIGN]))
            .await;
        assert!(matches!(result, Err(IssuanceError::Canonicalization(_))));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_writes_the_configured_verification_method() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let key_reference = format!("{}#primary", owner.did());
        let root = CapabilitySigner::new(&owner)
            .with_verification_method(key_reference.clone())
            .issue(owner.did(), keystore(), Actions::new([CREATE_KEY]))
            .await?;
        assert_eq!(root.proofs()[0].verification_method(), key_reference);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_snapshots_the_chain_into_the_delegation_proof() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let delegate = Ed25519Signer::import(&[2; 32])?;
        let root = CapabilitySigner::new(&owner)
            .issue(owner.did(), keystore(), Actions::new([CREATE_KEY, SIGN]))
            .await?;
        let child = CapabilitySigner::new(&owner)
            .delegate(&root, delegate.did(), Actions::new([SIGN]))
            .await?;

        assert_eq!(child.invocation_target(), root.invocation_target());
        assert_eq!(child.capability_chain(), &[root.id().to_string()]);
        assert_eq!(
            child.proofs()[0].capability_chain(),
            child.capability_chain()
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_refuses_to_delegate_an_unsigned_parent() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let unsigned = Capability::unsigned(None, owner.did(), keystore(), Actions::new([SIGN]));
        let result = CapabilitySigner::new(&owner)
            .delegate(&unsigned, owner.did(), Actions::new([SIGN]))
            .await;
        assert!(matches!(result, Err(DelegationError::UnsignedParent(_))));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_surfaces_signing_failures() -> TestResult {
        let owner = Ed25519Signer::import(&[1; 32])?;
        let locked = Locked(Ed25519Signer::import(&[2; 32])?);

        let issued = CapabilitySigner::new(&locked)
            .issue(locked.did(), keystore(), Actions::new([SIGN]))
            .await;
        assert!(matches!(issued, Err(IssuanceError::Signing(_))));

        let root = CapabilitySigner::new(&owner)
            .issue(locked.did(), keystore(), Actions::new([CREATE_KEY, SIGN]))
            .await?;
        let delegated = CapabilitySigner::new(&locked)
            .delegate(&root, owner.did(), Actions::new([SIGN]))
            .await;
        assert!(matches!(delegated, Err(DelegationError::Signing(_))));
        Ok(())
    }
}
