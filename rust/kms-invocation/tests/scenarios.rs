//! Invocations signed by delegates and checked by a local KMS.

use kms_common::FailurePolicy;
use kms_credentials::{Ed25519KeyResolver, Ed25519Signature, Ed25519Signer, Principal};
use kms_invocation::{
    CAPABILITY_INVOCATION_HEADER, DispatchError, InvocationRequest, InvocationResponse,
    InvocationVerifier, SignedInvocation, Transport, VerificationError, dispatch,
    sign_invocation,
};
use kms_zcap::{
    Actions, Capability, CapabilitySigner, ChainError, InvocationTarget,
    MemoryCapabilityResolver, action,
};
use pretty_assertions::assert_eq;
use std::{collections::HashSet, convert::Infallible, sync::Arc};
use testresult::TestResult;
use url::Url;

const KEYSTORE: &str = "https://kms.example.com/kms/keystores/ks-1";

/// A KMS endpoint that authorizes each invocation against its trusted roots
/// and answers with the invoked capability id.
struct LocalKms {
    verifier: InvocationVerifier<Ed25519Signature, MemoryCapabilityResolver, Ed25519KeyResolver>,
}

impl LocalKms {
    fn new(trusted: MemoryCapabilityResolver) -> Self {
        Self {
            verifier: InvocationVerifier::new(trusted, Ed25519KeyResolver),
        }
    }
}

impl Transport for LocalKms {
    type Error = Infallible;

    async fn send(&self, invocation: SignedInvocation) -> Result<InvocationResponse, Self::Error> {
        Ok(
            match self.verifier.authorize(&invocation.request, KEYSTORE).await {
                Ok(verified) => InvocationResponse {
                    status: 200,
                    body: verified.capability_id.into_bytes(),
                },
                Err(rejection) => InvocationResponse {
                    status: rejection.status_code(),
                    body: rejection.message.into_bytes(),
                },
            },
        )
    }
}

async fn keystore_root(owner: &Ed25519Signer) -> TestResult<Capability> {
    Ok(CapabilitySigner::new(owner)
        .issue(
            owner.did(),
            InvocationTarget::new(KEYSTORE, "urn:kms:keystore"),
            Actions::kms(),
        )
        .await?)
}

fn create_key_request() -> TestResult<InvocationRequest> {
    Ok(
        InvocationRequest::post(Url::parse(&format!("{KEYSTORE}/keys"))?)
            .with_header("content-type", "application/json")
            .with_body(br#"{"type":"Ed25519VerificationKey2018"}"#.to_vec()),
    )
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn it_authorizes_concurrent_invocations_of_distinct_delegations() -> TestResult {
    let owner = Ed25519Signer::import(&[1; 32])?;
    let root = keystore_root(&owner).await?;
    let trusted = MemoryCapabilityResolver::default();
    trusted.insert(root.clone()).await;

    let mut invocations = Vec::new();
    let mut expected = HashSet::new();
    for seed in 30u8..35 {
        let worker = Ed25519Signer::import(&[seed; 32])?;
        let capability = CapabilitySigner::new(&owner)
            .delegate(&root, worker.did(), Actions::new([action::CREATE_KEY]))
            .await?;
        expected.insert(capability.id().to_string());
        invocations.push(
            sign_invocation(create_key_request()?, &capability, action::CREATE_KEY, &worker)
                .await?,
        );
    }
    assert_eq!(expected.len(), 5);

    let outcomes = dispatch(
        Arc::new(LocalKms::new(trusted)),
        invocations,
        FailurePolicy::FailFast,
        None,
    )
    .await?;

    let mut seen = HashSet::new();
    for outcome in outcomes {
        let outcome = outcome?;
        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.action, action::CREATE_KEY);
        assert_eq!(
            String::from_utf8(outcome.response.body)?,
            outcome.capability_id
        );
        seen.insert(outcome.capability_id);
    }
    assert_eq!(seen, expected);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_rejects_a_chain_that_omits_the_parent() -> TestResult {
    let owner = Ed25519Signer::import(&[1; 32])?;
    let worker = Ed25519Signer::import(&[2; 32])?;
    let root = keystore_root(&owner).await?;
    let delegated = CapabilitySigner::new(&owner)
        .delegate(&root, worker.did(), Actions::new([action::CREATE_KEY]))
        .await?;

    let mut json = serde_json::to_value(&delegated)?;
    json["capabilityChain"] = serde_json::json!([]);
    let corrupted: Capability = serde_json::from_value(json)?;

    let trusted = MemoryCapabilityResolver::default();
    trusted.insert(root).await;
    let kms = LocalKms::new(trusted);

    let signed =
        sign_invocation(create_key_request()?, &corrupted, action::CREATE_KEY, &worker).await?;
    let result = kms.verifier.verify(&signed.request, KEYSTORE).await;
    assert!(matches!(
        result,
        Err(VerificationError::Chain(ChainError::BrokenChain { .. }))
    ));

    let failed = dispatch(Arc::new(kms), [signed], FailurePolicy::FailFast, None).await;
    assert!(matches!(
        failed,
        Err(DispatchError::Rejected { status: 401, .. })
    ));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_binds_the_signature_to_the_request() -> TestResult {
    let owner = Ed25519Signer::import(&[1; 32])?;
    let worker = Ed25519Signer::import(&[2; 32])?;
    let root = keystore_root(&owner).await?;
    let signer = CapabilitySigner::new(&owner);
    let create = signer
        .delegate(&root, worker.did(), Actions::new([action::CREATE_KEY]))
        .await?;
    let sign = signer
        .delegate(&root, worker.did(), Actions::new([action::SIGN]))
        .await?;

    let trusted = MemoryCapabilityResolver::default();
    trusted.insert(root).await;
    let kms = LocalKms::new(trusted);

    let signed =
        sign_invocation(create_key_request()?, &create, action::CREATE_KEY, &worker).await?;
    kms.verifier.verify(&signed.request, KEYSTORE).await?;

    let other_method = signed.request.clone().with_method("PUT");
    let other_path = signed
        .request
        .clone()
        .with_url(Url::parse(&format!("{KEYSTORE}/keys/key-1"))?);

    let other = sign_invocation(create_key_request()?, &sign, action::SIGN, &worker).await?;
    let swapped_header = signed.request.clone().with_header(
        CAPABILITY_INVOCATION_HEADER,
        other
            .request
            .header(CAPABILITY_INVOCATION_HEADER)
            .unwrap_or_default(),
    );

    for tampered in [other_method, other_path, swapped_header] {
        let result = kms.verifier.verify(&tampered, KEYSTORE).await;
        assert!(
            matches!(result, Err(VerificationError::InvalidSignature)),
            "expected an invalid signature, got {result:?}"
        );
    }
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_rejects_a_capability_the_service_does_not_trust() -> TestResult {
    let owner = Ed25519Signer::import(&[1; 32])?;
    let stranger = Ed25519Signer::import(&[9; 32])?;
    let root = keystore_root(&owner).await?;
    let forged_root = keystore_root(&stranger).await?;

    let trusted = MemoryCapabilityResolver::default();
    trusted.insert(root).await;

    let signed =
        sign_invocation(create_key_request()?, &forged_root, action::CREATE_KEY, &stranger)
            .await?;
    let response = LocalKms::new(trusted).send(signed).await?;

    assert_eq!(response.status, 401);
    assert_eq!(response.body, b"unauthorized");
    Ok(())
}
