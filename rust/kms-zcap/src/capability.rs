//! The capability document and its proofs.

use crate::action::Actions;
use kms_credentials::Did;
use serde::{Deserialize, Serialize};

/// JSON-LD context for linked data security vocabularies.
pub const SECURITY_CONTEXT_V2: &str = "https://w3id.org/security/v2";

/// JSON-LD context for authorization capabilities.
pub const ZCAP_CONTEXT_V1: &str = "https://w3id.org/zcap/v1";

/// Prefix of every capability identifier minted by this crate.
pub const CAPABILITY_ID_PREFIX: &str = "urn:zcap:";

/// The resource a capability is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationTarget {
    /// Resource identifier, e.g. a keystore URL.
    pub id: String,
    /// Resource type, e.g. `urn:kms:keystore`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl InvocationTarget {
    /// Build a target from an identifier and a type.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }
}

impl std::fmt::Display for InvocationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.kind)
    }
}

/// What a proof attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProofPurpose {
    /// The signer grants the capability to its invoker.
    CapabilityDelegation,
    /// The signer exercises the capability.
    CapabilityInvocation,
}

/// A linked data proof attached to a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    proof_type: String,
    created: String,
    verification_method: String,
    proof_purpose: ProofPurpose,
    capability_chain: Vec<String>,
    #[serde(with = "proof_value")]
    proof_value: Vec<u8>,
}

/// The part of a [`Proof`] covered by its own signature.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProofOptions<'a> {
    #[serde(rename = "@context")]
    pub context: &'a [String],
    #[serde(rename = "type")]
    pub proof_type: &'a str,
    pub created: &'a str,
    pub verification_method: &'a str,
    pub proof_purpose: ProofPurpose,
    pub capability_chain: &'a [String],
}

impl Proof {
    pub(crate) fn new(options: ProofOptions<'_>, proof_value: Vec<u8>) -> Self {
        Self {
            proof_type: options.proof_type.to_string(),
            created: options.created.to_string(),
            verification_method: options.verification_method.to_string(),
            proof_purpose: options.proof_purpose,
            capability_chain: options.capability_chain.to_vec(),
            proof_value,
        }
    }

    pub(crate) fn options<'a>(&'a self, context: &'a [String]) -> ProofOptions<'a> {
        ProofOptions {
            context,
            proof_type: &self.proof_type,
            created: &self.created,
            verification_method: &self.verification_method,
            proof_purpose: self.proof_purpose,
            capability_chain: &self.capability_chain,
        }
    }

    /// Signature suite name, e.g. `Ed25519Signature2018`.
    pub fn proof_type(&self) -> &str {
        &self.proof_type
    }

    /// RFC 3339 creation time.
    pub fn created(&self) -> &str {
        &self.created
    }

    /// Reference to the key that produced the signature.
    pub fn verification_method(&self) -> &str {
        &self.verification_method
    }

    /// What the proof attests to.
    pub fn proof_purpose(&self) -> ProofPurpose {
        self.proof_purpose
    }

    /// Snapshot of the capability chain at signing time.
    pub fn capability_chain(&self) -> &[String] {
        &self.capability_chain
    }

    /// Raw signature bytes.
    pub fn proof_value(&self) -> &[u8] {
        &self.proof_value
    }
}

/// An authorization capability.
///
/// A root capability binds an invocation target to its owner; a delegated
/// capability narrows its parent's actions and names a new invoker. Values
/// are immutable: the only way to obtain one is to issue, delegate or decode
/// it, and deriving a new capability never touches the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    #[serde(rename = "@context")]
    context: Vec<String>,
    id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    parent: String,
    invoker: Did,
    invocation_target: InvocationTarget,
    allowed_action: Actions,
    #[serde(default)]
    capability_chain: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    proof: Vec<Proof>,
}

impl Capability {
    pub(crate) fn unsigned(
        parent: Option<&Capability>,
        invoker: Did,
        invocation_target: InvocationTarget,
        allowed_action: Actions,
    ) -> Self {
        let (parent_id, capability_chain) = match parent {
            Some(parent) => {
                let mut chain = parent.capability_chain.clone();
                chain.push(parent.id.clone());
                (parent.id.clone(), chain)
            }
            None => (String::new(), Vec::new()),
        };

        Self {
            context: vec![SECURITY_CONTEXT_V2.to_string()],
            id: format!("{CAPABILITY_ID_PREFIX}{}", ulid::Ulid::new()),
            parent: parent_id,
            invoker,
            invocation_target,
            allowed_action,
            capability_chain,
            proof: Vec::new(),
        }
    }

    /// The document without its proofs, which is what proofs sign over.
    pub(crate) fn without_proofs(&self) -> Self {
        Self {
            proof: Vec::new(),
            ..self.clone()
        }
    }

    pub(crate) fn with_proof(mut self, proof: Proof) -> Self {
        self.proof.push(proof);
        self
    }

    /// JSON-LD contexts the document is expressed in.
    pub fn context(&self) -> &[String] {
        &self.context
    }

    /// Unique identifier assigned at mint time.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier of the capability this one derives from, `None` for a root.
    pub fn parent(&self) -> Option<&str> {
        (!self.parent.is_empty()).then_some(self.parent.as_str())
    }

    /// The principal allowed to exercise this capability.
    pub fn invoker(&self) -> &Did {
        &self.invoker
    }

    /// The resource this capability is about.
    pub fn invocation_target(&self) -> &InvocationTarget {
        &self.invocation_target
    }

    /// Actions the invoker may perform.
    pub fn allowed_actions(&self) -> &Actions {
        &self.allowed_action
    }

    /// Whether `action` is granted.
    pub fn allows(&self, action: &str) -> bool {
        self.allowed_action.contains(action)
    }

    /// Ancestor identifiers, root first, ending with the immediate parent.
    pub fn capability_chain(&self) -> &[String] {
        &self.capability_chain
    }

    /// Proofs attached to the document.
    pub fn proofs(&self) -> &[Proof] {
        &self.proof
    }

    /// Returns true when this capability has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_empty()
    }
}

mod proof_value {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD.decode(encoded).map_err(D::Error::custom)
    }
}
