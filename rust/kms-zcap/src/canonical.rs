//! Canonical byte production for proof signing.
//!
//! Proofs sign over the JSON Canonicalization Scheme (RFC 8785) form of the
//! document, so the signature does not depend on map key order or
//! whitespace. Before a document is canonicalized every JSON-LD context it
//! names must resolve through a [`DocumentLoader`], and each of its top-level
//! terms must be defined by one of those contexts. A document in an unknown
//! vocabulary cannot be signed or verified.

use crate::capability::{SECURITY_CONTEXT_V2, ZCAP_CONTEXT_V1};
use kms_common::ConditionalSync;
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised while producing canonical bytes.
#[derive(Debug, Error)]
pub enum CanonicalizationError {
    /// A JSON-LD context could not be loaded.
    #[error("Unable to load JSON-LD context {url}: {reason}")]
    UnresolvableContext {
        /// The context URL.
        url: String,
        /// Why the loader refused it.
        reason: String,
    },

    /// A top-level term is not defined by any of the document's contexts.
    #[error("Term {0} is not defined by the document's contexts")]
    UndefinedTerm(String),

    /// The value could not be serialized to JSON.
    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Resolves JSON-LD context URLs to their documents.
pub trait DocumentLoader: ConditionalSync {
    /// Load the context document published at `url`.
    fn load(&self, url: &str) -> Result<Value, CanonicalizationError>;
}

impl<L: DocumentLoader + ?Sized> DocumentLoader for &L {
    fn load(&self, url: &str) -> Result<Value, CanonicalizationError> {
        (**self).load(url)
    }
}

impl<L: DocumentLoader + ?Sized> DocumentLoader for std::sync::Arc<L> {
    fn load(&self, url: &str) -> Result<Value, CanonicalizationError> {
        (**self).load(url)
    }
}

/// A [`DocumentLoader`] answering from an in-memory table. Created with the
/// security and zcap vocabularies already registered; never fetches over the
/// network.
#[derive(Debug, Clone)]
pub struct StaticDocumentLoader {
    documents: HashMap<String, Value>,
}

impl Default for StaticDocumentLoader {
    fn default() -> Self {
        let mut documents = HashMap::new();
        documents.insert(SECURITY_CONTEXT_V2.to_string(), security_v2_context());
        documents.insert(ZCAP_CONTEXT_V1.to_string(), zcap_v1_context());
        Self { documents }
    }
}

impl StaticDocumentLoader {
    /// Register an additional context document.
    pub fn with_document(mut self, url: impl Into<String>, document: Value) -> Self {
        self.documents.insert(url.into(), document);
        self
    }
}

impl DocumentLoader for StaticDocumentLoader {
    fn load(&self, url: &str) -> Result<Value, CanonicalizationError> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| CanonicalizationError::UnresolvableContext {
                url: url.to_string(),
                reason: "not registered with the static loader".into(),
            })
    }
}

/// Bytes in RFC 8785 canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize `value` after checking that every context in `contexts`
    /// resolves through `loader` and that together they define every
    /// top-level term of `value`. Keys starting with `@` are JSON-LD keywords
    /// and need no definition. With no contexts there is no vocabulary to
    /// check against.
    pub fn new<L: DocumentLoader>(
        loader: &L,
        contexts: &[String],
        value: &impl Serialize,
    ) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(value)?;

        if !contexts.is_empty() {
            let mut terms = HashSet::new();
            for url in contexts {
                terms.extend(defined_terms(&loader.load(url)?));
            }
            if let Value::Object(fields) = &value {
                let undefined = fields
                    .keys()
                    .find(|key| !key.starts_with('@') && !terms.contains(key.as_str()));
                if let Some(term) = undefined {
                    return Err(CanonicalizationError::UndefinedTerm(term.clone()));
                }
            }
        }

        Ok(Self(serde_jcs::to_vec(&value)?))
    }

    /// The canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// SHA-256 of the canonical bytes.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.0).into()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Terms defined by a context document's `@context`, which is either a map
/// or a list of maps.
fn defined_terms(document: &Value) -> Vec<String> {
    let definitions: Vec<&Value> = match document.get("@context") {
        Some(Value::Array(entries)) => entries.iter().collect(),
        Some(entry) => vec![entry],
        None => Vec::new(),
    };
    definitions
        .into_iter()
        .filter_map(Value::as_object)
        .flat_map(|definition| definition.keys())
        .filter(|term| !term.starts_with('@'))
        .cloned()
        .collect()
}

fn security_v2_context() -> Value {
    json!({
        "@context": {
            "@version": 1.1,
            "id": "@id",
            "type": "@type",
            "sec": "https://w3id.org/security#",
            "proof": {"@id": "sec:proof", "@type": "@id", "@container": "@graph"},
            "proofPurpose": {"@id": "sec:proofPurpose", "@type": "@vocab"},
            "proofValue": "sec:proofValue",
            "created": {"@id": "http://purl.org/dc/terms/created", "@type": "http://www.w3.org/2001/XMLSchema#dateTime"},
            "verificationMethod": {"@id": "sec:verificationMethod", "@type": "@id"},
            "capabilityDelegation": {"@id": "sec:capabilityDelegationMethod", "@type": "@id", "@container": "@set"},
            "capabilityInvocation": {"@id": "sec:capabilityInvocationMethod", "@type": "@id", "@container": "@set"},
            "capabilityChain": {"@id": "sec:capabilityChain", "@type": "@id", "@container": "@list"},
            "invocationTarget": {"@id": "sec:invocationTarget", "@type": "@id"},
            "invoker": {"@id": "sec:invoker", "@type": "@id"},
            "parent": {"@id": "sec:parentCapability", "@type": "@id"},
            "allowedAction": "sec:allowedAction",
            "Ed25519Signature2018": "sec:Ed25519Signature2018"
        }
    })
}

fn zcap_v1_context() -> Value {
    json!({
        "@context": {
            "@protected": true,
            "id": "@id",
            "type": "@type",
            "zcap": "https://w3id.org/zcap#",
            "allowedAction": {"@id": "zcap:allowedAction"},
            "capability": {"@id": "zcap:capability", "@type": "@id"},
            "capabilityAction": {"@id": "zcap:capabilityAction"},
            "capabilityChain": {"@id": "zcap:capabilityChain", "@type": "@id", "@container": "@list"},
            "controller": {"@id": "zcap:controller", "@type": "@id"},
            "invocationTarget": {"@id": "zcap:invocationTarget", "@type": "@id"},
            "parentCapability": {"@id": "zcap:parentCapability", "@type": "@id"}
        }
    })
}
