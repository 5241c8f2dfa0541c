//! Decentralized identifiers.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// A [DID] such as `did:key:z6Mk…`.
///
/// Only the generic `did:<method>:<method-specific-id>` shape is checked here;
/// method specific validation belongs to the resolver for that method.
///
/// [DID]: https://www.w3.org/TR/did-core/
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

/// Errors raised while parsing a [`Did`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DidParseError {
    /// The value does not start with `did:`.
    #[error("expected a did: scheme in {0:?}")]
    MissingScheme(String),

    /// The method or method specific identifier is empty.
    #[error("malformed did {0:?}")]
    Malformed(String),
}

impl Did {
    /// The DID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DID method, e.g. `key` for `did:key:…`.
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// Extracts the DID from a verification method reference. Both the bare
    /// DID form and the `did#fragment` form are accepted.
    pub fn from_verification_method(reference: &str) -> Result<Self, DidParseError> {
        let did = reference
            .split_once('#')
            .map_or(reference, |(did, _fragment)| did);
        did.parse()
    }

    pub(crate) fn from_trusted(value: String) -> Self {
        Self(value)
    }
}

impl FromStr for Did {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("did:")
            .ok_or_else(|| DidParseError::MissingScheme(s.to_string()))?;
        match rest.split_once(':') {
            Some((method, id)) if !method.is_empty() && !id.is_empty() => Ok(Self(s.to_string())),
            _ => Err(DidParseError::Malformed(s.to_string())),
        }
    }
}

impl TryFrom<String> for Did {
    type Error = DidParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
