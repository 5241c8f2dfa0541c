use crate::canonical::CanonicalizationError;
use thiserror::Error;

/// Errors raised while minting a root capability.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// A capability must grant at least one action.
    #[error("A capability must grant at least one action")]
    NoActions,

    /// The document could not be canonicalized.
    #[error("Failed to canonicalize capability: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// The signer refused to sign.
    #[error("Failed to sign capability: {0}")]
    Signing(#[source] signature::Error),
}

/// Errors raised while deriving a capability from a parent.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// The requested actions are not a subset of the parent's.
    #[error("Delegation requests actions {excess:?} that the parent does not grant")]
    NotAttenuated {
        /// Requested actions the parent does not allow.
        excess: Vec<String>,
    },

    /// A delegated capability must grant at least one action.
    #[error("A delegated capability must grant at least one action")]
    NoActions,

    /// The parent already lists itself as an ancestor.
    #[error("Parent capability {0} appears in its own chain")]
    CyclicChain(String),

    /// The parent capability carries no proof and cannot be delegated.
    #[error("Parent capability {0} is not signed")]
    UnsignedParent(String),

    /// The document could not be canonicalized.
    #[error("Failed to canonicalize capability: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// The signer refused to sign.
    #[error("Failed to sign capability: {0}")]
    Signing(#[source] signature::Error),
}

/// Errors raised while compressing a capability for transport.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The capability could not be serialized.
    #[error("Failed to serialize capability: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The compressor failed.
    #[error("Failed to compress capability: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding a transported capability. Any of these means
/// the request carrying the capability is unauthenticated.
#[derive(Debug, Error)]
pub enum DecompressionError {
    /// The input was empty.
    #[error("Compressed capability is empty")]
    Empty,

    /// The transport encoding was not valid base64url.
    #[error("Invalid capability encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The compressed stream was truncated or corrupt.
    #[error("Failed to decompress capability: {0}")]
    Io(#[from] std::io::Error),

    /// The decompressed document exceeds the configured limit.
    #[error("Decompressed capability exceeds {limit} bytes")]
    TooLarge {
        /// The configured limit.
        limit: usize,
    },

    /// The decompressed bytes are not a capability document.
    #[error("Malformed capability document: {0}")]
    Malformed(#[from] serde_json::Error),
}
