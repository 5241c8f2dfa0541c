//! Principal trait for types that have a DID identity.

use crate::did::Did;

/// An entity identified by a [`Did`].
///
/// Implemented by anything that has a DID: key types, signers, KMS users.
/// Does not imply any cryptographic capability.
pub trait Principal {
    /// Returns this entity's DID.
    fn did(&self) -> Did;
}

impl Principal for Did {
    fn did(&self) -> Did {
        self.clone()
    }
}
