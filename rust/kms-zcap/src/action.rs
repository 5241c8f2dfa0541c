//! Action names and the ordered action sets carried by capabilities.

use serde::{Deserialize, Deserializer, Serialize};

/// Generate a key in a keystore.
pub const CREATE_KEY: &str = "create-key";
/// Export the public part of a key.
pub const EXPORT_KEY: &str = "export-key";
/// Import externally generated key material.
pub const IMPORT_KEY: &str = "import-key";
/// Rotate a key to a fresh version.
pub const ROTATE_KEY: &str = "rotate-key";
/// Produce a signature.
pub const SIGN: &str = "sign";
/// Check a signature.
pub const VERIFY: &str = "verify";
/// Encrypt a payload.
pub const ENCRYPT: &str = "encrypt";
/// Decrypt a payload.
pub const DECRYPT: &str = "decrypt";
/// Compute a message authentication code.
pub const COMPUTE_MAC: &str = "compute-mac";
/// Check a message authentication code.
pub const VERIFY_MAC: &str = "verify-mac";
/// Wrap a content encryption key.
pub const WRAP: &str = "wrap";
/// Unwrap a content encryption key.
pub const UNWRAP: &str = "unwrap";

/// Every operation a keystore exposes.
pub const KMS_ACTIONS: [&str; 12] = [
    CREATE_KEY,
    EXPORT_KEY,
    IMPORT_KEY,
    ROTATE_KEY,
    SIGN,
    VERIFY,
    ENCRYPT,
    DECRYPT,
    COMPUTE_MAC,
    VERIFY_MAC,
    WRAP,
    UNWRAP,
];

/// An ordered set of action names.
///
/// Insertion order is kept so a capability serializes exactly the way it was
/// signed; duplicates are dropped on construction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Actions(Vec<String>);

impl Actions {
    /// Build an action set, keeping the first occurrence of every name.
    pub fn new<I, A>(actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let mut set = Vec::new();
        for action in actions {
            let action = action.into();
            if !set.contains(&action) {
                set.push(action);
            }
        }
        Self(set)
    }

    /// The full keystore action set.
    pub fn kms() -> Self {
        Self::new(KMS_ACTIONS)
    }

    /// Whether `action` is part of this set.
    pub fn contains(&self, action: &str) -> bool {
        self.0.iter().any(|allowed| allowed == action)
    }

    /// Whether every action in this set is also in `other`.
    pub fn is_subset_of(&self, other: &Actions) -> bool {
        self.0.iter().all(|action| other.contains(action))
    }

    /// Actions of this set that `other` does not grant.
    pub fn excess_over(&self, other: &Actions) -> Vec<String> {
        self.0
            .iter()
            .filter(|action| !other.contains(action))
            .cloned()
            .collect()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for an empty set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<A: Into<String>> FromIterator<A> for Actions {
    fn from_iter<T: IntoIterator<Item = A>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl<'de> Deserialize<'de> for Actions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self::new(Vec::<String>::deserialize(deserializer)?))
    }
}

impl std::fmt::Display for Actions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}
