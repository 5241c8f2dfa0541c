//! Looking up stored capabilities by identifier.

use crate::capability::Capability;
use kms_common::{ConditionalSend, ConditionalSync};
use std::{collections::HashMap, convert::Infallible, future::Future, sync::Arc};
use tokio::sync::RwLock;

/// Resolves capability identifiers to the documents a verifier trusts.
///
/// Root capabilities are trusted because they come out of a resolver; a
/// root presented by a client must be identical to the resolved copy.
pub trait CapabilityResolver: ConditionalSync {
    /// Error type for lookup failures.
    type Error: std::error::Error + ConditionalSend + 'static;

    /// Look up the capability with identifier `id`.
    fn resolve(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Capability>, Self::Error>> + ConditionalSend;
}

impl<R: CapabilityResolver> CapabilityResolver for Arc<R> {
    type Error = R::Error;

    fn resolve(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Capability>, Self::Error>> + ConditionalSend {
        (**self).resolve(id)
    }
}

/// A [`CapabilityResolver`] over an in-memory table. Clones share the table.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapabilityResolver {
    capabilities: Arc<RwLock<HashMap<String, Capability>>>,
}

impl MemoryCapabilityResolver {
    /// Make `capability` resolvable by its identifier.
    pub async fn insert(&self, capability: Capability) {
        self.capabilities
            .write()
            .await
            .insert(capability.id().to_string(), capability);
    }

    /// Forget the capability with identifier `id`.
    pub async fn remove(&self, id: &str) -> Option<Capability> {
        self.capabilities.write().await.remove(id)
    }

    /// Number of stored capabilities.
    pub async fn len(&self) -> usize {
        self.capabilities.read().await.len()
    }

    /// Returns true when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.capabilities.read().await.is_empty()
    }
}

impl CapabilityResolver for MemoryCapabilityResolver {
    type Error = Infallible;

    async fn resolve(&self, id: &str) -> Result<Option<Capability>, Self::Error> {
        Ok(self.capabilities.read().await.get(id).cloned())
    }
}
