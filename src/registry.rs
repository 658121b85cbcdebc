//! Capability registry — which providers can do what
//!
//! Built once from validated configuration and never mutated afterwards, so
//! reads need no synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::Capability;
use crate::config::ProviderDescriptor;

/// Immutable index from capability to capable providers
pub struct CapabilityRegistry {
    /// Providers in declaration order
    providers: Vec<Arc<ProviderDescriptor>>,
    /// Lookup by provider id
    by_id: HashMap<String, Arc<ProviderDescriptor>>,
    /// Lookup by capability, preserving declaration order
    by_capability: HashMap<Capability, Vec<Arc<ProviderDescriptor>>>,
}

impl CapabilityRegistry {
    /// Build the registry from descriptors (assumed already validated)
    #[must_use]
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        let providers: Vec<Arc<ProviderDescriptor>> =
            descriptors.into_iter().map(Arc::new).collect();

        let mut by_id = HashMap::new();
        let mut by_capability: HashMap<Capability, Vec<Arc<ProviderDescriptor>>> = HashMap::new();
        for provider in &providers {
            by_id.insert(provider.id.clone(), Arc::clone(provider));
            for capability in &provider.capabilities {
                by_capability
                    .entry(*capability)
                    .or_default()
                    .push(Arc::clone(provider));
            }
        }

        Self {
            providers,
            by_id,
            by_capability,
        }
    }

    /// Providers declaring `capability`, in declaration order
    #[must_use]
    pub fn providers_for(&self, capability: Capability) -> &[Arc<ProviderDescriptor>] {
        self.by_capability
            .get(&capability)
            .map_or(&[], Vec::as_slice)
    }

    /// Look up one provider by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<ProviderDescriptor>> {
        self.by_id.get(id)
    }

    /// All providers, in declaration order
    #[must_use]
    pub fn all(&self) -> &[Arc<ProviderDescriptor>] {
        &self.providers
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
