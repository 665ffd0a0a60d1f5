//! Name to prober directory.

use crate::probe::Prober;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gateway_core::{GatewayError, GatewayResult};
use std::sync::Arc;
use tracing::info;

/// Directory of registered probers, keyed by [`Prober::name`]
///
/// Constructed explicitly and injected into the engine and scheduler; there
/// is no process-wide default registry.
#[derive(Default)]
pub struct ProberRegistry {
    probers: DashMap<String, Arc<dyn Prober>>,
}

impl ProberRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prober under its own name
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if the name is already taken
    pub fn register(&self, prober: Arc<dyn Prober>) -> GatewayResult<()> {
        let name = prober.name().to_string();
        match self.probers.entry(name) {
            Entry::Occupied(entry) => Err(GatewayError::configuration(format!(
                "prober '{}' is already registered",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                info!(provider = %entry.key(), "Prober registered");
                entry.insert(prober);
                Ok(())
            }
        }
    }

    /// Remove a prober, returning it if present
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Prober>> {
        self.probers.remove(name).map(|(_, prober)| prober)
    }

    /// Look up a prober by provider name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Prober>> {
        self.probers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Check whether a provider is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.probers.contains_key(name)
    }

    /// Registered provider names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.probers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered probers
    #[must_use]
    pub fn len(&self) -> usize {
        self.probers.len()
    }

    /// Check if no prober is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probers.is_empty()
    }
}

impl std::fmt::Debug for ProberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProberRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
