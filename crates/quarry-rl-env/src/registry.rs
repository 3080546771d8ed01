//! Domain registry
//!
//! Owned and passed explicitly; there is no process-wide registry, so each
//! runner or test builds the set of domains it needs.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_rl_core::{Domain, DomainKind, EngineError};

use crate::{FarmingDomain, MiningDomain, NavigationDomain, RedstoneDomain};

/// Lookup table from domain kind to plug-in
#[derive(Clone, Default)]
pub struct DomainRegistry {
    domains: HashMap<DomainKind, Arc<dyn Domain>>,
}

impl std::fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRegistry")
            .field("domains", &self.kinds())
            .finish()
    }
}

impl DomainRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four built-in domains at default settings
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MiningDomain::new()));
        registry.register(Arc::new(FarmingDomain::new()));
        registry.register(Arc::new(RedstoneDomain::new()));
        registry.register(Arc::new(NavigationDomain::new()));
        registry
    }

    /// Register a domain, replacing any previous plug-in of the same kind
    pub fn register(&mut self, domain: Arc<dyn Domain>) -> Option<Arc<dyn Domain>> {
        self.domains.insert(domain.kind(), domain)
    }

    /// Plug-in for `kind`
    pub fn get(&self, kind: DomainKind) -> quarry_rl_core::Result<Arc<dyn Domain>> {
        self.domains
            .get(&kind)
            .cloned()
            .ok_or_else(|| EngineError::validation(format!("no domain registered for {kind}")))
    }

    /// Registered kinds in a stable order
    #[must_use]
    pub fn kinds(&self) -> Vec<DomainKind> {
        DomainKind::ALL
            .into_iter()
            .filter(|k| self.domains.contains_key(k))
            .collect()
    }
}
