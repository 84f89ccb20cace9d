//! Service registry
//!
//! Holds every loaded service definition, keyed by id. The registry is the
//! only place definitions live; the supervisor reads it and the control
//! server mutates the `enabled` flag through it.

mod descriptor;

pub use descriptor::{
    load_definition, persist_enabled, service_id, DescriptorError, ServiceDefinition,
    DESCRIPTOR_EXTENSION,
};

use std::collections::BTreeMap;

/// Loaded service definitions, iterated in id order
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceDefinition>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition
    pub fn insert(&mut self, def: ServiceDefinition) {
        self.services.insert(def.id.clone(), def);
    }

    pub fn get(&self, id: &str) -> Option<&ServiceDefinition> {
        self.services.get(id)
    }

    /// Like `get`, but unknown ids are an error
    pub fn require(&self, id: &str) -> Result<&ServiceDefinition, RegistryError> {
        self.get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.services.contains_key(id)
    }

    /// All known ids
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.services.keys()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Persist the enabled flag to the backing descriptor, then update memory
    ///
    /// Memory is only touched once the descriptor write has succeeded, so the
    /// two never disagree after a failure.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), RegistryError> {
        let def = self
            .services
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        persist_enabled(&def.path, enabled)?;
        def.enabled = enabled;

        log::info!(
            "{} {}",
            if enabled { "Enabled" } else { "Disabled" },
            id
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Service not found: {0}")]
    NotFound(String),

    #[error("Failed to persist descriptor: {0}")]
    Persist(#[from] DescriptorError),
}
