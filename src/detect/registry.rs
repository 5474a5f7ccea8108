use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, DetectorBackend};
use super::backends::{StubBackend, UnavailableBackend};

type BackendFactory = dyn Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync;

/// Registry of detector backend factories.
///
/// Each camera session owns its own backend instance and releases it on teardown,
/// so the registry stores constructors rather than instances. It is built once at
/// startup with the platform's backends and shared behind an `Arc`.
pub struct BackendRegistry {
    factories: HashMap<String, Arc<BackendFactory>>,
    order: Vec<String>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            order: Vec::new(),
            default_name: None,
        }
    }

    /// Registry holding the in-process backends (`stub`, `unavailable`).
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", || Ok(Box::new(StubBackend::new())));
        registry.register("unavailable", || {
            Ok(Box::new(UnavailableBackend::new("no platform detector linked")))
        });
        registry
    }

    /// Register a factory. The first registered backend becomes the default.
    /// Registering an existing name replaces its factory.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        if !self.factories.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered backend names, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Construct a backend by name.
    pub fn create(&self, name: &str) -> Result<Box<dyn DetectorBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("backend '{}' not registered", name))?;
        factory()
    }

    /// Construct the default backend.
    pub fn create_default(&self) -> Result<Box<dyn DetectorBackend>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no detector backends registered"))?;
        self.create(name)
    }

    /// Construct a backend that supports the requested capability.
    ///
    /// Prefers the default backend when it supports the capability, then tries the
    /// others in registration order. Backends whose factory fails are skipped.
    pub fn create_for_capability(
        &self,
        capability: DetectionCapability,
    ) -> Result<Box<dyn DetectorBackend>> {
        let default = self.default_name.iter();
        let others = self
            .order
            .iter()
            .filter(|name| Some(name.as_str()) != self.default_name.as_deref());

        for name in default.chain(others) {
            match self.create(name) {
                Ok(backend) if backend.supports(capability) => return Ok(backend),
                Ok(_) => {}
                Err(e) => log::warn!("backend '{}' failed to initialize: {:#}", name, e),
            }
        }

        Err(anyhow!(
            "no registered backend supports capability {:?}",
            capability
        ))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_backend_is_default() {
        let registry = BackendRegistry::with_builtin();
        assert_eq!(registry.default_name(), Some("stub"));
        assert_eq!(registry.list(), vec!["stub", "unavailable"]);
        assert_eq!(registry.create_default().unwrap().name(), "stub");
    }

    #[test]
    fn set_default_requires_registration() {
        let mut registry = BackendRegistry::with_builtin();
        assert!(registry.set_default("mlkit").is_err());
        registry.set_default("unavailable").unwrap();
        assert_eq!(registry.create_default().unwrap().name(), "unavailable");
    }

    #[test]
    fn capability_selection_skips_failing_factories() {
        let mut registry = BackendRegistry::new();
        registry.register("broken", || Err(anyhow!("native library missing")));
        registry.register("stub", || Ok(Box::new(StubBackend::new())));
        let backend = registry
            .create_for_capability(DetectionCapability::FaceBounds)
            .unwrap();
        assert_eq!(backend.name(), "stub");
        assert!(registry
            .create_for_capability(DetectionCapability::FaceLandmarks)
            .is_err());
    }

    #[test]
    fn empty_registry_has_no_default() {
        assert!(BackendRegistry::new().create_default().is_err());
    }
}
