//! Gateway registry.
//!
//! Maps driver names to factories. Constructed at startup, populated via
//! `register()`, and passed to the runtime by value. No global state.

use plc_common::config::GatewayConfig;
use plc_common::gateway::{GatewayError, GatewayFactory, IoGateway};
use std::collections::HashMap;
use std::time::Duration;

/// Registry of available gateway drivers.
pub struct GatewayRegistry {
    factories: HashMap<&'static str, GatewayFactory>,
}

impl GatewayRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: GatewayFactory) {
        if self.factories.contains_key(name) {
            panic!("Gateway driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<GatewayFactory> {
        self.factories.get(name).copied()
    }

    /// Create the driver named in `config.driver`.
    ///
    /// # Errors
    /// `GatewayError::DriverNotFound` for an unknown name, or whatever the
    /// driver's factory reports for a bad configuration.
    pub fn create(
        &self,
        config: &GatewayConfig,
        timeout: Duration,
    ) -> Result<Box<dyn IoGateway>, GatewayError> {
        let factory = self
            .get_factory(&config.driver)
            .ok_or_else(|| GatewayError::DriverNotFound(config.driver.clone()))?;
        factory(config, timeout)
    }

    /// List all registered driver names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
