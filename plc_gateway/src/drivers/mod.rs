//! Gateway driver implementations.
//!
//! - [`evok`] - HTTP client for the Evok REST API
//! - [`simulation`] - In-memory I/O image for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `IoGateway` from `plc_common::gateway`
//! 3. Register its factory in [`register_all`]

pub mod evok;
pub mod simulation;

use crate::registry::GatewayRegistry;

/// Register all built-in drivers.
pub fn register_all(registry: &mut GatewayRegistry) {
    registry.register("evok", evok::create_gateway);
    registry.register("simulation", simulation::create_gateway);
}

/// A registry holding every built-in driver.
pub fn default_registry() -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    register_all(&mut registry);
    registry
}
