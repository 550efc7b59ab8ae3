//! # PLC Gateway Library
//!
//! Pluggable I/O gateway drivers. Drivers implement the `IoGateway` trait
//! defined in `plc_common::gateway` and are created by name through a
//! [`GatewayRegistry`].
//!
//! # Module Structure
//!
//! - [`registry`] - Driver factory registration
//! - [`drivers`] - Driver implementations (`evok`, `simulation`)
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       plc_gateway                         │
//! │  ┌──────────────────┐        ┌──────────────────────────┐ │
//! │  │ GatewayRegistry  │──────► │  Box<dyn IoGateway>      │ │
//! │  │  name → factory  │        │  evok │ simulation       │ │
//! │  └──────────────────┘        └────────────┬─────────────┘ │
//! │                                           │               │
//! └───────────────────────────────────────────┼───────────────┘
//!                                             ▼
//!                                   Evok REST / in-memory image
//! ```

pub mod drivers;
pub mod registry;

pub use crate::drivers::default_registry;
pub use crate::drivers::evok::EvokGateway;
pub use crate::drivers::simulation::{IoEvent, IoOp, SimulationGateway, SimulationHandle};
pub use crate::registry::GatewayRegistry;
