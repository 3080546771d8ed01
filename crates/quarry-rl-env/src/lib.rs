//! Task domains and a simulated world for Quarry
//!
//! This crate provides:
//! - the four domain plug-ins (mining, farming, redstone, navigation)
//! - an explicitly owned domain registry
//! - a simulated block world implementing the actuator and state provider

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod features;

pub mod farming;
pub mod mining;
pub mod navigation;
pub mod redstone;
pub mod registry;
pub mod sim;

pub use farming::FarmingDomain;
pub use features::DEFAULT_REACH;
pub use mining::MiningDomain;
pub use navigation::NavigationDomain;
pub use redstone::RedstoneDomain;
pub use registry::DomainRegistry;
pub use sim::SimulatedWorld;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DomainRegistry, FarmingDomain, MiningDomain, NavigationDomain, RedstoneDomain,
        SimulatedWorld,
    };
    pub use quarry_rl_core::prelude::*;
}
