//! Infrastructure layer: stores, compatibility sources, config, wiring.

pub mod bootstrap;
pub mod compatibility_source;
pub mod config;
pub mod inventory_store;
