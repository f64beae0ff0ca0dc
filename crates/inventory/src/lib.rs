//! Blood inventory allocation engine.
//!
//! This crate decides whether a requested blood type and volume can be met
//! (exactly, by substitution, or by combining donor types) and performs the
//! matching deduction atomically. Storage is reached only through the
//! [`InventoryStore`] boundary; concrete stores live in `hemobank-infra`.

pub mod allocation;
pub mod compatibility;
pub mod lot;
pub mod resolver;
pub mod store;

pub use allocation::{
    Allocation, AllocationCommitter, AllocationError, AllocationOutcome, AllocationRequest,
    Deduction,
};
pub use compatibility::{
    CompatibilityRegistry, CompatibilityRule, CompatibilitySource, CompatibilityTable,
};
pub use lot::InventoryLot;
pub use resolver::{AvailabilityResolver, Resolution};
pub use store::{InventoryStore, InventoryTransaction, StockLevels, StoreError};
