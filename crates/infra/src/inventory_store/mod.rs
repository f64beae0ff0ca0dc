//! Inventory store implementations.
//!
//! Both satisfy the transaction contract of `hemobank_inventory::store`:
//! staged writes become visible only on commit, and concurrent allocations
//! cannot both consume the same lot.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryInventoryStore, InMemoryTransaction};
pub use postgres::{PostgresInventoryStore, PostgresInventoryTransaction};
