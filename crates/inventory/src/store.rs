//! Inventory storage boundary.
//!
//! The engine never touches a database directly. It reads stock through
//! [`InventoryStore`] and mutates lots only through an [`InventoryTransaction`]
//! obtained from [`InventoryStore::begin`].
//!
//! ## Transaction contract
//!
//! - Reads made through the transaction see its own staged changes.
//! - Lots read through the transaction are locked against other transactions
//!   until commit or rollback (row locks, or a single-writer lock in memory).
//! - `commit` publishes all staged changes at once.
//! - `rollback`, or dropping the transaction without committing, discards them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use hemobank_core::{BloodType, LotId, Volume};

use crate::lot::InventoryLot;

/// Available volume per blood type.
pub type StockLevels = BTreeMap<BloodType, Volume>;

/// Inventory store operation error.
///
/// These are **infrastructure errors** as opposed to domain errors: the
/// backing store could not be reached, returned data we cannot interpret,
/// or refused a write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("lot not found: {0}")]
    LotNotFound(LotId),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("storage conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}

/// A unit of work over inventory lots.
#[async_trait]
pub trait InventoryTransaction: Send {
    /// Lots of one type in consumption order (ascending expiry, then id),
    /// locked for the rest of the transaction.
    async fn lots_ordered_by_expiry(
        &mut self,
        blood_type: BloodType,
    ) -> Result<Vec<InventoryLot>, StoreError>;

    /// Remove a lot whose volume has been used up.
    async fn consume_lot_fully(&mut self, id: LotId) -> Result<(), StoreError>;

    /// Set a lot's remaining disposable volume.
    async fn reduce_lot_volume(&mut self, id: LotId, new_volume: Volume) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Read access to stored lots plus a transaction factory.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    type Tx: InventoryTransaction;

    /// Sum of disposable volume across all lots of a type.
    async fn total_available_volume(&self, blood_type: BloodType) -> Result<Volume, StoreError>;

    /// Lots of one type in consumption order (ascending expiry, then id).
    async fn lots_ordered_by_expiry(
        &self,
        blood_type: BloodType,
    ) -> Result<Vec<InventoryLot>, StoreError>;

    /// Available volume for every blood type, zero included.
    async fn stock_levels(&self) -> Result<StockLevels, StoreError> {
        let mut levels = StockLevels::new();
        for blood_type in BloodType::ALL {
            levels.insert(blood_type, self.total_available_volume(blood_type).await?);
        }
        Ok(levels)
    }

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    type Tx = S::Tx;

    async fn total_available_volume(&self, blood_type: BloodType) -> Result<Volume, StoreError> {
        (**self).total_available_volume(blood_type).await
    }

    async fn lots_ordered_by_expiry(
        &self,
        blood_type: BloodType,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        (**self).lots_ordered_by_expiry(blood_type).await
    }

    async fn stock_levels(&self) -> Result<StockLevels, StoreError> {
        (**self).stock_levels().await
    }

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}
