//! In-memory inventory store with staged, single-writer transactions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use hemobank_core::{BloodType, LotId, Volume};
use hemobank_inventory::{InventoryLot, InventoryStore, InventoryTransaction, StoreError};
use hemobank_inventory::lot::sort_by_expiry;

type Lots = BTreeMap<LotId, InventoryLot>;

/// Test hooks for simulating an unreliable backend.
#[derive(Debug)]
struct Faults {
    unavailable: AtomicBool,
    /// Fail the write with this index (0-based) in any transaction.
    fail_write_at: AtomicUsize,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            unavailable: AtomicBool::new(false),
            fail_write_at: AtomicUsize::new(usize::MAX),
        }
    }
}

/// In-memory inventory store.
///
/// Intended for tests/dev. A transaction holds the single write lock for its
/// whole lifetime (single-writer), works on a private copy of the lots and
/// swaps it in on commit. Cloning yields another handle to the same stock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    lots: Arc<RwLock<Lots>>,
    faults: Arc<Faults>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stock entry. A lot with the same type and expiry absorbs the volume
    /// instead of creating a new record.
    pub async fn register_lot(
        &self,
        blood_type: BloodType,
        volume: Volume,
        expires_on: NaiveDate,
    ) -> Result<LotId, StoreError> {
        if volume.is_zero() {
            return Err(StoreError::invalid_data("registered volume must be positive"));
        }
        self.check_available()?;

        let mut lots = self.lots.write().await;
        if let Some(existing) = lots
            .values_mut()
            .find(|l| l.blood_type == blood_type && l.expires_on == expires_on)
        {
            existing.disposable_volume = existing
                .disposable_volume
                .checked_add(volume)
                .ok_or_else(|| StoreError::invalid_data("lot volume overflow"))?;
            return Ok(existing.id);
        }

        let lot = InventoryLot::new(blood_type, volume, expires_on);
        let id = lot.id;
        lots.insert(id, lot);
        Ok(id)
    }

    /// Insert a lot as-is (explicit id), replacing any lot with the same id.
    pub async fn insert_lot(&self, lot: InventoryLot) {
        self.lots.write().await.insert(lot.id, lot);
    }

    pub async fn lot(&self, id: LotId) -> Option<InventoryLot> {
        self.lots.read().await.get(&id).cloned()
    }

    /// All lots, in id order.
    pub async fn snapshot(&self) -> Vec<InventoryLot> {
        self.lots.read().await.values().cloned().collect()
    }

    /// Make every read, `begin` and stock entry fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the `n`-th write (0-based) inside any transaction fail.
    pub fn fail_write_at(&self, n: usize) {
        self.faults.fail_write_at.store(n, Ordering::SeqCst);
    }

    pub fn clear_faults(&self) {
        self.set_unavailable(false);
        self.fail_write_at(usize::MAX);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store marked unavailable"));
        }
        Ok(())
    }
}

fn lots_of_type(lots: &Lots, blood_type: BloodType) -> Vec<InventoryLot> {
    let mut of_type: Vec<_> = lots
        .values()
        .filter(|l| l.blood_type == blood_type)
        .cloned()
        .collect();
    sort_by_expiry(&mut of_type);
    of_type
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    type Tx = InMemoryTransaction;

    async fn total_available_volume(&self, blood_type: BloodType) -> Result<Volume, StoreError> {
        self.check_available()?;
        let lots = self.lots.read().await;
        Ok(lots
            .values()
            .filter(|l| l.blood_type == blood_type)
            .map(|l| l.disposable_volume)
            .sum())
    }

    async fn lots_ordered_by_expiry(
        &self,
        blood_type: BloodType,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        self.check_available()?;
        Ok(lots_of_type(&*self.lots.read().await, blood_type))
    }

    async fn begin(&self) -> Result<InMemoryTransaction, StoreError> {
        self.check_available()?;
        let guard = Arc::clone(&self.lots).write_owned().await;
        let staged = Lots::clone(&guard);
        Ok(InMemoryTransaction {
            guard,
            staged,
            faults: Arc::clone(&self.faults),
            writes: 0,
        })
    }
}

/// Exclusive unit of work over the in-memory lots.
///
/// Dropping it without `commit` discards `staged` and releases the lock.
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedRwLockWriteGuard<Lots>,
    staged: Lots,
    faults: Arc<Faults>,
    writes: usize,
}

impl InMemoryTransaction {
    fn next_write(&mut self) -> Result<(), StoreError> {
        let index = self.writes;
        self.writes += 1;
        if index == self.faults.fail_write_at.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(format!("injected failure on write {index}")));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryTransaction for InMemoryTransaction {
    async fn lots_ordered_by_expiry(
        &mut self,
        blood_type: BloodType,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        Ok(lots_of_type(&self.staged, blood_type))
    }

    async fn consume_lot_fully(&mut self, id: LotId) -> Result<(), StoreError> {
        self.next_write()?;
        self.staged
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::LotNotFound(id))
    }

    async fn reduce_lot_volume(&mut self, id: LotId, new_volume: Volume) -> Result<(), StoreError> {
        self.next_write()?;
        let lot = self.staged.get_mut(&id).ok_or(StoreError::LotNotFound(id))?;
        if new_volume > lot.disposable_volume {
            return Err(StoreError::Conflict(format!(
                "lot {id} holds {}, cannot raise it to {new_volume}",
                lot.disposable_volume
            )));
        }
        lot.disposable_volume = new_volume;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let Self {
            mut guard, staged, ..
        } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ml(v: u64) -> Volume {
        Volume::from_whole_ml(v)
    }

    #[tokio::test]
    async fn register_merges_same_type_and_expiry() {
        let store = InMemoryInventoryStore::new();
        let a = store.register_lot(BloodType::APos, ml(200), date(2026, 5, 1)).await.unwrap();
        let b = store.register_lot(BloodType::APos, ml(150), date(2026, 5, 1)).await.unwrap();
        let c = store.register_lot(BloodType::APos, ml(100), date(2026, 6, 1)).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.lot(a).await.unwrap().disposable_volume, ml(350));
        assert_eq!(store.total_available_volume(BloodType::APos).await.unwrap(), ml(450));
    }

    #[tokio::test]
    async fn register_rejects_empty_lot() {
        let store = InMemoryInventoryStore::new();
        let err = store
            .register_lot(BloodType::APos, Volume::ZERO, date(2026, 5, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[tokio::test]
    async fn lots_come_back_earliest_expiry_first() {
        let store = InMemoryInventoryStore::new();
        store.register_lot(BloodType::ONeg, ml(100), date(2026, 9, 1)).await.unwrap();
        store.register_lot(BloodType::ONeg, ml(100), date(2026, 2, 1)).await.unwrap();
        store.register_lot(BloodType::OPos, ml(100), date(2026, 1, 1)).await.unwrap();

        let lots = store.lots_ordered_by_expiry(BloodType::ONeg).await.unwrap();
        let expiries: Vec<_> = lots.iter().map(|l| l.expires_on).collect();
        assert_eq!(expiries, vec![date(2026, 2, 1), date(2026, 9, 1)]);
    }

    #[tokio::test]
    async fn dropped_transaction_changes_nothing() {
        let store = InMemoryInventoryStore::new();
        let id = store.register_lot(BloodType::BNeg, ml(300), date(2026, 4, 1)).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.reduce_lot_volume(id, ml(10)).await.unwrap();
            let staged = tx.lots_ordered_by_expiry(BloodType::BNeg).await.unwrap();
            assert_eq!(staged[0].disposable_volume, ml(10));
        }

        assert_eq!(store.lot(id).await.unwrap().disposable_volume, ml(300));
    }

    #[tokio::test]
    async fn commit_publishes_staged_writes() {
        let store = InMemoryInventoryStore::new();
        let keep = store.register_lot(BloodType::BNeg, ml(300), date(2026, 4, 1)).await.unwrap();
        let gone = store.register_lot(BloodType::BNeg, ml(50), date(2026, 3, 1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.consume_lot_fully(gone).await.unwrap();
        tx.reduce_lot_volume(keep, ml(120)).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.lot(gone).await.is_none());
        assert_eq!(store.total_available_volume(BloodType::BNeg).await.unwrap(), ml(120));
    }

    #[tokio::test]
    async fn reduce_cannot_raise_volume() {
        let store = InMemoryInventoryStore::new();
        let id = store.register_lot(BloodType::AbNeg, ml(80), date(2026, 4, 1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.reduce_lot_volume(id, ml(81)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_lot_is_reported() {
        let store = InMemoryInventoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = LotId::new();
        assert_eq!(tx.consume_lot_fully(id).await, Err(StoreError::LotNotFound(id)));
    }

    #[tokio::test]
    async fn unavailable_store_fails_reads_and_begin() {
        let store = InMemoryInventoryStore::new();
        store.set_unavailable(true);

        assert!(store.total_available_volume(BloodType::OPos).await.is_err());
        assert!(store.begin().await.is_err());

        store.clear_faults();
        assert_eq!(store.total_available_volume(BloodType::OPos).await.unwrap(), Volume::ZERO);
    }

    #[tokio::test]
    async fn stock_levels_cover_every_type() {
        let store = InMemoryInventoryStore::new();
        store.register_lot(BloodType::AbPos, ml(70), date(2026, 4, 1)).await.unwrap();

        let levels = store.stock_levels().await.unwrap();
        assert_eq!(levels.len(), BloodType::ALL.len());
        assert_eq!(levels[&BloodType::AbPos], ml(70));
        assert_eq!(levels[&BloodType::ONeg], Volume::ZERO);
    }

    #[tokio::test]
    async fn same_expiry_lots_are_ordered_by_id() {
        let store = InMemoryInventoryStore::new();
        let expiry = date(2026, 3, 1);
        let high = LotId::from_uuid(uuid::Uuid::from_u128(2));
        let low = LotId::from_uuid(uuid::Uuid::from_u128(1));
        for id in [high, low] {
            store
                .insert_lot(InventoryLot {
                    id,
                    blood_type: BloodType::BNeg,
                    disposable_volume: ml(10),
                    expires_on: expiry,
                })
                .await;
        }

        let lots = store.lots_ordered_by_expiry(BloodType::BNeg).await.unwrap();
        let ids: Vec<_> = lots.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![low, high]);

        let mut tx = store.begin().await.unwrap();
        let in_tx: Vec<_> = tx
            .lots_ordered_by_expiry(BloodType::BNeg)
            .await
            .unwrap()
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(in_tx, ids);
    }
}
