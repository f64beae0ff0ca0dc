//! Stored blood lots and their consumption order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use hemobank_core::{BloodType, Entity, LotId, Volume};

/// A physical unit of stored blood.
///
/// Lots are owned by the inventory store; the engine only sees snapshots and
/// asks the store to shrink or remove them inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLot {
    pub id: LotId,
    pub blood_type: BloodType,
    pub disposable_volume: Volume,
    pub expires_on: NaiveDate,
}

impl InventoryLot {
    pub fn new(blood_type: BloodType, disposable_volume: Volume, expires_on: NaiveDate) -> Self {
        Self {
            id: LotId::new(),
            blood_type,
            disposable_volume,
            expires_on,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.disposable_volume.is_zero()
    }

    /// Consumption order: earliest expiry first, lot id as tie-breaker.
    pub fn consumption_key(&self) -> (NaiveDate, LotId) {
        (self.expires_on, self.id)
    }
}

impl Entity for InventoryLot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Sort lots into consumption order in place.
pub fn sort_by_expiry(lots: &mut [InventoryLot]) {
    lots.sort_by_key(InventoryLot::consumption_key);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot_id(n: u128) -> LotId {
        LotId::from_uuid(uuid::Uuid::from_u128(n))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn sorts_by_expiry_then_id() {
        let mut lots = vec![
            InventoryLot {
                id: lot_id(3),
                blood_type: BloodType::ONeg,
                disposable_volume: Volume::from_whole_ml(100),
                expires_on: date(2026, 3, 1),
            },
            InventoryLot {
                id: lot_id(2),
                blood_type: BloodType::ONeg,
                disposable_volume: Volume::from_whole_ml(100),
                expires_on: date(2026, 1, 15),
            },
            InventoryLot {
                id: lot_id(1),
                blood_type: BloodType::ONeg,
                disposable_volume: Volume::from_whole_ml(100),
                expires_on: date(2026, 3, 1),
            },
        ];

        sort_by_expiry(&mut lots);

        let order: Vec<_> = lots.iter().map(|l| l.id).collect();
        assert_eq!(order, vec![lot_id(2), lot_id(1), lot_id(3)]);
    }
}
