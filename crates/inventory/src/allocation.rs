//! Atomic multi-lot, multi-type stock deduction.
//!
//! The committer walks the requested type and then its substitutes in
//! preference order, consuming lots earliest-expiry first, all inside one
//! store transaction. It commits only when the full volume was found; any
//! shortfall or storage error rolls every deduction back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use hemobank_core::{BloodType, LotId, Volume};

use crate::compatibility::CompatibilityRegistry;
use crate::store::{InventoryStore, InventoryTransaction, StoreError};

/// A validated request for `volume` of `blood_type`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub blood_type: BloodType,
    pub volume: Volume,
}

impl AllocationRequest {
    pub fn new(blood_type: BloodType, volume: Volume) -> Result<Self, AllocationError> {
        if volume.is_zero() {
            return Err(AllocationError::InvalidRequest(
                "requested volume must be greater than zero".to_string(),
            ));
        }
        Ok(Self { blood_type, volume })
    }

    /// Build from a fractional millilitre amount as typed by an operator.
    pub fn from_ml(blood_type: BloodType, ml: f64) -> Result<Self, AllocationError> {
        let volume =
            Volume::from_ml(ml).map_err(|e| AllocationError::InvalidRequest(e.to_string()))?;
        Self::new(blood_type, volume)
    }
}

/// Volume taken from one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub lot_id: LotId,
    pub blood_type: BloodType,
    pub taken: Volume,
    /// The lot was used up and removed.
    pub depleted: bool,
}

/// A committed allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub request: AllocationRequest,
    /// Deductions in the order they were applied.
    pub deductions: Vec<Deduction>,
}

impl Allocation {
    pub fn moved(&self) -> Volume {
        self.deductions.iter().map(|d| d.taken).sum()
    }

    pub fn volume_by_type(&self) -> BTreeMap<BloodType, Volume> {
        let mut by_type = BTreeMap::new();
        for d in &self.deductions {
            let entry: &mut Volume = by_type.entry(d.blood_type).or_default();
            *entry = entry.saturating_add(d.taken);
        }
        by_type
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("invalid allocation request: {0}")]
    InvalidRequest(String),

    /// Compatible stock ran out; nothing was deducted.
    #[error("insufficient stock: {shortfall} short of {requested}")]
    InsufficientStock { requested: Volume, shortfall: Volume },

    /// The store failed; the transaction was aborted and nothing was deducted.
    #[error(transparent)]
    StorageUnavailable(#[from] StoreError),
}

/// Flat report of an allocation attempt, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub success: bool,
    pub blood_type: BloodType,
    pub requested: Volume,
    pub moved: Volume,
    /// Unmet volume; zero on success.
    pub shortfall: Volume,
    pub error: Option<String>,
}

impl AllocationOutcome {
    pub fn from_result(
        request: &AllocationRequest,
        result: &Result<Allocation, AllocationError>,
    ) -> Self {
        match result {
            Ok(allocation) => Self {
                success: true,
                blood_type: request.blood_type,
                requested: request.volume,
                moved: allocation.moved(),
                shortfall: Volume::ZERO,
                error: None,
            },
            Err(AllocationError::InsufficientStock { shortfall, .. }) => Self {
                success: false,
                blood_type: request.blood_type,
                requested: request.volume,
                moved: Volume::ZERO,
                shortfall: *shortfall,
                error: None,
            },
            Err(other) => Self {
                success: false,
                blood_type: request.blood_type,
                requested: request.volume,
                moved: Volume::ZERO,
                shortfall: request.volume,
                error: Some(other.to_string()),
            },
        }
    }

    /// Operator-facing one-liner.
    pub fn message(&self) -> String {
        if self.success {
            return format!("Stock deducted for {}: {}", self.blood_type, self.moved);
        }
        match &self.error {
            Some(err) => format!("Could not deduct stock: {err}"),
            None => format!(
                "Insufficient stock: {} short of {}",
                self.shortfall, self.requested
            ),
        }
    }
}

/// The only mutating entry point of the engine.
#[derive(Debug, Clone)]
pub struct AllocationCommitter<S> {
    store: S,
    compatibility: CompatibilityRegistry,
}

struct Plan {
    deductions: Vec<Deduction>,
    remaining: Volume,
}

impl<S> AllocationCommitter<S>
where
    S: InventoryStore,
{
    pub fn new(store: S, compatibility: CompatibilityRegistry) -> Self {
        Self {
            store,
            compatibility,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Deduct `volume` of `blood_type` (or compatible substitutes) from stock.
    pub async fn allocate(
        &self,
        blood_type: BloodType,
        volume: Volume,
    ) -> Result<Allocation, AllocationError> {
        let request = AllocationRequest::new(blood_type, volume)?;
        self.allocate_request(request).await
    }

    #[instrument(
        skip(self),
        fields(blood_type = %request.blood_type, volume = %request.volume),
        err
    )]
    pub async fn allocate_request(
        &self,
        request: AllocationRequest,
    ) -> Result<Allocation, AllocationError> {
        let request = AllocationRequest::new(request.blood_type, request.volume)?;
        let table = self.compatibility.snapshot();
        let order = table.compatible_donors(request.blood_type);

        let mut tx = self.store.begin().await?;

        let plan = match deduct(&mut tx, order, request.volume).await {
            Ok(plan) => plan,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after storage failure failed");
                }
                return Err(err.into());
            }
        };

        if !plan.remaining.is_zero() {
            tx.rollback().await?;
            tracing::warn!(
                shortfall = %plan.remaining,
                "insufficient compatible stock; deductions rolled back"
            );
            return Err(AllocationError::InsufficientStock {
                requested: request.volume,
                shortfall: plan.remaining,
            });
        }

        tx.commit().await?;
        tracing::info!(lots = plan.deductions.len(), "allocation committed");

        Ok(Allocation {
            request,
            deductions: plan.deductions,
        })
    }
}

async fn deduct<T>(tx: &mut T, order: &[BloodType], volume: Volume) -> Result<Plan, StoreError>
where
    T: InventoryTransaction,
{
    let mut remaining = volume;
    let mut deductions = Vec::new();

    for &blood_type in order {
        if remaining.is_zero() {
            break;
        }

        let lots = tx.lots_ordered_by_expiry(blood_type).await?;
        for lot in lots {
            if remaining.is_zero() {
                break;
            }
            if lot.is_empty() {
                continue;
            }

            let deduction = if lot.disposable_volume <= remaining {
                tx.consume_lot_fully(lot.id).await?;
                Deduction {
                    lot_id: lot.id,
                    blood_type,
                    taken: lot.disposable_volume,
                    depleted: true,
                }
            } else {
                let left = lot.disposable_volume.saturating_sub(remaining);
                tx.reduce_lot_volume(lot.id, left).await?;
                Deduction {
                    lot_id: lot.id,
                    blood_type,
                    taken: remaining,
                    depleted: false,
                }
            };

            tracing::debug!(
                lot_id = %deduction.lot_id,
                %blood_type,
                taken = %deduction.taken,
                depleted = deduction.depleted,
                "lot deducted"
            );
            remaining = remaining.saturating_sub(deduction.taken);
            deductions.push(deduction);
        }
    }

    Ok(Plan {
        deductions,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_volume_is_rejected() {
        let err = AllocationRequest::new(BloodType::OPos, Volume::ZERO).unwrap_err();
        assert!(matches!(err, AllocationError::InvalidRequest(_)));
    }

    #[test]
    fn negative_or_nan_ml_is_rejected() {
        for ml in [-1.0, f64::NAN, 0.0] {
            let err = AllocationRequest::from_ml(BloodType::APos, ml).unwrap_err();
            assert!(matches!(err, AllocationError::InvalidRequest(_)), "{ml}");
        }
    }

    #[test]
    fn outcome_reports_shortfall() {
        let request = AllocationRequest::from_ml(BloodType::ANeg, 500.0).unwrap();
        let result = Err(AllocationError::InsufficientStock {
            requested: request.volume,
            shortfall: Volume::from_whole_ml(200),
        });

        let outcome = AllocationOutcome::from_result(&request, &result);
        assert!(!outcome.success);
        assert_eq!(outcome.moved, Volume::ZERO);
        assert_eq!(outcome.shortfall, Volume::from_whole_ml(200));
        assert_eq!(outcome.message(), "Insufficient stock: 200.00 ml short of 500.00 ml");
    }

    #[test]
    fn outcome_reports_success() {
        let request = AllocationRequest::from_ml(BloodType::OPos, 500.0).unwrap();
        let result = Ok(Allocation {
            request,
            deductions: vec![Deduction {
                lot_id: LotId::new(),
                blood_type: BloodType::ONeg,
                taken: Volume::from_whole_ml(500),
                depleted: false,
            }],
        });

        let outcome = AllocationOutcome::from_result(&request, &result);
        assert!(outcome.success);
        assert_eq!(outcome.moved, request.volume);
        assert_eq!(outcome.shortfall, Volume::ZERO);
        assert_eq!(outcome.message(), "Stock deducted for O+: 500.00 ml");
    }

    #[test]
    fn outcome_for_storage_failure_carries_error_text() {
        let request = AllocationRequest::from_ml(BloodType::BPos, 50.0).unwrap();
        let result = Err(AllocationError::StorageUnavailable(StoreError::unavailable("timeout")));

        let outcome = AllocationOutcome::from_result(&request, &result);
        assert!(!outcome.success);
        assert_eq!(
            outcome.message(),
            "Could not deduct stock: storage unavailable: timeout"
        );
    }

    #[test]
    fn volume_by_type_groups_deductions() {
        let request = AllocationRequest::from_ml(BloodType::AbPos, 400.0).unwrap();
        let allocation = Allocation {
            request,
            deductions: vec![
                Deduction {
                    lot_id: LotId::new(),
                    blood_type: BloodType::AbPos,
                    taken: Volume::from_whole_ml(150),
                    depleted: true,
                },
                Deduction {
                    lot_id: LotId::new(),
                    blood_type: BloodType::AbPos,
                    taken: Volume::from_whole_ml(50),
                    depleted: true,
                },
                Deduction {
                    lot_id: LotId::new(),
                    blood_type: BloodType::APos,
                    taken: Volume::from_whole_ml(200),
                    depleted: false,
                },
            ],
        };

        let by_type = allocation.volume_by_type();
        assert_eq!(by_type[&BloodType::AbPos], Volume::from_whole_ml(200));
        assert_eq!(by_type[&BloodType::APos], Volume::from_whole_ml(200));
        assert_eq!(allocation.moved(), request.volume);
    }
}
