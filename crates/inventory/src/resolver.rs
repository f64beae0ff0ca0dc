//! Read-only availability search over the substitution graph.
//!
//! Depth-first, preference-ordered, "first satisfactory" (not "maximum"):
//!
//! 1. A type already on the current path ends the branch (cycle guard).
//! 2. If the type alone has enough stock, it answers for the full volume.
//! 3. If it has some stock, the first substitute that contributes anything
//!    tops it up and the search stops, even if another substitute would
//!    have filled the gap better.
//! 4. If it has none, the first substitute able to cover the full volume on
//!    its own (possibly through its own substitutes) answers.
//!
//! The visited path is passed by value, so sibling branches never see each
//! other's visits.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use hemobank_core::{BloodType, Volume};

use crate::compatibility::{CompatibilityRegistry, CompatibilityTable};
use crate::store::{InventoryStore, StoreError};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Answer of a resolution: which type to draw from and how much it yields.
///
/// `source` is `None` (and `obtainable` zero) when nothing compatible is found.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub source: Option<BloodType>,
    pub obtainable: Volume,
}

impl Resolution {
    pub fn none() -> Self {
        Self {
            source: None,
            obtainable: Volume::ZERO,
        }
    }

    pub fn found(source: BloodType, obtainable: Volume) -> Self {
        Self {
            source: Some(source),
            obtainable,
        }
    }

    pub fn is_found(&self) -> bool {
        self.source.is_some()
    }

    /// Whether this resolution yields at least `volume`.
    pub fn covers(&self, volume: Volume) -> bool {
        self.is_found() && self.obtainable >= volume
    }
}

/// Blood types already explored on one recursion path (bit per type).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
struct VisitedPath(u8);

impl VisitedPath {
    fn contains(self, blood_type: BloodType) -> bool {
        self.0 & Self::bit(blood_type) != 0
    }

    fn with(self, blood_type: BloodType) -> Self {
        Self(self.0 | Self::bit(blood_type))
    }

    fn bit(blood_type: BloodType) -> u8 {
        1 << blood_type.index()
    }
}

/// Advisory availability check; never mutates the store.
#[derive(Debug, Clone)]
pub struct AvailabilityResolver<S> {
    store: S,
    compatibility: CompatibilityRegistry,
}

impl<S> AvailabilityResolver<S>
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

    /// Decide whether `volume` of `blood_type` is obtainable, and from where.
    ///
    /// "Nothing found" is a normal [`Resolution::none`]; only storage failures
    /// are errors.
    #[instrument(skip(self), fields(blood_type = %blood_type, volume = %volume), err)]
    pub async fn resolve(
        &self,
        blood_type: BloodType,
        volume: Volume,
    ) -> Result<Resolution, StoreError> {
        let table = self.compatibility.snapshot();
        let resolution = self
            .search(&table, blood_type, volume, VisitedPath::default())
            .await?;

        tracing::debug!(
            source = ?resolution.source,
            obtainable = %resolution.obtainable,
            "resolution finished"
        );
        Ok(resolution)
    }

    fn search<'a>(
        &'a self,
        table: &'a CompatibilityTable,
        blood_type: BloodType,
        volume: Volume,
        visited: VisitedPath,
    ) -> BoxFuture<'a, Result<Resolution, StoreError>> {
        Box::pin(async move {
            if visited.contains(blood_type) {
                tracing::trace!(%blood_type, "cycle on substitution path; branch cut");
                return Ok(Resolution::none());
            }
            let visited = visited.with(blood_type);

            let available = self.store.total_available_volume(blood_type).await?;

            if available >= volume {
                return Ok(Resolution::found(blood_type, volume));
            }

            if !available.is_zero() {
                let missing = volume.saturating_sub(available);
                for donor in table.substitutes(blood_type) {
                    let topped_up = self.search(table, donor, missing, visited).await?;
                    if !topped_up.obtainable.is_zero() {
                        return Ok(Resolution::found(
                            blood_type,
                            available.saturating_add(topped_up.obtainable),
                        ));
                    }
                }
                return Ok(Resolution::found(blood_type, available));
            }

            for donor in table.substitutes(blood_type) {
                let candidate = self.search(table, donor, volume, visited).await?;
                if candidate.obtainable >= volume {
                    return Ok(Resolution::found(donor, candidate.obtainable));
                }
            }

            Ok(Resolution::none())
        })
    }
}
