//! Donor compatibility table.
//!
//! Maps a recipient blood type to the donor types it may receive, most
//! preferred first. The table is process-wide configuration: it is loaded once
//! (from a persisted source when one is available, else the built-in standard
//! table) and afterwards only replaced wholesale through [`CompatibilityRegistry`].

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hemobank_core::BloodType;

use crate::store::StoreError;

use hemobank_core::BloodType::{AbNeg, AbPos, ANeg, APos, BNeg, BPos, ONeg, OPos};

/// Built-in table: recipient -> accepted donors in preference order.
const STANDARD: [(BloodType, &[BloodType]); 8] = [
    (OPos, &[OPos, ONeg]),
    (ONeg, &[ONeg]),
    (APos, &[APos, ANeg, OPos, ONeg]),
    (ANeg, &[ANeg, ONeg]),
    (BPos, &[BPos, BNeg, OPos, ONeg]),
    (BNeg, &[BNeg, ONeg]),
    (AbPos, &[AbPos, AbNeg, APos, ANeg, BPos, BNeg, OPos, ONeg]),
    (AbNeg, &[AbNeg, ANeg, BNeg, ONeg]),
];

/// One persisted `(recipient, donor, preference_rank)` row. Lower rank wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityRule {
    pub recipient: BloodType,
    pub donor: BloodType,
    pub preference_rank: i32,
}

impl CompatibilityRule {
    pub fn new(recipient: BloodType, donor: BloodType, preference_rank: i32) -> Self {
        Self {
            recipient,
            donor,
            preference_rank,
        }
    }
}

/// Where persisted compatibility rules come from.
#[async_trait]
pub trait CompatibilitySource: Send + Sync {
    /// Short label for logs (e.g. `postgres`, a file path).
    fn describe(&self) -> String;

    async fn load_rules(&self) -> Result<Vec<CompatibilityRule>, StoreError>;
}

/// Recipient -> ordered donor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityTable {
    donors: BTreeMap<BloodType, Vec<BloodType>>,
}

impl Default for CompatibilityTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl CompatibilityTable {
    /// The standard ABO/Rh red-cell table.
    pub fn standard() -> Self {
        let donors = STANDARD
            .iter()
            .map(|(recipient, donors)| (*recipient, donors.to_vec()))
            .collect();
        Self { donors }
    }

    /// Build a table from persisted rules.
    ///
    /// Each recipient's donors are ordered by ascending rank (ties keep input
    /// order) and de-duplicated. The recipient's own type is always moved to
    /// the front, whether its list omits it or ranks it later. Returns `None`
    /// when there are no rules at all.
    pub fn from_rules(rules: impl IntoIterator<Item = CompatibilityRule>) -> Option<Self> {
        let mut grouped: BTreeMap<BloodType, Vec<(i32, BloodType)>> = BTreeMap::new();
        for rule in rules {
            grouped
                .entry(rule.recipient)
                .or_default()
                .push((rule.preference_rank, rule.donor));
        }

        if grouped.is_empty() {
            return None;
        }

        let donors = grouped
            .into_iter()
            .map(|(recipient, mut ranked)| {
                ranked.sort_by_key(|(rank, _)| *rank);

                // The recipient's own type always comes first, whatever its rank.
                let mut list: Vec<BloodType> = Vec::with_capacity(ranked.len() + 1);
                list.push(recipient);
                for (_, donor) in ranked {
                    if !list.contains(&donor) {
                        list.push(donor);
                    }
                }
                (recipient, list)
            })
            .collect();

        Some(Self { donors })
    }

    /// Load from a persisted source, falling back to the standard table in full
    /// when the source fails or holds no rules.
    pub async fn load<S>(source: &S) -> Self
    where
        S: CompatibilitySource + ?Sized,
    {
        match source.load_rules().await {
            Ok(rules) => {
                let count = rules.len();
                match Self::from_rules(rules) {
                    Some(table) => {
                        tracing::info!(
                            source = %source.describe(),
                            rules = count,
                            recipients = table.donors.len(),
                            "loaded compatibility table"
                        );
                        table
                    }
                    None => {
                        tracing::warn!(
                            source = %source.describe(),
                            "compatibility source is empty; using standard table"
                        );
                        Self::standard()
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    source = %source.describe(),
                    error = %err,
                    "compatibility source unreadable; using standard table"
                );
                Self::standard()
            }
        }
    }

    /// Donor types accepted by `recipient`, most preferred first.
    ///
    /// Never empty: a type with no entry accepts only itself.
    pub fn compatible_donors(&self, recipient: BloodType) -> &[BloodType] {
        self.donors
            .get(&recipient)
            .map(Vec::as_slice)
            .unwrap_or_else(|| recipient.as_singleton())
    }

    /// Donor types other than `recipient` itself, in preference order.
    pub fn substitutes(&self, recipient: BloodType) -> impl Iterator<Item = BloodType> + '_ {
        self.compatible_donors(recipient)
            .iter()
            .copied()
            .filter(move |donor| *donor != recipient)
    }

    /// Human-readable summary of what a recipient accepts.
    pub fn recommendation(&self, recipient: BloodType) -> String {
        let labels: Vec<&str> = self
            .compatible_donors(recipient)
            .iter()
            .map(|t| t.label())
            .collect();
        format!("Accepted donor types for {recipient}: {}", labels.join(", "))
    }

    /// Recipients with an explicit entry.
    pub fn recipients(&self) -> impl Iterator<Item = BloodType> + '_ {
        self.donors.keys().copied()
    }
}

/// Shared, swap-only handle to the active compatibility table.
///
/// Readers take a cheap [`snapshot`](Self::snapshot) per operation so a reload
/// never changes the table underneath a running search or allocation.
#[derive(Debug, Clone)]
pub struct CompatibilityRegistry {
    current: Arc<RwLock<Arc<CompatibilityTable>>>,
}

impl Default for CompatibilityRegistry {
    fn default() -> Self {
        Self::new(CompatibilityTable::standard())
    }
}

impl CompatibilityRegistry {
    pub fn new(table: CompatibilityTable) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    pub fn snapshot(&self) -> Arc<CompatibilityTable> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, table: CompatibilityTable) {
        let table = Arc::new(table);
        match self.current.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    /// Re-read the persisted source and swap the result in.
    pub async fn reload<S>(&self, source: &S) -> Arc<CompatibilityTable>
    where
        S: CompatibilitySource + ?Sized,
    {
        self.replace(CompatibilityTable::load(source).await);
        self.snapshot()
    }
}
