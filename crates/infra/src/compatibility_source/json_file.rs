//! Compatibility rules read from a JSON file.

use std::path::PathBuf;

use async_trait::async_trait;

use hemobank_inventory::{CompatibilityRule, CompatibilitySource, StoreError};

/// Compatibility rules kept in a JSON file:
///
/// ```json
/// [{ "recipient": "A+", "donor": "A+", "preference_rank": 1 }, ...]
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileCompatibilitySource {
    path: PathBuf,
}

impl JsonFileCompatibilitySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CompatibilitySource for JsonFileCompatibilitySource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load_rules(&self) -> Result<Vec<CompatibilityRule>, StoreError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            StoreError::unavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            StoreError::invalid_data(format!("malformed rules in {}: {e}", self.path.display()))
        })
    }
}
