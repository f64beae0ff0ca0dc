//! Compatibility rules read from the `blood_compatibility` table.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use hemobank_core::{BloodType, DomainError};
use hemobank_inventory::{CompatibilityRule, CompatibilitySource, StoreError};

use crate::inventory_store::postgres::map_sqlx_error;

/// Reads `blood_compatibility` rows, lowest preference rank first.
#[derive(Debug, Clone)]
pub struct PostgresCompatibilitySource {
    pool: Arc<PgPool>,
}

impl PostgresCompatibilitySource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl CompatibilitySource for PostgresCompatibilitySource {
    fn describe(&self) -> String {
        "postgres:blood_compatibility".to_string()
    }

    async fn load_rules(&self) -> Result<Vec<CompatibilityRule>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT recipient_type, donor_type, preference_rank
            FROM blood_compatibility
            ORDER BY recipient_type ASC, preference_rank ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_compatibility", e))?;

        rows.iter()
            .map(|row| {
                let recipient: String = row
                    .try_get("recipient_type")
                    .map_err(|e| map_sqlx_error("load_compatibility", e))?;
                let donor: String = row
                    .try_get("donor_type")
                    .map_err(|e| map_sqlx_error("load_compatibility", e))?;
                let preference_rank: i32 = row
                    .try_get("preference_rank")
                    .map_err(|e| map_sqlx_error("load_compatibility", e))?;

                Ok(CompatibilityRule {
                    recipient: parse_type(&recipient)?,
                    donor: parse_type(&donor)?,
                    preference_rank,
                })
            })
            .collect()
    }
}

fn parse_type(label: &str) -> Result<BloodType, StoreError> {
    label
        .parse()
        .map_err(|e: DomainError| StoreError::invalid_data(e.to_string()))
}
