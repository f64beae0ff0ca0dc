//! Postgres-backed inventory store.
//!
//! ## Locking
//!
//! Reads through [`PostgresInventoryTransaction`] use `SELECT ... FOR UPDATE`,
//! so two concurrent allocations that reach the same lots serialize on the row
//! locks: the second one sees the volumes left by the first after it commits.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `InvalidData` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolClosed, PoolTimedOut, Io, Tls | N/A | `Unavailable` |
//! | Decode / ColumnNotFound | N/A | `InvalidData` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use hemobank_core::{BloodType, LotId, Volume};
use hemobank_inventory::{InventoryLot, InventoryStore, InventoryTransaction, StockLevels, StoreError};

const LOTS_OF_TYPE: &str = r#"
    SELECT id, blood_type, disposable_volume_ml, expires_on
    FROM inventory_lots
    WHERE blood_type = $1
    ORDER BY expires_on ASC, id ASC
"#;

const LOTS_OF_TYPE_FOR_UPDATE: &str = r#"
    SELECT id, blood_type, disposable_volume_ml, expires_on
    FROM inventory_lots
    WHERE blood_type = $1
    ORDER BY expires_on ASC, id ASC
    FOR UPDATE
"#;

/// Postgres-backed inventory store.
///
/// Uses the SQLx connection pool, which is thread-safe (Arc + Send + Sync).
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Stock entry; merges into an existing lot with the same type and expiry.
    #[instrument(skip(self), fields(blood_type = %blood_type, volume = %volume), err)]
    pub async fn register_lot(
        &self,
        blood_type: BloodType,
        volume: Volume,
        expires_on: NaiveDate,
    ) -> Result<LotId, StoreError> {
        if volume.is_zero() {
            return Err(StoreError::invalid_data("registered volume must be positive"));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let existing = sqlx::query(
            r#"
            SELECT id FROM inventory_lots
            WHERE blood_type = $1 AND expires_on = $2
            ORDER BY id ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(blood_type.label())
        .bind(expires_on)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_lot", e))?;

        let id = match existing {
            Some(row) => {
                let id: uuid::Uuid = row
                    .try_get("id")
                    .map_err(|e| map_sqlx_error("find_lot", e))?;
                sqlx::query(
                    "UPDATE inventory_lots SET disposable_volume_ml = disposable_volume_ml + $2 WHERE id = $1",
                )
                .bind(id)
                .bind(volume.as_ml())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("merge_lot", e))?;
                LotId::from_uuid(id)
            }
            None => {
                let id = LotId::new();
                sqlx::query(
                    r#"
                    INSERT INTO inventory_lots (id, blood_type, disposable_volume_ml, expires_on)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(id.as_uuid())
                .bind(blood_type.label())
                .bind(volume.as_ml())
                .bind(expires_on)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_lot", e))?;
                id
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(id)
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    type Tx = PostgresInventoryTransaction;

    /// Sum of the decoded lots, so the total matches what an allocation can
    /// actually take unit for unit.
    #[instrument(skip(self), fields(blood_type = %blood_type), err)]
    async fn total_available_volume(&self, blood_type: BloodType) -> Result<Volume, StoreError> {
        let lots = self.lots_ordered_by_expiry(blood_type).await?;
        Ok(lots.iter().map(|l| l.disposable_volume).sum())
    }

    #[instrument(skip(self), fields(blood_type = %blood_type), err)]
    async fn lots_ordered_by_expiry(
        &self,
        blood_type: BloodType,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        let rows = sqlx::query(LOTS_OF_TYPE)
            .bind(blood_type.label())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("lots_ordered_by_expiry", e))?;
        decode_lots(&rows)
    }

    #[instrument(skip(self), err)]
    async fn stock_levels(&self) -> Result<StockLevels, StoreError> {
        let rows = sqlx::query(
            "SELECT id, blood_type, disposable_volume_ml, expires_on FROM inventory_lots",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_levels", e))?;
        Ok(totals_by_type(&decode_lots(&rows)?))
    }

    async fn begin(&self) -> Result<PostgresInventoryTransaction, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresInventoryTransaction { tx })
    }
}

/// Database transaction over `inventory_lots`.
///
/// SQLx rolls the transaction back when it is dropped without `commit`.
#[derive(Debug)]
pub struct PostgresInventoryTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventoryTransaction for PostgresInventoryTransaction {
    async fn lots_ordered_by_expiry(
        &mut self,
        blood_type: BloodType,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        let rows = sqlx::query(LOTS_OF_TYPE_FOR_UPDATE)
            .bind(blood_type.label())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_lots", e))?;
        decode_lots(&rows)
    }

    async fn consume_lot_fully(&mut self, id: LotId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM inventory_lots WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("consume_lot", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::LotNotFound(id));
        }
        Ok(())
    }

    async fn reduce_lot_volume(&mut self, id: LotId, new_volume: Volume) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_lots
            SET disposable_volume_ml = $2
            WHERE id = $1 AND disposable_volume_ml >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(new_volume.as_ml())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reduce_lot", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "lot {id} is missing or holds less than {new_volume}"
            )));
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

// SQLx row types

struct LotRow {
    id: uuid::Uuid,
    blood_type: String,
    disposable_volume_ml: f64,
    expires_on: NaiveDate,
}

impl<'r> FromRow<'r, PgRow> for LotRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LotRow {
            id: row.try_get("id")?,
            blood_type: row.try_get("blood_type")?,
            disposable_volume_ml: row.try_get("disposable_volume_ml")?,
            expires_on: row.try_get("expires_on")?,
        })
    }
}

impl TryFrom<LotRow> for InventoryLot {
    type Error = StoreError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        let blood_type = row
            .blood_type
            .parse()
            .map_err(|e: hemobank_core::DomainError| StoreError::invalid_data(e.to_string()))?;
        let disposable_volume = Volume::from_ml(row.disposable_volume_ml)
            .map_err(|e| StoreError::invalid_data(format!("lot {}: {e}", row.id)))?;
        Ok(InventoryLot {
            id: LotId::from_uuid(row.id),
            blood_type,
            disposable_volume,
            expires_on: row.expires_on,
        })
    }
}

fn decode_lots(rows: &[PgRow]) -> Result<Vec<InventoryLot>, StoreError> {
    rows.iter()
        .map(|row| {
            let lot = LotRow::from_row(row).map_err(|e| {
                StoreError::invalid_data(format!("failed to deserialize lot row: {e}"))
            })?;
            InventoryLot::try_from(lot)
        })
        .collect()
}

/// Per-type totals over decoded lots; every type is present.
fn totals_by_type(lots: &[InventoryLot]) -> StockLevels {
    let mut levels: StockLevels = BloodType::ALL.into_iter().map(|t| (t, Volume::ZERO)).collect();
    for lot in lots {
        if let Some(total) = levels.get_mut(&lot.blood_type) {
            *total = total.saturating_add(lot.disposable_volume);
        }
    }
    levels
}

/// Map SQLx errors onto the store boundary (see module docs).
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("23514") => StoreError::InvalidData(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::ColumnNotFound(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::InvalidData(format!("undecodable row in {}: {}", operation, err))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}
