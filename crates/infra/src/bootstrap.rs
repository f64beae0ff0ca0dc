//! Wiring: config -> stores -> compatibility table -> engine.

use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use hemobank_core::{BloodType, Volume};
use hemobank_inventory::{
    Allocation, AllocationCommitter, AllocationError, AvailabilityResolver, CompatibilityRegistry,
    CompatibilityTable, InventoryStore, Resolution, StockLevels, StoreError,
};

use crate::compatibility_source::{JsonFileCompatibilitySource, PostgresCompatibilitySource};
use crate::config::InfraConfig;
use crate::inventory_store::{InMemoryInventoryStore, PostgresInventoryStore};

/// Resolver and committer sharing one store and one compatibility table.
#[derive(Debug, Clone)]
pub struct AllocationEngine<S> {
    resolver: AvailabilityResolver<S>,
    committer: AllocationCommitter<S>,
    compatibility: CompatibilityRegistry,
}

impl<S> AllocationEngine<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, compatibility: CompatibilityRegistry) -> Self {
        Self {
            resolver: AvailabilityResolver::new(store.clone(), compatibility.clone()),
            committer: AllocationCommitter::new(store, compatibility.clone()),
            compatibility,
        }
    }

    pub fn resolver(&self) -> &AvailabilityResolver<S> {
        &self.resolver
    }

    pub fn committer(&self) -> &AllocationCommitter<S> {
        &self.committer
    }

    pub fn compatibility(&self) -> &CompatibilityRegistry {
        &self.compatibility
    }

    pub fn store(&self) -> &S {
        self.committer.store()
    }
}

/// Engine over whichever store the configuration selected.
#[derive(Debug, Clone)]
pub enum Engine {
    InMemory(AllocationEngine<InMemoryInventoryStore>),
    Postgres(AllocationEngine<PostgresInventoryStore>),
}

impl Engine {
    pub fn compatibility(&self) -> &CompatibilityRegistry {
        match self {
            Engine::InMemory(e) => e.compatibility(),
            Engine::Postgres(e) => e.compatibility(),
        }
    }

    pub async fn resolve(&self, blood_type: BloodType, volume: Volume) -> Result<Resolution, StoreError> {
        match self {
            Engine::InMemory(e) => e.resolver().resolve(blood_type, volume).await,
            Engine::Postgres(e) => e.resolver().resolve(blood_type, volume).await,
        }
    }

    pub async fn allocate(
        &self,
        blood_type: BloodType,
        volume: Volume,
    ) -> Result<Allocation, AllocationError> {
        match self {
            Engine::InMemory(e) => e.committer().allocate(blood_type, volume).await,
            Engine::Postgres(e) => e.committer().allocate(blood_type, volume).await,
        }
    }

    pub async fn stock_levels(&self) -> Result<StockLevels, StoreError> {
        match self {
            Engine::InMemory(e) => e.store().stock_levels().await,
            Engine::Postgres(e) => e.store().stock_levels().await,
        }
    }
}

/// Open the Postgres pool when persistent stores are configured.
pub async fn connect(config: &InfraConfig) -> anyhow::Result<Option<PgPool>> {
    if !config.use_persistent_stores {
        return Ok(None);
    }
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(Some(pool))
}

/// Pick the compatibility source: database, then JSON file, then built-in.
///
/// Each persisted source falls back to the standard table on its own.
pub async fn load_compatibility_table(
    config: &InfraConfig,
    pool: Option<&PgPool>,
) -> CompatibilityTable {
    if let Some(pool) = pool {
        return CompatibilityTable::load(&PostgresCompatibilitySource::new(pool.clone())).await;
    }
    if let Some(path) = &config.compatibility_file {
        return CompatibilityTable::load(&JsonFileCompatibilitySource::new(path.clone())).await;
    }
    tracing::info!("no compatibility source configured; using standard table");
    CompatibilityTable::standard()
}

pub async fn build_engine(config: &InfraConfig) -> anyhow::Result<Engine> {
    let pool = connect(config).await?;
    let compatibility = CompatibilityRegistry::new(load_compatibility_table(config, pool.as_ref()).await);

    let engine = match pool {
        Some(pool) => {
            tracing::info!(max_connections = config.max_connections, "using Postgres inventory store");
            Engine::Postgres(AllocationEngine::new(PostgresInventoryStore::new(pool), compatibility))
        }
        None => {
            tracing::info!("using in-memory inventory store");
            Engine::InMemory(AllocationEngine::new(InMemoryInventoryStore::new(), compatibility))
        }
    };
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn default_config_builds_in_memory_engine_with_standard_table() {
        let engine = build_engine(&InfraConfig::default()).await.unwrap();
        assert!(matches!(engine, Engine::InMemory(_)));
        assert_eq!(*engine.compatibility().snapshot(), CompatibilityTable::standard());
    }

    #[tokio::test]
    async fn compatibility_file_is_used_without_database() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"[{"recipient": "O+", "donor": "O+", "preference_rank": 1}]"#)
            .unwrap();
        file.flush().unwrap();

        let config = InfraConfig {
            compatibility_file: Some(file.path().to_path_buf()),
            ..InfraConfig::default()
        };
        let table = load_compatibility_table(&config, None).await;
        assert_eq!(table.compatible_donors(BloodType::OPos), &[BloodType::OPos]);
    }

    #[tokio::test]
    async fn unreadable_compatibility_file_falls_back() {
        let config = InfraConfig {
            compatibility_file: Some("/nonexistent/rules.json".into()),
            ..InfraConfig::default()
        };
        let table = load_compatibility_table(&config, None).await;
        assert_eq!(table, CompatibilityTable::standard());
    }
}
