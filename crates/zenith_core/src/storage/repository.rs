//! Persistence seam for player attributes

use crate::database::schema::{LAST_ONLINE_COLUMN, NAME_COLUMN, STEAM_ID_COLUMN};
use crate::database::Database;
use crate::error::StoreResult;
use crate::types::{Partition, SteamId};
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::{Any, Row};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument};

/// One player's serialized namespaces for one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    pub steam_id: SteamId,
    pub name: String,
    /// `(namespace, json text)` pairs; only namespaces with data
    pub namespaces: Vec<(String, String)>,
}

/// Storage backend for the attribute store.
///
/// Implementations hold one row per player and partition, with one JSON text
/// slot per namespace.
#[async_trait]
pub trait AttributeRepository: Send + Sync {
    /// Makes sure the namespace has a slot in the partition.
    async fn ensure_namespace(&self, partition: Partition, namespace: &str) -> StoreResult<()>;

    /// Reads every namespace slot of a player's row. A missing row yields an
    /// empty map; empty slots are omitted.
    async fn load(&self, partition: Partition, steam_id: SteamId) -> StoreResult<HashMap<String, String>>;

    /// Upserts one row, writing only the listed namespaces.
    async fn save(&self, partition: Partition, row: &PlayerRow) -> StoreResult<()>;

    /// Upserts many rows as one unit of work.
    async fn save_many(&self, partition: Partition, rows: &[PlayerRow]) -> StoreResult<()>;
}

/// [`AttributeRepository`] over the player tables.
pub struct SqlAttributeRepository {
    db: Database,
    /// Namespace data columns known to exist, per partition
    columns: DashMap<Partition, BTreeSet<String>>,
}

impl SqlAttributeRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            columns: DashMap::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn known_columns(&self, partition: Partition) -> StoreResult<Vec<String>> {
        if let Some(cols) = self.columns.get(&partition) {
            return Ok(cols.iter().cloned().collect());
        }
        let cols: BTreeSet<String> = self.db.data_columns(partition).await?.into_iter().collect();
        let out = cols.iter().cloned().collect();
        self.columns.insert(partition, cols);
        Ok(out)
    }

    async fn ensure_columns(&self, partition: Partition, rows: &[PlayerRow]) -> StoreResult<()> {
        let known = self.known_columns(partition).await?;
        let missing: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.namespaces.iter().map(|(ns, _)| ns.as_str()))
            .filter(|ns| !known.contains(&partition.column_for(ns)))
            .collect();
        for namespace in missing {
            self.ensure_namespace(partition, namespace).await?;
        }
        Ok(())
    }

    fn upsert_for(&self, partition: Partition, row: &PlayerRow) -> StoreResult<String> {
        let mut columns = vec![NAME_COLUMN.to_string()];
        columns.extend(row.namespaces.iter().map(|(ns, _)| partition.column_for(ns)));
        Ok(self.db.dialect().upsert_sql(
            &self.db.player_table(partition),
            STEAM_ID_COLUMN,
            &columns,
            Some(LAST_ONLINE_COLUMN),
        )?)
    }
}

#[async_trait]
impl AttributeRepository for SqlAttributeRepository {
    async fn ensure_namespace(&self, partition: Partition, namespace: &str) -> StoreResult<()> {
        self.db.ensure_column(partition, namespace).await?;
        // Seed the cache from the table first so columns written by earlier
        // runs stay visible to `load`
        self.known_columns(partition).await?;
        self.columns
            .entry(partition)
            .or_default()
            .insert(partition.column_for(namespace));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, partition: Partition, steam_id: SteamId) -> StoreResult<HashMap<String, String>> {
        let columns = self.known_columns(partition).await?;
        if columns.is_empty() {
            return Ok(HashMap::new());
        }

        let dialect = self.db.dialect();
        let select = columns
            .iter()
            .map(|c| dialect.quote(c))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            select,
            dialect.quote(&self.db.player_table(partition))?,
            dialect.quote(STEAM_ID_COLUMN)?
        );

        let row = sqlx::query::<Any>(&sql)
            .bind(steam_id.as_db())
            .fetch_optional(self.db.pool())
            .await?;

        let mut out = HashMap::new();
        if let Some(row) = row {
            for (index, column) in columns.iter().enumerate() {
                let text: Option<String> = row.try_get(index)?;
                let Some(namespace) = partition.namespace_of(column) else {
                    continue;
                };
                if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
                    out.insert(namespace.to_string(), text);
                }
            }
        }
        debug!("Loaded {} {} namespaces for {}", out.len(), partition, steam_id);
        Ok(out)
    }

    async fn save(&self, partition: Partition, row: &PlayerRow) -> StoreResult<()> {
        self.ensure_columns(partition, std::slice::from_ref(row)).await?;
        let sql = self.upsert_for(partition, row)?;

        let mut query = sqlx::query::<Any>(&sql)
            .bind(row.steam_id.as_db())
            .bind(row.name.clone());
        for (_, json) in &row.namespaces {
            query = query.bind(json.clone());
        }
        query.execute(self.db.pool()).await?;
        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn save_many(&self, partition: Partition, rows: &[PlayerRow]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        // Schema changes go first; the transaction below may hold the only connection
        self.ensure_columns(partition, rows).await?;

        let mut tx = self.db.pool().begin().await?;
        for row in rows {
            let sql = self.upsert_for(partition, row)?;
            let mut query = sqlx::query::<Any>(&sql)
                .bind(row.steam_id.as_db())
                .bind(row.name.clone());
            for (_, json) in &row.namespaces {
                query = query.bind(json.clone());
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
