//! Player table schema
//!
//! Two tables per deployment, one per [`Partition`], keyed by SteamID with a
//! JSON text column per registered namespace. Columns are added as
//! namespaces register and are never dropped.

use super::{index_exists_with, Database, Dialect};
use crate::error::DatabaseResult;
use crate::types::Partition;
use sqlx::Any;
use tracing::{debug, info, instrument};

pub const STEAM_ID_COLUMN: &str = "steam_id";
pub const NAME_COLUMN: &str = "name";
pub const LAST_ONLINE_COLUMN: &str = "last_online";
pub const INFO_TABLE: &str = "zenith_info";

impl Database {
    /// Prefixed table name for a partition.
    pub fn player_table(&self, partition: Partition) -> String {
        self.table(&format!("player_{}", partition.suffix()))
    }

    /// Prefixed name of the key/value info table holding `db_version`.
    pub fn info_table(&self) -> String {
        self.table(INFO_TABLE)
    }

    /// Creates both player tables and their `last_online` index if missing.
    ///
    /// The index matches the one migration 1.1.0 adds to older tables, so a
    /// fresh install and an upgraded one end with the same schema.
    #[instrument(skip(self))]
    pub async fn ensure_tables(&self) -> DatabaseResult<()> {
        let dialect = self.dialect();
        for partition in Partition::ALL {
            let table = self.player_table(partition);
            let sql = player_table_ddl(dialect, &table)?;
            sqlx::query::<Any>(&sql).execute(self.pool()).await?;

            let index = last_online_index(&table);
            if !self.index_exists(&table, &index).await? {
                let sql = format!(
                    "CREATE INDEX {} ON {} ({})",
                    dialect.quote(&index)?,
                    dialect.quote(&table)?,
                    dialect.quote(LAST_ONLINE_COLUMN)?
                );
                sqlx::query::<Any>(&sql).execute(self.pool()).await?;
                info!("➕ Added index {} to {}", index, table);
            }
            debug!("Ensured table {}", table);
        }
        Ok(())
    }

    pub async fn index_exists(&self, table: &str, index: &str) -> DatabaseResult<bool> {
        index_exists_with(self.dialect(), self.pool(), table, index).await
    }

    /// Creates the info table if it is missing.
    pub async fn ensure_info_table(&self) -> DatabaseResult<()> {
        let sql = info_table_ddl(self.dialect(), &self.info_table())?;
        sqlx::query::<Any>(&sql).execute(self.pool()).await?;
        Ok(())
    }

    /// Adds the `"<namespace>.<partition>"` column when it does not exist yet.
    ///
    /// Returns `true` when the column was created.
    #[instrument(skip(self))]
    pub async fn ensure_column(&self, partition: Partition, namespace: &str) -> DatabaseResult<bool> {
        let table = self.player_table(partition);
        let column = partition.column_for(namespace);
        let dialect = self.dialect();
        let quoted_column = dialect.quote(&column)?;

        let existing = self.columns_of(&table).await?;
        if existing.iter().any(|c| c.eq_ignore_ascii_case(&column)) {
            return Ok(false);
        }

        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            dialect.quote(&table)?,
            quoted_column,
            dialect.json_column_type()
        );
        sqlx::query::<Any>(&sql).execute(self.pool()).await?;
        info!("➕ Added column {} to {}", column, table);
        Ok(true)
    }

    /// Namespace data columns currently present on a partition's table.
    pub async fn data_columns(&self, partition: Partition) -> DatabaseResult<Vec<String>> {
        let columns = self.columns_of(&self.player_table(partition)).await?;
        Ok(columns
            .into_iter()
            .filter(|c| partition.namespace_of(c).is_some())
            .collect())
    }

    /// Deletes rows from both player tables whose `last_online` is older than
    /// `days` days. Returns the number of rows removed; `0` days disables the
    /// purge.
    #[instrument(skip(self))]
    pub async fn purge_inactive(&self, days: u32) -> DatabaseResult<u64> {
        if days == 0 {
            return Ok(0);
        }

        let dialect = self.dialect();
        let mut removed = 0;
        for partition in Partition::ALL {
            let table = dialect.quote(&self.player_table(partition))?;
            let column = dialect.quote(LAST_ONLINE_COLUMN)?;
            let result = match dialect {
                Dialect::MySql => {
                    let sql = format!("DELETE FROM {} WHERE {} < NOW() - INTERVAL ? DAY", table, column);
                    sqlx::query::<Any>(&sql).bind(i64::from(days)).execute(self.pool()).await?
                }
                Dialect::Sqlite => {
                    let sql = format!("DELETE FROM {} WHERE {} < datetime('now', ?)", table, column);
                    sqlx::query::<Any>(&sql)
                        .bind(format!("-{} days", days))
                        .execute(self.pool())
                        .await?
                }
            };
            removed += result.rows_affected();
        }

        info!("🧹 Purged {} rows inactive for more than {} days", removed, days);
        Ok(removed)
    }
}

/// Name of the `last_online` index on a prefixed player table.
pub fn last_online_index(table: &str) -> String {
    format!("{}_last_online", table)
}

fn player_table_ddl(dialect: Dialect, table: &str) -> DatabaseResult<String> {
    let t = dialect.quote(table)?;
    let id = dialect.quote(STEAM_ID_COLUMN)?;
    let name = dialect.quote(NAME_COLUMN)?;
    let seen = dialect.quote(LAST_ONLINE_COLUMN)?;
    Ok(match dialect {
        Dialect::MySql => format!(
            "CREATE TABLE IF NOT EXISTS {t} ({id} BIGINT NOT NULL PRIMARY KEY, \
             {name} VARCHAR(128) NOT NULL DEFAULT '', \
             {seen} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP) \
             ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
        ),
        Dialect::Sqlite => format!(
            "CREATE TABLE IF NOT EXISTS {t} ({id} INTEGER NOT NULL PRIMARY KEY, \
             {name} TEXT NOT NULL DEFAULT '', \
             {seen} TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)"
        ),
    })
}

fn info_table_ddl(dialect: Dialect, table: &str) -> DatabaseResult<String> {
    let t = dialect.quote(table)?;
    let key = dialect.quote("key")?;
    let value = dialect.quote("value")?;
    Ok(match dialect {
        Dialect::MySql => format!(
            "CREATE TABLE IF NOT EXISTS {t} ({key} VARCHAR(64) NOT NULL PRIMARY KEY, {value} TEXT NOT NULL) \
             ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
        ),
        Dialect::Sqlite => {
            format!("CREATE TABLE IF NOT EXISTS {t} ({key} TEXT NOT NULL PRIMARY KEY, {value} TEXT NOT NULL)")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseSettings;
    use tempfile::TempDir;

    async fn sqlite_db(dir: &TempDir) -> Database {
        Database::connect(DatabaseSettings::sqlite(dir.path().join("zenith.db"), "test_"))
            .await
            .unwrap()
    }

    #[test]
    fn test_player_table_ddl_mentions_all_columns() {
        let sql = player_table_ddl(Dialect::MySql, "zenith_player_settings").unwrap();
        assert!(sql.contains("`steam_id` BIGINT NOT NULL PRIMARY KEY"));
        assert!(sql.contains("`last_online` TIMESTAMP"));
        assert!(player_table_ddl(Dialect::Sqlite, "bad name").is_err());
    }

    #[tokio::test]
    async fn test_ensure_tables_and_columns() {
        let dir = TempDir::new().unwrap();
        let db = sqlite_db(&dir).await;
        db.ensure_tables().await.unwrap();

        assert!(db.table_exists("test_player_settings").await.unwrap());
        assert!(db.table_exists("test_player_storage").await.unwrap());
        assert!(db.data_columns(Partition::Settings).await.unwrap().is_empty());

        assert!(db.ensure_column(Partition::Settings, "ranks").await.unwrap());
        // Second registration is a no-op
        assert!(!db.ensure_column(Partition::Settings, "ranks").await.unwrap());

        let columns = db.data_columns(Partition::Settings).await.unwrap();
        assert_eq!(columns, vec!["ranks.settings".to_string()]);
        assert!(db.data_columns(Partition::Storage).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_tables_indexes_last_online() {
        let dir = TempDir::new().unwrap();
        let db = sqlite_db(&dir).await;
        db.ensure_tables().await.unwrap();
        // Idempotent
        db.ensure_tables().await.unwrap();

        for partition in Partition::ALL {
            let table = db.player_table(partition);
            assert!(db.index_exists(&table, &last_online_index(&table)).await.unwrap());
        }
        assert!(!db.index_exists("test_player_settings", "missing_index").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_inactive_removes_old_rows() {
        let dir = TempDir::new().unwrap();
        let db = sqlite_db(&dir).await;
        db.ensure_tables().await.unwrap();

        let table = db.player_table(Partition::Storage);
        sqlx::query::<Any>(&format!(
            "INSERT INTO \"{}\" (steam_id, name, last_online) VALUES (1, 'old', datetime('now', '-40 days'))",
            table
        ))
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query::<Any>(&format!(
            "INSERT INTO \"{}\" (steam_id, name) VALUES (2, 'fresh')",
            table
        ))
        .execute(db.pool())
        .await
        .unwrap();

        assert_eq!(db.purge_inactive(0).await.unwrap(), 0);
        assert_eq!(db.purge_inactive(30).await.unwrap(), 1);

        let remaining: i64 = sqlx::query_scalar::<Any, i64>(&format!("SELECT COUNT(*) FROM \"{}\"", table))
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
