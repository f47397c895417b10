//! Logical backup of every prefixed table, taken before migrations run

use super::{Database, Dialect};
use crate::error::{DatabaseError, DatabaseResult};
use sqlx::{Any, Row};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Writes a schema and data dump of every table carrying the configured prefix
/// into `directory`, returning the path of the written file.
#[instrument(skip(db))]
pub async fn dump_tables(db: &Database, directory: &Path) -> DatabaseResult<PathBuf> {
    let dialect = db.dialect();
    let mut out = String::new();
    out.push_str(&format!(
        "-- Zenith backup of prefix '{}' taken {}\n\n",
        db.prefix(),
        chrono::Utc::now().to_rfc3339()
    ));

    let tables = db.prefixed_tables().await?;
    for table in &tables {
        let quoted = dialect.quote(table)?;
        out.push_str(&format!("-- Table {}\n", table));
        out.push_str(&create_statement(db, table).await?);
        out.push_str(";\n");

        let columns = db.columns_of(table).await?;
        if columns.is_empty() {
            continue;
        }
        let quoted_columns: Vec<String> = columns
            .iter()
            .map(|c| dialect.quote(c))
            .collect::<DatabaseResult<_>>()?;
        let select = quoted_columns
            .iter()
            .map(|c| format!("CAST({} AS {})", c, dialect.text_cast_type()))
            .collect::<Vec<_>>()
            .join(", ");

        let rows = sqlx::query::<Any>(&format!("SELECT {} FROM {}", select, quoted))
            .fetch_all(db.pool())
            .await?;
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                let value: Option<String> = row.try_get(index)?;
                values.push(sql_literal(dialect, value.as_deref()));
            }
            out.push_str(&format!(
                "INSERT INTO {} ({}) VALUES ({});\n",
                quoted,
                quoted_columns.join(", "),
                values.join(", ")
            ));
        }
        out.push('\n');
    }

    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| DatabaseError::BackupWrite(directory.to_path_buf(), e))?;
    let path = directory.join(format!(
        "{}backup_{}.sql",
        db.prefix(),
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    tokio::fs::write(&path, out)
        .await
        .map_err(|e| DatabaseError::BackupWrite(path.clone(), e))?;

    info!("💾 Wrote backup of {} tables to {}", tables.len(), path.display());
    Ok(path)
}

async fn create_statement(db: &Database, table: &str) -> DatabaseResult<String> {
    match db.dialect() {
        Dialect::MySql => {
            let row = sqlx::query::<Any>(&format!("SHOW CREATE TABLE {}", db.dialect().quote(table)?))
                .fetch_one(db.pool())
                .await?;
            Ok(row.try_get::<String, _>(1)?)
        }
        Dialect::Sqlite => Ok(sqlx::query_scalar::<Any, String>(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table.to_string())
        .fetch_one(db.pool())
        .await?),
    }
}

fn sql_literal(dialect: Dialect, value: Option<&str>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(text) => {
            let mut escaped = text.replace('\'', "''");
            if dialect == Dialect::MySql {
                escaped = escaped.replace('\\', "\\\\");
            }
            format!("'{}'", escaped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseSettings;
    use crate::types::Partition;
    use tempfile::TempDir;

    #[test]
    fn test_sql_literal_escaping() {
        assert_eq!(sql_literal(Dialect::Sqlite, None), "NULL");
        assert_eq!(sql_literal(Dialect::Sqlite, Some("it's")), "'it''s'");
        assert_eq!(sql_literal(Dialect::MySql, Some("a\\b")), "'a\\\\b'");
    }

    #[tokio::test]
    async fn test_dump_contains_schema_and_rows() {
        let dir = TempDir::new().unwrap();
        let db = Database::connect(DatabaseSettings::sqlite(dir.path().join("z.db"), "bk_"))
            .await
            .unwrap();
        db.ensure_tables().await.unwrap();
        db.ensure_column(Partition::Storage, "ranks").await.unwrap();
        sqlx::query::<Any>(
            "INSERT INTO \"bk_player_storage\" (steam_id, name, \"ranks.storage\") VALUES (7, 'O''Neil', '{\"Points\":5}')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let path = dump_tables(&db, &dir.path().join("backups")).await.unwrap();
        let dump = std::fs::read_to_string(path).unwrap();

        assert!(dump.contains("CREATE TABLE"));
        assert!(dump.contains("-- Table bk_player_settings"));
        assert!(dump.contains("'O''Neil'"));
        assert!(dump.contains("{\"Points\":5}"));
    }
}
