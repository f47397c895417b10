//! Versioned schema migrations
//!
//! The applied schema version lives in `<prefix>zenith_info` under the
//! `db_version` key. [`Migrator::migrate_to`] applies every registered
//! [`Migration`] newer than that version, one transaction per version, and
//! records the new version inside the same transaction.
//!
//! Step SQL may use three placeholders:
//!
//! - `{prefix}` - the configured table prefix
//! - `{table}` - the step's target table, prefixed and quoted
//! - `{column}` - each namespace data column of the target table, quoted; a
//!   step using it runs once per column

use super::schema::last_online_index;
use super::{backup, index_exists_with, table_exists_with, Database, Dialect};
use crate::error::{DatabaseResult, MigrationError, MigrationResult};
use crate::types::Partition;
use sqlx::{Any, AnyConnection};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Version assumed when the info table or its row is missing.
pub const BASELINE_VERSION: SchemaVersion = SchemaVersion([1, 0, 0]);

/// Newest version among the built-in migrations.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion([1, 2, 0]);

const VERSION_KEY: &str = "db_version";

// ============================================================================
// Versions
// ============================================================================

/// `major.minor.patch` schema version. Missing components parse as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(pub [u64; 3]);

impl SchemaVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self([major, minor, patch])
    }
}

impl std::str::FromStr for SchemaVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MigrationError::InvalidVersion(s.to_string());
        let trimmed = s.trim().trim_start_matches(['v', 'V']);
        let parts: Vec<&str> = trimmed.split('.').collect();
        if trimmed.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }

        let mut out = [0u64; 3];
        for (slot, part) in out.iter_mut().zip(parts) {
            *slot = part.trim().parse().map_err(|_| invalid())?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

// ============================================================================
// Migrations
// ============================================================================

/// One statement of a migration, guarded by the existence of its table.
#[derive(Debug, Clone)]
pub struct MigrationStep {
    /// Unprefixed table name the step applies to
    pub table: String,
    pub sql: String,
    /// When set, the step runs once per namespace data column of this
    /// partition, substituting `{column}`.
    pub per_column: Option<Partition>,
    /// Unprefixed index name; the step is skipped when it already exists
    pub unless_index: Option<String>,
}

impl MigrationStep {
    pub fn new(table: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sql: sql.into(),
            per_column: None,
            unless_index: None,
        }
    }

    /// Skips the step when the table already carries `index`.
    pub fn unless_index(mut self, index: impl Into<String>) -> Self {
        self.unless_index = Some(index.into());
        self
    }

    /// A step expanded over every `"<namespace>.<partition>"` column.
    pub fn for_each_column(partition: Partition, sql: impl Into<String>) -> Self {
        Self {
            table: format!("player_{}", partition.suffix()),
            sql: sql.into(),
            per_column: Some(partition),
            unless_index: None,
        }
    }
}

/// Every step needed to bring the schema up to `version`.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: SchemaVersion,
    pub steps: Vec<MigrationStep>,
}

impl Migration {
    pub fn new(version: SchemaVersion, steps: Vec<MigrationStep>) -> Self {
        Self { version, steps }
    }
}

/// Migrations shipped with the crate.
pub fn builtin_migrations() -> Vec<Migration> {
    let mut out = Vec::new();

    out.push(Migration::new(
        SchemaVersion::new(1, 1, 0),
        Partition::ALL
            .iter()
            .map(|p| {
                let table = format!("player_{}", p.suffix());
                let index = last_online_index(&table);
                MigrationStep::new(table, format!("CREATE INDEX {{prefix}}{} ON {{table}} (last_online)", index))
                    .unless_index(index)
            })
            .collect(),
    ));

    // Older writers stored an empty string for "no data"; reads expect NULL.
    out.push(Migration::new(
        SchemaVersion::new(1, 2, 0),
        Partition::ALL
            .iter()
            .map(|p| MigrationStep::for_each_column(*p, "UPDATE {table} SET {column} = NULL WHERE {column} = ''"))
            .collect(),
    ));

    out
}

/// Backoff between attempts of a failing migration version.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Outcome of a [`Migrator::migrate_to`] run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub applied: Vec<SchemaVersion>,
    /// Steps skipped because their target table did not exist
    pub skipped_steps: usize,
    pub backup: Option<PathBuf>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Applies registered migrations to one database.
pub struct Migrator {
    db: Database,
    migrations: Vec<Migration>,
    backup_dir: Option<PathBuf>,
    retry: RetryPolicy,
}

impl Migrator {
    /// A runner preloaded with [`builtin_migrations`].
    pub fn new(db: Database) -> Self {
        Self {
            db,
            migrations: builtin_migrations(),
            backup_dir: None,
            retry: RetryPolicy::default(),
        }
    }

    /// A runner with no migrations registered.
    pub fn empty(db: Database) -> Self {
        Self {
            migrations: Vec::new(),
            ..Self::new(db)
        }
    }

    /// Adds a migration. A later registration for the same version replaces
    /// the earlier one.
    pub fn register(&mut self, migration: Migration) -> &mut Self {
        self.migrations.retain(|m| m.version != migration.version);
        self.migrations.push(migration);
        self
    }

    /// Directory receiving the pre-migration dump. Without one no backup is taken.
    pub fn backup_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn retry_policy(&mut self, retry: RetryPolicy) -> &mut Self {
        self.retry = retry;
        self
    }

    /// Version recorded in the info table, or [`BASELINE_VERSION`].
    pub async fn current_version(&self) -> MigrationResult<SchemaVersion> {
        self.db.ensure_info_table().await?;

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.db.dialect().quote("value")?,
            self.db.dialect().quote(&self.db.info_table())?,
            self.db.dialect().quote("key")?
        );
        let stored = sqlx::query_scalar::<Any, String>(&sql)
            .bind(VERSION_KEY.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(crate::error::DatabaseError::from)?;

        match stored {
            Some(version) => version.parse(),
            None => Ok(BASELINE_VERSION),
        }
    }

    /// Registered migrations newer than `current` and not newer than `target`,
    /// oldest first.
    pub fn pending(&self, current: SchemaVersion, target: SchemaVersion) -> Vec<&Migration> {
        let mut pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| m.version > current && m.version <= target)
            .collect();
        pending.sort_by_key(|m| m.version);
        pending
    }

    /// Brings the schema up to `target`.
    ///
    /// Takes a backup first when anything is pending (a failed backup is
    /// logged and does not stop the run). A version that keeps failing after
    /// the retry budget aborts the run with [`MigrationError::Exhausted`].
    #[instrument(skip(self), fields(prefix = %self.db.prefix()))]
    pub async fn migrate_to(&self, target: SchemaVersion) -> MigrationResult<MigrationReport> {
        let from = self.current_version().await?;
        let pending = self.pending(from, target);

        let mut report = MigrationReport {
            from,
            to: from,
            applied: Vec::new(),
            skipped_steps: 0,
            backup: None,
        };

        if pending.is_empty() {
            debug!("Schema is up to date at {}", from);
            return Ok(report);
        }

        info!("🔧 Migrating schema from {} to {} ({} pending)", from, target, pending.len());

        if let Some(dir) = &self.backup_dir {
            match backup::dump_tables(&self.db, dir).await {
                Ok(path) => report.backup = Some(path),
                Err(e) => warn!("⚠️ Backup before migration failed, continuing: {}", e),
            }
        }

        for migration in pending {
            let skipped = self.apply_with_retry(migration).await?;
            report.skipped_steps += skipped;
            report.applied.push(migration.version);
            report.to = migration.version;
        }

        info!("✅ Schema migrated to {}", report.to);
        Ok(report)
    }

    async fn apply_with_retry(&self, migration: &Migration) -> MigrationResult<usize> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.apply_once(migration).await {
                Ok(skipped) => return Ok(skipped),
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "Migration {} failed on attempt {}/{}: {}; retrying in {:?}",
                        migration.version, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("❌ Migration {} failed after {} attempts: {}", migration.version, attempt, e);
                    return Err(MigrationError::Exhausted {
                        version: migration.version.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// Runs one version inside a transaction and returns how many steps were
    /// skipped. Dropping the transaction on error rolls it back.
    async fn apply_once(&self, migration: &Migration) -> DatabaseResult<usize> {
        let dialect = self.db.dialect();
        let mut tx = self.db.pool().begin().await?;
        let mut skipped = 0;

        for step in &migration.steps {
            let table = self.db.table(&step.table);
            if !table_exists_with(dialect, &mut *tx, &table).await? {
                info!("Skipping migration {} step on missing table {}", migration.version, table);
                skipped += 1;
                continue;
            }
            if let Some(index) = &step.unless_index {
                if index_exists_with(dialect, &mut *tx, &table, &self.db.table(index)).await? {
                    debug!("Skipping migration {} step, index {} exists", migration.version, index);
                    skipped += 1;
                    continue;
                }
            }

            let base = step
                .sql
                .replace("{prefix}", self.db.prefix())
                .replace("{table}", &dialect.quote(&table)?);

            match step.per_column {
                None => {
                    sqlx::query::<Any>(&base).execute(&mut *tx).await?;
                }
                Some(partition) => {
                    let columns = columns_in_tx(dialect, &mut tx, &table).await?;
                    for column in columns.iter().filter(|c| partition.namespace_of(c).is_some()) {
                        let sql = base.replace("{column}", &dialect.quote(column)?);
                        sqlx::query::<Any>(&sql).execute(&mut *tx).await?;
                    }
                }
            }
        }

        let upsert = dialect.upsert_sql(&self.db.info_table(), "key", &["value".to_string()], None)?;
        sqlx::query::<Any>(&upsert)
            .bind(VERSION_KEY.to_string())
            .bind(migration.version.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Applied migration {}", migration.version);
        Ok(skipped)
    }
}

async fn columns_in_tx(dialect: Dialect, conn: &mut AnyConnection, table: &str) -> DatabaseResult<Vec<String>> {
    let sql = dialect.list_columns_sql(table);
    let mut query = sqlx::query_scalar::<Any, String>(&sql);
    if dialect == Dialect::MySql {
        query = query.bind(table.to_string());
    }
    Ok(query.fetch_all(conn).await?)
}
