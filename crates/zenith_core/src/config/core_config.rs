//! Entries owned by the core module
//!
//! `core.yaml` carries the database connection (`Database` group) and the
//! registry's own behaviour (`Config` group).

use super::{ConfigFlags, ConfigRegistry, CORE_MODULE};
use crate::database::{DatabaseSettings, Driver};
use crate::error::{ConfigError, ConfigResult, ValueError};

pub const DATABASE_GROUP: &str = "Database";
pub const CONFIG_GROUP: &str = "Config";
pub const TRACK_CHANGES: &str = "TrackChanges";

/// Registers every core entry and applies `TrackChanges` to the registry.
/// Reloads of `core.yaml` and writes to the entry re-apply it.
pub fn register_core_config(registry: &ConfigRegistry) -> ConfigResult<()> {
    let core = registry.module(CORE_MODULE);
    let defaults = DatabaseSettings::default();
    let db = ConfigFlags::PROTECTED;

    core.register(DATABASE_GROUP, "Driver", "Database driver (mysql or sqlite)", "mysql".to_string(), db)?;
    core.register(DATABASE_GROUP, "Hostname", "Database server host", defaults.hostname, db)?;
    core.register(DATABASE_GROUP, "Port", "Database server port", defaults.port, db)?;
    core.register(DATABASE_GROUP, "Username", "Database user", defaults.username, db)?;
    core.register(DATABASE_GROUP, "Password", "Database password", defaults.password, db)?;
    core.register(
        DATABASE_GROUP,
        "Database",
        "Database (schema) name, or file path for sqlite",
        defaults.database,
        db,
    )?;
    core.register(
        DATABASE_GROUP,
        "Sslmode",
        "SSL mode: None, Preferred, Required, VerifyCA or VerifyFull",
        defaults.sslmode,
        db,
    )?;
    core.register(DATABASE_GROUP, "TablePrefix", "Prefix for every table name", defaults.table_prefix, db)?;
    core.register(
        DATABASE_GROUP,
        "TablePurgeDays",
        "Delete players not seen for this many days (0 disables)",
        defaults.purge_days,
        db,
    )?;
    core.register(
        DATABASE_GROUP,
        "SaveOnRoundEnd",
        "Save every active player at each checkpoint",
        true,
        ConfigFlags::GLOBAL | ConfigFlags::LOCKED,
    )?;

    core.register(
        CONFIG_GROUP,
        "AutoReload",
        "Reload config files when they change on disk",
        true,
        ConfigFlags::GLOBAL | ConfigFlags::LOCKED,
    )?;
    core.register(
        CONFIG_GROUP,
        TRACK_CHANGES,
        "Save every config write to disk",
        false,
        ConfigFlags::GLOBAL | ConfigFlags::LOCKED,
    )?;

    registry.sync_track_changes();
    Ok(())
}

impl DatabaseSettings {
    /// Connection settings from the core `Database` group.
    pub fn from_registry(registry: &ConfigRegistry) -> ConfigResult<Self> {
        let core = registry.module(CORE_MODULE);
        let driver: String = core.get(DATABASE_GROUP, "Driver")?;
        let driver = driver.parse::<Driver>().map_err(|e| {
            ConfigError::Value(ValueError::InvalidLiteral {
                kind: "driver".to_string(),
                value: driver.clone(),
                reason: e.to_string(),
            })
        })?;

        Ok(Self {
            driver,
            hostname: core.get(DATABASE_GROUP, "Hostname")?,
            port: core.get(DATABASE_GROUP, "Port")?,
            username: core.get(DATABASE_GROUP, "Username")?,
            password: core.get(DATABASE_GROUP, "Password")?,
            database: core.get(DATABASE_GROUP, "Database")?,
            sslmode: core.get(DATABASE_GROUP, "Sslmode")?,
            table_prefix: core.get(DATABASE_GROUP, "TablePrefix")?,
            purge_days: core.get(DATABASE_GROUP, "TablePurgeDays")?,
            ..Self::default()
        })
    }
}

/// Whether active players are checkpointed on every round end.
pub fn save_on_round_end(registry: &ConfigRegistry) -> bool {
    registry
        .get_value(CORE_MODULE, DATABASE_GROUP, "SaveOnRoundEnd")
        .unwrap_or(true)
}

/// Whether the config directory should be watched for edits.
pub fn auto_reload(registry: &ConfigRegistry) -> bool {
    registry.get_value(CORE_MODULE, CONFIG_GROUP, "AutoReload").unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModuleDocument, WriteOutcome};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_core_defaults_round_trip_into_settings() {
        let dir = TempDir::new().unwrap();
        let registry = ConfigRegistry::new(dir.path());
        register_core_config(&registry).unwrap();

        let settings = DatabaseSettings::from_registry(&registry).unwrap();
        assert_eq!(settings.driver, Driver::MySql);
        assert_eq!(settings.port, 3306);
        assert_eq!(settings.table_prefix, "zenith_");
        assert_eq!(settings.purge_days, 30);
        assert!(save_on_round_end(&registry));
        assert!(auto_reload(&registry));
        assert!(!registry.track_changes());
        assert!(dir.path().join("core.yaml").exists());
    }

    #[test]
    fn test_other_modules_cannot_touch_database_group() {
        let dir = TempDir::new().unwrap();
        let registry = ConfigRegistry::new(dir.path());
        register_core_config(&registry).unwrap();

        assert!(registry.get_value::<String>("Ranks", DATABASE_GROUP, "Password").is_err());
        assert!(registry
            .set_value("Ranks", DATABASE_GROUP, "Hostname", "evil".to_string())
            .is_err());
        assert_eq!(
            registry
                .set_value("Ranks", DATABASE_GROUP, "SaveOnRoundEnd", false)
                .unwrap(),
            WriteOutcome::Rejected(crate::config::DenyReason::Locked)
        );
        assert!(registry.get_value::<bool>("Ranks", DATABASE_GROUP, "SaveOnRoundEnd").unwrap());
    }

    #[test]
    fn test_track_changes_follows_writes_and_reloads() {
        let dir = TempDir::new().unwrap();
        let registry = ConfigRegistry::new(dir.path());
        register_core_config(&registry).unwrap();
        assert!(!registry.track_changes());

        assert_eq!(
            registry.set_value(CORE_MODULE, CONFIG_GROUP, TRACK_CHANGES, true).unwrap(),
            WriteOutcome::Applied
        );
        assert!(registry.track_changes());

        let path = registry.path_for(CORE_MODULE);
        let edit = |enabled: bool| {
            let (mut doc, _) = ModuleDocument::read(&path).unwrap().unwrap();
            let item = doc.item_mut(CONFIG_GROUP, TRACK_CHANGES).unwrap();
            item.current_value = json!(enabled);
            // Differ from the registry's own last write
            item.description = format!("edited to {}", enabled);
            std::fs::write(&path, doc.to_yaml().unwrap()).unwrap();
        };

        edit(false);
        registry.reload_module(CORE_MODULE).unwrap();
        assert!(!registry.track_changes());

        edit(true);
        assert_eq!(
            registry.reload_changed_file(&path).unwrap().as_deref(),
            Some(CORE_MODULE)
        );
        assert!(registry.track_changes());
    }

    #[test]
    fn test_sqlite_driver_from_file() {
        let dir = TempDir::new().unwrap();
        let registry = ConfigRegistry::new(dir.path());
        register_core_config(&registry).unwrap();
        registry
            .set_value(CORE_MODULE, DATABASE_GROUP, "Driver", "SQLite".to_string())
            .unwrap();
        registry
            .set_value(CORE_MODULE, DATABASE_GROUP, "Database", "/tmp/z.db".to_string())
            .unwrap();

        let settings = DatabaseSettings::from_registry(&registry).unwrap();
        assert_eq!(settings.driver, Driver::Sqlite);
        assert_eq!(settings.connection_url().unwrap(), "sqlite:///tmp/z.db?mode=rwc");
    }
}
