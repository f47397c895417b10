//! # Zenith Core
//!
//! Player data persistence and module configuration for a game server host.
//!
//! ## Components
//!
//! - [`storage`] - per-player, per-namespace settings and storage cache backed
//!   by two relational tables with one JSON column per namespace
//! - [`config`] - typed, flagged YAML configuration registry with per-module
//!   accessors and file-watch reload
//! - [`database`] - connection handling, schema helpers, versioned migrations
//!   and backups over MySQL or SQLite
//! - [`value`] - the closed set of value kinds and their lenient coercions
//! - [`dispatch`] - hand-off of background completions to the host tick
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use zenith_core::config::{core_config, ConfigRegistry};
//! use zenith_core::database::{Database, DatabaseSettings, Migrator, CURRENT_SCHEMA_VERSION};
//! use zenith_core::storage::{defaults, PlayerStore, StoreOptions};
//! use zenith_core::{SteamId, TickDispatcher};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ConfigRegistry::new("configs");
//! core_config::register_core_config(&registry)?;
//!
//! let db = Database::connect(DatabaseSettings::from_registry(&registry)?).await?;
//! Migrator::new(db.clone()).migrate_to(CURRENT_SCHEMA_VERSION).await?;
//! db.ensure_tables().await?;
//!
//! let store = PlayerStore::with_database(db, TickDispatcher::new(), StoreOptions::default());
//! store.register_storage("ranks", defaults([("Points", json!(0))])).await?;
//!
//! let player = SteamId::new(76561198012345678);
//! store.load(player, "Player").await?;
//! let ranks = store.module("ranks");
//! let points: i64 = ranks.storage().get_or_default(player, "Points");
//! ranks.storage().set(player, "Points", points + 100, false)?;
//! store.dispose(player).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod storage;
pub mod types;
pub mod value;

pub use config::{ConfigFlags, ConfigRegistry, ModuleConfig, WriteOutcome, CORE_MODULE};
pub use database::{Database, DatabaseSettings};
pub use dispatch::TickDispatcher;
pub use error::{ConfigError, DatabaseError, MigrationError, StoreError, ValueError};
pub use storage::{ModuleStorage, PlayerStore, StoreEvent, StoreOptions};
pub use types::{Partition, SteamId};
pub use value::{ValueKind, ValueType};

// Used by `value_enum!` expansions in downstream crates
#[doc(hidden)]
pub use serde_json as __serde_json;
