//! Zenith host entry point
//!
//! Boots the config registry and the database, migrates the schema, runs the
//! player store with its scheduled jobs and an admin console, and saves every
//! active player before exiting.

mod cli;
mod config;
mod console;
mod logging;
mod scheduler;
mod signals;

use anyhow::Context;
use tracing::{error, info, warn};

use cli::CliArgs;
use config::AppConfig;
use console::{Console, ConsoleExit};
use scheduler::Scheduler;
use zenith_core::config::core_config;
use zenith_core::config::ConfigWatcher;
use zenith_core::database::{Migrator, CURRENT_SCHEMA_VERSION};
use zenith_core::storage::StoreOptions;
use zenith_core::{ConfigRegistry, Database, DatabaseError, DatabaseSettings, MigrationError, PlayerStore, TickDispatcher};

// ============================================================================
// Errors
// ============================================================================

/// Startup failures that leave the host unable to serve any player
#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    #[error("database connection failed: {0}")]
    Database(#[source] DatabaseError),
    #[error("schema migration failed: {0}")]
    Migration(#[source] MigrationError),
    #[error("player tables could not be created: {0}")]
    Schema(#[source] DatabaseError),
}

/// Exit code for [`InitializationError`]; other failures exit with 1
const INIT_FAILURE_EXIT_CODE: i32 = 2;

// ============================================================================
// Application
// ============================================================================

pub struct Application {
    config: AppConfig,
    registry: ConfigRegistry,
    db: Database,
    store: PlayerStore,
}

impl Application {
    /// Loads configuration, connects and migrates the database and creates
    /// the player store. Any failure here aborts startup.
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(config_dir) = args.config_dir {
            config.host.config_dir = config_dir.to_string_lossy().to_string();
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            anyhow::bail!("Configuration validation failed: {}", e);
        }

        logging::setup_logging(&config.logging)?;
        display_banner();

        let registry = ConfigRegistry::new(config.config_dir());
        core_config::register_core_config(&registry).context("failed to register core config")?;

        let settings = DatabaseSettings::from_registry(&registry).context("invalid database settings")?;
        info!("🗄️ Connecting to {}", settings.redacted_url());
        let db = Database::connect(settings)
            .await
            .map_err(InitializationError::Database)?;

        let mut migrator = Migrator::new(db.clone());
        migrator.backup_dir(config.backup_dir());
        let report = migrator
            .migrate_to(CURRENT_SCHEMA_VERSION)
            .await
            .map_err(InitializationError::Migration)?;
        if report.is_noop() {
            info!("📐 Schema is current at {}", report.to);
        } else {
            info!(
                "📐 Schema migrated {} -> {} ({} versions, {} steps skipped)",
                report.from,
                report.to,
                report.applied.len(),
                report.skipped_steps
            );
        }
        db.ensure_tables().await.map_err(InitializationError::Schema)?;

        let store = PlayerStore::with_database(
            db.clone(),
            TickDispatcher::new(),
            StoreOptions {
                namespace_suffix_fallback: config.host.namespace_suffix_fallback,
            },
        );
        store.on_loaded(|steam_id| info!("✅ Player {} ready", steam_id));

        Ok(Self {
            config,
            registry,
            db,
            store,
        })
    }

    /// Runs until a signal or the console's `quit`, then shuts down.
    pub async fn run(self) -> anyhow::Result<()> {
        let watcher = if core_config::auto_reload(&self.registry) {
            match ConfigWatcher::start(self.registry.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("⚠️ Config auto reload unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut scheduler = Scheduler::new();
        scheduler.spawn_tick(self.store.dispatcher().clone(), self.config.tick_interval());
        scheduler.spawn_checkpoint(
            self.store.clone(),
            self.registry.clone(),
            self.config.checkpoint_interval(),
        );
        scheduler.spawn_midnight_purge(self.db.clone(), self.db.settings().purge_days);

        info!("📋 Configuration Summary:");
        info!("  📁 Config directory: {}", self.config.host.config_dir);
        info!("  💾 Backup directory: {}", self.config.host.backup_dir);
        info!("  ⏱️ Tick rate: {} Hz", self.config.host.tick_rate_hz);
        info!("  🔁 Checkpoint every {}s", self.config.host.checkpoint_interval_secs);
        info!("✅ Zenith is now running!");
        info!("🛑 Press Ctrl+C or type 'quit' to shut down");

        let console = Console::new(self.store.clone(), self.registry.clone(), self.db.clone());
        let mut console_task = tokio::spawn(console.run());

        tokio::select! {
            result = signals::wait_for_signal() => {
                result?;
                console_task.abort();
            }
            exit = &mut console_task => {
                match exit {
                    Ok(ConsoleExit::Quit) => info!("⌨️ Quit requested from console"),
                    Ok(ConsoleExit::Closed) => {
                        info!("⌨️ Console input closed, waiting for a signal");
                        signals::wait_for_signal().await?;
                    }
                    Err(e) => {
                        error!("❌ Console task failed: {}", e);
                        signals::wait_for_signal().await?;
                    }
                }
            }
        }

        info!("🛑 Shutdown initiated, saving players...");
        scheduler.stop();
        if let Some(watcher) = watcher {
            watcher.stop();
        }

        let active = self.store.active_players().len();
        let result = self.store.shutdown().await;
        self.db.close().await;

        match result {
            Ok(()) => {
                info!("✅ Saved {} active players, Zenith shutdown complete", active);
                Ok(())
            }
            Err(e) => Err(e).context("final save failed"),
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:#}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start: {:#}", e);
            eprintln!("❌ Failed to start: {:#}", e);
            let code = if e.downcast_ref::<InitializationError>().is_some() {
                INIT_FAILURE_EXIT_CODE
            } else {
                1
            };
            std::process::exit(code);
        }
    }
}

fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("🌟 Zenith v{} - player data and module configuration host", version);
}
