//! Recurring host jobs: the dispatcher tick, player checkpoints and the
//! nightly purge of stale rows.

use chrono::{Local, NaiveDateTime};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use zenith_core::config::core_config;
use zenith_core::{ConfigRegistry, Database, PlayerStore, TickDispatcher};

/// Owns every background job the host started. Stopping aborts them all.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains `dispatcher` once per `interval`.
    pub fn spawn_tick(&mut self, dispatcher: TickDispatcher, interval: Duration) {
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                dispatcher.drain();
            }
        }));
    }

    /// Saves every active player each `interval` while `SaveOnRoundEnd` is
    /// enabled. The flag is re-read each time so a config reload applies.
    pub fn spawn_checkpoint(&mut self, store: PlayerStore, registry: ConfigRegistry, interval: Duration) {
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !core_config::save_on_round_end(&registry) {
                    debug!("Checkpoint skipped, SaveOnRoundEnd is off");
                    continue;
                }
                match store.save_all_active().await {
                    Ok(0) => {}
                    Ok(count) => info!("💾 Checkpoint saved {} players", count),
                    Err(e) => error!("❌ Checkpoint failed: {}", e),
                }
            }
        }));
    }

    /// Deletes players unseen for `days` days at every local midnight.
    pub fn spawn_midnight_purge(&mut self, db: Database, days: u32) {
        if days == 0 {
            info!("🧹 Purge disabled (TablePurgeDays = 0)");
            return;
        }

        self.tasks.push(tokio::spawn(async move {
            loop {
                let wait = until_next_midnight(Local::now().naive_local());
                debug!("Next purge in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;

                match db.purge_inactive(days).await {
                    Ok(removed) => info!("🧹 Purged {} players inactive for {} days", removed, days),
                    Err(e) => error!("❌ Purge failed: {}", e),
                }
            }
        }));
    }

    pub fn job_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn stop(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Time from `now` to the following 00:00:00.
pub fn until_next_midnight(now: NaiveDateTime) -> Duration {
    now.date()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|midnight| (midnight - now).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}
