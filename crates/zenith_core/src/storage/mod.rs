//! # Player attribute store
//!
//! Per-player, per-namespace key/value data split into two partitions:
//! settings (preferences the player controls) and storage (state written by
//! module logic). Each active player is cached in memory; the cache is
//! hydrated on [`PlayerStore::load`], written back per player or in bulk, and
//! dropped on [`PlayerStore::dispose`] after a final save.
//!
//! ## Lifecycle
//!
//! 1. Modules register namespace defaults at startup (idempotent, last wins).
//! 2. `load` activates a player, reads both partition rows and fills gaps
//!    from the registered defaults. Completion is announced through
//!    [`StoreEvent::Loaded`], [`PlayerStore::wait_loaded`] and any
//!    [`PlayerStore::on_loaded`] callbacks (run on the next host tick).
//! 3. Reads and writes hit the cache; `save_immediately` writes through.
//! 4. `dispose` saves, then removes the player.
//!
//! Every activation gets a new generation number. A load that finishes after
//! its player was disposed (or re-activated) is discarded.

mod cache;
mod handle;
mod registry;
mod repository;

pub use cache::{NamespaceMap, PlayerData};
pub use handle::{ModuleStorage, PartitionView};
pub use registry::{defaults, Defaults, DisplayResolver, NamespaceRegistry};
pub use repository::{AttributeRepository, PlayerRow, SqlAttributeRepository};

use crate::database::Database;
use crate::dispatch::TickDispatcher;
use crate::error::{StoreError, StoreResult};
use crate::types::{Partition, SteamId};
use crate::value::ValueType;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Capacity of the store event channel
const EVENT_CAPACITY: usize = 256;

/// Notifications published by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A player's rows were merged into the cache
    Loaded(SteamId),
    /// A bulk save wrote this many players
    Saved { players: usize },
    /// A player was saved and dropped from the cache
    Disposed(SteamId),
}

/// Behaviour switches for [`PlayerStore`]
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// When an exact namespace lookup misses, also try namespaces whose name
    /// ends with the requested one. Kept for modules whose runtime identity
    /// differs from the name they registered under; every use logs a warning.
    pub namespace_suffix_fallback: bool,
}

type LoadedCallback = Arc<dyn Fn(SteamId) + Send + Sync>;

struct StoreInner {
    registry: NamespaceRegistry,
    players: DashMap<SteamId, Arc<PlayerData>>,
    repository: Arc<dyn AttributeRepository>,
    dispatcher: TickDispatcher,
    events: broadcast::Sender<StoreEvent>,
    loaded_callbacks: RwLock<Vec<LoadedCallback>>,
    generation: AtomicU64,
    options: StoreOptions,
}

/// The attribute store service. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct PlayerStore {
    inner: Arc<StoreInner>,
}

impl PlayerStore {
    pub fn new(repository: Arc<dyn AttributeRepository>, dispatcher: TickDispatcher, options: StoreOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                registry: NamespaceRegistry::new(),
                players: DashMap::new(),
                repository,
                dispatcher,
                events,
                loaded_callbacks: RwLock::new(Vec::new()),
                generation: AtomicU64::new(0),
                options,
            }),
        }
    }

    /// Store backed by the SQL player tables of `db`.
    pub fn with_database(db: Database, dispatcher: TickDispatcher, options: StoreOptions) -> Self {
        Self::new(Arc::new(SqlAttributeRepository::new(db)), dispatcher, options)
    }

    pub fn dispatcher(&self) -> &TickDispatcher {
        &self.inner.dispatcher
    }

    pub fn registry(&self) -> &NamespaceRegistry {
        &self.inner.registry
    }

    /// Accessor bound to one namespace.
    pub fn module(&self, namespace: &str) -> ModuleStorage {
        ModuleStorage::new(self.clone(), namespace)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers a namespace's settings defaults and optional display resolver.
    ///
    /// Adds the `"<namespace>.settings"` column when missing. Calling it again
    /// replaces the defaults.
    pub async fn register_settings(
        &self,
        namespace: &str,
        defaults: Defaults,
        resolver: Option<DisplayResolver>,
    ) -> StoreResult<()> {
        self.register(Partition::Settings, namespace, defaults, resolver).await
    }

    /// Registers a namespace's storage defaults.
    pub async fn register_storage(&self, namespace: &str, defaults: Defaults) -> StoreResult<()> {
        self.register(Partition::Storage, namespace, defaults, None).await
    }

    async fn register(
        &self,
        partition: Partition,
        namespace: &str,
        defaults: Defaults,
        resolver: Option<DisplayResolver>,
    ) -> StoreResult<()> {
        self.inner.repository.ensure_namespace(partition, namespace).await?;
        let count = defaults.len();
        self.inner.registry.register(partition, namespace, defaults, resolver);
        debug!("Registered {} {} defaults for {}", count, partition, namespace);
        Ok(())
    }

    // ========================================================================
    // Activation
    // ========================================================================

    /// Activates a player and hydrates the cache from both partition tables.
    ///
    /// A player with no row gets the registered defaults. Database errors are
    /// logged and also leave the player on defaults. Loading a player that is
    /// already active only refreshes the display name.
    #[instrument(skip(self, name))]
    pub async fn load(&self, steam_id: SteamId, name: &str) -> StoreResult<()> {
        let (data, generation) = match self.inner.players.entry(steam_id) {
            Entry::Occupied(existing) => {
                existing.get().set_name(name);
                debug!("Player {} is already active", steam_id);
                return Ok(());
            }
            Entry::Vacant(slot) => {
                let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let data = Arc::new(PlayerData::new(steam_id, name, generation));
                slot.insert(data.clone());
                (data, generation)
            }
        };

        let results = futures::future::join_all(
            Partition::ALL
                .iter()
                .map(|partition| self.inner.repository.load(*partition, steam_id)),
        )
        .await;

        let mut rows = Vec::with_capacity(results.len());
        for (partition, result) in Partition::ALL.into_iter().zip(results) {
            match result {
                Ok(row) => rows.push((partition, row)),
                Err(e) => {
                    error!("❌ Failed to load {} for {}, using defaults: {}", partition, steam_id, e);
                    rows.push((partition, Default::default()));
                }
            }
        }

        if !self.is_current(steam_id, generation) {
            debug!("Discarding stale load of {} (generation {})", steam_id, generation);
            return Ok(());
        }

        for (partition, row) in rows {
            for (namespace, text) in row {
                match serde_json::from_str::<NamespaceMap>(&text) {
                    Ok(map) => data.merge_loaded(partition, &namespace, map),
                    Err(e) => warn!(
                        "Skipping unreadable {} data of {} for {}: {}",
                        partition, namespace, steam_id, e
                    ),
                }
            }
            for (namespace, defaults) in self.inner.registry.all(partition) {
                data.merge_defaults(partition, &namespace, &defaults);
            }
        }

        data.mark_loaded();
        let _ = self.inner.events.send(StoreEvent::Loaded(steam_id));
        for callback in self.inner.loaded_callbacks.read().iter().cloned() {
            self.inner.dispatcher.run_on_next_tick(move || callback(steam_id));
        }
        debug!("Loaded player {} (generation {})", steam_id, generation);
        Ok(())
    }

    fn is_current(&self, steam_id: SteamId, generation: u64) -> bool {
        self.inner
            .players
            .get(&steam_id)
            .map(|p| p.generation() == generation)
            .unwrap_or(false)
    }

    fn player(&self, steam_id: SteamId) -> StoreResult<Arc<PlayerData>> {
        self.inner
            .players
            .get(&steam_id)
            .map(|p| p.value().clone())
            .ok_or(StoreError::NotActive(steam_id.as_u64()))
    }

    pub fn is_active(&self, steam_id: SteamId) -> bool {
        self.inner.players.contains_key(&steam_id)
    }

    pub fn is_loaded(&self, steam_id: SteamId) -> bool {
        self.inner
            .players
            .get(&steam_id)
            .map(|p| p.is_loaded())
            .unwrap_or(false)
    }

    pub fn active_players(&self) -> Vec<SteamId> {
        let mut ids: Vec<SteamId> = self.inner.players.iter().map(|p| *p.key()).collect();
        ids.sort();
        ids
    }

    /// Resolves once the player's load has been merged into the cache.
    pub async fn wait_loaded(&self, steam_id: SteamId) -> StoreResult<()> {
        let mut receiver = self.player(steam_id)?.loaded_receiver();
        if receiver.wait_for(|loaded| *loaded).await.is_err() {
            return Err(StoreError::NotActive(steam_id.as_u64()));
        }
        Ok(())
    }

    /// Registers a callback run on the host tick after each completed load.
    pub fn on_loaded<F>(&self, callback: F)
    where
        F: Fn(SteamId) + Send + Sync + 'static,
    {
        self.inner.loaded_callbacks.write().push(Arc::new(callback));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    // ========================================================================
    // Reads and writes
    // ========================================================================

    /// Typed read of a cached value.
    ///
    /// Returns `None` when the player is not active, the key is missing or
    /// the stored value cannot be coerced to `T` (logged).
    pub fn get<T: ValueType>(&self, steam_id: SteamId, namespace: &str, key: &str, partition: Partition) -> Option<T> {
        let data = self.inner.players.get(&steam_id)?.value().clone();

        let raw = match data.get(partition, namespace, key) {
            Some(value) => value,
            None if self.inner.options.namespace_suffix_fallback => {
                let (matched, value) = data.get_by_suffix(partition, namespace, key)?;
                warn!(
                    "Namespace {} not found, using suffix match {} for key {}",
                    namespace, matched, key
                );
                value
            }
            None => return None,
        };

        match T::from_value(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    "Cannot read {}/{} of {} as {}: {}",
                    namespace,
                    key,
                    steam_id,
                    T::kind(),
                    e
                );
                None
            }
        }
    }

    /// Typed read falling back to `T::default()`.
    pub fn get_or_default<T: ValueType + Default>(
        &self,
        steam_id: SteamId,
        namespace: &str,
        key: &str,
        partition: Partition,
    ) -> T {
        self.get(steam_id, namespace, key, partition).unwrap_or_default()
    }

    /// Writes a value into the cache.
    ///
    /// With `save_immediately` a save of just this namespace is spawned on the
    /// current runtime; its failure is logged.
    pub fn set<T: ValueType>(
        &self,
        steam_id: SteamId,
        namespace: &str,
        key: &str,
        value: T,
        partition: Partition,
        save_immediately: bool,
    ) -> StoreResult<()> {
        let data = self.player(steam_id)?;
        data.set(partition, namespace, key, value.to_value());

        if save_immediately {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let store = self.clone();
                    let namespace = namespace.to_string();
                    handle.spawn(async move {
                        if let Err(e) = store.save_namespace(&data, partition, &namespace).await {
                            error!("❌ Immediate save of {} for {} failed: {}", namespace, steam_id, e);
                        }
                    });
                }
                Err(_) => warn!("No runtime available, {} for {} stays pending", namespace, steam_id),
            }
        }
        Ok(())
    }

    /// Display label for a settings key, through the namespace's resolver.
    pub fn display_name(&self, namespace: &str, key: &str, locale: Option<&str>) -> String {
        self.inner
            .registry
            .resolver(namespace)
            .and_then(|resolve| resolve(key, locale))
            .unwrap_or_else(|| key.to_string())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    async fn save_namespace(&self, data: &PlayerData, partition: Partition, namespace: &str) -> StoreResult<()> {
        if let Some(row) = Self::row_for(data, partition, Some(namespace))? {
            self.inner.repository.save(partition, &row).await?;
        }
        Ok(())
    }

    fn row_for(data: &PlayerData, partition: Partition, namespace: Option<&str>) -> StoreResult<Option<PlayerRow>> {
        let snapshot = data.snapshot(partition, namespace);
        if snapshot.is_empty() {
            return Ok(None);
        }
        let namespaces = snapshot
            .into_iter()
            .map(|(ns, map)| {
                serde_json::to_string(&map)
                    .map(|json| (ns.clone(), json))
                    .map_err(|source| StoreError::Serialization { namespace: ns, source })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Some(PlayerRow {
            steam_id: data.steam_id(),
            name: data.name(),
            namespaces,
        }))
    }

    /// Saves one namespace, or every namespace, of one player in both partitions.
    #[instrument(skip(self))]
    pub async fn save_one(&self, steam_id: SteamId, namespace: Option<&str>) -> StoreResult<()> {
        let data = self.player(steam_id)?;
        for partition in Partition::ALL {
            if let Some(row) = Self::row_for(&data, partition, namespace)? {
                self.inner.repository.save(partition, &row).await?;
            }
        }
        Ok(())
    }

    /// Saves every active player, one transaction per partition table.
    ///
    /// The cache is left untouched whatever the outcome, so a failed
    /// checkpoint is retried by the next one. Returns how many players were
    /// written.
    #[instrument(skip(self))]
    pub async fn save_all_active(&self) -> StoreResult<usize> {
        let players: Vec<Arc<PlayerData>> = self.inner.players.iter().map(|p| p.value().clone()).collect();
        if players.is_empty() {
            return Ok(0);
        }

        let mut first_error = None;
        for partition in Partition::ALL {
            let mut rows = Vec::with_capacity(players.len());
            for data in &players {
                match Self::row_for(data, partition, None) {
                    Ok(Some(row)) => rows.push(row),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping {} of {} in bulk save: {}", partition, data.steam_id(), e),
                }
            }
            if let Err(e) = self.inner.repository.save_many(partition, &rows).await {
                error!("❌ Bulk save of {} rows into {} failed: {}", rows.len(), partition, e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let _ = self.inner.events.send(StoreEvent::Saved { players: players.len() });
        info!("💾 Saved {} active players", players.len());
        Ok(players.len())
    }

    /// Saves a player, then drops it from the cache.
    ///
    /// When the save fails the player stays cached and the error is returned,
    /// so a later dispose, checkpoint or shutdown can still write it. If the
    /// player was re-activated while the save ran, the new activation is kept.
    #[instrument(skip(self))]
    pub async fn dispose(&self, steam_id: SteamId) -> StoreResult<()> {
        let data = self.player(steam_id)?;
        if let Err(e) = self.save_one(steam_id, None).await {
            error!("❌ Final save for {} failed, keeping it cached: {}", steam_id, e);
            return Err(e);
        }

        let generation = data.generation();
        self.inner
            .players
            .remove_if(&steam_id, |_, current| current.generation() == generation);
        let _ = self.inner.events.send(StoreEvent::Disposed(steam_id));
        debug!("Disposed player {}", steam_id);
        Ok(())
    }

    /// Replaces a player's namespace with the registered defaults and saves it.
    pub async fn reset_namespace(&self, steam_id: SteamId, namespace: &str, partition: Partition) -> StoreResult<()> {
        let defaults = self
            .inner
            .registry
            .defaults(partition, namespace)
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))?;
        let data = self.player(steam_id)?;
        data.replace_namespace(partition, namespace, (*defaults).clone());
        self.save_namespace(&data, partition, namespace).await
    }

    /// Best-effort bulk save, then drops every player and registration.
    pub async fn shutdown(&self) -> StoreResult<()> {
        let result = self.save_all_active().await.map(|_| ());
        if let Err(e) = &result {
            error!("❌ Shutdown save failed: {}", e);
        }
        self.inner.players.clear();
        self.inner.registry.clear();
        self.inner.loaded_callbacks.write().clear();
        info!("🛑 Player store shut down");
        result
    }
}

impl std::fmt::Debug for PlayerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerStore")
            .field("active", &self.inner.players.len())
            .field("registry", &self.inner.registry)
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    /// In-memory repository recording saves
    #[derive(Default)]
    struct MemoryRepository {
        rows: DashMap<(Partition, SteamId), HashMap<String, String>>,
        fail_loads: bool,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl AttributeRepository for MemoryRepository {
        async fn ensure_namespace(&self, _: Partition, _: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn load(&self, partition: Partition, steam_id: SteamId) -> StoreResult<HashMap<String, String>> {
            if self.fail_loads {
                return Err(StoreError::UnknownNamespace("offline".to_string()));
            }
            Ok(self.rows.get(&(partition, steam_id)).map(|r| r.value().clone()).unwrap_or_default())
        }

        async fn save(&self, partition: Partition, row: &PlayerRow) -> StoreResult<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::UnknownNamespace("offline".to_string()));
            }
            let mut entry = self.rows.entry((partition, row.steam_id)).or_default();
            for (ns, json) in &row.namespaces {
                entry.insert(ns.clone(), json.clone());
            }
            Ok(())
        }

        async fn save_many(&self, partition: Partition, rows: &[PlayerRow]) -> StoreResult<()> {
            for row in rows {
                self.save(partition, row).await?;
            }
            Ok(())
        }
    }

    fn store_with(repo: Arc<MemoryRepository>, options: StoreOptions) -> PlayerStore {
        PlayerStore::new(repo, TickDispatcher::new(), options)
    }

    #[tokio::test]
    async fn test_load_without_row_yields_defaults() {
        let repo = Arc::new(MemoryRepository::default());
        let store = store_with(repo, StoreOptions::default());
        store
            .register_storage("ranks", defaults([("Points", json!(0)), ("Rank", json!(null))]))
            .await
            .unwrap();

        let id = SteamId(76561198012345678);
        store.load(id, "tester").await.unwrap();

        assert!(store.is_loaded(id));
        assert_eq!(store.get::<i64>(id, "ranks", "Points", Partition::Storage), Some(0));
        assert_eq!(
            store.get::<Option<String>>(id, "ranks", "Rank", Partition::Storage),
            Some(None)
        );
    }

    #[tokio::test]
    async fn test_unreadable_column_keeps_defaults() {
        let repo = Arc::new(MemoryRepository::default());
        let id = SteamId(5);
        repo.rows.insert(
            (Partition::Settings, id),
            HashMap::from([
                ("ranks".to_string(), "{not json".to_string()),
                ("tags".to_string(), r#"{"Color":"red"}"#.to_string()),
            ]),
        );
        let store = store_with(repo, StoreOptions::default());
        store
            .register_settings("ranks", defaults([("Hide", json!(false))]), None)
            .await
            .unwrap();

        store.load(id, "p").await.unwrap();
        assert_eq!(store.get::<bool>(id, "ranks", "Hide", Partition::Settings), Some(false));
        assert_eq!(
            store.get::<String>(id, "tags", "Color", Partition::Settings).as_deref(),
            Some("red")
        );
    }

    #[tokio::test]
    async fn test_load_failure_falls_back_to_defaults() {
        let repo = Arc::new(MemoryRepository {
            fail_loads: true,
            ..Default::default()
        });
        let store = store_with(repo, StoreOptions::default());
        store.register_storage("stats", defaults([("Kills", json!(0))])).await.unwrap();

        store.load(SteamId(1), "p").await.unwrap();
        assert_eq!(store.get_or_default::<u32>(SteamId(1), "stats", "Kills", Partition::Storage), 0);
    }

    #[tokio::test]
    async fn test_set_requires_active_player() {
        let store = store_with(Arc::new(MemoryRepository::default()), StoreOptions::default());
        match store.set(SteamId(1), "ranks", "Points", 1i64, Partition::Storage, false) {
            Err(StoreError::NotActive(1)) => {}
            other => panic!("expected NotActive, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_coercion_failure_returns_none() {
        let store = store_with(Arc::new(MemoryRepository::default()), StoreOptions::default());
        store.load(SteamId(1), "p").await.unwrap();
        store
            .set(SteamId(1), "tags", "Color", "red".to_string(), Partition::Settings, false)
            .unwrap();

        assert_eq!(store.get::<i64>(SteamId(1), "tags", "Color", Partition::Settings), None);
        assert_eq!(store.get_or_default::<i64>(SteamId(1), "tags", "Color", Partition::Settings), 0);
    }

    #[tokio::test]
    async fn test_suffix_fallback_is_opt_in() {
        let id = SteamId(3);
        for enabled in [false, true] {
            let store = store_with(
                Arc::new(MemoryRepository::default()),
                StoreOptions {
                    namespace_suffix_fallback: enabled,
                },
            );
            store.load(id, "p").await.unwrap();
            store
                .set(id, "Zenith.Ranks", "Points", 10i64, Partition::Storage, false)
                .unwrap();

            let found = store.get::<i64>(id, "Ranks", "Points", Partition::Storage);
            assert_eq!(found, if enabled { Some(10) } else { None });
        }
    }

    #[tokio::test]
    async fn test_dispose_saves_before_removing() {
        let repo = Arc::new(MemoryRepository::default());
        let store = store_with(repo.clone(), StoreOptions::default());
        let mut events = store.subscribe();
        let id = SteamId(8);

        store.load(id, "p").await.unwrap();
        store.set(id, "stats", "Kills", 3u32, Partition::Storage, false).unwrap();
        store.dispose(id).await.unwrap();

        assert!(!store.is_active(id));
        let saved = repo.rows.get(&(Partition::Storage, id)).unwrap();
        assert_eq!(saved.get("stats").map(String::as_str), Some(r#"{"Kills":3}"#));

        assert_eq!(events.recv().await.unwrap(), StoreEvent::Loaded(id));
        assert_eq!(events.recv().await.unwrap(), StoreEvent::Disposed(id));
    }

    #[tokio::test]
    async fn test_failed_final_save_keeps_player() {
        let repo = Arc::new(MemoryRepository::default());
        let store = store_with(repo.clone(), StoreOptions::default());
        let id = SteamId(9);

        store.load(id, "p").await.unwrap();
        store.set(id, "stats", "Kills", 4u32, Partition::Storage, false).unwrap();

        repo.fail_saves.store(true, Ordering::SeqCst);
        assert!(store.dispose(id).await.is_err());
        assert!(store.is_active(id));
        assert_eq!(store.get::<u32>(id, "stats", "Kills", Partition::Storage), Some(4));

        repo.fail_saves.store(false, Ordering::SeqCst);
        store.dispose(id).await.unwrap();
        assert!(!store.is_active(id));
        let saved = repo.rows.get(&(Partition::Storage, id)).unwrap();
        assert_eq!(saved.get("stats").map(String::as_str), Some(r#"{"Kills":4}"#));
    }

    #[tokio::test]
    async fn test_on_loaded_runs_on_tick() {
        let store = store_with(Arc::new(MemoryRepository::default()), StoreOptions::default());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_loaded(move |id| sink.lock().push(id));

        store.load(SteamId(4), "p").await.unwrap();
        store.wait_loaded(SteamId(4)).await.unwrap();
        assert!(seen.lock().is_empty());

        assert_eq!(store.dispatcher().drain(), 1);
        assert_eq!(*seen.lock(), vec![SteamId(4)]);
    }

    #[tokio::test]
    async fn test_reset_namespace_restores_defaults() {
        let repo = Arc::new(MemoryRepository::default());
        let store = store_with(repo.clone(), StoreOptions::default());
        store
            .register_settings("tags", defaults([("Color", json!("white"))]), None)
            .await
            .unwrap();
        let id = SteamId(2);
        store.load(id, "p").await.unwrap();
        store
            .set(id, "tags", "Color", "red".to_string(), Partition::Settings, false)
            .unwrap();

        store.reset_namespace(id, "tags", Partition::Settings).await.unwrap();

        assert_eq!(
            store.get::<String>(id, "tags", "Color", Partition::Settings).as_deref(),
            Some("white")
        );
        let saved = repo.rows.get(&(Partition::Settings, id)).unwrap();
        assert_eq!(saved.get("tags").map(String::as_str), Some(r#"{"Color":"white"}"#));
        assert!(store.reset_namespace(id, "missing", Partition::Settings).await.is_err());
    }

    #[tokio::test]
    async fn test_display_name_falls_back_to_key() {
        let store = store_with(Arc::new(MemoryRepository::default()), StoreOptions::default());
        let resolver: DisplayResolver = Arc::new(|key, _| (key == "Hide").then(|| "Hide my rank".to_string()));
        store
            .register_settings("ranks", defaults([("Hide", json!(false))]), Some(resolver))
            .await
            .unwrap();

        assert_eq!(store.display_name("ranks", "Hide", None), "Hide my rank");
        assert_eq!(store.display_name("ranks", "Other", None), "Other");
        assert_eq!(store.display_name("stats", "Hide", Some("en")), "Hide");
    }
}
