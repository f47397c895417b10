//! In-memory data of one active player

use super::registry::Defaults;
use crate::types::{Partition, SteamId};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::watch;

/// Key/value map of one namespace in one partition
pub type NamespaceMap = Map<String, Value>;

/// Cached settings and storage of one active player.
///
/// Each partition maps namespace to a key/value map. Values stay as decoded
/// JSON until a typed read coerces them.
pub struct PlayerData {
    steam_id: SteamId,
    name: RwLock<String>,
    /// Activation number; a load carrying another number is stale
    generation: u64,
    settings: DashMap<String, NamespaceMap>,
    storage: DashMap<String, NamespaceMap>,
    loaded: watch::Sender<bool>,
}

impl PlayerData {
    pub fn new(steam_id: SteamId, name: impl Into<String>, generation: u64) -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            steam_id,
            name: RwLock::new(name.into()),
            generation,
            settings: DashMap::new(),
            storage: DashMap::new(),
            loaded,
        }
    }

    pub fn steam_id(&self) -> SteamId {
        self.steam_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    fn partition(&self, partition: Partition) -> &DashMap<String, NamespaceMap> {
        match partition {
            Partition::Settings => &self.settings,
            Partition::Storage => &self.storage,
        }
    }

    pub fn get(&self, partition: Partition, namespace: &str, key: &str) -> Option<Value> {
        self.partition(partition)
            .get(namespace)
            .and_then(|map| map.get(key).cloned())
    }

    /// Looks a key up in every namespace whose name ends with `suffix`.
    pub fn get_by_suffix(&self, partition: Partition, suffix: &str, key: &str) -> Option<(String, Value)> {
        self.partition(partition).iter().find_map(|entry| {
            if entry.key().ends_with(suffix) {
                entry.value().get(key).map(|v| (entry.key().clone(), v.clone()))
            } else {
                None
            }
        })
    }

    pub fn set(&self, partition: Partition, namespace: &str, key: &str, value: Value) {
        self.partition(partition)
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Merges a loaded namespace map. Keys already in the cache were written
    /// after activation and win over the stored copy.
    pub fn merge_loaded(&self, partition: Partition, namespace: &str, loaded: NamespaceMap) {
        let mut map = self.partition(partition).entry(namespace.to_string()).or_default();
        for (key, value) in loaded {
            map.entry(key).or_insert(value);
        }
    }

    /// Fills keys missing from a namespace with registered defaults. Present
    /// keys are never touched, so applying the same defaults twice is a no-op.
    pub fn merge_defaults(&self, partition: Partition, namespace: &str, defaults: &Defaults) {
        let mut map = self.partition(partition).entry(namespace.to_string()).or_default();
        for (key, value) in defaults {
            if !map.contains_key(key) {
                map.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn replace_namespace(&self, partition: Partition, namespace: &str, map: NamespaceMap) {
        self.partition(partition).insert(namespace.to_string(), map);
    }

    /// Copies of the non-empty namespace maps, either all of them or just one.
    pub fn snapshot(&self, partition: Partition, namespace: Option<&str>) -> Vec<(String, NamespaceMap)> {
        let table = self.partition(partition);
        match namespace {
            Some(ns) => table
                .get(ns)
                .filter(|map| !map.is_empty())
                .map(|map| vec![(ns.to_string(), map.clone())])
                .unwrap_or_default(),
            None => {
                let mut out: Vec<(String, NamespaceMap)> = table
                    .iter()
                    .filter(|entry| !entry.value().is_empty())
                    .map(|entry| (entry.key().clone(), entry.value().clone()))
                    .collect();
                out.sort_by(|a, b| a.0.cmp(&b.0));
                out
            }
        }
    }

    pub fn namespaces(&self, partition: Partition) -> Vec<String> {
        self.partition(partition).iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.send_replace(true);
    }

    pub(crate) fn loaded_receiver(&self) -> watch::Receiver<bool> {
        self.loaded.subscribe()
    }
}

impl std::fmt::Debug for PlayerData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerData")
            .field("steam_id", &self.steam_id)
            .field("generation", &self.generation)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
