//! Namespace-bound accessor over the attribute store

use super::PlayerStore;
use crate::error::StoreResult;
use crate::types::{Partition, SteamId};
use crate::value::ValueType;

/// Attribute store access bound to one namespace, so module code never
/// repeats its own name.
#[derive(Clone, Debug)]
pub struct ModuleStorage {
    store: PlayerStore,
    namespace: String,
}

impl ModuleStorage {
    pub(crate) fn new(store: PlayerStore, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// User preferences of this namespace
    pub fn settings(&self) -> PartitionView<'_> {
        PartitionView {
            owner: self,
            partition: Partition::Settings,
        }
    }

    /// Accumulated state of this namespace
    pub fn storage(&self) -> PartitionView<'_> {
        PartitionView {
            owner: self,
            partition: Partition::Storage,
        }
    }

    pub async fn save(&self, steam_id: SteamId) -> StoreResult<()> {
        self.store.save_one(steam_id, Some(&self.namespace)).await
    }

    /// Display label of one of this namespace's settings.
    pub fn display_name(&self, key: &str, locale: Option<&str>) -> String {
        self.store.display_name(&self.namespace, key, locale)
    }
}

/// One partition of a [`ModuleStorage`]
pub struct PartitionView<'a> {
    owner: &'a ModuleStorage,
    partition: Partition,
}

impl PartitionView<'_> {
    pub fn get<T: ValueType>(&self, steam_id: SteamId, key: &str) -> Option<T> {
        self.owner
            .store
            .get(steam_id, &self.owner.namespace, key, self.partition)
    }

    pub fn get_or_default<T: ValueType + Default>(&self, steam_id: SteamId, key: &str) -> T {
        self.get(steam_id, key).unwrap_or_default()
    }

    pub fn set<T: ValueType>(&self, steam_id: SteamId, key: &str, value: T, save_immediately: bool) -> StoreResult<()> {
        self.owner.store.set(
            steam_id,
            &self.owner.namespace,
            key,
            value,
            self.partition,
            save_immediately,
        )
    }

    /// Restores the registered defaults for this player and persists them.
    pub async fn reset(&self, steam_id: SteamId) -> StoreResult<()> {
        self.owner
            .store
            .reset_namespace(steam_id, &self.owner.namespace, self.partition)
            .await
    }
}
