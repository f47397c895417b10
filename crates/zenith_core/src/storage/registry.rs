//! Per-namespace default maps and display resolvers

use crate::types::Partition;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Default key/value map registered by one namespace for one partition
pub type Defaults = Map<String, Value>;

/// Resolves a settings key to a human readable label for a locale.
///
/// Returning `None` falls back to the key itself.
pub type DisplayResolver = Arc<dyn Fn(&str, Option<&str>) -> Option<String> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    defaults: Arc<Defaults>,
    resolver: Option<DisplayResolver>,
}

/// Registered defaults for every namespace, one table per partition.
///
/// Registration is last-wins: registering a namespace again replaces its
/// defaults (and resolver, for settings).
#[derive(Default)]
pub struct NamespaceRegistry {
    settings: DashMap<String, Registration>,
    storage: DashMap<String, Registration>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, partition: Partition) -> &DashMap<String, Registration> {
        match partition {
            Partition::Settings => &self.settings,
            Partition::Storage => &self.storage,
        }
    }

    pub fn register(
        &self,
        partition: Partition,
        namespace: &str,
        defaults: Defaults,
        resolver: Option<DisplayResolver>,
    ) {
        self.table(partition).insert(
            namespace.to_string(),
            Registration {
                defaults: Arc::new(defaults),
                resolver,
            },
        );
    }

    pub fn defaults(&self, partition: Partition, namespace: &str) -> Option<Arc<Defaults>> {
        self.table(partition).get(namespace).map(|r| r.defaults.clone())
    }

    pub fn is_registered(&self, partition: Partition, namespace: &str) -> bool {
        self.table(partition).contains_key(namespace)
    }

    /// Every registered namespace of a partition with its defaults.
    pub fn all(&self, partition: Partition) -> Vec<(String, Arc<Defaults>)> {
        self.table(partition)
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().defaults.clone()))
            .collect()
    }

    pub fn resolver(&self, namespace: &str) -> Option<DisplayResolver> {
        self.settings.get(namespace).and_then(|r| r.resolver.clone())
    }

    pub fn clear(&self) {
        self.settings.clear();
        self.storage.clear();
    }
}

impl std::fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceRegistry")
            .field("settings", &self.settings.len())
            .field("storage", &self.storage.len())
            .finish()
    }
}

/// Builds a [`Defaults`] map from `(key, value)` pairs.
///
/// ```rust
/// use serde_json::json;
/// use zenith_core::storage::defaults;
///
/// let map = defaults([("Points", json!(0)), ("Rank", json!(null))]);
/// assert_eq!(map.len(), 2);
/// ```
pub fn defaults<K, I>(pairs: I) -> Defaults
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registration_is_last_wins() {
        let registry = NamespaceRegistry::new();
        registry.register(Partition::Storage, "ranks", defaults([("Points", json!(0))]), None);
        registry.register(Partition::Storage, "ranks", defaults([("Points", json!(10))]), None);

        let map = registry.defaults(Partition::Storage, "ranks").unwrap();
        assert_eq!(map.get("Points"), Some(&json!(10)));
        assert!(!registry.is_registered(Partition::Settings, "ranks"));
        assert_eq!(registry.all(Partition::Storage).len(), 1);
    }

    #[test]
    fn test_resolver_lookup() {
        let registry = NamespaceRegistry::new();
        let resolver: DisplayResolver = Arc::new(|key, locale| match (key, locale) {
            ("HideRank", Some("de")) => Some("Rang verbergen".to_string()),
            ("HideRank", _) => Some("Hide rank".to_string()),
            _ => None,
        });
        registry.register(Partition::Settings, "ranks", Defaults::new(), Some(resolver));

        let resolve = registry.resolver("ranks").unwrap();
        assert_eq!(resolve("HideRank", Some("de")).as_deref(), Some("Rang verbergen"));
        assert!(registry.resolver("stats").is_none());

        registry.clear();
        assert!(registry.resolver("ranks").is_none());
    }
}
