//! # Configuration registry
//!
//! Typed, flagged configuration values organised as `module -> group -> key`,
//! persisted as one YAML document per module:
//!
//! - `<root>/core.yaml` for the core module
//! - `<root>/modules/<module>.yaml` for every other module
//!
//! Modules register their entries with a default value and [`ConfigFlags`].
//! Reads and writes name the calling module explicitly; [`ModuleConfig`]
//! binds that identity once. A caller always reaches its own entries; entries
//! of other modules are reachable only when flagged global, and writes to
//! them are further limited by the protected and locked flags (see
//! [`check_access`]).
//!
//! Documents are replaced wholesale on reload (copy-on-write), so readers
//! never observe a half-applied file.

mod accessor;
pub mod core_config;
mod document;
mod flags;
mod watcher;

pub use accessor::ModuleConfig;
pub use document::{ConfigGroup, ConfigItem, ModuleDocument};
pub use flags::{check_access, AccessDecision, ConfigFlags, DenyReason, Operation};
pub use watcher::ConfigWatcher;

use crate::error::{ConfigError, ConfigResult};
use crate::value::{ValueKind, ValueType};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Module identity of the core, which owns `core.yaml` and may write
/// protected entries of every module.
pub const CORE_MODULE: &str = "Core";

const CORE_FILE: &str = "core.yaml";
const MODULES_DIR: &str = "modules";
const EXTENSION: &str = "yaml";

/// Result of a [`ConfigRegistry::set_value`] call that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The write was refused and nothing changed
    Rejected(DenyReason),
}

/// One row of [`ConfigRegistry::list_entries`]
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub module: String,
    pub group: String,
    pub name: String,
    pub description: String,
    pub type_tag: String,
    pub current_value: Value,
    pub flags: ConfigFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    module: String,
    group: String,
    name: String,
}

impl EntryKey {
    fn new(module: &str, group: &str, name: &str) -> Self {
        Self {
            module: module.to_string(),
            group: group.to_string(),
            name: name.to_string(),
        }
    }
}

/// What a module registered for one entry; re-applied after every reload
#[derive(Debug, Clone)]
struct Registration {
    kind: ValueKind,
    default: Value,
    description: String,
    flags: ConfigFlags,
}

struct RegistryInner {
    root: PathBuf,
    documents: DashMap<String, Arc<ModuleDocument>>,
    registrations: DashMap<EntryKey, Registration>,
    track_changes: AtomicBool,
    /// Serialises document mutation and the file write that follows it
    write_lock: Mutex<()>,
    /// Fingerprint of the text last written to each file
    last_written: DashMap<PathBuf, u64>,
}

/// Process-wide configuration catalog. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct ConfigRegistry {
    inner: Arc<RegistryInner>,
}

/// A resolved entry: owning module, flags and a copy of the item
struct Resolved {
    module: String,
    flags: ConfigFlags,
    item: ConfigItem,
}

impl ConfigRegistry {
    /// Registry persisting documents under `root`. Nothing is read until a
    /// module is first used.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                root: root.into(),
                documents: DashMap::new(),
                registrations: DashMap::new(),
                track_changes: AtomicBool::new(false),
                write_lock: Mutex::new(()),
                last_written: DashMap::new(),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Accessor bound to one module identity.
    pub fn module(&self, module: &str) -> ModuleConfig {
        ModuleConfig::new(self.clone(), module)
    }

    /// When enabled, every accepted write is saved to disk. Otherwise only
    /// writes to global entries and writes by the core module are.
    pub fn set_track_changes(&self, enabled: bool) {
        self.inner.track_changes.store(enabled, Ordering::Relaxed);
    }

    pub fn track_changes(&self) -> bool {
        self.inner.track_changes.load(Ordering::Relaxed)
    }

    /// Copies core's `Config/TrackChanges` entry, when registered, into the
    /// switch read by [`set_value`](Self::set_value).
    pub(crate) fn sync_track_changes(&self) {
        if !self.has_value(CORE_MODULE, core_config::CONFIG_GROUP, core_config::TRACK_CHANGES) {
            return;
        }
        match self.get_value::<bool>(CORE_MODULE, core_config::CONFIG_GROUP, core_config::TRACK_CHANGES) {
            Ok(enabled) => self.set_track_changes(enabled),
            Err(e) => warn!("Keeping TrackChanges at {}: {}", self.track_changes(), e),
        }
    }

    /// Names of every module with a document in memory.
    pub fn modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self.inner.documents.iter().map(|d| d.key().clone()).collect();
        modules.sort();
        modules
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// File backing a module's document.
    pub fn path_for(&self, module: &str) -> PathBuf {
        if module == CORE_MODULE {
            self.inner.root.join(CORE_FILE)
        } else {
            self.inner
                .root
                .join(MODULES_DIR)
                .join(format!("{}.{}", module, EXTENSION))
        }
    }

    /// Maps a document path back to its module, if it is one of ours.
    pub fn module_for_path(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        let parent = path.parent()?;

        if file_name == CORE_FILE && same_dir(parent, &self.inner.root) {
            return Some(CORE_MODULE.to_string());
        }
        if !same_dir(parent, &self.inner.root.join(MODULES_DIR)) {
            return None;
        }

        let stem = file_name.strip_suffix(&format!(".{}", EXTENSION))?;
        let known = self
            .inner
            .documents
            .iter()
            .find(|d| d.key().eq_ignore_ascii_case(stem))
            .map(|d| d.key().clone());
        Some(known.unwrap_or_else(|| stem.to_string()))
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// The module's document, loading it from disk (or starting an empty
    /// one) on first use.
    pub fn document(&self, module: &str) -> ConfigResult<Arc<ModuleDocument>> {
        if let Some(doc) = self.inner.documents.get(module) {
            return Ok(doc.value().clone());
        }

        let path = self.path_for(module);
        let doc = match ModuleDocument::read(&path)? {
            Some((doc, _)) => {
                debug!("Loaded config document {}", path.display());
                self.reconcile(module, doc)
            }
            None => ModuleDocument::new(module),
        };
        let doc = self
            .inner
            .documents
            .entry(module.to_string())
            .or_insert_with(|| Arc::new(doc))
            .value()
            .clone();
        Ok(doc)
    }

    fn save_document(&self, module: &str, doc: &ModuleDocument) -> ConfigResult<()> {
        let path = self.path_for(module);
        let text = doc.to_yaml()?;
        document::write_atomic(&path, &text)?;
        self.inner.last_written.insert(path, fingerprint(&text));
        Ok(())
    }

    /// Applies a change to a module's document, optionally saves it, then
    /// stores the new copy. Runs under the write lock.
    fn update_document<R>(
        &self,
        module: &str,
        save: impl FnOnce(&R) -> bool,
        change: impl FnOnce(&mut ModuleDocument) -> R,
    ) -> ConfigResult<R> {
        let mut doc = self.document(module)?;
        let result = change(Arc::make_mut(&mut doc));
        // A failed save leaves the previous document in effect
        if save(&result) {
            self.save_document(module, &doc)?;
        }
        self.inner.documents.insert(module.to_string(), doc);
        Ok(result)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Creates or updates an entry and saves the module's document.
    ///
    /// On update the description, default, type and flags are refreshed; the
    /// current value is kept when it still fits the new type.
    pub fn register_config<T: ValueType>(
        &self,
        module: &str,
        group: &str,
        name: &str,
        description: &str,
        default: T,
        flags: ConfigFlags,
    ) -> ConfigResult<()> {
        let kind = T::kind();
        let default = default.to_value();
        let _guard = self.inner.write_lock.lock();

        self.inner.registrations.insert(
            EntryKey::new(module, group, name),
            Registration {
                kind: kind.clone(),
                default: default.clone(),
                description: description.to_string(),
                flags,
            },
        );

        self.update_document(
            module,
            |_| true,
            |doc| {
                let fresh = doc.item(group, name).is_none();
                let item = doc.item_or_insert(group, name);
                let same_type = item
                    .type_tag
                    .parse::<ValueKind>()
                    .map(|old| kind.accepts(&old))
                    .unwrap_or(false);

                item.current_value = match kind.normalize(&item.current_value) {
                    Ok(current) if !fresh && same_type => current,
                    _ => {
                        if !fresh {
                            warn!(
                                "Resetting {}/{}/{} to its default, stored value does not fit {}",
                                module, group, name, kind
                            );
                        }
                        default.clone()
                    }
                };
                item.description = description.to_string();
                item.default_value = default.clone();
                item.type_tag = kind.to_string();
                doc.touch();
            },
        )?;

        debug!("Registered config {}/{}/{} ({}, {})", module, group, name, kind, flags);
        Ok(())
    }

    fn flags_of(&self, module: &str, group: &str, name: &str) -> ConfigFlags {
        self.inner
            .registrations
            .get(&EntryKey::new(module, group, name))
            .map(|r| r.flags)
            .unwrap_or_default()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Finds the entry `caller` means by `group`/`name`: its own first, then
    /// one in another module. Foreign candidates are tried in module name
    /// order and the first one `operation` is allowed on wins; otherwise the
    /// first denial is reported.
    fn resolve(
        &self,
        caller: &str,
        group: &str,
        name: &str,
        operation: Operation,
    ) -> ConfigResult<Result<Resolved, (Resolved, DenyReason)>> {
        let own = self.document(caller)?;
        if let Some(item) = own.item(group, name) {
            return Ok(Ok(Resolved {
                module: caller.to_string(),
                flags: self.flags_of(caller, group, name),
                item: item.clone(),
            }));
        }

        let mut denied = None;
        for module in self.modules() {
            if module == caller {
                continue;
            }
            let Some(doc) = self.inner.documents.get(&module).map(|d| d.value().clone()) else {
                continue;
            };
            let Some(item) = doc.item(group, name) else {
                continue;
            };

            let flags = self.flags_of(&module, group, name);
            let resolved = Resolved {
                module: module.clone(),
                flags,
                item: item.clone(),
            };
            match check_access(&module, flags, caller, operation, CORE_MODULE) {
                AccessDecision::Allowed => return Ok(Ok(resolved)),
                AccessDecision::Denied(reason) => {
                    denied.get_or_insert((resolved, reason));
                }
            }
        }

        match denied {
            Some(denial) => Ok(Err(denial)),
            None => Err(ConfigError::NotFound {
                module: caller.to_string(),
                group: group.to_string(),
                key: name.to_string(),
            }),
        }
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Reads an entry as `T`.
    ///
    /// Fails with [`ConfigError::NotFound`] when neither the caller nor a
    /// global entry of another module has it, and with [`ConfigError::Cast`]
    /// when the stored type cannot be read as `T`.
    pub fn get_value<T: ValueType>(&self, caller: &str, group: &str, name: &str) -> ConfigResult<T> {
        let not_found = || ConfigError::NotFound {
            module: caller.to_string(),
            group: group.to_string(),
            key: name.to_string(),
        };

        let resolved = match self.resolve(caller, group, name, Operation::Read) {
            Ok(Ok(resolved)) => resolved,
            Ok(Err((denied, reason))) => {
                warn!(
                    "{} cannot read {}/{}/{}: {}",
                    caller, denied.module, group, name, reason
                );
                return Err(not_found());
            }
            Err(e) => {
                warn!("Configuration not found: {}/{}/{}", caller, group, name);
                return Err(e);
            }
        };

        let requested = T::kind();
        let cast_error = || ConfigError::Cast {
            key: format!("{}/{}/{}", resolved.module, group, name),
            stored: resolved.item.type_tag.clone(),
            requested: requested.to_string(),
        };

        if let Ok(stored) = resolved.item.type_tag.parse::<ValueKind>() {
            if !requested.accepts(&stored) {
                warn!(
                    "Cast error reading {}/{}/{}: stored {}, requested {}",
                    resolved.module, group, name, stored, requested
                );
                return Err(cast_error());
            }
        }

        T::from_value(&resolved.item.current_value).map_err(|e| {
            warn!("Cast error reading {}/{}/{}: {}", resolved.module, group, name, e);
            cast_error()
        })
    }

    /// Writes an entry.
    ///
    /// Writes to another module's protected entry fail with
    /// [`ConfigError::Protected`] unless the caller is the core module. Writes
    /// to foreign non-global or locked entries, and values whose type does
    /// not fit the entry, are logged and rejected without changing anything.
    pub fn set_value<T: ValueType>(
        &self,
        caller: &str,
        group: &str,
        name: &str,
        value: T,
    ) -> ConfigResult<WriteOutcome> {
        let _guard = self.inner.write_lock.lock();

        let resolved = match self.resolve(caller, group, name, Operation::Write)? {
            Ok(resolved) => resolved,
            Err((denied, DenyReason::Protected)) => {
                warn!("{} tried to modify protected {}/{}/{}", caller, denied.module, group, name);
                return Err(ConfigError::Protected {
                    module: denied.module,
                    group: group.to_string(),
                    key: name.to_string(),
                    caller: caller.to_string(),
                });
            }
            Err((denied, reason)) => {
                warn!(
                    "Rejected write by {} to {}/{}/{}: {}",
                    caller, denied.module, group, name, reason
                );
                return Ok(WriteOutcome::Rejected(reason));
            }
        };

        let supplied = T::kind();
        let value = value.to_value();
        let normalized = resolved
            .item
            .type_tag
            .parse::<ValueKind>()
            .ok()
            .filter(|stored| stored.accepts(&supplied))
            .and_then(|stored| stored.normalize(&value).ok());
        let Some(normalized) = normalized else {
            warn!(
                "Rejected write to {}/{}/{}: entry type is {}, value type is {}",
                resolved.module, group, name, resolved.item.type_tag, supplied
            );
            return Ok(WriteOutcome::Rejected(DenyReason::TypeMismatch));
        };

        let save = self.track_changes() || resolved.flags.is_global() || caller == CORE_MODULE;
        let module = resolved.module;
        let updated = self.update_document(
            &module,
            |updated| *updated && save,
            |doc| match doc.item_mut(group, name) {
                Some(item) => {
                    item.current_value = normalized;
                    doc.touch();
                    true
                }
                None => false,
            },
        )?;

        if !updated {
            // The document was reloaded between resolution and the write
            return Ok(WriteOutcome::Rejected(DenyReason::NotFound));
        }
        if module == CORE_MODULE && group == core_config::CONFIG_GROUP && name == core_config::TRACK_CHANGES {
            self.sync_track_changes();
        }
        debug!("{} set {}/{}/{}", caller, module, group, name);
        Ok(WriteOutcome::Applied)
    }

    /// Whether `module` itself has the entry. No cross-module lookup.
    pub fn has_value(&self, module: &str, group: &str, name: &str) -> bool {
        self.document(module)
            .map(|doc| doc.item(group, name).is_some())
            .unwrap_or(false)
    }

    /// Every entry in memory. Protected entries are left out unless
    /// `show_protected` is set.
    pub fn list_entries(&self, show_protected: bool) -> Vec<EntryInfo> {
        let mut out = Vec::new();
        for module in self.modules() {
            let Some(doc) = self.inner.documents.get(&module).map(|d| d.value().clone()) else {
                continue;
            };
            for (group, item) in doc.entries() {
                let flags = self.flags_of(&module, group, &item.name);
                if flags.is_protected() && !show_protected {
                    continue;
                }
                out.push(EntryInfo {
                    module: module.clone(),
                    group: group.to_string(),
                    name: item.name.clone(),
                    description: item.description.clone(),
                    type_tag: item.type_tag.clone(),
                    current_value: item.current_value.clone(),
                    flags,
                });
            }
        }
        out
    }

    // ========================================================================
    // Reload
    // ========================================================================

    /// Reloads every module document from disk.
    ///
    /// Every module is attempted; the first failure is returned.
    pub fn reload_all(&self) -> ConfigResult<()> {
        let mut first_error = None;
        for module in self.modules() {
            if let Err(e) = self.reload_module(&module) {
                warn!("Failed to reload config of {}: {}", module, e);
                first_error.get_or_insert(e);
            }
        }
        info!("🔄 Reloaded {} config documents", self.modules().len());
        first_error.map_or(Ok(()), Err)
    }

    /// Replaces one module's document with the file on disk. A missing file
    /// gives an empty document with registered entries restored.
    pub fn reload_module(&self, module: &str) -> ConfigResult<()> {
        let path = self.path_for(module);
        let doc = match ModuleDocument::read(&path)? {
            Some((doc, _)) => doc,
            None => ModuleDocument::new(module),
        };
        self.install(module, doc);
        if module == CORE_MODULE {
            self.sync_track_changes();
        }
        Ok(())
    }

    /// Reloads the module behind a changed file. Returns the module name, or
    /// `None` when the file is not a module document or still holds what the
    /// registry itself last wrote.
    pub fn reload_changed_file(&self, path: &Path) -> ConfigResult<Option<String>> {
        let Some(module) = self.module_for_path(path) else {
            return Ok(None);
        };
        let Some((doc, text)) = ModuleDocument::read(path)? else {
            return Ok(None);
        };

        let own_write = self
            .inner
            .last_written
            .get(&self.path_for(&module))
            .map(|f| *f == fingerprint(&text))
            .unwrap_or(false);
        if own_write {
            debug!("Ignoring change to {}, matches last write", path.display());
            return Ok(None);
        }

        self.install(&module, doc);
        if module == CORE_MODULE {
            self.sync_track_changes();
        }
        info!("🔄 Reloaded config of {} after file change", module);
        Ok(Some(module))
    }

    fn install(&self, module: &str, doc: ModuleDocument) {
        let _guard = self.inner.write_lock.lock();
        let doc = self.reconcile(module, doc);
        self.inner.documents.insert(module.to_string(), Arc::new(doc));
    }

    /// Brings a freshly read document in line with what the module registered:
    /// unreadable or ill-typed entries fall back to their registered default,
    /// and registered entries missing from the file are restored.
    fn reconcile(&self, module: &str, mut doc: ModuleDocument) -> ModuleDocument {
        let registrations: Vec<(EntryKey, Registration)> = self
            .inner
            .registrations
            .iter()
            .filter(|r| r.key().module == module)
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        for (key, registration) in registrations {
            let item = doc.item_or_insert(&key.group, &key.name);
            let tag_ok = item
                .type_tag
                .parse::<ValueKind>()
                .map(|kind| kind == registration.kind)
                .unwrap_or(false);

            if !tag_ok {
                if !item.type_tag.is_empty() {
                    warn!(
                        "Config {}/{}/{} has type {:?}, expected {}; using default",
                        module, key.group, key.name, item.type_tag, registration.kind
                    );
                }
                item.type_tag = registration.kind.to_string();
                item.current_value = registration.default.clone();
            } else {
                match registration.kind.normalize(&item.current_value) {
                    Ok(value) => item.current_value = value,
                    Err(e) => {
                        warn!(
                            "Config {}/{}/{} holds an invalid value, using default: {}",
                            module, key.group, key.name, e
                        );
                        item.current_value = registration.default.clone();
                    }
                }
            }
            if item.description.is_empty() {
                item.description = registration.description.clone();
            }
            item.default_value = registration.default.clone();
        }
        doc
    }

    /// Drops every document and registration.
    pub fn clear(&self) {
        let _guard = self.inner.write_lock.lock();
        self.inner.documents.clear();
        self.inner.registrations.clear();
        self.inner.last_written.clear();
    }
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("root", &self.inner.root)
            .field("modules", &self.inner.documents.len())
            .field("track_changes", &self.track_changes())
            .finish()
    }
}

fn fingerprint(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> ConfigRegistry {
        ConfigRegistry::new(dir.path())
    }

    #[test]
    fn test_paths_and_module_mapping() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        assert_eq!(registry.path_for(CORE_MODULE), dir.path().join("core.yaml"));
        assert_eq!(
            registry.path_for("Ranks"),
            dir.path().join("modules").join("Ranks.yaml")
        );
        assert_eq!(
            registry.module_for_path(&dir.path().join("core.yaml")).as_deref(),
            Some(CORE_MODULE)
        );
        assert_eq!(
            registry
                .module_for_path(&dir.path().join("modules").join("Stats.yaml"))
                .as_deref(),
            Some("Stats")
        );
        assert!(registry.module_for_path(&dir.path().join("other.yaml")).is_none());
        assert!(registry
            .module_for_path(&dir.path().join("modules").join("Stats.yaml.tmp"))
            .is_none());
    }

    #[test]
    fn test_register_creates_file_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry
            .register_config("Ranks", "Points", "PerKill", "Points per kill", 10i64, ConfigFlags::NONE)
            .unwrap();

        assert!(registry.path_for("Ranks").exists());
        assert_eq!(registry.get_value::<i64>("Ranks", "Points", "PerKill").unwrap(), 10);
        assert!(registry.has_value("Ranks", "Points", "PerKill"));
        assert!(!registry.has_value("Stats", "Points", "PerKill"));
    }

    #[test]
    fn test_reregistration_keeps_current_value() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry
            .register_config("Ranks", "General", "MinPlayers", "", 4i64, ConfigFlags::NONE)
            .unwrap();
        assert_eq!(
            registry.set_value("Ranks", "General", "MinPlayers", 6i64).unwrap(),
            WriteOutcome::Applied
        );

        registry
            .register_config("Ranks", "General", "MinPlayers", "minimum players", 2i64, ConfigFlags::NONE)
            .unwrap();
        assert_eq!(registry.get_value::<i64>("Ranks", "General", "MinPlayers").unwrap(), 6);

        // A type change that the old value cannot satisfy resets it
        registry
            .register_config("Ranks", "General", "MinPlayers", "", true, ConfigFlags::NONE)
            .unwrap();
        assert!(!registry.get_value::<bool>("Ranks", "General", "MinPlayers").unwrap());
    }

    #[test]
    fn test_cast_error_on_wrong_type() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry
            .register_config("Ranks", "General", "Prefix", "", "[Rank]".to_string(), ConfigFlags::NONE)
            .unwrap();

        match registry.get_value::<i64>("Ranks", "General", "Prefix") {
            Err(ConfigError::Cast { stored, requested, .. }) => {
                assert_eq!(stored, "string");
                assert_eq!(requested, "int");
            }
            other => panic!("expected cast error, got {:?}", other),
        }
        // Widening int to float is allowed
        registry
            .register_config("Ranks", "General", "Bonus", "", 2i64, ConfigFlags::NONE)
            .unwrap();
        assert_eq!(registry.get_value::<f64>("Ranks", "General", "Bonus").unwrap(), 2.0);
    }

    #[test]
    fn test_untracked_writes_stay_in_memory() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry
            .register_config("Ranks", "General", "Local", "", 1i64, ConfigFlags::NONE)
            .unwrap();
        registry
            .register_config("Ranks", "General", "Shared", "", 1i64, ConfigFlags::GLOBAL)
            .unwrap();

        registry.set_value("Ranks", "General", "Local", 2i64).unwrap();
        registry.set_value("Ranks", "General", "Shared", 3i64).unwrap();

        let (on_disk, _) = ModuleDocument::read(&registry.path_for("Ranks")).unwrap().unwrap();
        assert_eq!(on_disk.item("General", "Local").unwrap().current_value, json!(1));
        assert_eq!(on_disk.item("General", "Shared").unwrap().current_value, json!(3));

        registry.set_track_changes(true);
        registry.set_value("Ranks", "General", "Local", 5i64).unwrap();
        let (on_disk, _) = ModuleDocument::read(&registry.path_for("Ranks")).unwrap().unwrap();
        assert_eq!(on_disk.item("General", "Local").unwrap().current_value, json!(5));
    }

    #[test]
    fn test_failed_save_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry
            .register_config("Ranks", "General", "Shared", "", 1i64, ConfigFlags::GLOBAL)
            .unwrap();

        // A directory where the temp file goes makes the atomic write fail
        let blocker = registry.path_for("Ranks").with_extension("yaml.tmp");
        std::fs::create_dir_all(&blocker).unwrap();

        assert!(matches!(
            registry.set_value("Ranks", "General", "Shared", 2i64),
            Err(ConfigError::FileWrite(..))
        ));
        assert_eq!(registry.get_value::<i64>("Ranks", "General", "Shared").unwrap(), 1);

        std::fs::remove_dir(&blocker).unwrap();
        assert_eq!(
            registry.set_value("Ranks", "General", "Shared", 2i64).unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(registry.get_value::<i64>("Ranks", "General", "Shared").unwrap(), 2);
    }

    #[test]
    fn test_reload_falls_back_to_default_for_bad_entries() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry
            .register_config("Ranks", "General", "Enabled", "", true, ConfigFlags::GLOBAL)
            .unwrap();
        registry
            .register_config("Ranks", "General", "Scale", "", 1.5f64, ConfigFlags::NONE)
            .unwrap();

        let path = registry.path_for("Ranks");
        let mut doc = ModuleDocument::new("Ranks");
        let enabled = doc.item_or_insert("General", "Enabled");
        enabled.type_tag = "list<".to_string();
        enabled.current_value = json!("garbage");
        let scale = doc.item_or_insert("General", "Scale");
        scale.type_tag = "float".to_string();
        scale.current_value = json!("2.5");
        document::write_atomic(&path, &doc.to_yaml().unwrap()).unwrap();

        registry.reload_all().unwrap();

        assert!(registry.get_value::<bool>("Ranks", "General", "Enabled").unwrap());
        assert_eq!(registry.get_value::<f64>("Ranks", "General", "Scale").unwrap(), 2.5);
        // Flags survive the reload
        assert!(registry.get_value::<bool>("Stats", "General", "Enabled").unwrap());
    }

    #[test]
    fn test_changed_file_reload_ignores_own_writes() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry
            .register_config("Ranks", "General", "Limit", "", 3i64, ConfigFlags::NONE)
            .unwrap();
        let path = registry.path_for("Ranks");

        assert_eq!(registry.reload_changed_file(&path).unwrap(), None);

        let (mut doc, _) = ModuleDocument::read(&path).unwrap().unwrap();
        doc.item_mut("General", "Limit").unwrap().current_value = json!(9);
        document::write_atomic(&path, &doc.to_yaml().unwrap()).unwrap();

        assert_eq!(registry.reload_changed_file(&path).unwrap().as_deref(), Some("Ranks"));
        assert_eq!(registry.get_value::<i64>("Ranks", "General", "Limit").unwrap(), 9);
    }

    #[test]
    fn test_list_entries_hides_protected() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry
            .register_config(CORE_MODULE, "Database", "Password", "", String::new(), ConfigFlags::PROTECTED)
            .unwrap();
        registry
            .register_config(CORE_MODULE, "Database", "Hostname", "", "localhost".to_string(), ConfigFlags::NONE)
            .unwrap();

        let public = registry.list_entries(false);
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].name, "Hostname");

        let all = registry.list_entries(true);
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|e| e.name == "Password" && e.flags.is_protected()));
    }

    #[test]
    fn test_existing_file_is_loaded_on_first_use() {
        let dir = TempDir::new().unwrap();
        {
            let registry = registry(&dir);
            registry
                .register_config("Ranks", "General", "Limit", "", 3i64, ConfigFlags::NONE)
                .unwrap();
            registry.set_track_changes(true);
            registry.set_value("Ranks", "General", "Limit", 7i64).unwrap();
        }

        let registry = registry(&dir);
        assert!(registry.has_value("Ranks", "General", "Limit"));
        registry
            .register_config("Ranks", "General", "Limit", "", 3i64, ConfigFlags::NONE)
            .unwrap();
        assert_eq!(registry.get_value::<i64>("Ranks", "General", "Limit").unwrap(), 7);
    }
}
