//! On-disk module documents
//!
//! ```yaml
//! moduleName: Ranks
//! createdAt: 2024-05-01T12:00:00Z
//! lastUpdated: 2024-05-02T08:30:00Z
//! groups:
//!   - name: Settings
//!     items:
//!       - name: VipMultiplier
//!         description: vip bonus
//!         defaultValue: 1.25
//!         currentValue: 1.5
//!         type: float
//! ```

use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_value: Value,
    #[serde(default)]
    pub current_value: Value,
    /// Serialized type tag, see [`ValueKind`](crate::value::ValueKind)
    #[serde(rename = "type", default)]
    pub type_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigGroup {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ConfigItem>,
}

/// All config groups of one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDocument {
    pub module_name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub groups: Vec<ConfigGroup>,
}

impl ModuleDocument {
    pub fn new(module: &str) -> Self {
        let now = Utc::now();
        Self {
            module_name: module.to_string(),
            created_at: now,
            last_updated: now,
            groups: Vec::new(),
        }
    }

    pub fn item(&self, group: &str, name: &str) -> Option<&ConfigItem> {
        self.groups
            .iter()
            .find(|g| g.name == group)
            .and_then(|g| g.items.iter().find(|i| i.name == name))
    }

    pub fn item_mut(&mut self, group: &str, name: &str) -> Option<&mut ConfigItem> {
        self.groups
            .iter_mut()
            .find(|g| g.name == group)
            .and_then(|g| g.items.iter_mut().find(|i| i.name == name))
    }

    /// Returns the item, creating its group and an empty item when missing.
    pub fn item_or_insert(&mut self, group: &str, name: &str) -> &mut ConfigItem {
        let group_index = match self.groups.iter().position(|g| g.name == group) {
            Some(index) => index,
            None => {
                self.groups.push(ConfigGroup {
                    name: group.to_string(),
                    items: Vec::new(),
                });
                self.groups.len() - 1
            }
        };

        let items = &mut self.groups[group_index].items;
        let item_index = match items.iter().position(|i| i.name == name) {
            Some(index) => index,
            None => {
                items.push(ConfigItem {
                    name: name.to_string(),
                    description: String::new(),
                    default_value: Value::Null,
                    current_value: Value::Null,
                    type_tag: String::new(),
                });
                items.len() - 1
            }
        };
        &mut items[item_index]
    }

    /// Every `(group, item)` pair in document order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConfigItem)> {
        self.groups
            .iter()
            .flat_map(|g| g.items.iter().map(move |i| (g.name.as_str(), i)))
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize(self.module_name.clone(), e))
    }

    pub fn from_yaml(path: &Path, text: &str) -> ConfigResult<Self> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Reads a document. A missing file is `Ok(None)`.
    pub fn read(path: &Path) -> ConfigResult<Option<(Self, String)>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some((Self::from_yaml(path, &text)?, text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::FileRead(path.to_path_buf(), e)),
        }
    }
}

/// Replaces `path` with `contents` through a sibling temp file, so readers
/// (and the file watcher) never see a half-written document.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::FileWrite(parent.to_path_buf(), e))?;
    }
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, contents).map_err(|e| ConfigError::FileWrite(tmp.clone(), e))?;
    std::fs::rename(&tmp, path).map_err(|e| ConfigError::FileWrite(path.to_path_buf(), e))
}
