//! Module-bound accessor over the config registry

use super::{ConfigFlags, ConfigRegistry, WriteOutcome};
use crate::error::ConfigResult;
use crate::value::ValueType;

/// [`ConfigRegistry`] access bound to one module identity.
///
/// ```rust,no_run
/// use zenith_core::config::{ConfigFlags, ConfigRegistry};
///
/// let registry = ConfigRegistry::new("configs");
/// let config = registry.module("Ranks");
/// config.register("Settings", "VipMultiplier", "vip bonus", 1.25f64, ConfigFlags::NONE)?;
/// let multiplier: f64 = config.get("Settings", "VipMultiplier")?;
/// # Ok::<(), zenith_core::error::ConfigError>(())
/// ```
#[derive(Clone, Debug)]
pub struct ModuleConfig {
    registry: ConfigRegistry,
    module: String,
}

impl ModuleConfig {
    pub(crate) fn new(registry: ConfigRegistry, module: impl Into<String>) -> Self {
        Self {
            registry,
            module: module.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn register<T: ValueType>(
        &self,
        group: &str,
        name: &str,
        description: &str,
        default: T,
        flags: ConfigFlags,
    ) -> ConfigResult<()> {
        self.registry
            .register_config(&self.module, group, name, description, default, flags)
    }

    pub fn get<T: ValueType>(&self, group: &str, name: &str) -> ConfigResult<T> {
        self.registry.get_value(&self.module, group, name)
    }

    /// Reads a value, falling back to `fallback` on any error.
    pub fn get_or<T: ValueType>(&self, group: &str, name: &str, fallback: T) -> T {
        self.get(group, name).unwrap_or(fallback)
    }

    pub fn set<T: ValueType>(&self, group: &str, name: &str, value: T) -> ConfigResult<WriteOutcome> {
        self.registry.set_value(&self.module, group, name, value)
    }

    pub fn has(&self, group: &str, name: &str) -> bool {
        self.registry.has_value(&self.module, group, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_accessor_binds_module() {
        let dir = TempDir::new().unwrap();
        let registry = ConfigRegistry::new(dir.path());
        let ranks = registry.module("Ranks");
        let stats = registry.module("Stats");

        ranks
            .register("General", "Enabled", "", true, ConfigFlags::NONE)
            .unwrap();

        assert!(ranks.has("General", "Enabled"));
        assert!(!stats.has("General", "Enabled"));
        assert!(ranks.get::<bool>("General", "Enabled").unwrap());
        assert!(stats.get::<bool>("General", "Enabled").is_err());
        assert!(!stats.get_or("General", "Enabled", false));

        assert_eq!(ranks.set("General", "Enabled", false).unwrap(), WriteOutcome::Applied);
        assert!(!ranks.get::<bool>("General", "Enabled").unwrap());
    }
}
