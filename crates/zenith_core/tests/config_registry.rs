//! Config registry access rules across modules

use tempfile::TempDir;
use zenith_core::config::{ConfigFlags, ConfigRegistry, DenyReason, ModuleDocument, WriteOutcome, CORE_MODULE};
use zenith_core::error::ConfigError;

fn registry() -> (TempDir, ConfigRegistry) {
    let dir = TempDir::new().unwrap();
    let registry = ConfigRegistry::new(dir.path());
    (dir, registry)
}

#[test]
fn test_vip_multiplier_becomes_visible_once_global() {
    let (_dir, registry) = registry();
    registry
        .register_config("RanksModule", "Settings", "VipMultiplier", "vip bonus", 1.25f64, ConfigFlags::NONE)
        .unwrap();

    match registry.get_value::<f64>("OtherModule", "Settings", "VipMultiplier") {
        Err(ConfigError::NotFound { module, group, key }) => {
            assert_eq!(module, "OtherModule");
            assert_eq!(group, "Settings");
            assert_eq!(key, "VipMultiplier");
        }
        other => panic!("expected not found, got {:?}", other),
    }

    registry
        .register_config("RanksModule", "Settings", "VipMultiplier", "vip bonus", 1.25f64, ConfigFlags::GLOBAL)
        .unwrap();
    assert_eq!(
        registry
            .get_value::<f64>("OtherModule", "Settings", "VipMultiplier")
            .unwrap(),
        1.25
    );
}

#[test]
fn test_list_type_mismatch_is_rejected() {
    let (_dir, registry) = registry();
    let ranks = registry.module("Ranks");
    ranks
        .register(
            "Settings",
            "Tags",
            "tags",
            vec!["vip".to_string(), "admin".to_string()],
            ConfigFlags::NONE,
        )
        .unwrap();

    let outcome = ranks.set("Settings", "Tags", vec![1i64, 2, 3]).unwrap();
    assert_eq!(outcome, WriteOutcome::Rejected(DenyReason::TypeMismatch));
    assert_eq!(
        ranks.get::<Vec<String>>("Settings", "Tags").unwrap(),
        vec!["vip".to_string(), "admin".to_string()]
    );

    let outcome = ranks.set("Settings", "Tags", vec!["mod".to_string()]).unwrap();
    assert_eq!(outcome, WriteOutcome::Applied);
    assert_eq!(ranks.get::<Vec<String>>("Settings", "Tags").unwrap(), vec!["mod".to_string()]);
}

#[test]
fn test_flag_enforcement_for_foreign_callers() {
    let (_dir, registry) = registry();
    let owner = registry.module("Ranks");
    owner.register("General", "Private", "", 1i64, ConfigFlags::NONE).unwrap();
    owner.register("General", "Shared", "", 1i64, ConfigFlags::GLOBAL).unwrap();
    owner
        .register("General", "ReadOnly", "", 1i64, ConfigFlags::GLOBAL | ConfigFlags::LOCKED)
        .unwrap();
    owner
        .register("General", "Guarded", "", 1i64, ConfigFlags::GLOBAL | ConfigFlags::PROTECTED)
        .unwrap();

    let stranger = registry.module("Stats");

    // Not global: invisible and unwritable
    assert!(matches!(
        stranger.get::<i64>("General", "Private"),
        Err(ConfigError::NotFound { .. })
    ));
    assert_eq!(
        stranger.set("General", "Private", 5i64).unwrap(),
        WriteOutcome::Rejected(DenyReason::NotGlobalCrossModule)
    );
    assert_eq!(owner.get::<i64>("General", "Private").unwrap(), 1);

    // Global: readable and writable
    assert_eq!(stranger.set("General", "Shared", 5i64).unwrap(), WriteOutcome::Applied);
    assert_eq!(owner.get::<i64>("General", "Shared").unwrap(), 5);

    // Locked: silently refused
    assert_eq!(
        stranger.set("General", "ReadOnly", 5i64).unwrap(),
        WriteOutcome::Rejected(DenyReason::Locked)
    );
    assert_eq!(stranger.get::<i64>("General", "ReadOnly").unwrap(), 1);

    // Protected: an error for everyone but the owner and core
    assert!(matches!(
        stranger.set("General", "Guarded", 5i64),
        Err(ConfigError::Protected { .. })
    ));
    assert_eq!(
        registry.set_value(CORE_MODULE, "General", "Guarded", 9i64).unwrap(),
        WriteOutcome::Applied
    );
    assert_eq!(owner.get::<i64>("General", "Guarded").unwrap(), 9);

    // Missing entirely
    assert!(matches!(
        stranger.set("General", "Nope", 1i64),
        Err(ConfigError::NotFound { .. })
    ));
}

#[test]
fn test_own_entry_shadows_foreign_global() {
    let (_dir, registry) = registry();
    registry
        .register_config("Ranks", "General", "Prefix", "", "[R]".to_string(), ConfigFlags::GLOBAL)
        .unwrap();
    registry
        .register_config("Stats", "General", "Prefix", "", "[S]".to_string(), ConfigFlags::NONE)
        .unwrap();

    assert_eq!(registry.get_value::<String>("Stats", "General", "Prefix").unwrap(), "[S]");
    assert_eq!(registry.get_value::<String>("Bans", "General", "Prefix").unwrap(), "[R]");
    assert!(!registry.has_value("Bans", "General", "Prefix"));
}

#[test]
fn test_documents_persist_without_flags() {
    let (dir, registry) = registry();
    registry
        .register_config("Ranks", "General", "Guarded", "guarded value", 3i64, ConfigFlags::PROTECTED)
        .unwrap();

    let text = std::fs::read_to_string(dir.path().join("modules").join("Ranks.yaml")).unwrap();
    assert!(text.contains("moduleName: Ranks"));
    assert!(text.contains("description: guarded value"));
    assert!(!text.to_lowercase().contains("protected"));

    let (doc, _) = ModuleDocument::read(&registry.path_for("Ranks")).unwrap().unwrap();
    assert_eq!(doc.item("General", "Guarded").unwrap().type_tag, "int");
}

#[test]
fn test_reload_all_picks_up_edits_and_keeps_flags() {
    let (_dir, registry) = registry();
    registry
        .register_config("Ranks", "General", "Limit", "", 3i64, ConfigFlags::GLOBAL | ConfigFlags::LOCKED)
        .unwrap();

    let path = registry.path_for("Ranks");
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("currentValue: 3", "currentValue: 8")).unwrap();

    registry.reload_all().unwrap();
    assert_eq!(registry.get_value::<i64>("Stats", "General", "Limit").unwrap(), 8);
    assert_eq!(
        registry.set_value("Stats", "General", "Limit", 1i64).unwrap(),
        WriteOutcome::Rejected(DenyReason::Locked)
    );
}
