use std::path::PathBuf;

use tempfile::TempDir;

use rollout_core::config::{CONFIG_FILE_NAME, ConfigStore, RolloutConfig, ServiceEntry};
use rollout_core::context::AppContext;
use rollout_core::plan::DeploymentPlan;
use rollout_core::profile::{BlockInheritance, DeployBlock, Profile};

#[test]
fn load_missing_config_is_an_error() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::for_project(temp.path().to_path_buf());

    let err = store.load().unwrap_err();

    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn save_then_load_roundtrip() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::for_project(temp.path().join("project"));

    let mut config = RolloutConfig::new();
    config.project.version = "3.1.0".to_string();
    config.settings.inherit = BlockInheritance::AllBlocks;
    config.profiles.push(Profile::new("prod").with_deploy(DeployBlock {
        target_namespaces: vec!["prod".to_string()].into(),
        ..Default::default()
    }));
    config.services.push(ServiceEntry {
        name: "api".to_string(),
        dir: Some("services/api".to_string()),
    });

    store.save(&config).unwrap();
    let loaded = store.load().unwrap();

    assert!(temp.path().join("project").join(CONFIG_FILE_NAME).is_file());
    assert_eq!(loaded, config);
}

#[test]
fn starter_config_is_created_and_plans() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::for_project(temp.path().join("shop"));

    store.create(&RolloutConfig::starter("shop")).unwrap();
    let loaded = store.load().unwrap();
    let plan = DeploymentPlan::build(&loaded).unwrap();

    assert_eq!(loaded, RolloutConfig::starter("shop"));
    assert!(plan.graph().contains("buildShop"));
    assert!(plan.graph().contains("deployShopDefault"));
}

#[test]
fn create_never_replaces_an_existing_config() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "[project]\nversion = \"9.9.9\"\n").unwrap();
    let store = ConfigStore::from_path(path.clone());

    let err = store.create(&RolloutConfig::starter("api")).unwrap_err();

    assert!(err.to_string().contains("already exists"), "{err}");
    assert_eq!(store.load().unwrap().project.version, "9.9.9");
}

#[test]
fn invalid_config_reports_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "[[service]]\nname = \"api\"\n\n[[service]]\nname = \"api\"\n").unwrap();

    let err = ConfigStore::from_path(path).load().unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("Failed to parse config file"), "{message}");
    assert!(message.contains("declared more than once"), "{message}");
}

#[test]
fn bare_file_name_resolves_to_current_directory() {
    let store = ConfigStore::from_path(PathBuf::from(CONFIG_FILE_NAME));

    assert_eq!(store.project_root(), PathBuf::from(".").as_path());
}

#[test]
fn app_context_derives_layout_and_state() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    let store = ConfigStore::for_project(project.clone());

    let mut config = RolloutConfig::new();
    config.services.push(ServiceEntry {
        name: "api".to_string(),
        dir: Some("services/api".to_string()),
    });

    let context = AppContext::new(&store, temp.path().join("state"));
    let root = std::fs::canonicalize(&project).unwrap();
    let layout = context.layout(&config);

    assert_eq!(context.project_root(), root.as_path());
    assert_eq!(layout.service_dir("api"), root.join("services/api"));
    assert_eq!(layout.service_dir("worker"), root);
    assert_eq!(layout.version(), "0.0.0");
    assert!(context.state_store().dir().starts_with(temp.path().join("state")));
}
