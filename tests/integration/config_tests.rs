use ctxbuild::config::{Config, ENV_PREFIX};
use ctxbuild::container::ContainerFormat;
use figment::providers::Serialized;
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;

// Environment variables are process-wide.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config.format, ContainerFormat::Packed);
    assert!(!config.overwrite);
    assert!(config.output_dir.is_none());
    assert!(config.max_entry_size.is_none());
    assert!(!config.implicit_descriptors);
}

#[test]
fn test_config_load_from_toml() {
    let _guard = ENV_LOCK.lock().unwrap();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
format = "cabinet"
overwrite = true
output_dir = "/media/recovered"
max_entry_size = 1048576
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(config.format, ContainerFormat::Cabinet);
    assert!(config.overwrite);
    assert_eq!(config.output_dir, Some(PathBuf::from("/media/recovered")));
    assert_eq!(config.max_entry_size, Some(1_048_576));
    assert!(!config.implicit_descriptors);
}

#[test]
fn test_env_overrides_toml() {
    let _guard = ENV_LOCK.lock().unwrap();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "format = \"cabinet\"\noverwrite = true\n").unwrap();

    std::env::set_var(format!("{ENV_PREFIX}FORMAT"), "packed");
    std::env::set_var(format!("{ENV_PREFIX}IMPLICIT_DESCRIPTORS"), "true");

    let config = Config::load_from_path(&config_path);

    std::env::remove_var(format!("{ENV_PREFIX}FORMAT"));
    std::env::remove_var(format!("{ENV_PREFIX}IMPLICIT_DESCRIPTORS"));

    let config = config.unwrap();
    assert_eq!(config.format, ContainerFormat::Packed);
    assert!(config.overwrite);
    assert!(config.implicit_descriptors);
}

#[test]
fn test_invalid_config_falls_back_to_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "format = \"zip\"\n").unwrap();

    assert!(Config::load_from_path(&config_path).is_err());
    assert_eq!(Config::load(Some(config_path.as_path())), Config::default());
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    let temp_dir = tempdir().unwrap();
    let config = Config::load(Some(temp_dir.path().join("absent.toml").as_path()));
    assert_eq!(config, Config::default());
}
